//! Transaction, block and discussion routes
//!
//! Submit-tx and list-validators are authenticated by matching the `Host`
//! header port against the caller node's API port in the registry.

use base64::Engine as _;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::{error_response, error_status, json_ok, host_port, read_json};
use crate::bft::EngineRpc;
use crate::core::{Block, Transaction, TX_REGISTER_VALIDATOR, TX_DISCUSS};
use crate::deliberation::breakdown::run_task_breakdown;
use crate::deliberation::delegation::{notify_assigned_validators, run_task_delegation};
use crate::events::EVENT_NEW_TRANSACTION;
use crate::registry::NodeInfo;
use crate::server::http::AppState;
use crate::types::ConclaveError;

/// Resolve the caller node from the Host header port, or 401.
fn authenticate_caller(
    state: &AppState,
    chain_id: &str,
    req: &Request<Incoming>,
) -> Result<(String, NodeInfo), ConclaveError> {
    let port = host_port(req)
        .ok_or_else(|| ConclaveError::Unauthorized("missing Host header port".to_string()))?;
    state
        .nodes
        .node_by_api_port(chain_id, port)
        .ok_or_else(|| ConclaveError::Unauthorized(format!("node not recognized for port {}", port)))
}

#[derive(Debug, Deserialize)]
struct SubmitTxRequest {
    #[serde(rename = "type", default)]
    tx_type: String,
    #[serde(default)]
    from: String,
    #[serde(default)]
    content: String,
    /// Base64 payload; filled from the node's validator key for
    /// registrations when absent
    #[serde(default)]
    data: String,
}

/// POST /api/chains/{chain}/transactions
pub async fn submit_transaction(
    state: Arc<AppState>,
    chain_id: String,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let (_node_id, node) = match authenticate_caller(&state, &chain_id, &req) {
        Ok(n) => n,
        Err(e) => return error_response(&e),
    };

    let body: SubmitTxRequest = match read_json(req).await {
        Ok(b) => b,
        Err(_) => return error_status(StatusCode::BAD_REQUEST, "invalid transaction format"),
    };

    let tx_type = if body.tx_type.is_empty() {
        TX_DISCUSS.to_string()
    } else {
        body.tx_type
    };

    let mut data = match base64::engine::general_purpose::STANDARD.decode(&body.data) {
        Ok(d) => d,
        Err(_) => return error_status(StatusCode::BAD_REQUEST, "data must be base64"),
    };

    let rpc = match EngineRpc::for_port(node.rpc_port) {
        Ok(rpc) => rpc,
        Err(e) => return error_response(&e),
    };

    // Registrations default to the node's own validator key
    if tx_type == TX_REGISTER_VALIDATOR && data.is_empty() {
        match rpc.status().await {
            Ok(status) => {
                match base64::engine::general_purpose::STANDARD
                    .decode(&status.validator_info.pub_key)
                {
                    Ok(key) => data = key,
                    Err(_) => {
                        return error_response(&ConclaveError::Internal(
                            "node returned malformed validator key".to_string(),
                        ))
                    }
                }
            }
            Err(e) => return error_response(&e),
        }
    }

    let tx = Transaction {
        tx_type,
        from: body.from,
        content: body.content,
        data,
        chain_id: chain_id.clone(),
    };

    let encoded = match tx.encode() {
        Ok(e) => e,
        Err(_) => return error_status(StatusCode::BAD_REQUEST, "failed to encode transaction"),
    };

    match rpc.broadcast_tx(&encoded).await {
        Ok(hash) => {
            state.hub.broadcast(
                EVENT_NEW_TRANSACTION,
                json!({ "chainId": chain_id, "type": tx.tx_type, "from": tx.from }),
            );
            json_ok(&json!({
                "message": "Transaction submitted successfully",
                "hash": hash,
            }))
        }
        Err(e) => error_response(&e),
    }
}

/// GET /api/chains/{chain}/validators
pub async fn list_validators(
    state: Arc<AppState>,
    chain_id: String,
    req: &Request<Incoming>,
) -> Response<Full<Bytes>> {
    let (_node_id, node) = match authenticate_caller(&state, &chain_id, req) {
        Ok(n) => n,
        Err(e) => return error_response(&e),
    };

    let rpc = match EngineRpc::for_port(node.rpc_port) {
        Ok(rpc) => rpc,
        Err(e) => return error_response(&e),
    };

    match rpc.validators().await {
        Ok(response) => json_ok(&json!({ "validators": response.validators })),
        Err(e) => error_response(&e),
    }
}

/// GET /api/chains/{chain}/blocks/{height}
pub async fn get_block(
    state: Arc<AppState>,
    chain_id: String,
    height: String,
) -> Response<Full<Bytes>> {
    let Ok(height) = height.parse::<u64>() else {
        return error_status(StatusCode::BAD_REQUEST, "invalid block height");
    };

    let rpc_port = match state.manager.rpc_port_for_chain(&chain_id) {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };
    let rpc = match EngineRpc::for_port(rpc_port) {
        Ok(rpc) => rpc,
        Err(e) => return error_response(&e),
    };

    match rpc.block(height).await {
        Ok(block) => json_ok(&json!({
            "block": {
                "height": block.height,
                "hash": block.hash,
                "timestamp": block.timestamp,
                "numTxs": block.txs.len(),
                "proposer": block.proposer,
            }
        })),
        Err(e) => error_response(&e),
    }
}

/// GET /api/chains/{chain}/discussions/block/{hash}
pub async fn block_discussions_by_hash(
    state: Arc<AppState>,
    chain_id: String,
    block_hash: String,
) -> Response<Full<Bytes>> {
    let Some(reference) = state.da.by_hash(&chain_id, &block_hash) else {
        return error_response(&ConclaveError::NotFound(
            "no discussions found for this block".to_string(),
        ));
    };

    match state.da.discussion_data(&reference.blob_id).await {
        Ok(data) => json_ok(&json!({
            "blockHash": block_hash,
            "blockHeight": reference.block_height,
            "discussions": data.discussions,
            "votes": data.votes,
            "outcome": data.outcome,
            "agents": data.agent_identities,
            "timestamp": data.timestamp,
        })),
        Err(e) => error_response(&e),
    }
}

/// GET /api/chains/{chain}/discussions/height/{height}
pub async fn block_discussions_by_height(
    state: Arc<AppState>,
    chain_id: String,
    height: String,
) -> Response<Full<Bytes>> {
    let Ok(height) = height.parse::<u64>() else {
        return error_status(StatusCode::BAD_REQUEST, "invalid block height");
    };

    let Some(reference) = state.da.by_height(&chain_id, height) else {
        return error_response(&ConclaveError::NotFound(
            "no discussions found for this block height".to_string(),
        ));
    };

    match state.da.discussion_data(&reference.blob_id).await {
        Ok(data) => json_ok(&json!({
            "blockHash": reference.block_hash,
            "blockHeight": height,
            "discussions": data.discussions,
            "votes": data.votes,
            "outcome": data.outcome,
            "agents": data.agent_identities,
            "timestamp": data.timestamp,
        })),
        Err(e) => error_response(&e),
    }
}

/// GET /api/chains/{chain}/discussions — all blocks with discussion blobs.
pub fn list_block_discussions(state: Arc<AppState>, chain_id: String) -> Response<Full<Bytes>> {
    let blocks: Vec<_> = state
        .da
        .list_for_chain(&chain_id)
        .into_iter()
        .map(|r| {
            json!({
                "blockHash": r.block_hash,
                "blockHeight": r.block_height,
                "outcome": r.outcome,
                "timestamp": r.timestamp,
                "blobId": r.blob_id,
            })
        })
        .collect();
    json_ok(&json!({ "blocks": blocks }))
}

/// GET /api/chains/{chain}/threads — active deliberation threads.
pub fn list_threads(state: Arc<AppState>, chain_id: String) -> Response<Full<Bytes>> {
    let threads: Vec<_> = state
        .da
        .list_for_chain(&chain_id)
        .into_iter()
        .map(|r| {
            json!({
                "threadId": format!("block-{}", r.block_hash),
                "blockHeight": r.block_height,
                "outcome": r.outcome,
            })
        })
        .collect();
    json_ok(&json!({ "threads": threads }))
}

#[derive(Debug, Deserialize)]
struct TaskRequest {
    #[serde(rename = "transactionDetails")]
    transaction_details: String,
}

/// Latest committed block for a chain, or a pre-genesis placeholder.
async fn latest_block(state: &AppState, chain_id: &str) -> Result<Block, ConclaveError> {
    let rpc_port = state.manager.rpc_port_for_chain(chain_id)?;
    let rpc = EngineRpc::for_port(rpc_port)?;
    let status = rpc.status().await?;
    let height = status.sync_info.latest_block_height;
    if height == 0 {
        return Ok(Block {
            height: 0,
            hash: String::from("genesis"),
            prev_hash: String::new(),
            proposer: "genesis".to_string(),
            timestamp: chrono::Utc::now(),
            txs: Vec::new(),
        });
    }
    rpc.block(height).await
}

/// POST /api/chains/{chain}/tasks/breakdown — run the collaborative
/// breakdown pipeline for the latest block.
pub async fn start_task_breakdown(
    state: Arc<AppState>,
    chain_id: String,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let body: TaskRequest = match read_json(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };

    let block = match latest_block(&state, &chain_id).await {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };

    let results = run_task_breakdown(
        state.llm.as_ref(),
        &state.validators,
        &state.hub,
        &chain_id,
        &block,
        &body.transaction_details,
    )
    .await;

    json_ok(&json!({
        "finalSubtasks": results.final_subtasks,
        "consensusScore": results.consensus_score,
        "strategy": results.selected_strategy.as_ref().map(|s| s.name.clone()),
        "messages": results.discussion.len(),
    }))
}

/// POST /api/chains/{chain}/tasks/delegate — breakdown then delegation,
/// with assignment notifications.
pub async fn start_task_delegation(
    state: Arc<AppState>,
    chain_id: String,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let body: TaskRequest = match read_json(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };

    let block = match latest_block(&state, &chain_id).await {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };

    let breakdown = run_task_breakdown(
        state.llm.as_ref(),
        &state.validators,
        &state.hub,
        &chain_id,
        &block,
        &body.transaction_details,
    )
    .await;

    let Some(delegation) = run_task_delegation(
        state.llm.as_ref(),
        &state.validators,
        &state.hub,
        &chain_id,
        &breakdown,
    )
    .await
    else {
        return error_response(&ConclaveError::InvalidInput(
            "breakdown produced no subtasks to delegate".to_string(),
        ));
    };

    notify_assigned_validators(&state.hub, &state.validators, &chain_id, &delegation);

    json_ok(&json!({
        "assignments": delegation.assignments,
        "subtasks": delegation.subtasks,
        "strategy": delegation.strategy.as_ref().map(|s| s.name.clone()),
    }))
}
