//! Agent registration and social routes

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::{error_response, error_status, json_ok, read_json};
use crate::core::Agent;
use crate::events::EVENT_AGENT_ALLIANCE;
use crate::server::http::AppState;
use crate::types::ConclaveError;
use crate::validator::{spawn_block_listener, Validator};

/// POST /api/chains/{chain}/agents — register an agent and launch its node.
pub async fn register_agent(
    state: Arc<AppState>,
    chain_id: String,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let agent: Agent = match read_json(req).await {
        Ok(a) => a,
        Err(_) => return error_status(StatusCode::BAD_REQUEST, "invalid agent data"),
    };
    let agent_id = agent.id.clone();

    match state.manager.register_agent(&chain_id, agent.clone()).await {
        Ok(ports) => {
            // Bring the deliberation-capable validator up in this process
            // and have it react to proposed blocks.
            let validator = Arc::new(Validator::new(
                &agent.id,
                &agent.name,
                agent.traits.clone(),
                &agent.style,
                agent.influences.clone(),
                "",
                &chain_id,
                &state.args.log_dir,
            ));
            state.validators.register(Arc::clone(&validator));
            spawn_block_listener(validator, Arc::clone(&state.llm), state.hub.clone());

            json_ok(&json!({
                "message": "Agent registered successfully",
                "agentID": agent_id,
                "p2pPort": ports.p2p,
                "rpcPort": ports.rpc,
                "apiPort": ports.api,
            }))
        }
        Err(e) => error_response(&e),
    }
}

/// GET /api/chains/{chain}/agents
pub async fn list_agents(state: Arc<AppState>, chain_id: String) -> Response<Full<Bytes>> {
    let mut agents = state.agents.agents_for_chain(&chain_id).await;
    agents.sort_by(|a, b| a.id.cmp(&b.id));
    json_ok(&json!({ "agents": agents }))
}

/// GET /api/chains/{chain}/agents/{agent}/status — social summary.
pub async fn social_status(
    state: Arc<AppState>,
    chain_id: String,
    agent_id: String,
) -> Response<Full<Bytes>> {
    match state.validators.by_id(&chain_id, &agent_id) {
        Some(validator) => json_ok(&validator.social_status()),
        None => error_response(&ConclaveError::NotFound(format!("validator {}", agent_id))),
    }
}

#[derive(Debug, Deserialize)]
struct InfluenceRequest {
    name: String,
}

/// POST /api/chains/{chain}/agents/{agent}/influences
pub async fn add_influence(
    state: Arc<AppState>,
    chain_id: String,
    agent_id: String,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let body: InfluenceRequest = match read_json(req).await {
        Ok(b) => b,
        Err(_) => return error_status(StatusCode::BAD_REQUEST, "invalid influence data"),
    };

    match state.validators.by_id(&chain_id, &agent_id) {
        Some(validator) => {
            validator.add_influence(&body.name);
            json_ok(&json!({ "message": "Influence added successfully" }))
        }
        None => error_response(&ConclaveError::NotFound(format!("validator {}", agent_id))),
    }
}

#[derive(Debug, Deserialize)]
struct RelationshipUpdate {
    #[serde(rename = "targetId")]
    target_id: String,
    /// Sentiment in [-1, 1]
    score: f64,
}

/// POST /api/chains/{chain}/agents/{agent}/relationships — out-of-range
/// scores are rejected with 400.
pub async fn update_relationship(
    state: Arc<AppState>,
    chain_id: String,
    agent_id: String,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let body: RelationshipUpdate = match read_json(req).await {
        Ok(b) => b,
        Err(_) => return error_status(StatusCode::BAD_REQUEST, "invalid relationship data"),
    };

    let Some(validator) = state.validators.by_id(&chain_id, &agent_id) else {
        return error_response(&ConclaveError::NotFound(format!("validator {}", agent_id)));
    };

    if let Err(e) = validator.set_relationship(&body.target_id, body.score) {
        return error_response(&e);
    }

    state.hub.broadcast(
        EVENT_AGENT_ALLIANCE,
        json!({
            "fromId": agent_id,
            "targetId": body.target_id,
            "score": body.score,
            "chainId": chain_id,
        }),
    );

    json_ok(&json!({ "message": "Relationship updated successfully" }))
}
