//! Node RPC surface
//!
//! The narrow engine RPC a node exposes: status, validators, block lookup
//! and transaction broadcast. Served with hyper http1 on the node's RPC
//! port; consumed by [`super::client::EngineRpc`].

use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error};

use super::sequencer::{ChainStore, LocalSequencer};
use super::types::ValidatorUpdate;
use crate::consensus::Application;
use crate::core::Block;
use crate::types::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfoView {
    pub network: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncInfoView {
    pub latest_block_height: u64,
    pub latest_block_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorView {
    pub address: String,
    /// Base64 ed25519 public key
    pub pub_key: String,
    pub voting_power: i64,
}

impl From<&ValidatorUpdate> for ValidatorView {
    fn from(update: &ValidatorUpdate) -> Self {
        Self {
            address: update.address(),
            pub_key: update.pub_key_base64(),
            voting_power: update.power,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub node_info: NodeInfoView,
    pub sync_info: SyncInfoView,
    pub validator_info: ValidatorView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorsResponse {
    pub validators: Vec<ValidatorView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockResponse {
    pub block: Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastTxResponse {
    pub hash: String,
}

/// Everything the RPC handlers need about their node.
pub struct RpcContext {
    pub chain_id: String,
    pub app: Arc<Application>,
    pub store: Arc<ChainStore>,
    pub sequencer: Arc<LocalSequencer>,
    pub self_validator: ValidatorUpdate,
}

/// Serve the RPC surface on an already-bound listener until the task is
/// dropped.
pub async fn serve(listener: TcpListener, ctx: Arc<RpcContext>) -> Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |req| {
                let ctx = Arc::clone(&ctx);
                async move { Ok::<_, hyper::Error>(handle(ctx, req).await) }
            });
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                error!("RPC connection error from {}: {:?}", addr, err);
            }
        });
    }
}

async fn handle(ctx: Arc<RpcContext>, req: Request<hyper::body::Incoming>) -> Response<Full<Bytes>> {
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(|q| q.to_string());
    debug!(chain = %ctx.chain_id, path = %path, "RPC request");

    match (req.method().clone(), path.as_str()) {
        (Method::GET, "/status") => {
            let (height, hash) = ctx.store.latest();
            json_response(&StatusResponse {
                node_info: NodeInfoView {
                    network: ctx.chain_id.clone(),
                },
                sync_info: SyncInfoView {
                    latest_block_height: height,
                    latest_block_hash: hash,
                },
                validator_info: ValidatorView::from(&ctx.self_validator),
            })
        }

        (Method::GET, "/validators") => {
            let validators = ctx
                .app
                .live_validators()
                .iter()
                .map(ValidatorView::from)
                .collect();
            json_response(&ValidatorsResponse { validators })
        }

        (Method::GET, "/block") => {
            let params = parse_query(query.as_deref().unwrap_or(""));
            let Some(height) = params.get("height").and_then(|h| h.parse::<u64>().ok()) else {
                return error_response(StatusCode::BAD_REQUEST, "invalid block height");
            };
            match ctx.store.by_height(height) {
                Some(block) => json_response(&BlockResponse { block }),
                None => error_response(StatusCode::NOT_FOUND, "block not found"),
            }
        }

        (Method::GET, "/broadcast_tx_sync") => {
            let params = parse_query(query.as_deref().unwrap_or(""));
            let Some(tx_hex) = params.get("tx") else {
                return error_response(StatusCode::BAD_REQUEST, "missing tx parameter");
            };
            let Ok(tx) = hex::decode(tx_hex.trim_start_matches("0x")) else {
                return error_response(StatusCode::BAD_REQUEST, "tx must be hex encoded");
            };
            match ctx.sequencer.submit_tx(tx).await {
                Ok(hash) => json_response(&BroadcastTxResponse { hash }),
                Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.public_message()),
            }
        }

        _ => error_response(StatusCode::NOT_FOUND, "unknown RPC path"),
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?;
            let value = parts.next().unwrap_or("");
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

fn json_response<T: Serialize>(value: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(value).unwrap_or_default();
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({ "error": message }).to_string();
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}
