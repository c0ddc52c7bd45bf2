//! Chain lifecycle routes

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;

use super::{error_response, json_ok, json_with_status, read_json};
use crate::server::http::AppState;

#[derive(Debug, Deserialize)]
struct CreateChainRequest {
    chain_id: String,
    #[serde(default)]
    genesis_prompt: String,
}

/// POST /api/chains — create a chain and start its genesis node.
pub async fn create_chain(state: Arc<AppState>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let body: CreateChainRequest = match read_json(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e),
    };

    match state
        .manager
        .create_chain(&body.chain_id, &body.genesis_prompt)
        .await
    {
        Ok(ports) => json_with_status(
            StatusCode::CREATED,
            &serde_json::json!({
                "message": "Chain created successfully",
                "chain_id": body.chain_id,
                "genesis_node": {
                    "p2p_port": ports.p2p,
                    "rpc_port": ports.rpc,
                },
            }),
        ),
        Err(e) => error_response(&e),
    }
}

/// GET /api/chains — list known chains.
pub fn list_chains(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let mut chains = state.nodes.list_chains();
    chains.sort();
    json_ok(&serde_json::json!({ "chains": chains }))
}
