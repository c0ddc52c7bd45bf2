//! HTTP server
//!
//! hyper http1 with TokioIo, manual match-based routing. Chain-scoped
//! routes live under `/api/chains/{chain_id}/…`; authenticated routes
//! additionally resolve the caller node by the `Host` header port.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::chain::ChainManager;
use crate::config::Args;
use crate::da::DaService;
use crate::discussions::DiscussionLog;
use crate::events::EventHub;
use crate::llm::LlmClient;
use crate::registry::{AgentRegistry, NodeRegistry};
use crate::routes;
use crate::server::websocket;
use crate::types::Result;
use crate::validator::ValidatorStore;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub nodes: Arc<NodeRegistry>,
    pub agents: Arc<AgentRegistry>,
    pub manager: Arc<ChainManager>,
    pub validators: Arc<ValidatorStore>,
    pub hub: EventHub,
    pub da: Arc<DaService>,
    pub llm: Arc<dyn LlmClient>,
    pub discussion_log: DiscussionLog,
}

/// Start the HTTP server on the given listener until the task is dropped.
pub async fn run(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    info!("Conclave listening on {}", listener.local_addr()?);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move {
                            Ok::<_, hyper::Error>(handle_request(state, req).await)
                        }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .with_upgrades()
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(state: Arc<AppState>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    info!("{} {}", method, path);

    // WebSocket event stream
    if method == Method::GET && path == "/ws" {
        if hyper_tungstenite::is_upgrade_request(&req) {
            return websocket::handle_upgrade(state, req).await;
        }
        return routes::error_status(StatusCode::BAD_REQUEST, "WebSocket upgrade required for /ws");
    }

    if method == Method::GET && (path == "/health" || path == "/healthz") {
        return routes::json_ok(&serde_json::json!({
            "status": "ok",
            "chains": state.nodes.list_chains().len(),
        }));
    }

    // Chain collection
    if path == "/api/chains" {
        return match method {
            Method::POST => routes::chains::create_chain(state, req).await,
            Method::GET => routes::chains::list_chains(state),
            _ => routes::error_status(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"),
        };
    }

    // Chain-scoped routes: /api/chains/{chain_id}/...
    let segments: Vec<String> = path
        .trim_matches('/')
        .split('/')
        .map(|s| s.to_string())
        .collect();

    if segments.len() >= 3 && segments[0] == "api" && segments[1] == "chains" {
        let chain_id = segments[2].clone();
        let rest: Vec<&str> = segments[3..].iter().map(|s| s.as_str()).collect();

        return match (method, rest.as_slice()) {
            (Method::POST, ["agents"]) => routes::agents::register_agent(state, chain_id, req).await,
            (Method::GET, ["agents"]) => routes::agents::list_agents(state, chain_id).await,
            (Method::GET, ["agents", agent_id, "status"]) => {
                routes::agents::social_status(state, chain_id, agent_id.to_string()).await
            }
            (Method::POST, ["agents", agent_id, "influences"]) => {
                routes::agents::add_influence(state, chain_id, agent_id.to_string(), req).await
            }
            (Method::POST, ["agents", agent_id, "relationships"]) => {
                routes::agents::update_relationship(state, chain_id, agent_id.to_string(), req)
                    .await
            }
            (Method::POST, ["transactions"]) => {
                routes::txs::submit_transaction(state, chain_id, req).await
            }
            (Method::GET, ["validators"]) => {
                routes::txs::list_validators(state, chain_id, &req).await
            }
            (Method::GET, ["blocks", height]) => {
                routes::txs::get_block(state, chain_id, height.to_string()).await
            }
            (Method::GET, ["discussions"]) => {
                routes::txs::list_block_discussions(state, chain_id)
            }
            (Method::GET, ["discussions", "block", hash]) => {
                routes::txs::block_discussions_by_hash(state, chain_id, hash.to_string()).await
            }
            (Method::GET, ["discussions", "height", height]) => {
                routes::txs::block_discussions_by_height(state, chain_id, height.to_string()).await
            }
            (Method::GET, ["threads"]) => routes::txs::list_threads(state, chain_id),
            (Method::POST, ["tasks", "breakdown"]) => {
                routes::txs::start_task_breakdown(state, chain_id, req).await
            }
            (Method::POST, ["tasks", "delegate"]) => {
                routes::txs::start_task_delegation(state, chain_id, req).await
            }
            _ => routes::error_status(StatusCode::NOT_FOUND, "unknown route"),
        };
    }

    routes::error_status(StatusCode::NOT_FOUND, "unknown route")
}
