//! WebSocket event stream
//!
//! `GET /ws` upgrades to a typed event stream fed from the in-process hub.
//! A `?chain=<id>` query additionally tails that chain's discussion log so
//! round lines surface as `AGENT_VOTE` events.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info};

use crate::discussions::watcher::spawn_discussion_watcher;
use crate::server::http::AppState;

/// Handle the `/ws` upgrade and spawn the streaming task.
pub async fn handle_upgrade(state: Arc<AppState>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let chain_id = req
        .uri()
        .query()
        .and_then(|q| {
            q.split('&').find_map(|pair| {
                let (key, value) = pair.split_once('=')?;
                (key == "chain").then(|| value.to_string())
            })
        });

    match hyper_tungstenite::upgrade(req, None) {
        Ok((response, websocket)) => {
            info!(chain = ?chain_id, "WebSocket subscriber connecting");

            tokio::spawn(async move {
                match websocket.await {
                    Ok(ws) => run_stream(state, ws, chain_id).await,
                    Err(e) => error!("WebSocket upgrade failed: {:?}", e),
                }
            });

            let (parts, _) = response.into_parts();
            Response::from_parts(parts, Full::new(Bytes::new()))
        }
        Err(e) => {
            error!("WebSocket upgrade error: {:?}", e);
            Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .body(Full::new(Bytes::from(format!(
                    "WebSocket upgrade failed: {}",
                    e
                ))))
                .unwrap()
        }
    }
}

async fn run_stream(
    state: Arc<AppState>,
    ws: hyper_tungstenite::WebSocketStream<hyper_util::rt::TokioIo<hyper::upgrade::Upgraded>>,
    chain_id: Option<String>,
) {
    let (mut sink, mut stream) = ws.split();
    let mut events = state.hub.subscribe();

    // Tail the chain's discussion log into the hub for this subscriber
    let watcher = chain_id.map(|chain| {
        spawn_discussion_watcher(state.discussion_log.clone(), chain, state.hub.clone())
    });

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let Ok(text) = serde_json::to_string(&event) else { continue };
                        if sink.send(WsMessage::text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        debug!(missed, "WebSocket subscriber lagged, events dropped");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!("WebSocket read error: {:?}", e);
                        break;
                    }
                    // Pings are answered by tungstenite; other frames ignored
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    if let Some(watcher) = watcher {
        watcher.abort();
    }
    info!("WebSocket subscriber disconnected");
}
