//! HTTP route handlers
//!
//! Bodies are JSON; error responses use the `{"error": …}` envelope with the
//! status codes from the error taxonomy. Internal details never leave the
//! process.

pub mod agents;
pub mod chains;
pub mod txs;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::error;

use crate::types::{ConclaveError, Result};

/// Successful JSON response.
pub fn json_ok<T: Serialize>(value: &T) -> Response<Full<Bytes>> {
    json_with_status(StatusCode::OK, value)
}

pub fn json_with_status<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(value).unwrap_or_default();
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Error envelope with an explicit status.
pub fn error_status(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({ "error": message }).to_string();
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Translate a taxonomy error to its HTTP shape. Internal errors are logged
/// here and redacted in the response.
pub fn error_response(err: &ConclaveError) -> Response<Full<Bytes>> {
    if err.status_code() == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Internal error handling request: {}", err);
    }
    error_status(err.status_code(), &err.public_message())
}

/// Collect and deserialize a JSON request body.
pub async fn read_json<T: DeserializeOwned>(req: Request<Incoming>) -> Result<T> {
    let bytes = req
        .into_body()
        .collect()
        .await
        .map_err(|e| ConclaveError::InvalidInput(format!("failed to read body: {}", e)))?
        .to_bytes();
    serde_json::from_slice(&bytes)
        .map_err(|e| ConclaveError::InvalidInput(format!("invalid JSON body: {}", e)))
}

/// Port from the request's `Host` header, used to resolve the caller node.
pub fn host_port(req: &Request<Incoming>) -> Option<u16> {
    let host = req.headers().get(hyper::header::HOST)?.to_str().ok()?;
    let port = host.rsplit_once(':')?.1;
    port.parse().ok()
}
