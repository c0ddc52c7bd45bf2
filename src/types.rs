//! Shared error taxonomy for Conclave
//!
//! Every fallible surface in the crate funnels into [`ConclaveError`] so the
//! HTTP layer can translate errors to status codes in one place. Agent
//! rejections are deliberately NOT errors; they are consensus outcomes and
//! live in `bft::types::ProposalDecision`.

use hyper::StatusCode;
use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, ConclaveError>;

#[derive(Debug, Error)]
pub enum ConclaveError {
    /// Chain, node, block, agent, or blob does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Chain already exists on create
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Derived ports collide with the genesis reservation
    #[error("port conflict: {0}")]
    PortConflict(String),

    /// Malformed JSON, out-of-range score, bad block height, wrong port
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Caller port not recognized in the registry
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Child node process exited within the startup grace period
    #[error("node process exited: {0}")]
    ProcessExited(String),

    /// Spawn failure, key load failure, FS write failure, engine RPC failure
    #[error("internal error: {0}")]
    Internal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConclaveError {
    /// HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ConclaveError::NotFound(_) => StatusCode::NOT_FOUND,
            ConclaveError::AlreadyExists(_) | ConclaveError::PortConflict(_) => {
                StatusCode::CONFLICT
            }
            ConclaveError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ConclaveError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ConclaveError::ProcessExited(_)
            | ConclaveError::Internal(_)
            | ConclaveError::Io(_)
            | ConclaveError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to clients. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            ConclaveError::ProcessExited(_)
            | ConclaveError::Internal(_)
            | ConclaveError::Io(_)
            | ConclaveError::Json(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Truncate a string for log lines, appending an ellipsis when cut.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let cut: String = s.chars().take(max_len).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_taxonomy() {
        assert_eq!(
            ConclaveError::NotFound("chain x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ConclaveError::AlreadyExists("chain x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ConclaveError::InvalidInput("score".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ConclaveError::Unauthorized("port".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ConclaveError::Internal("spawn".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_details_redacted() {
        let err = ConclaveError::Internal("spawn failed: /usr/bin/thing".into());
        assert_eq!(err.public_message(), "internal server error");

        let err = ConclaveError::NotFound("chain demo".into());
        assert!(err.public_message().contains("demo"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer string", 8), "a longer...");
    }
}
