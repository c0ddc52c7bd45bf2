//! Hook request/response vocabulary

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One validator-set delta: ed25519 public key plus voting power.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorUpdate {
    /// Raw 32-byte ed25519 public key
    pub pub_key: [u8; 32],
    pub power: i64,
}

impl ValidatorUpdate {
    pub fn new(pub_key: [u8; 32], power: i64) -> Self {
        Self { pub_key, power }
    }

    /// Validator address: hex of the first 20 bytes of SHA-256(pub_key),
    /// uppercase, matching the engine's native addressing.
    pub fn address(&self) -> String {
        let digest = Sha256::digest(self.pub_key);
        hex::encode_upper(&digest[..20])
    }

    pub fn pub_key_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.pub_key)
    }
}

/// Consensus parameters returned from InitChain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusParams {
    pub max_block_bytes: u64,
    pub evidence_max_age_blocks: u64,
    pub evidence_max_age_secs: u64,
    pub evidence_max_bytes: u64,
    pub pub_key_types: Vec<String>,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            max_block_bytes: 22_020_096, // 21 MB
            evidence_max_age_blocks: 100_000,
            evidence_max_age_secs: 172_800, // 48 hours
            evidence_max_bytes: 1_048_576,  // 1 MB
            pub_key_types: vec!["ed25519".to_string()],
        }
    }
}

/// Follower-side verdict on a proposed block. The decision is a total
/// function of the inputs; every error path collapses into a variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposalDecision {
    Accept,
    Reject(String),
}

impl ProposalDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, ProposalDecision::Accept)
    }
}

/// Per-transaction result from CheckTx/DeliverTx.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxResult {
    Ok(String),
    Error(String),
}

impl TxResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, TxResult::Ok(_))
    }
}

/// Static application identity returned from Info.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppInfo {
    pub data: String,
    pub version: String,
    pub app_version: u64,
}
