//! Block view supplied by the BFT engine
//!
//! The application reads blocks but never forges them; the hash here mirrors
//! the engine's native hash and is treated as opaque by everything above.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub hash: String,
    pub prev_hash: String,
    pub proposer: String,
    pub timestamp: DateTime<Utc>,
    /// Encoded transactions as carried on the wire
    #[serde(default)]
    pub txs: Vec<Vec<u8>>,
}

impl Block {
    /// Compute the engine's block hash over (chain, height, prev, txs).
    pub fn compute_hash(chain_id: &str, height: u64, prev_hash: &str, txs: &[Vec<u8>]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(chain_id.as_bytes());
        hasher.update(height.to_be_bytes());
        hasher.update(prev_hash.as_bytes());
        for tx in txs {
            hasher.update((tx.len() as u64).to_be_bytes());
            hasher.update(tx);
        }
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic_and_tx_sensitive() {
        let txs = vec![b"tx1".to_vec(), b"tx2".to_vec()];
        let a = Block::compute_hash("demo", 5, "prev", &txs);
        let b = Block::compute_hash("demo", 5, "prev", &txs);
        assert_eq!(a, b);

        let c = Block::compute_hash("demo", 5, "prev", &[b"tx1".to_vec()]);
        assert_ne!(a, c);

        let d = Block::compute_hash("other", 5, "prev", &txs);
        assert_ne!(a, d);
    }
}
