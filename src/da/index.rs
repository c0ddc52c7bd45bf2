//! Append-only DA index keyed by (chain, blockHash, height)

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobReference {
    pub chain_id: String,
    pub block_hash: String,
    pub block_height: u64,
    pub outcome: String,
    pub timestamp: DateTime<Utc>,
    pub blob_id: String,
}

/// Per-chain append-only list of blob references.
#[derive(Default)]
pub struct DaIndex {
    refs: DashMap<String, Vec<BlobReference>>,
}

impl DaIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, reference: BlobReference) {
        self.refs
            .entry(reference.chain_id.clone())
            .or_default()
            .push(reference);
    }

    pub fn by_hash(&self, chain_id: &str, block_hash: &str) -> Option<BlobReference> {
        self.refs
            .get(chain_id)?
            .iter()
            .find(|r| r.block_hash == block_hash)
            .cloned()
    }

    pub fn by_height(&self, chain_id: &str, height: u64) -> Option<BlobReference> {
        self.refs
            .get(chain_id)?
            .iter()
            .find(|r| r.block_height == height)
            .cloned()
    }

    pub fn list_for_chain(&self, chain_id: &str) -> Vec<BlobReference> {
        self.refs
            .get(chain_id)
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}
