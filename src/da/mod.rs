//! Data-availability layer
//!
//! The real blob store is an external collaborator; its whole surface is
//! `put(blob) → id` / `get(id) → blob`. The index keyed by
//! (chain, blockHash, height) is ours and append-only.

pub mod index;
pub mod store;

pub use index::{BlobReference, DaIndex};
pub use store::{BlobStore, MemoryBlobStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::types::Result;

/// Off-chain record of one block's full deliberation transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffchainDiscussionData {
    pub discussions: Vec<DiscussionEntry>,
    #[serde(default)]
    pub votes: Vec<VoteEntry>,
    pub outcome: String,
    #[serde(default)]
    pub agent_identities: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscussionEntry {
    pub id: String,
    pub validator_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub round: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteEntry {
    pub validator_id: String,
    pub approval: bool,
}

/// Blob store + index, wired together.
pub struct DaService {
    store: Arc<dyn BlobStore>,
    index: DaIndex,
}

impl DaService {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            index: DaIndex::new(),
        }
    }

    /// Persist a block's discussion transcript and index it by hash/height.
    pub async fn put_discussion_blob(
        &self,
        chain_id: &str,
        block_hash: &str,
        block_height: u64,
        outcome: &str,
        data: &OffchainDiscussionData,
    ) -> Result<String> {
        let blob = serde_json::to_vec(data)?;
        let blob_id = self.store.put(blob).await?;
        self.index.append(BlobReference {
            chain_id: chain_id.to_string(),
            block_hash: block_hash.to_string(),
            block_height,
            outcome: outcome.to_string(),
            timestamp: Utc::now(),
            blob_id: blob_id.clone(),
        });
        Ok(blob_id)
    }

    pub async fn discussion_data(&self, blob_id: &str) -> Result<OffchainDiscussionData> {
        let blob = self.store.get(blob_id).await?;
        Ok(serde_json::from_slice(&blob)?)
    }

    pub fn by_hash(&self, chain_id: &str, block_hash: &str) -> Option<BlobReference> {
        self.index.by_hash(chain_id, block_hash)
    }

    pub fn by_height(&self, chain_id: &str, height: u64) -> Option<BlobReference> {
        self.index.by_height(chain_id, height)
    }

    pub fn list_for_chain(&self, chain_id: &str) -> Vec<BlobReference> {
        self.index.list_for_chain(chain_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_data() -> OffchainDiscussionData {
        OffchainDiscussionData {
            discussions: vec![DiscussionEntry {
                id: "m1".into(),
                validator_id: "v1".into(),
                message: "looks sound".into(),
                timestamp: Utc::now(),
                entry_type: "review".into(),
                round: 1,
            }],
            votes: vec![VoteEntry {
                validator_id: "v1".into(),
                approval: true,
            }],
            outcome: "accepted".into(),
            agent_identities: vec!["Ada".into()],
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_put_and_retrieve_by_hash_and_height() {
        let svc = DaService::new(Arc::new(MemoryBlobStore::new()));
        let blob_id = svc
            .put_discussion_blob("demo", "hash1", 7, "accepted", &sample_data())
            .await
            .unwrap();

        let by_hash = svc.by_hash("demo", "hash1").unwrap();
        assert_eq!(by_hash.blob_id, blob_id);
        assert_eq!(by_hash.block_height, 7);

        let by_height = svc.by_height("demo", 7).unwrap();
        assert_eq!(by_height.block_hash, "hash1");

        let data = svc.discussion_data(&blob_id).await.unwrap();
        assert_eq!(data.discussions.len(), 1);
        assert_eq!(data.outcome, "accepted");
    }

    #[tokio::test]
    async fn test_index_is_append_only_per_chain() {
        let svc = DaService::new(Arc::new(MemoryBlobStore::new()));
        for h in 1..=3u64 {
            svc.put_discussion_blob("demo", &format!("hash{}", h), h, "accepted", &sample_data())
                .await
                .unwrap();
        }
        let refs = svc.list_for_chain("demo");
        assert_eq!(refs.len(), 3);
        let heights: Vec<u64> = refs.iter().map(|r| r.block_height).collect();
        assert_eq!(heights, vec![1, 2, 3]);

        assert!(svc.list_for_chain("other").is_empty());
    }
}
