//! Blob store seam
//!
//! `put`/`get` is the entire contract with the external DA provider. The
//! in-memory implementation backs local deployments and tests.

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::types::{ConclaveError, Result};

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, blob: Vec<u8>) -> Result<String>;
    async fn get(&self, blob_id: &str) -> Result<Vec<u8>>;
}

/// In-memory blob store.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<String, Vec<u8>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, blob: Vec<u8>) -> Result<String> {
        let blob_id = Uuid::new_v4().to_string();
        self.blobs.insert(blob_id.clone(), blob);
        Ok(blob_id)
    }

    async fn get(&self, blob_id: &str) -> Result<Vec<u8>> {
        self.blobs
            .get(blob_id)
            .map(|e| e.clone())
            .ok_or_else(|| ConclaveError::NotFound(format!("blob {}", blob_id)))
    }
}
