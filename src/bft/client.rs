//! Engine RPC client
//!
//! The HTTP handlers talk to chain nodes only through this narrow client:
//! status, validators, block lookup and transaction broadcast.

use std::time::Duration;

use super::rpc::{BlockResponse, BroadcastTxResponse, StatusResponse, ValidatorsResponse};
use crate::core::Block;
use crate::types::{ConclaveError, Result};

const RPC_TIMEOUT: Duration = Duration::from_secs(10);

pub struct EngineRpc {
    client: reqwest::Client,
    base_url: String,
}

impl EngineRpc {
    /// Client for the node RPC listening on `127.0.0.1:<port>`.
    pub fn for_port(port: u16) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .map_err(|e| ConclaveError::Internal(format!("rpc client: {}", e)))?;
        Ok(Self {
            client,
            base_url: format!("http://127.0.0.1:{}", port),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ConclaveError::Internal(format!("rpc request {}: {}", url, e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ConclaveError::NotFound(format!("rpc resource {}", path)));
        }
        if !response.status().is_success() {
            return Err(ConclaveError::Internal(format!(
                "rpc {} returned {}",
                path,
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ConclaveError::Internal(format!("rpc response {}: {}", path, e)))
    }

    pub async fn status(&self) -> Result<StatusResponse> {
        self.get_json("/status").await
    }

    pub async fn validators(&self) -> Result<ValidatorsResponse> {
        self.get_json("/validators").await
    }

    pub async fn block(&self, height: u64) -> Result<Block> {
        let response: BlockResponse = self.get_json(&format!("/block?height={}", height)).await?;
        Ok(response.block)
    }

    /// Broadcast a raw transaction; returns its hash.
    pub async fn broadcast_tx(&self, tx: &[u8]) -> Result<String> {
        let response: BroadcastTxResponse = self
            .get_json(&format!("/broadcast_tx_sync?tx=0x{}", hex::encode(tx)))
            .await?;
        Ok(response.hash)
    }
}
