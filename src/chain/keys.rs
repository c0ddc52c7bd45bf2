//! Node and validator key material
//!
//! Each node carries two ed25519 keypairs: the node key (P2P identity) and
//! the validator key (block signing). Both persist as JSON under the node's
//! `config/` directory and are generated on first use.

use base64::Engine as _;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::types::{ConclaveError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeKey {
    /// Node ID: hex of the first 20 bytes of SHA-256(pub_key)
    pub id: String,
    /// Base64 ed25519 public key
    pub pub_key: String,
    /// Base64 ed25519 secret key
    pub priv_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorKey {
    /// Hex-uppercase validator address
    pub address: String,
    /// Base64 ed25519 public key
    pub pub_key: String,
    /// Base64 ed25519 secret key
    pub priv_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorState {
    pub height: u64,
    pub round: u32,
    pub step: u32,
}

fn node_id(pub_key: &[u8]) -> String {
    let digest = Sha256::digest(pub_key);
    hex::encode(&digest[..20])
}

fn validator_address(pub_key: &[u8]) -> String {
    let digest = Sha256::digest(pub_key);
    hex::encode_upper(&digest[..20])
}

fn encode_key(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn decode_key(s: &str) -> Result<[u8; 32]> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|e| ConclaveError::Internal(format!("key decode: {}", e)))?;
    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| ConclaveError::Internal("key must be 32 bytes".to_string()))
}

impl NodeKey {
    pub fn generate() -> Self {
        let signing = SigningKey::generate(&mut OsRng);
        let pub_bytes = signing.verifying_key().to_bytes();
        Self {
            id: node_id(&pub_bytes),
            pub_key: encode_key(&pub_bytes),
            priv_key: encode_key(&signing.to_bytes()),
        }
    }

    /// Load the node key, generating and persisting one if absent.
    pub async fn load_or_generate(path: &Path) -> Result<Self> {
        if let Ok(bytes) = tokio::fs::read(path).await {
            return serde_json::from_slice(&bytes).map_err(ConclaveError::from);
        }

        let key = Self::generate();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, serde_json::to_vec_pretty(&key)?).await?;
        Ok(key)
    }
}

impl ValidatorKey {
    pub fn generate() -> Self {
        let signing = SigningKey::generate(&mut OsRng);
        let pub_bytes = signing.verifying_key().to_bytes();
        Self {
            address: validator_address(&pub_bytes),
            pub_key: encode_key(&pub_bytes),
            priv_key: encode_key(&signing.to_bytes()),
        }
    }

    /// Load the validator key, generating and persisting both the key file
    /// and a fresh signing-state file if absent.
    pub async fn load_or_generate(key_path: &Path, state_path: &Path) -> Result<Self> {
        if let Ok(bytes) = tokio::fs::read(key_path).await {
            return serde_json::from_slice(&bytes).map_err(ConclaveError::from);
        }

        let key = Self::generate();
        if let Some(parent) = key_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(key_path, serde_json::to_vec_pretty(&key)?).await?;

        if let Some(parent) = state_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let state = ValidatorState {
            height: 0,
            round: 0,
            step: 0,
        };
        tokio::fs::write(state_path, serde_json::to_vec_pretty(&state)?).await?;

        Ok(key)
    }

    /// Raw 32-byte public key.
    pub fn pub_key_bytes(&self) -> Result<[u8; 32]> {
        decode_key(&self.pub_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_node_key_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config/node_key.json");

        let first = NodeKey::load_or_generate(&path).await.unwrap();
        let second = NodeKey::load_or_generate(&path).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.pub_key, second.pub_key);
        assert_eq!(first.id.len(), 40);
    }

    #[tokio::test]
    async fn test_validator_key_creates_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("config/priv_validator_key.json");
        let state_path = dir.path().join("data/priv_validator_state.json");

        let key = ValidatorKey::load_or_generate(&key_path, &state_path)
            .await
            .unwrap();
        assert!(state_path.exists());
        assert_eq!(key.address, key.address.to_uppercase());
        assert_eq!(key.pub_key_bytes().unwrap().len(), 32);

        let state: ValidatorState =
            serde_json::from_slice(&std::fs::read(&state_path).unwrap()).unwrap();
        assert_eq!(state.height, 0);

        // Reload keeps the same identity
        let again = ValidatorKey::load_or_generate(&key_path, &state_path)
            .await
            .unwrap();
        assert_eq!(key.address, again.address);
    }

    #[test]
    fn test_address_matches_validator_update_derivation() {
        let key = ValidatorKey::generate();
        let pub_key = key.pub_key_bytes().unwrap();
        let update = crate::bft::types::ValidatorUpdate::new(pub_key, 1);
        assert_eq!(key.address, update.address());
    }
}
