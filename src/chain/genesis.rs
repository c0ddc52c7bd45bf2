//! Genesis documents
//!
//! Built once at chain creation with the genesis validator at a large fixed
//! power. Pre-launch fleet provisioning may append further validators; the
//! rewrite is atomic (temp file + rename) and the document is validated
//! before replacing the original, so a failed rewrite leaves the file
//! untouched.

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::bft::types::{ConsensusParams, ValidatorUpdate};
use crate::types::{ConclaveError, Result};

/// Voting power of the genesis validator.
pub const GENESIS_VALIDATOR_POWER: i64 = 1_000_000;
/// Voting power of validators appended during pre-launch provisioning.
pub const PROVISIONED_VALIDATOR_POWER: i64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisValidator {
    pub address: String,
    /// Base64 ed25519 public key
    pub pub_key: String,
    pub power: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisDoc {
    pub chain_id: String,
    pub genesis_time: DateTime<Utc>,
    pub consensus_params: ConsensusParams,
    pub validators: Vec<GenesisValidator>,
}

impl GenesisDoc {
    pub fn new(chain_id: &str, validators: Vec<GenesisValidator>) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            genesis_time: Utc::now(),
            consensus_params: ConsensusParams::default(),
            validators,
        }
    }

    /// Structural validation: non-empty identity, decodable 32-byte keys,
    /// positive powers, no duplicate addresses.
    pub fn validate(&self) -> Result<()> {
        if self.chain_id.is_empty() {
            return Err(ConclaveError::InvalidInput("genesis chain_id is empty".into()));
        }
        if self.validators.is_empty() {
            return Err(ConclaveError::InvalidInput(
                "genesis has no validators".into(),
            ));
        }
        for v in &self.validators {
            let key = base64::engine::general_purpose::STANDARD
                .decode(&v.pub_key)
                .map_err(|e| {
                    ConclaveError::InvalidInput(format!("validator {} key: {}", v.name, e))
                })?;
            if key.len() != 32 {
                return Err(ConclaveError::InvalidInput(format!(
                    "validator {} key is {} bytes, want 32",
                    v.name,
                    key.len()
                )));
            }
            if v.power <= 0 {
                return Err(ConclaveError::InvalidInput(format!(
                    "validator {} has non-positive power",
                    v.name
                )));
            }
        }
        let mut addresses: Vec<&str> = self.validators.iter().map(|v| v.address.as_str()).collect();
        addresses.sort_unstable();
        addresses.dedup();
        if addresses.len() != self.validators.len() {
            return Err(ConclaveError::InvalidInput(
                "genesis contains duplicate validator addresses".into(),
            ));
        }
        Ok(())
    }

    /// Validator set in hook vocabulary, for InitChain.
    pub fn validator_updates(&self) -> Result<Vec<ValidatorUpdate>> {
        self.validators
            .iter()
            .map(|v| {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(&v.pub_key)
                    .map_err(|e| ConclaveError::Internal(format!("genesis key decode: {}", e)))?;
                let pub_key = <[u8; 32]>::try_from(bytes.as_slice())
                    .map_err(|_| ConclaveError::Internal("genesis key must be 32 bytes".into()))?;
                Ok(ValidatorUpdate::new(pub_key, v.power))
            })
            .collect()
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let doc: GenesisDoc = serde_json::from_slice(&bytes)?;
        Ok(doc)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, serde_json::to_vec_pretty(self)?).await?;
        Ok(())
    }
}

/// Append a validator to an on-disk genesis document atomically. The
/// rewritten document must parse and validate; on any error the original
/// file is left untouched.
pub async fn add_validator(genesis_path: &Path, validator: GenesisValidator) -> Result<GenesisDoc> {
    let mut doc = GenesisDoc::load(genesis_path).await?;
    doc.validators.push(validator);
    doc.validate()?;

    let bytes = serde_json::to_vec_pretty(&doc)?;

    // Round-trip check on the exact bytes we are about to install
    let reparsed: GenesisDoc = serde_json::from_slice(&bytes)?;
    reparsed.validate()?;

    let tmp = genesis_path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &bytes).await?;
    tokio::fs::rename(&tmp, genesis_path).await?;
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::keys::ValidatorKey;

    fn genesis_validator(name: &str, power: i64) -> GenesisValidator {
        let key = ValidatorKey::generate();
        GenesisValidator {
            address: key.address,
            pub_key: key.pub_key,
            power,
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config/genesis.json");

        let doc = GenesisDoc::new("demo", vec![genesis_validator("genesis", GENESIS_VALIDATOR_POWER)]);
        doc.save(&path).await.unwrap();

        let loaded = GenesisDoc::load(&path).await.unwrap();
        assert_eq!(loaded.chain_id, "demo");
        assert_eq!(loaded.validators.len(), 1);
        assert_eq!(loaded.validators[0].power, GENESIS_VALIDATOR_POWER);
        assert_eq!(loaded.validator_updates().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_validator_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genesis.json");

        let doc = GenesisDoc::new("demo", vec![genesis_validator("genesis", GENESIS_VALIDATOR_POWER)]);
        doc.save(&path).await.unwrap();

        let updated = add_validator(&path, genesis_validator("v1", PROVISIONED_VALIDATOR_POWER))
            .await
            .unwrap();
        assert_eq!(updated.validators.len(), 2);

        let reloaded = GenesisDoc::load(&path).await.unwrap();
        assert_eq!(reloaded.validators.len(), 2);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_bad_validator_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genesis.json");

        let doc = GenesisDoc::new("demo", vec![genesis_validator("genesis", GENESIS_VALIDATOR_POWER)]);
        doc.save(&path).await.unwrap();
        let original = std::fs::read(&path).unwrap();

        let bad = GenesisValidator {
            address: "XYZ".into(),
            pub_key: "not base64!!".into(),
            power: 10,
            name: "bad".into(),
        };
        assert!(add_validator(&path, bad).await.is_err());

        assert_eq!(std::fs::read(&path).unwrap(), original);
    }

    #[test]
    fn test_validate_rejects_bad_documents() {
        let good = genesis_validator("genesis", 1);
        assert!(GenesisDoc::new("", vec![good.clone()]).validate().is_err());
        assert!(GenesisDoc::new("demo", vec![]).validate().is_err());
        assert!(GenesisDoc::new("demo", vec![genesis_validator("x", 0)])
            .validate()
            .is_err());

        let mut dup = GenesisDoc::new("demo", vec![good.clone(), good]);
        assert!(dup.validate().is_err());
        dup.validators.pop();
        assert!(dup.validate().is_ok());
    }
}
