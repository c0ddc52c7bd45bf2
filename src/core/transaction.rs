//! Transaction taxonomy
//!
//! Transactions ride through the BFT engine as JSON; the `type` field
//! discriminates. `data` carries raw key bytes for validator registration
//! and is base64 in the JSON encoding.

use base64::Engine as _;
use serde::{Deserialize, Serialize};

pub const TX_REGISTER_VALIDATOR: &str = "register_validator";
pub const TX_SUBMIT_PAPER: &str = "submit_paper";
pub const TX_LOAN_REQUEST: &str = "loan_request";
pub const TX_DISCUSS: &str = "discuss_transaction";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "type")]
    pub tx_type: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub content: String,
    /// Raw bytes (ed25519 public key for `register_validator`)
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        with = "base64_bytes"
    )]
    pub data: Vec<u8>,
    #[serde(default, rename = "chainId")]
    pub chain_id: String,
}

impl Transaction {
    pub fn discussion(chain_id: &str, from: &str, content: &str) -> Self {
        Self {
            tx_type: TX_DISCUSS.to_string(),
            from: from.to_string(),
            content: content.to_string(),
            data: Vec::new(),
            chain_id: chain_id.to_string(),
        }
    }

    pub fn register_validator(chain_id: &str, from: &str, pub_key: &[u8]) -> Self {
        Self {
            tx_type: TX_REGISTER_VALIDATOR.to_string(),
            from: from.to_string(),
            content: String::new(),
            data: pub_key.to_vec(),
            chain_id: chain_id.to_string(),
        }
    }

    pub fn encode(&self) -> crate::types::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> crate::types::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

mod base64_bytes {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        if s.is_empty() {
            return Ok(Vec::new());
        }
        base64::engine::general_purpose::STANDARD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_round_trip() {
        let tx = Transaction::register_validator("demo", "v1", &[7u8; 32]);
        let bytes = tx.encode().unwrap();
        let back = Transaction::decode(&bytes).unwrap();
        assert_eq!(back.tx_type, TX_REGISTER_VALIDATOR);
        assert_eq!(back.data, vec![7u8; 32]);
        assert_eq!(back.chain_id, "demo");
    }

    #[test]
    fn test_decode_tolerates_missing_fields() {
        let tx = Transaction::decode(br#"{"type":"discuss_transaction"}"#).unwrap();
        assert_eq!(tx.tx_type, TX_DISCUSS);
        assert!(tx.content.is_empty());
        assert!(tx.data.is_empty());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Transaction::decode(b"not json at all").is_err());
    }
}
