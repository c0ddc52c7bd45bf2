//! Persisted agent registry
//!
//! Holds every registered agent plus the chain → validator-address → agent
//! binding. The whole document lives at `<data>/agent_registry.json` and is
//! rewritten atomically (temp file + rename) on every mutation, so a crash
//! mid-write never leaves a torn file. Readers take the shared lock.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::core::Agent;
use crate::types::{ConclaveError, Result};

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryDocument {
    /// chainID -> agentID -> Agent
    #[serde(default)]
    agents: HashMap<String, HashMap<String, Agent>>,
    /// chainID -> validatorAddr -> agentID
    #[serde(default)]
    validator_map: HashMap<String, HashMap<String, String>>,
}

/// Lock-guarded persisted registry. One instance per process, owned by the
/// application state.
pub struct AgentRegistry {
    path: PathBuf,
    inner: RwLock<RegistryDocument>,
}

impl AgentRegistry {
    /// Load the registry from disk, or start empty if the file is absent or
    /// unreadable.
    pub async fn load(data_dir: &Path) -> Self {
        let path = data_dir.join("agent_registry.json");
        let doc = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<RegistryDocument>(&bytes) {
                Ok(doc) => {
                    let count: usize = doc.agents.values().map(|m| m.len()).sum();
                    info!(agents = count, "Loaded agent registry from {}", path.display());
                    doc
                }
                Err(e) => {
                    warn!("Failed to parse agent registry, starting empty: {}", e);
                    RegistryDocument::default()
                }
            },
            Err(_) => RegistryDocument::default(),
        };

        Self {
            path,
            inner: RwLock::new(doc),
        }
    }

    async fn persist(&self, doc: &RegistryDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Register (or replace) an agent for a chain.
    pub async fn register_agent(&self, chain_id: &str, agent: Agent) -> Result<()> {
        let mut doc = self.inner.write().await;
        doc.agents
            .entry(chain_id.to_string())
            .or_default()
            .insert(agent.id.clone(), agent);
        self.persist(&doc).await
    }

    /// Bind an agent to its validator address once registration commits.
    pub async fn link_validator(
        &self,
        chain_id: &str,
        agent_id: &str,
        validator_addr: &str,
    ) -> Result<()> {
        let mut doc = self.inner.write().await;
        doc.validator_map
            .entry(chain_id.to_string())
            .or_default()
            .insert(validator_addr.to_string(), agent_id.to_string());

        if let Some(agents) = doc.agents.get_mut(chain_id) {
            if let Some(agent) = agents.get_mut(agent_id) {
                agent.is_validator = true;
                agent.validator_address = Some(validator_addr.to_string());
            }
        }

        info!(
            chain = %chain_id,
            agent = %agent_id,
            validator = %validator_addr,
            "Linked agent to validator address"
        );
        self.persist(&doc).await
    }

    /// Resolve the agent bound to a validator address.
    pub async fn agent_by_validator(&self, chain_id: &str, validator_addr: &str) -> Option<Agent> {
        let doc = self.inner.read().await;
        let agent_id = doc.validator_map.get(chain_id)?.get(validator_addr)?;
        doc.agents.get(chain_id)?.get(agent_id).cloned()
    }

    pub async fn agent_by_id(&self, chain_id: &str, agent_id: &str) -> Option<Agent> {
        let doc = self.inner.read().await;
        doc.agents.get(chain_id)?.get(agent_id).cloned()
    }

    pub async fn agents_for_chain(&self, chain_id: &str) -> Vec<Agent> {
        let doc = self.inner.read().await;
        doc.agents
            .get(chain_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn validator_mappings(&self, chain_id: &str) -> HashMap<String, String> {
        let doc = self.inner.read().await;
        doc.validator_map.get(chain_id).cloned().unwrap_or_default()
    }

    /// Full snapshot for diagnostics.
    pub async fn snapshot(&self) -> Result<serde_json::Value> {
        let doc = self.inner.read().await;
        serde_json::to_value(&*doc).map_err(ConclaveError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AgentRole;

    #[tokio::test]
    async fn test_register_persist_reload() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AgentRegistry::load(dir.path()).await;

        let agent = Agent::new("a1", "Ada", AgentRole::Validator)
            .with_traits(vec!["analytical".into()]);
        registry.register_agent("demo", agent).await.unwrap();

        // Reload from disk and confirm the agent survived
        let reloaded = AgentRegistry::load(dir.path()).await;
        let agent = reloaded.agent_by_id("demo", "a1").await.unwrap();
        assert_eq!(agent.name, "Ada");
        assert!(!agent.is_validator);
    }

    #[tokio::test]
    async fn test_validator_binding() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AgentRegistry::load(dir.path()).await;

        registry
            .register_agent("demo", Agent::new("a1", "Ada", AgentRole::Validator))
            .await
            .unwrap();
        registry
            .link_validator("demo", "a1", "ABCDEF0123")
            .await
            .unwrap();

        let agent = registry.agent_by_validator("demo", "ABCDEF0123").await.unwrap();
        assert_eq!(agent.id, "a1");
        assert!(agent.is_validator);
        assert_eq!(agent.validator_address.as_deref(), Some("ABCDEF0123"));

        // Unknown address resolves to nothing
        assert!(registry.agent_by_validator("demo", "FFFF").await.is_none());

        // Binding survives reload
        let reloaded = AgentRegistry::load(dir.path()).await;
        assert!(reloaded
            .agent_by_validator("demo", "ABCDEF0123")
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_atomic_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AgentRegistry::load(dir.path()).await;
        registry
            .register_agent("demo", Agent::new("a1", "Ada", AgentRole::Validator))
            .await
            .unwrap();

        assert!(dir.path().join("agent_registry.json").exists());
        assert!(!dir.path().join("agent_registry.json.tmp").exists());
    }
}
