//! Chain manager
//!
//! For each chain: exactly one running genesis node and zero-or-more
//! validator subprocesses, with the node registry kept in sync. Validator
//! ports derive deterministically from the agent id (CRC32, IEEE
//! polynomial) so registrations are reproducible across restarts.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use super::genesis::{
    GenesisDoc, GenesisValidator, GENESIS_VALIDATOR_POWER, PROVISIONED_VALIDATOR_POWER,
};
use super::keys::{NodeKey, ValidatorKey};
use super::launcher::{NodeHandle, NodeLauncher};
use crate::core::Agent;
use crate::events::{EventHub, EVENT_AGENT_REGISTERED, EVENT_CHAIN_CREATED};
use crate::registry::{AgentRegistry, NodeInfo, NodeRegistry};
use crate::types::{ConclaveError, Result};

/// Base port for the deterministic derivation; also the genesis P2P
/// reservation that derived ports must not collide with.
pub const BASE_P2P_PORT: u16 = 26656;
pub const GENESIS_RPC_PORT: u16 = 26657;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePorts {
    pub p2p: u16,
    pub rpc: u16,
    pub api: u16,
}

/// Derive `(p2p, rpc, api)` for an agent:
/// `p2p = 26656 + (crc32(agentID) mod 10000)`, rpc = p2p + 1, api = p2p + 2.
pub fn derive_agent_ports(agent_id: &str) -> NodePorts {
    let p2p = BASE_P2P_PORT + (crc32(agent_id.as_bytes()) % 10_000) as u16;
    NodePorts {
        p2p,
        rpc: p2p + 1,
        api: p2p + 2,
    }
}

pub struct ChainManager {
    data_dir: PathBuf,
    nodes: Arc<NodeRegistry>,
    agents: Arc<AgentRegistry>,
    hub: EventHub,
    launcher: Arc<dyn NodeLauncher>,
    /// (chain, node) → live handle; stopped nodes are not removed
    handles: DashMap<(String, String), NodeHandle>,
}

impl ChainManager {
    pub fn new(
        data_dir: PathBuf,
        nodes: Arc<NodeRegistry>,
        agents: Arc<AgentRegistry>,
        hub: EventHub,
        launcher: Arc<dyn NodeLauncher>,
    ) -> Self {
        Self {
            data_dir,
            nodes,
            agents,
            hub,
            launcher,
            handles: DashMap::new(),
        }
    }

    fn chain_home(&self, chain_id: &str, node: &str) -> PathBuf {
        self.data_dir.join(chain_id).join(node)
    }

    /// Create a chain: materialize keys and genesis doc on disk, start the
    /// genesis node, record it in the registry.
    pub async fn create_chain(&self, chain_id: &str, genesis_prompt: &str) -> Result<NodePorts> {
        if self.nodes.has_chain(chain_id) {
            return Err(ConclaveError::AlreadyExists(format!("chain {}", chain_id)));
        }
        if chain_id.is_empty() {
            return Err(ConclaveError::InvalidInput("chain_id is empty".into()));
        }

        let home = self.chain_home(chain_id, "genesis");
        tokio::fs::create_dir_all(home.join("config")).await?;
        tokio::fs::create_dir_all(home.join("data")).await?;

        let _node_key = NodeKey::load_or_generate(&home.join("config/node_key.json")).await?;
        let validator_key = ValidatorKey::load_or_generate(
            &home.join("config/priv_validator_key.json"),
            &home.join("data/priv_validator_state.json"),
        )
        .await?;

        let genesis_file = home.join("config/genesis.json");
        if tokio::fs::metadata(&genesis_file).await.is_err() {
            let doc = GenesisDoc::new(
                chain_id,
                vec![GenesisValidator {
                    address: validator_key.address.clone(),
                    pub_key: validator_key.pub_key.clone(),
                    power: GENESIS_VALIDATOR_POWER,
                    name: "genesis".to_string(),
                }],
            );
            doc.save(&genesis_file).await?;
        }

        let handle = self.launcher.launch_genesis(chain_id).await?;
        let ports = handle.ports;

        self.nodes.register_node(
            chain_id,
            "genesis",
            NodeInfo {
                is_genesis: true,
                name: "genesis".to_string(),
                p2p_port: ports.p2p,
                rpc_port: ports.rpc,
                api_port: ports.api,
            },
        );
        self.handles
            .insert((chain_id.to_string(), "genesis".to_string()), handle);

        info!(chain = %chain_id, prompt = %genesis_prompt, "Chain created");
        self.hub.broadcast(
            EVENT_CHAIN_CREATED,
            json!({ "chainId": chain_id, "genesisPrompt": genesis_prompt }),
        );

        Ok(ports)
    }

    /// Register an agent: persist it, derive its ports, launch its node
    /// process, record it once the grace period passes.
    pub async fn register_agent(&self, chain_id: &str, agent: Agent) -> Result<NodePorts> {
        if !self.nodes.has_chain(chain_id) {
            return Err(ConclaveError::NotFound(format!("chain {}", chain_id)));
        }
        if agent.id.is_empty() {
            return Err(ConclaveError::InvalidInput("agent id is empty".into()));
        }

        self.agents.register_agent(chain_id, agent.clone()).await?;

        let ports = derive_agent_ports(&agent.id);
        if ports.p2p == BASE_P2P_PORT || ports.rpc == GENESIS_RPC_PORT {
            return Err(ConclaveError::PortConflict(format!(
                "agent {} ports collide with the genesis reservation",
                agent.id
            )));
        }

        let seed = self.genesis_seed(chain_id).await?;
        let handle = self
            .launcher
            .launch_validator(chain_id, &agent, ports, &seed)
            .await?;

        self.nodes.register_node(
            chain_id,
            &agent.id,
            NodeInfo {
                is_genesis: false,
                name: agent.id.clone(),
                p2p_port: ports.p2p,
                rpc_port: ports.rpc,
                api_port: ports.api,
            },
        );
        self.handles
            .insert((chain_id.to_string(), agent.id.clone()), handle);

        self.hub.broadcast(
            EVENT_AGENT_REGISTERED,
            json!({
                "chainId": chain_id,
                "agentId": agent.id,
                "name": agent.name,
                "role": agent.role,
            }),
        );

        Ok(ports)
    }

    /// Seed string `nodekey@127.0.0.1:<genesis_p2p_port>` for joining peers.
    async fn genesis_seed(&self, chain_id: &str) -> Result<String> {
        let node_key_file = self
            .chain_home(chain_id, "genesis")
            .join("config/node_key.json");
        let node_key = NodeKey::load_or_generate(&node_key_file).await?;

        let p2p_port = self
            .nodes
            .node_info(chain_id, "genesis")
            .map(|n| n.p2p_port)
            .unwrap_or(BASE_P2P_PORT);

        Ok(format!("{}@127.0.0.1:{}", node_key.id, p2p_port))
    }

    pub fn rpc_port_for_chain(&self, chain_id: &str) -> Result<u16> {
        self.nodes.rpc_port_for_chain(chain_id)
    }

    pub fn node_by_api_port(&self, chain_id: &str, api_port: u16) -> Option<(String, NodeInfo)> {
        self.nodes.node_by_api_port(chain_id, api_port)
    }

    pub fn list_chains(&self) -> Vec<String> {
        self.nodes.list_chains()
    }

    pub fn node_state(&self, chain_id: &str, node_id: &str) -> Option<super::launcher::NodeState> {
        self.handles
            .get(&(chain_id.to_string(), node_id.to_string()))
            .map(|h| h.state())
    }

    /// Pre-launch fleet provisioning: generate the agent's validator key and
    /// append it to the chain's genesis document. The genesis file is
    /// replaced atomically and the updated document is copied into the new
    /// node's config directory.
    pub async fn add_validator_to_genesis(&self, chain_id: &str, agent: &Agent) -> Result<()> {
        let node_home = self.chain_home(chain_id, &agent.id);
        tokio::fs::create_dir_all(node_home.join("config")).await?;
        tokio::fs::create_dir_all(node_home.join("data")).await?;

        let validator_key = ValidatorKey::load_or_generate(
            &node_home.join("config/priv_validator_key.json"),
            &node_home.join("data/priv_validator_state.json"),
        )
        .await?;

        let genesis_file = self
            .chain_home(chain_id, "genesis")
            .join("config/genesis.json");
        let updated = super::genesis::add_validator(
            &genesis_file,
            GenesisValidator {
                address: validator_key.address.clone(),
                pub_key: validator_key.pub_key.clone(),
                power: PROVISIONED_VALIDATOR_POWER,
                name: agent.id.clone(),
            },
        )
        .await?;

        updated.save(&node_home.join("config/genesis.json")).await?;

        info!(
            chain = %chain_id,
            agent = %agent.id,
            validators = updated.validators.len(),
            "Added validator to genesis document"
        );
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

/// CRC32 checksum (IEEE polynomial), matching the port-derivation contract.
fn crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = generate_crc32_table();
    let mut crc = 0xFFFF_FFFFu32;
    for byte in data {
        let index = ((crc ^ (*byte as u32)) & 0xFF) as usize;
        crc = TABLE[index] ^ (crc >> 8);
    }
    !crc
}

const fn generate_crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = 0xEDB8_8320 ^ (crc >> 1);
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_matches_ieee_vectors() {
        // Standard IEEE CRC32 check value
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn test_port_derivation_rule() {
        let ports = derive_agent_ports("agent-7");
        let expected_p2p = BASE_P2P_PORT + (crc32(b"agent-7") % 10_000) as u16;
        assert_eq!(ports.p2p, expected_p2p);
        assert_eq!(ports.rpc, ports.p2p + 1);
        assert_eq!(ports.api, ports.p2p + 2);

        // Deterministic
        assert_eq!(derive_agent_ports("agent-7"), derive_agent_ports("agent-7"));
    }
}
