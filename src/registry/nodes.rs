//! Node registry — maps chains to their running nodes
//!
//! Uses DashMap for lock-free concurrent reads; every authenticated HTTP
//! request looks up the caller node by API port.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{ConclaveError, Result};

/// A node registered for a chain: the genesis process or a validator child.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub is_genesis: bool,
    pub name: String,
    pub p2p_port: u16,
    pub rpc_port: u16,
    pub api_port: u16,
}

/// In-memory registry of chain → nodeID → NodeInfo.
#[derive(Default)]
pub struct NodeRegistry {
    chains: DashMap<String, DashMap<String, NodeInfo>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_node(&self, chain_id: &str, node_id: &str, info: NodeInfo) {
        info!(
            chain = %chain_id,
            node = %node_id,
            rpc = info.rpc_port,
            p2p = info.p2p_port,
            api = info.api_port,
            genesis = info.is_genesis,
            "Registered node"
        );
        self.chains
            .entry(chain_id.to_string())
            .or_default()
            .insert(node_id.to_string(), info);
    }

    pub fn has_chain(&self, chain_id: &str) -> bool {
        self.chains.contains_key(chain_id)
    }

    pub fn list_chains(&self) -> Vec<String> {
        self.chains.iter().map(|e| e.key().clone()).collect()
    }

    /// RPC port of the chain's genesis node.
    pub fn rpc_port_for_chain(&self, chain_id: &str) -> Result<u16> {
        let nodes = self
            .chains
            .get(chain_id)
            .ok_or_else(|| ConclaveError::NotFound(format!("chain {}", chain_id)))?;

        let result = nodes
            .iter()
            .find(|e| e.value().is_genesis)
            .map(|e| e.value().rpc_port)
            .ok_or_else(|| ConclaveError::NotFound(format!("genesis node for chain {}", chain_id)));
        result
    }

    /// Resolve a node by the API port the caller connected through.
    pub fn node_by_api_port(&self, chain_id: &str, api_port: u16) -> Option<(String, NodeInfo)> {
        let nodes = self.chains.get(chain_id)?;
        let result = nodes
            .iter()
            .find(|e| e.value().api_port == api_port)
            .map(|e| (e.key().clone(), e.value().clone()));
        result
    }

    pub fn node_info(&self, chain_id: &str, node_id: &str) -> Option<NodeInfo> {
        self.chains.get(chain_id)?.get(node_id).map(|e| e.clone())
    }

    pub fn nodes_for_chain(&self, chain_id: &str) -> Vec<(String, NodeInfo)> {
        match self.chains.get(chain_id) {
            Some(nodes) => nodes
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Whether any registered node on any chain reserves this port triple.
    pub fn port_in_use(&self, port: u16) -> bool {
        self.chains.iter().any(|chain| {
            chain.value().iter().any(|e| {
                let n = e.value();
                n.p2p_port == port || n.rpc_port == port || n.api_port == port
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(genesis: bool, base: u16) -> NodeInfo {
        NodeInfo {
            is_genesis: genesis,
            name: "n".into(),
            p2p_port: base,
            rpc_port: base + 1,
            api_port: base + 2,
        }
    }

    #[test]
    fn test_rpc_port_resolution() {
        let reg = NodeRegistry::new();
        reg.register_node("demo", "genesis", node(true, 26656));
        reg.register_node("demo", "v1", node(false, 27000));

        assert_eq!(reg.rpc_port_for_chain("demo").unwrap(), 26657);
        assert!(matches!(
            reg.rpc_port_for_chain("missing"),
            Err(ConclaveError::NotFound(_))
        ));
    }

    #[test]
    fn test_node_by_api_port() {
        let reg = NodeRegistry::new();
        reg.register_node("demo", "v1", node(false, 27000));

        let (id, info) = reg.node_by_api_port("demo", 27002).unwrap();
        assert_eq!(id, "v1");
        assert_eq!(info.rpc_port, 27001);
        assert!(reg.node_by_api_port("demo", 9999).is_none());
        assert!(reg.node_by_api_port("other", 27002).is_none());
    }

    #[test]
    fn test_chain_listing() {
        let reg = NodeRegistry::new();
        assert!(!reg.has_chain("demo"));
        reg.register_node("demo", "genesis", node(true, 26656));
        assert!(reg.has_chain("demo"));
        assert_eq!(reg.list_chains(), vec!["demo".to_string()]);
    }
}
