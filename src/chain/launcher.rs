//! Node launching
//!
//! The genesis node runs in-process (sequencer + RPC server tasks); each
//! validator is a child OS process of the same binary with node flags. The
//! launcher is a trait so the manager can be exercised with a stub.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::genesis::GenesisDoc;
use super::keys::{NodeKey, ValidatorKey};
use super::manager::NodePorts;
use crate::bft::rpc::{self, RpcContext};
use crate::bft::sequencer::{ChainStore, LocalSequencer};
use crate::bft::types::ValidatorUpdate;
use crate::consensus::Application;
use crate::core::Agent;
use crate::da::DaService;
use crate::discussions::DiscussionLog;
use crate::events::EventHub;
use crate::llm::LlmClient;
use crate::registry::AgentRegistry;
use crate::types::{ConclaveError, Result};

/// Grace period a child process must survive before registration succeeds.
pub const STARTUP_GRACE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Starting,
    Running,
    /// Terminal. A stopped node stays in the registry.
    Stopped,
}

/// Live handle to a launched node.
pub struct NodeHandle {
    pub ports: NodePorts,
    state: watch::Receiver<NodeState>,
}

impl NodeHandle {
    pub fn new(ports: NodePorts, state: watch::Receiver<NodeState>) -> Self {
        Self { ports, state }
    }

    /// Handle for a node that is already running (in-process genesis).
    pub fn running(ports: NodePorts) -> Self {
        let (tx, rx) = watch::channel(NodeState::Running);
        // Keep the channel open for the lifetime of the handle
        std::mem::forget(tx);
        Self { ports, state: rx }
    }

    pub fn state(&self) -> NodeState {
        *self.state.borrow()
    }
}

#[async_trait]
pub trait NodeLauncher: Send + Sync {
    /// Start a chain's genesis node in-process. Ports are allocated by the
    /// launcher; the returned handle carries the actual bindings.
    async fn launch_genesis(&self, chain_id: &str) -> Result<NodeHandle>;

    /// Launch a validator child process on the derived ports and wait the
    /// grace period for it to stay up.
    async fn launch_validator(
        &self,
        chain_id: &str,
        agent: &Agent,
        ports: NodePorts,
        genesis_seed: &str,
    ) -> Result<NodeHandle>;
}

/// Production launcher: in-process genesis, same-binary child validators.
pub struct SubprocessLauncher {
    data_dir: PathBuf,
    log_dir: PathBuf,
    llm: Arc<dyn LlmClient>,
    registry: Arc<AgentRegistry>,
    da: Arc<DaService>,
    hub: EventHub,
    discussion_log: DiscussionLog,
    block_interval: Duration,
}

impl SubprocessLauncher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        data_dir: PathBuf,
        log_dir: PathBuf,
        llm: Arc<dyn LlmClient>,
        registry: Arc<AgentRegistry>,
        da: Arc<DaService>,
        hub: EventHub,
        discussion_log: DiscussionLog,
        block_interval: Duration,
    ) -> Self {
        Self {
            data_dir,
            log_dir,
            llm,
            registry,
            da,
            hub,
            discussion_log,
            block_interval,
        }
    }
}

#[async_trait]
impl NodeLauncher for SubprocessLauncher {
    async fn launch_genesis(&self, chain_id: &str) -> Result<NodeHandle> {
        let home = self.data_dir.join(chain_id).join("genesis");

        let _node_key = NodeKey::load_or_generate(&home.join("config/node_key.json")).await?;
        let validator_key = ValidatorKey::load_or_generate(
            &home.join("config/priv_validator_key.json"),
            &home.join("data/priv_validator_state.json"),
        )
        .await?;

        let genesis = GenesisDoc::load(&home.join("config/genesis.json")).await?;

        // Reserve ports: RPC is served, P2P is recorded for peers
        let rpc_listener = TcpListener::bind("127.0.0.1:0").await?;
        let rpc_port = rpc_listener.local_addr()?.port();
        let p2p_listener = TcpListener::bind("127.0.0.1:0").await?;
        let p2p_port = p2p_listener.local_addr()?.port();
        drop(p2p_listener);

        let app = Arc::new(Application::new(
            chain_id,
            &validator_key.address,
            Arc::clone(&self.llm),
            Arc::clone(&self.registry),
            self.discussion_log.clone(),
            self.hub.clone(),
        ));
        app.init_chain(genesis.validator_updates()?);

        let store = Arc::new(ChainStore::new());
        let (sequencer, _seq_handle) = LocalSequencer::spawn(
            chain_id,
            Arc::clone(&app),
            Arc::clone(&store),
            Arc::clone(&self.da),
            self.hub.clone(),
            self.discussion_log.clone(),
            self.block_interval,
        );

        let self_validator =
            ValidatorUpdate::new(validator_key.pub_key_bytes()?, genesis.validators[0].power);
        let ctx = Arc::new(RpcContext {
            chain_id: chain_id.to_string(),
            app,
            store,
            sequencer,
            self_validator,
        });

        let rpc_chain = chain_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = rpc::serve(rpc_listener, ctx).await {
                error!(chain = %rpc_chain, "Genesis RPC server exited: {}", e);
            }
        });

        info!(chain = %chain_id, rpc = rpc_port, p2p = p2p_port, "Genesis node started in-process");

        Ok(NodeHandle::running(NodePorts {
            p2p: p2p_port,
            rpc: rpc_port,
            api: 0,
        }))
    }

    async fn launch_validator(
        &self,
        chain_id: &str,
        agent: &Agent,
        ports: NodePorts,
        genesis_seed: &str,
    ) -> Result<NodeHandle> {
        let exe = std::env::current_exe()
            .map_err(|e| ConclaveError::Internal(format!("resolve current exe: {}", e)))?;

        info!(
            chain = %chain_id,
            agent = %agent.id,
            p2p = ports.p2p,
            rpc = ports.rpc,
            api = ports.api,
            "Launching validator child process"
        );

        let mut child = Command::new(exe)
            .arg("--chain")
            .arg(chain_id)
            .arg("--agent-id")
            .arg(&agent.id)
            .arg("--p2p-port")
            .arg(ports.p2p.to_string())
            .arg("--rpc-port")
            .arg(ports.rpc.to_string())
            .arg("--api-port")
            .arg(ports.api.to_string())
            .arg("--genesis-node-id")
            .arg(genesis_seed)
            .arg("--role")
            .arg(agent.role.as_str())
            .env("DATA_DIR", &self.data_dir)
            .env("LOG_DIR", &self.log_dir)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| ConclaveError::Internal(format!("spawn agent process: {}", e)))?;

        // The child must survive the grace period
        tokio::select! {
            status = child.wait() => {
                let status = status
                    .map_err(|e| ConclaveError::Internal(format!("wait on agent process: {}", e)))?;
                return Err(ConclaveError::ProcessExited(format!(
                    "agent {} exited during startup: {}",
                    agent.id, status
                )));
            }
            _ = tokio::time::sleep(STARTUP_GRACE) => {}
        }

        let (state_tx, state_rx) = watch::channel(NodeState::Running);
        let agent_id = agent.id.clone();
        let monitor_chain = chain_id.to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => warn!(
                    chain = %monitor_chain,
                    agent = %agent_id,
                    "Validator process exited: {}",
                    status
                ),
                Err(e) => warn!(
                    chain = %monitor_chain,
                    agent = %agent_id,
                    "Validator process wait failed: {}",
                    e
                ),
            }
            let _ = state_tx.send(NodeState::Stopped);
        });

        Ok(NodeHandle::new(ports, state_rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_handle_reports_running() {
        let handle = NodeHandle::running(NodePorts {
            p2p: 1,
            rpc: 2,
            api: 3,
        });
        assert_eq!(handle.state(), NodeState::Running);
        assert_eq!(handle.ports.rpc, 2);
    }

    #[test]
    fn test_handle_observes_stop() {
        let (tx, rx) = watch::channel(NodeState::Running);
        let handle = NodeHandle::new(
            NodePorts {
                p2p: 1,
                rpc: 2,
                api: 3,
            },
            rx,
        );
        assert_eq!(handle.state(), NodeState::Running);
        tx.send(NodeState::Stopped).unwrap();
        assert_eq!(handle.state(), NodeState::Stopped);
    }
}
