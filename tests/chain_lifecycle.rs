//! End-to-end chain lifecycle: create a chain, register a validator through
//! a committed block, accept and reject deliberated transactions.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use conclave::bft::types::ValidatorUpdate;
use conclave::bft::EngineRpc;
use conclave::chain::launcher::NodeState;
use conclave::chain::{ChainManager, NodeHandle, NodeLauncher, SubprocessLauncher};
use conclave::chain::keys::ValidatorKey;
use conclave::chain::manager::{derive_agent_ports, NodePorts};
use conclave::core::{Agent, AgentRole, Transaction};
use conclave::da::{DaService, MemoryBlobStore};
use conclave::discussions::DiscussionLog;
use conclave::events::EventHub;
use conclave::llm::LlmClient;
use conclave::registry::{AgentRegistry, NodeRegistry};
use conclave::types::ConclaveError;

const BLOCK_INTERVAL: Duration = Duration::from_millis(50);

/// LLM stub that always returns the same response.
struct FixedLlm(String);

#[async_trait]
impl LlmClient for FixedLlm {
    async fn complete(&self, _prompt: &str) -> conclave::Result<String> {
        Ok(self.0.clone())
    }
}

struct Harness {
    manager: Arc<ChainManager>,
    agents: Arc<AgentRegistry>,
    da: Arc<DaService>,
    _dir: tempfile::TempDir,
}

async fn harness(llm: Arc<dyn LlmClient>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");
    let log_dir = dir.path().join("logs");

    let hub = EventHub::default();
    let nodes = Arc::new(NodeRegistry::new());
    let agents = Arc::new(AgentRegistry::load(&data_dir).await);
    let da = Arc::new(DaService::new(Arc::new(MemoryBlobStore::new())));
    let discussion_log = DiscussionLog::new(&data_dir);

    let launcher = Arc::new(SubprocessLauncher::new(
        data_dir.clone(),
        log_dir,
        llm,
        Arc::clone(&agents),
        Arc::clone(&da),
        hub.clone(),
        discussion_log,
        BLOCK_INTERVAL,
    ));
    let manager = Arc::new(ChainManager::new(
        data_dir,
        Arc::clone(&nodes),
        Arc::clone(&agents),
        hub,
        launcher,
    ));

    Harness {
        manager,
        agents,
        da,
        _dir: dir,
    }
}

/// Bind an agent to the chain's genesis validator so deliberation runs.
async fn bind_genesis_agent(h: &Harness, chain_id: &str, agent_id: &str, name: &str) {
    let key_path = h
        .manager
        .data_dir()
        .join(chain_id)
        .join("genesis/config/priv_validator_key.json");
    let key: ValidatorKey =
        serde_json::from_slice(&std::fs::read(&key_path).unwrap()).unwrap();

    let mut agent = Agent::new(agent_id, name, AgentRole::Validator)
        .with_traits(vec!["analytical".into()]);
    agent.is_validator = true;
    h.agents.register_agent(chain_id, agent).await.unwrap();
    h.agents
        .link_validator(chain_id, agent_id, &key.address)
        .await
        .unwrap();
}

async fn wait_for<F: Fn() -> bool>(predicate: F, what: &str) {
    for _ in 0..100 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("timed out waiting for {}", what);
}

#[tokio::test]
async fn test_create_chain_reaches_running() {
    let h = harness(Arc::new(FixedLlm("{}".into()))).await;

    let ports = h.manager.create_chain("chainA", "a test chain").await.unwrap();
    assert!(ports.rpc > 0);

    assert_eq!(
        h.manager.node_state("chainA", "genesis"),
        Some(NodeState::Running)
    );
    assert_eq!(h.manager.rpc_port_for_chain("chainA").unwrap(), ports.rpc);
    assert!(h.manager.list_chains().contains(&"chainA".to_string()));

    // The genesis RPC answers with the chain identity
    let rpc = EngineRpc::for_port(ports.rpc).unwrap();
    let status = rpc.status().await.unwrap();
    assert_eq!(status.node_info.network, "chainA");
    assert_eq!(status.sync_info.latest_block_height, 0);

    // Filesystem layout materialized
    let home = h.manager.data_dir().join("chainA/genesis");
    assert!(home.join("config/node_key.json").exists());
    assert!(home.join("config/genesis.json").exists());
    assert!(home.join("config/priv_validator_key.json").exists());
    assert!(home.join("data/priv_validator_state.json").exists());
}

#[tokio::test]
async fn test_create_chain_twice_conflicts() {
    let h = harness(Arc::new(FixedLlm("{}".into()))).await;
    h.manager.create_chain("chainA", "prompt").await.unwrap();

    let err = h.manager.create_chain("chainA", "prompt").await.unwrap_err();
    assert!(matches!(err, ConclaveError::AlreadyExists(_)));
}

#[tokio::test]
async fn test_register_validator_through_committed_block() {
    let h = harness(Arc::new(FixedLlm("{}".into()))).await;
    let ports = h.manager.create_chain("chainA", "prompt").await.unwrap();
    let rpc = EngineRpc::for_port(ports.rpc).unwrap();

    let before = rpc.validators().await.unwrap().validators.len();

    // Submit a registration transaction for agent v1
    let pub_key = [42u8; 32];
    let tx = Transaction::register_validator("chainA", "v1", &pub_key)
        .encode()
        .unwrap();
    rpc.broadcast_tx(&tx).await.unwrap();

    // After one committed block the live set includes the new key
    let expected = ValidatorUpdate::new(pub_key, 100);
    let mut registered = false;
    for _ in 0..100 {
        let vals = rpc.validators().await.unwrap().validators;
        if vals.iter().any(|v| v.address == expected.address()) {
            registered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(registered, "validator registration never committed");

    let vals = rpc.validators().await.unwrap().validators;
    assert_eq!(vals.len(), before + 1);
    let added = vals.iter().find(|v| v.address == expected.address()).unwrap();
    assert_eq!(added.voting_power, 100);
}

fn approve_paper_response() -> String {
    r#"{"summary":"solid methodology","flaws":[],"suggestions":[],"is_reproducible":true,"approval":true}"#
        .to_string()
}

fn reject_paper_response() -> String {
    r#"{"summary":"unconvincing","flaws":["no controls"],"suggestions":[],"is_reproducible":false,"approval":false}"#
        .to_string()
}

fn paper_tx(chain_id: &str) -> Vec<u8> {
    let paper = serde_json::json!({
        "title": "P",
        "abstract": "A",
        "content": "C",
        "author": "author",
        "topic_tags": ["testing"],
        "timestamp": 0,
    });
    Transaction {
        tx_type: "submit_paper".to_string(),
        from: "client".to_string(),
        content: paper.to_string(),
        data: vec![],
        chain_id: chain_id.to_string(),
    }
    .encode()
    .unwrap()
}

#[tokio::test]
async fn test_paper_accept_commits_block_and_writes_blob() {
    let h = harness(Arc::new(FixedLlm(approve_paper_response()))).await;
    let ports = h.manager.create_chain("chainA", "prompt").await.unwrap();
    bind_genesis_agent(&h, "chainA", "a1", "Ada").await;

    let rpc = EngineRpc::for_port(ports.rpc).unwrap();
    rpc.broadcast_tx(&paper_tx("chainA")).await.unwrap();

    wait_for(
        || !h.da.list_for_chain("chainA").is_empty(),
        "paper block to commit with a DA blob",
    )
    .await;

    let status = rpc.status().await.unwrap();
    assert_eq!(status.sync_info.latest_block_height, 1);

    // The blob is indexed under the committed block's hash
    let refs = h.da.list_for_chain("chainA");
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].block_hash, status.sync_info.latest_block_hash);
    assert_eq!(refs[0].outcome, "accepted");

    let data = h.da.discussion_data(&refs[0].blob_id).await.unwrap();
    assert!(data.votes.iter().all(|v| v.approval));
    assert!(data.agent_identities.contains(&"Ada".to_string()));

    // The deliberation landed in the shared discussion log and the chain's
    // round counter advanced past the committed block
    let log_file = h.manager.data_dir().join("discussions/chainA.txt");
    assert!(std::fs::read_to_string(&log_file).unwrap().contains("|@Ada|:"));
    let round_file = h.manager.data_dir().join("discussions/chainA_round.txt");
    assert_eq!(std::fs::read_to_string(&round_file).unwrap().trim(), "2");
}

#[tokio::test]
async fn test_paper_reject_leaves_height_unchanged_and_no_blob() {
    let h = harness(Arc::new(FixedLlm(reject_paper_response()))).await;
    let ports = h.manager.create_chain("chainA", "prompt").await.unwrap();
    bind_genesis_agent(&h, "chainA", "a1", "Ada").await;

    let rpc = EngineRpc::for_port(ports.rpc).unwrap();
    rpc.broadcast_tx(&paper_tx("chainA")).await.unwrap();

    // Give the sequencer several intervals to process (and reject) the block
    tokio::time::sleep(Duration::from_millis(500)).await;

    let status = rpc.status().await.unwrap();
    assert_eq!(status.sync_info.latest_block_height, 0);
    assert!(h.da.list_for_chain("chainA").is_empty());
}

/// Stub launcher so agent registration can be exercised without spawning
/// real child processes.
struct StubLauncher {
    fail_children: bool,
}

#[async_trait]
impl NodeLauncher for StubLauncher {
    async fn launch_genesis(&self, _chain_id: &str) -> conclave::Result<NodeHandle> {
        Ok(NodeHandle::running(NodePorts {
            p2p: 26656,
            rpc: 26657,
            api: 0,
        }))
    }

    async fn launch_validator(
        &self,
        _chain_id: &str,
        agent: &Agent,
        ports: NodePorts,
        _genesis_seed: &str,
    ) -> conclave::Result<NodeHandle> {
        if self.fail_children {
            return Err(ConclaveError::ProcessExited(format!(
                "agent {} exited during startup",
                agent.id
            )));
        }
        Ok(NodeHandle::running(ports))
    }
}

async fn stub_manager(fail_children: bool) -> (Arc<ChainManager>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");
    let nodes = Arc::new(NodeRegistry::new());
    let agents = Arc::new(AgentRegistry::load(&data_dir).await);
    let manager = Arc::new(ChainManager::new(
        data_dir,
        nodes,
        agents,
        EventHub::default(),
        Arc::new(StubLauncher { fail_children }),
    ));
    (manager, dir)
}

#[tokio::test]
async fn test_register_agent_records_derived_ports() {
    let (manager, _dir) = stub_manager(false).await;
    manager.create_chain("chainA", "prompt").await.unwrap();

    let agent = Agent::new("v1", "Ada", AgentRole::Validator);
    let ports = manager.register_agent("chainA", agent).await.unwrap();
    assert_eq!(ports, derive_agent_ports("v1"));

    let (node_id, info) = manager.node_by_api_port("chainA", ports.api).unwrap();
    assert_eq!(node_id, "v1");
    assert_eq!(info.rpc_port, ports.rpc);
    assert!(!info.is_genesis);
}

#[tokio::test]
async fn test_register_agent_on_unknown_chain_is_not_found() {
    let (manager, _dir) = stub_manager(false).await;
    let err = manager
        .register_agent("ghost", Agent::new("v1", "Ada", AgentRole::Validator))
        .await
        .unwrap_err();
    assert!(matches!(err, ConclaveError::NotFound(_)));
}

#[tokio::test]
async fn test_register_agent_surfaces_process_exit() {
    let (manager, _dir) = stub_manager(true).await;
    manager.create_chain("chainA", "prompt").await.unwrap();

    let err = manager
        .register_agent("chainA", Agent::new("v1", "Ada", AgentRole::Validator))
        .await
        .unwrap_err();
    assert!(matches!(err, ConclaveError::ProcessExited(_)));

    // The failed node was never recorded
    assert!(manager.node_by_api_port("chainA", derive_agent_ports("v1").api).is_none());
}

#[tokio::test]
async fn test_add_validator_to_genesis_rewrites_atomically() {
    let (manager, _dir) = stub_manager(false).await;
    manager.create_chain("chainA", "prompt").await.unwrap();

    let agent = Agent::new("v1", "Ada", AgentRole::Validator);
    manager.add_validator_to_genesis("chainA", &agent).await.unwrap();

    let genesis_path = manager
        .data_dir()
        .join("chainA/genesis/config/genesis.json");
    let doc = conclave::chain::GenesisDoc::load(&genesis_path).await.unwrap();
    assert_eq!(doc.validators.len(), 2);
    assert_eq!(doc.validators[1].name, "v1");
    assert_eq!(doc.validators[1].power, 10);

    // The new node got its own copy of the genesis doc and key material
    let node_home = manager.data_dir().join("chainA/v1");
    assert!(node_home.join("config/genesis.json").exists());
    assert!(node_home.join("config/priv_validator_key.json").exists());
    assert!(node_home.join("data/priv_validator_state.json").exists());
}
