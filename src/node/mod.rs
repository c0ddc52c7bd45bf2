//! Child validator node runtime
//!
//! The same binary re-invoked with node flags: loads (or creates) the
//! agent's validator key, copies the chain's genesis document, and runs its
//! own application + sequencer + RPC server, plus the HTTP API bound to the
//! agent's API port. Any fatal init error propagates so the process exits
//! non-zero and the manager's grace-period check catches it.

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::bft::rpc::{self, RpcContext};
use crate::bft::sequencer::{ChainStore, LocalSequencer};
use crate::bft::types::ValidatorUpdate;
use crate::chain::keys::ValidatorKey;
use crate::chain::{ChainManager, GenesisDoc, SubprocessLauncher};
use crate::config::Args;
use crate::consensus::app::REGISTERED_VALIDATOR_POWER;
use crate::consensus::Application;
use crate::da::{DaService, MemoryBlobStore};
use crate::discussions::DiscussionLog;
use crate::events::EventHub;
use crate::llm::{HttpLlmClient, LlmClient};
use crate::registry::{AgentRegistry, NodeInfo, NodeRegistry};
use crate::server::{self, AppState};
use crate::types::{ConclaveError, Result};
use crate::validator::ValidatorStore;

/// Run a validator node until it is killed. Returns only on fatal error.
pub async fn run_agent_node(args: Args) -> Result<()> {
    let chain_id = args
        .chain
        .clone()
        .ok_or_else(|| ConclaveError::InvalidInput("missing --chain".into()))?;
    let agent_id = args
        .agent_id
        .clone()
        .ok_or_else(|| ConclaveError::InvalidInput("missing --agent-id".into()))?;
    let p2p_port = args.p2p_port.unwrap_or_default();
    let rpc_port = args.rpc_port.unwrap_or_default();
    let api_port = args.api_port.unwrap_or_default();

    info!(
        chain = %chain_id,
        agent = %agent_id,
        p2p = p2p_port,
        rpc = rpc_port,
        api = api_port,
        seed = ?args.genesis_node_id,
        role = ?args.role,
        "Starting validator node"
    );

    let home = args.data_dir.join(&chain_id).join(&agent_id);
    tokio::fs::create_dir_all(home.join("config")).await?;
    tokio::fs::create_dir_all(home.join("data")).await?;

    let validator_key = ValidatorKey::load_or_generate(
        &home.join("config/priv_validator_key.json"),
        &home.join("data/priv_validator_state.json"),
    )
    .await?;

    // The chain's genesis document is the source of truth; keep a copy in
    // the node's own config directory.
    let genesis_src = args
        .data_dir
        .join(&chain_id)
        .join("genesis/config/genesis.json");
    let genesis = GenesisDoc::load(&genesis_src).await?;
    genesis.save(&home.join("config/genesis.json")).await?;

    let hub = EventHub::default();
    let nodes = Arc::new(NodeRegistry::new());
    let agents = Arc::new(AgentRegistry::load(&args.data_dir).await);
    let da = Arc::new(DaService::new(Arc::new(MemoryBlobStore::new())));
    let llm: Arc<dyn LlmClient> = Arc::new(HttpLlmClient::new(&args.llm)?);
    let discussion_log = DiscussionLog::new(&args.data_dir);
    let block_interval = std::time::Duration::from_millis(args.block_interval_ms);

    // Reserve the P2P port for the engine mesh
    let _p2p_listener = TcpListener::bind(("127.0.0.1", p2p_port)).await?;

    let app = Arc::new(Application::new(
        &chain_id,
        &validator_key.address,
        Arc::clone(&llm),
        Arc::clone(&agents),
        discussion_log.clone(),
        hub.clone(),
    ));
    app.init_chain(genesis.validator_updates()?);

    let store = Arc::new(ChainStore::new());
    let (sequencer, _seq_handle) = LocalSequencer::spawn(
        &chain_id,
        Arc::clone(&app),
        Arc::clone(&store),
        Arc::clone(&da),
        hub.clone(),
        discussion_log.clone(),
        block_interval,
    );

    let rpc_listener = TcpListener::bind(("127.0.0.1", rpc_port)).await?;
    let self_validator =
        ValidatorUpdate::new(validator_key.pub_key_bytes()?, REGISTERED_VALIDATOR_POWER);
    let rpc_ctx = Arc::new(RpcContext {
        chain_id: chain_id.clone(),
        app,
        store,
        sequencer,
        self_validator,
    });
    let rpc_chain = chain_id.clone();
    tokio::spawn(async move {
        if let Err(e) = rpc::serve(rpc_listener, rpc_ctx).await {
            error!(chain = %rpc_chain, "Node RPC server exited: {}", e);
        }
    });

    // This node's own registry entry makes Host-port authentication work
    // for requests arriving on its API port.
    nodes.register_node(
        &chain_id,
        &agent_id,
        NodeInfo {
            is_genesis: false,
            name: agent_id.clone(),
            p2p_port,
            rpc_port,
            api_port,
        },
    );

    let launcher = Arc::new(SubprocessLauncher::new(
        args.data_dir.clone(),
        args.log_dir.clone(),
        Arc::clone(&llm),
        Arc::clone(&agents),
        Arc::clone(&da),
        hub.clone(),
        discussion_log.clone(),
        block_interval,
    ));
    let manager = Arc::new(ChainManager::new(
        args.data_dir.clone(),
        Arc::clone(&nodes),
        Arc::clone(&agents),
        hub.clone(),
        launcher,
    ));

    // Bring this node's deliberation-capable validator up from its
    // registry entry and have it react to proposed blocks.
    let validators = Arc::new(ValidatorStore::new());
    if let Some(agent) = agents.agent_by_id(&chain_id, &agent_id).await {
        let validator = Arc::new(crate::validator::Validator::new(
            &agent.id,
            &agent.name,
            agent.traits.clone(),
            &agent.style,
            agent.influences.clone(),
            "",
            &chain_id,
            &args.log_dir,
        ));
        validators.register(Arc::clone(&validator));
        crate::validator::spawn_block_listener(validator, Arc::clone(&llm), hub.clone());
    }

    let state = Arc::new(AppState {
        args: args.clone(),
        nodes,
        agents,
        manager,
        validators,
        hub,
        da,
        llm,
        discussion_log,
    });

    let api_listener = TcpListener::bind(("127.0.0.1", api_port)).await?;
    info!(chain = %chain_id, agent = %agent_id, "Validator node up");
    server::run(api_listener, state).await
}
