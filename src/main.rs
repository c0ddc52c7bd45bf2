//! Conclave - agent deliberation gateway for BFT chains
//!
//! "In a multitude of counselors they are established" - Proverbs 15:22

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use conclave::chain::{ChainManager, SubprocessLauncher};
use conclave::config::Args;
use conclave::da::{DaService, MemoryBlobStore};
use conclave::discussions::DiscussionLog;
use conclave::events::EventHub;
use conclave::llm::{HttpLlmClient, LlmClient};
use conclave::registry::{AgentRegistry, NodeRegistry};
use conclave::server::AppState;
use conclave::validator::ValidatorStore;
use conclave::{node, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("conclave={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Child validator node mode
    if args.is_child_node() {
        if let Err(e) = node::run_agent_node(args).await {
            error!("Node error: {}", e);
            std::process::exit(1);
        }
        return Ok(());
    }

    info!("======================================");
    info!("  Conclave - deliberation gateway");
    info!("  \"In a multitude of counselors\"");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Data dir: {}", args.data_dir.display());
    info!("LLM: {} ({})", args.llm.llm_url, args.llm.llm_model);
    info!("Block interval: {} ms", args.block_interval_ms);
    info!("======================================");

    let hub = EventHub::default();
    let nodes = Arc::new(NodeRegistry::new());
    let agents = Arc::new(AgentRegistry::load(&args.data_dir).await);
    let da = Arc::new(DaService::new(Arc::new(MemoryBlobStore::new())));
    let discussion_log = DiscussionLog::new(&args.data_dir);
    let llm: Arc<dyn LlmClient> = Arc::new(HttpLlmClient::new(&args.llm)?);

    let launcher = Arc::new(SubprocessLauncher::new(
        args.data_dir.clone(),
        args.log_dir.clone(),
        Arc::clone(&llm),
        Arc::clone(&agents),
        Arc::clone(&da),
        hub.clone(),
        discussion_log.clone(),
        std::time::Duration::from_millis(args.block_interval_ms),
    ));
    let manager = Arc::new(ChainManager::new(
        args.data_dir.clone(),
        Arc::clone(&nodes),
        Arc::clone(&agents),
        hub.clone(),
        launcher,
    ));

    let state = Arc::new(AppState {
        args: args.clone(),
        nodes,
        agents,
        manager,
        validators: Arc::new(ValidatorStore::new()),
        hub,
        da,
        llm,
        discussion_log,
    });

    let listener = tokio::net::TcpListener::bind(state.args.listen).await?;
    if let Err(e) = server::run(listener, state).await {
        error!("Server error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}
