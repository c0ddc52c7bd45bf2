//! Configuration for Conclave
//!
//! CLI arguments and environment variable handling using clap. The same
//! binary runs in two modes: the gateway (default) and a child validator
//! node (selected by `--chain` + `--agent-id`, spawned by the chain
//! manager).

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Conclave - agent deliberation gateway for BFT chains
///
/// "In a multitude of counselors they are established" - Proverbs 15:22
#[derive(Parser, Debug, Clone)]
#[command(name = "conclave")]
#[command(about = "Agent deliberation gateway for BFT chains")]
pub struct Args {
    /// Address the gateway listens on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Root directory for chain state, keys and discussion logs
    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Root directory for per-validator log files
    #[arg(long, env = "LOG_DIR", default_value = "./logs")]
    pub log_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// LLM provider configuration
    #[command(flatten)]
    pub llm: LlmArgs,

    /// Block production cadence for the local sequencer, in milliseconds
    #[arg(long, env = "BLOCK_INTERVAL_MS", default_value = "1000")]
    pub block_interval_ms: u64,

    /// Chain to join as a child validator node (child mode)
    #[arg(long)]
    pub chain: Option<String>,

    /// Agent identity for this child node (child mode)
    #[arg(long)]
    pub agent_id: Option<String>,

    /// P2P port for the child node
    #[arg(long)]
    pub p2p_port: Option<u16>,

    /// RPC port for the child node
    #[arg(long)]
    pub rpc_port: Option<u16>,

    /// API port for the child node
    #[arg(long)]
    pub api_port: Option<u16>,

    /// Genesis seed in `nodekey@host:port` form (child mode)
    #[arg(long)]
    pub genesis_node_id: Option<String>,

    /// Agent role: producer or validator (child mode)
    #[arg(long)]
    pub role: Option<String>,
}

/// LLM provider connection configuration
#[derive(Parser, Debug, Clone)]
pub struct LlmArgs {
    /// Completion endpoint (OpenAI-compatible chat completions URL)
    #[arg(long = "llm-url", env = "LLM_URL", default_value = "https://api.openai.com/v1/chat/completions")]
    pub llm_url: String,

    /// Model identifier sent with each completion request
    #[arg(long = "llm-model", env = "LLM_MODEL", default_value = "gpt-4o")]
    pub llm_model: String,

    /// API key for the provider (optional for local endpoints)
    #[arg(long = "llm-api-key", env = "LLM_API_KEY")]
    pub llm_api_key: Option<String>,

    /// Per-call timeout in seconds; on expiry the deliberator falls back to
    /// its reject/no-support default
    #[arg(long = "llm-timeout-secs", env = "LLM_TIMEOUT_SECS", default_value = "60")]
    pub llm_timeout_secs: u64,
}

impl Args {
    /// Whether this invocation is a child validator node
    pub fn is_child_node(&self) -> bool {
        self.chain.is_some() && self.agent_id.is_some()
    }

    /// Validate configuration before startup
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.is_child_node() {
            if self.p2p_port.is_none() || self.rpc_port.is_none() || self.api_port.is_none() {
                return Err(
                    "child mode requires --p2p-port, --rpc-port and --api-port".to_string()
                );
            }
            match self.role.as_deref() {
                Some("producer") | Some("validator") => {}
                Some(other) => return Err(format!("invalid role: {}", other)),
                None => return Err("child mode requires --role".to_string()),
            }
        }
        if self.block_interval_ms == 0 {
            return Err("BLOCK_INTERVAL_MS must be greater than zero".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("conclave").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_gateway_defaults() {
        let args = parse(&[]);
        assert!(!args.is_child_node());
        assert!(args.validate().is_ok());
        assert_eq!(args.block_interval_ms, 1000);
    }

    #[test]
    fn test_child_mode_requires_ports_and_role() {
        let args = parse(&["--chain", "demo", "--agent-id", "v1"]);
        assert!(args.is_child_node());
        assert!(args.validate().is_err());

        let args = parse(&[
            "--chain", "demo",
            "--agent-id", "v1",
            "--p2p-port", "27001",
            "--rpc-port", "27002",
            "--api-port", "27003",
            "--genesis-node-id", "abc@127.0.0.1:26656",
            "--role", "validator",
        ]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_invalid_role_rejected() {
        let args = parse(&[
            "--chain", "demo",
            "--agent-id", "v1",
            "--p2p-port", "27001",
            "--rpc-port", "27002",
            "--api-port", "27003",
            "--role", "observer",
        ]);
        assert!(args.validate().is_err());
    }
}
