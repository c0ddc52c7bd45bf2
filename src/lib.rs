//! Conclave - agent deliberation gateway for BFT chains
//!
//! "In a multitude of counselors they are established" - Proverbs 15:22
//!
//! Conclave runs many independent BFT chains, each with a dynamic set of
//! validator nodes whose block-validation decisions are driven by per-node
//! AI agents. Every block proposal passes through a structured, multi-round
//! agent deliberation; a block commits only if the agents collectively
//! accept it.
//!
//! ## Subsystems
//!
//! - **Chain manager**: per-chain bootstrap (keys, genesis doc), validator
//!   subprocess launching, deterministic port allocation
//! - **Consensus application**: transaction taxonomy, validator-set
//!   mutation, proposal accept/reject driven by the deliberator
//! - **Deliberation engine**: multi-round reviews plus the collaborative
//!   task-breakdown and task-delegation pipelines

pub mod bft;
pub mod chain;
pub mod config;
pub mod consensus;
pub mod core;
pub mod da;
pub mod deliberation;
pub mod discussions;
pub mod events;
pub mod llm;
pub mod node;
pub mod registry;
pub mod routes;
pub mod server;
pub mod types;
pub mod validator;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{ConclaveError, Result};
