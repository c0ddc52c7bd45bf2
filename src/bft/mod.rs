//! Seam to the BFT consensus engine
//!
//! The engine itself (block production, gossip, commit) is an external
//! collaborator; this module holds the vocabulary its application hooks
//! speak ([`types`]), the RPC client the HTTP handlers consume
//! ([`client`]), the RPC surface a node serves ([`rpc`]) and a minimal
//! single-node driver that feeds the application hooks in the contractual
//! order for development and tests ([`sequencer`]).

pub mod client;
pub mod rpc;
pub mod sequencer;
pub mod types;

pub use client::EngineRpc;
pub use sequencer::{ChainStore, LocalSequencer};
pub use types::{ConsensusParams, ProposalDecision, TxResult, ValidatorUpdate};
