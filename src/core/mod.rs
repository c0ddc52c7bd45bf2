//! Core domain types shared across the gateway, the consensus application
//! and the deliberation engine.

pub mod agent;
pub mod block;
pub mod transaction;

pub use agent::{Agent, AgentRole};
pub use block::Block;
pub use transaction::{Transaction, TX_DISCUSS, TX_LOAN_REQUEST, TX_REGISTER_VALIDATOR, TX_SUBMIT_PAPER};
