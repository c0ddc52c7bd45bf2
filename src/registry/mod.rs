//! Two-tier registry
//!
//! - [`NodeRegistry`]: in-memory chain → node map. No durability; rebuilt as
//!   chains are created after a restart.
//! - [`AgentRegistry`]: persisted JSON under `<data>/agent_registry.json`,
//!   including the chain → validator-address → agent binding established
//!   when a registration transaction commits.

pub mod agents;
pub mod nodes;

pub use agents::AgentRegistry;
pub use nodes::{NodeInfo, NodeRegistry};
