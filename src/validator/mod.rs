//! In-memory deliberation-capable validators
//!
//! A [`Validator`] is the live, per-process face of an agent: personality,
//! mood, relationships, a two-tier memory system and a reinforcement
//! learner. Validators are held in a [`ValidatorStore`] keyed chain → id.

pub mod learner;
pub mod logger;
pub mod memory;
pub mod validator;

pub use learner::{PolicyStats, ReinforcementLearner};
pub use logger::ValidatorLogger;
pub use memory::AgentMemory;
pub use validator::{spawn_block_listener, Validator, ValidatorStore};
