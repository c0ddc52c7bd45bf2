//! In-process event hub
//!
//! Typed pub/sub between the deliberation engine, the consensus application
//! and websocket subscribers. Fan-out uses a tokio broadcast channel; slow
//! subscribers lag and drop rather than back-pressure the producers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

pub const EVENT_AGENT_VOTE: &str = "AGENT_VOTE";
pub const EVENT_DECISION_STRATEGY: &str = "DECISION_STRATEGY";
pub const EVENT_STRATEGY_VOTE: &str = "STRATEGY_VOTE";
pub const EVENT_STRATEGY_SELECTED: &str = "STRATEGY_SELECTED";
pub const EVENT_TASK_BREAKDOWN_STARTED: &str = "TASK_BREAKDOWN_STARTED";
pub const EVENT_TASK_BREAKDOWN_MESSAGE: &str = "TASK_BREAKDOWN_MESSAGE";
pub const EVENT_TASK_BREAKDOWN_COMPLETED: &str = "TASK_BREAKDOWN_COMPLETED";
pub const EVENT_TASK_DELEGATION_STARTED: &str = "TASK_DELEGATION_STARTED";
pub const EVENT_TASK_DELEGATION_MESSAGE: &str = "TASK_DELEGATION_MESSAGE";
pub const EVENT_TASK_DELEGATION_VOTE: &str = "TASK_DELEGATION_VOTE";
pub const EVENT_TASK_DELEGATION_COMPLETED: &str = "TASK_DELEGATION_COMPLETED";
pub const EVENT_TASK_ASSIGNMENT: &str = "TASK_ASSIGNMENT";
pub const EVENT_BLOCK_PROPOSED: &str = "BLOCK_PROPOSED";
pub const EVENT_BLOCK_VALIDATED: &str = "BLOCK_VALIDATED";
pub const EVENT_CHAIN_CREATED: &str = "CHAIN_CREATED";
pub const EVENT_AGENT_REGISTERED: &str = "AGENT_REGISTERED";
pub const EVENT_NEW_TRANSACTION: &str = "NEW_TRANSACTION";
pub const EVENT_AGENT_ALLIANCE: &str = "AGENT_ALLIANCE";

/// One event on the hub. `payload` shape depends on `event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainEvent {
    #[serde(rename = "type")]
    pub event: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

/// A parsed round line from a chain's discussion log, re-broadcast as an
/// `AGENT_VOTE` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentVote {
    #[serde(rename = "validatorId")]
    pub validator_id: String,
    #[serde(rename = "validatorName")]
    pub validator_name: String,
    pub message: String,
    pub timestamp: i64,
    pub round: u32,
    pub approval: bool,
}

/// Broadcast hub shared by producers and websocket subscribers.
#[derive(Clone)]
pub struct EventHub {
    tx: broadcast::Sender<ChainEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Lossy when no subscriber is connected.
    pub fn broadcast(&self, event: &str, payload: Value) {
        let event = ChainEvent {
            event: event.to_string(),
            payload,
            timestamp: Utc::now(),
        };
        debug!(event = %event.event, "Broadcasting event");
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(256)
    }
}
