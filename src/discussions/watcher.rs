//! Discussion-file tailer
//!
//! Polls a chain's discussion log, parses freshly appended round lines and
//! re-broadcasts them on the event hub as `AGENT_VOTE` payloads. A trailing
//! line without a newline is still being written and is skipped until the
//! writer finishes it.

use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{parse_round_line, DiscussionLog};
use crate::events::{EventHub, EVENT_AGENT_VOTE};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Spawn a tailer for one chain's discussion file. Existing content is
/// replayed once, then only new complete lines are broadcast.
pub fn spawn_discussion_watcher(
    log: DiscussionLog,
    chain_id: String,
    hub: EventHub,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut offset = 0usize;
        let mut ticker = tokio::time::interval(POLL_INTERVAL);

        loop {
            ticker.tick().await;

            let contents = log.read(&chain_id).await;
            if contents.len() < offset {
                // File was truncated or replaced; start over
                warn!(chain = %chain_id, "Discussion log shrank, resetting tail offset");
                offset = 0;
            }
            if contents.len() == offset {
                continue;
            }

            let fresh = &contents[offset..];
            let mut consumed = 0usize;
            for line in fresh.split_inclusive('\n') {
                if !line.ends_with('\n') {
                    // Partial final line: leave it for the next poll
                    break;
                }
                consumed += line.len();
                let line = line.trim_end();
                if line.is_empty() {
                    continue;
                }
                match parse_round_line(line) {
                    Some(vote) => match serde_json::to_value(&vote) {
                        Ok(payload) => hub.broadcast(EVENT_AGENT_VOTE, payload),
                        Err(e) => warn!("Failed to encode agent vote: {}", e),
                    },
                    None => debug!(chain = %chain_id, "Skipping non-round line in discussion log"),
                }
            }
            offset += consumed;
        }
    })
}
