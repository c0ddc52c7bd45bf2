//! Per-chain discussion logs
//!
//! Line-oriented append-only files under `<data>/discussions/`, one message
//! per line in the round format, plus a single-integer round counter file.
//! One async mutex per chain keeps appends from interleaving; readers
//! tolerate a partial trailing line (no newline yet) and skip it.

pub mod watcher;

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use crate::events::AgentVote;
use crate::types::Result;

/// Handle over a data root's discussion files.
#[derive(Clone)]
pub struct DiscussionLog {
    dir: PathBuf,
    write_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl DiscussionLog {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join("discussions"),
            write_locks: Arc::new(DashMap::new()),
        }
    }

    pub fn log_path(&self, chain_id: &str) -> PathBuf {
        self.dir.join(format!("{}.txt", chain_id))
    }

    fn round_path(&self, chain_id: &str) -> PathBuf {
        self.dir.join(format!("{}_round.txt", chain_id))
    }

    fn lock_for(&self, chain_id: &str) -> Arc<Mutex<()>> {
        self.write_locks
            .entry(chain_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Full discussion log contents; empty string when the file is absent.
    pub async fn read(&self, chain_id: &str) -> String {
        match tokio::fs::read_to_string(self.log_path(chain_id)).await {
            Ok(contents) => contents,
            Err(_) => String::new(),
        }
    }

    /// Append one message line. O_APPEND semantics under the per-chain lock.
    pub async fn append(&self, chain_id: &str, message: &str) -> Result<()> {
        let lock = self.lock_for(chain_id);
        let _guard = lock.lock().await;

        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(chain_id))
            .await?;
        file.write_all(message.as_bytes()).await?;
        file.write_all(b"\n").await?;
        Ok(())
    }

    /// Current round for a chain; initializes the counter file to 1.
    pub async fn current_round(&self, chain_id: &str) -> u32 {
        match tokio::fs::read_to_string(self.round_path(chain_id)).await {
            Ok(contents) => contents.trim().parse().unwrap_or(1),
            Err(_) => {
                if let Err(e) = self.write_round(chain_id, 1).await {
                    warn!("Failed to initialize round counter: {}", e);
                }
                1
            }
        }
    }

    pub async fn increment_round(&self, chain_id: &str) -> Result<u32> {
        let next = self.current_round(chain_id).await + 1;
        self.write_round(chain_id, next).await?;
        Ok(next)
    }

    async fn write_round(&self, chain_id: &str, round: u32) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.round_path(chain_id), round.to_string()).await?;
        Ok(())
    }
}

/// Format one round line: `[Round <n>] (<true|false>) |@<name>|: <message>`.
pub fn format_round_line(round: u32, approval: bool, name: &str, message: &str) -> String {
    format!("[Round {}] ({}) |@{}|: {}", round, approval, name, message)
}

/// Parse a round line back into its fields. Lines in any other shape (or
/// still being written) yield `None`.
pub fn parse_round_line(line: &str) -> Option<AgentVote> {
    let rest = line.strip_prefix("[Round ")?;
    let (round_str, rest) = rest.split_once("] (")?;
    let round: u32 = round_str.parse().ok()?;

    let (approval_str, rest) = rest.split_once(") |@")?;
    let approval = match approval_str {
        "true" => true,
        "false" => false,
        _ => return None,
    };

    let (name, message) = rest.split_once("|: ")?;
    if name.is_empty() {
        return None;
    }

    Some(AgentVote {
        validator_id: name.to_string(),
        validator_name: name.to_string(),
        message: message.trim().to_string(),
        timestamp: chrono::Utc::now().timestamp(),
        round,
        approval,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_line_round_trip() {
        let line = format_round_line(2, true, "Marie Curie", "the methodology is solid");
        assert_eq!(line, "[Round 2] (true) |@Marie Curie|: the methodology is solid");

        let vote = parse_round_line(&line).unwrap();
        assert_eq!(vote.round, 2);
        assert!(vote.approval);
        assert_eq!(vote.validator_name, "Marie Curie");
        assert_eq!(vote.message, "the methodology is solid");
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        assert!(parse_round_line("").is_none());
        assert!(parse_round_line("[Round x] (true) |@A|: msg").is_none());
        assert!(parse_round_line("[Round 1] (maybe) |@A|: msg").is_none());
        assert!(parse_round_line("[Round 1] (true) |@|: msg").is_none());
        assert!(parse_round_line("[Round 1] (true) |@A| msg").is_none());
        assert!(parse_round_line("random chatter").is_none());
    }

    #[tokio::test]
    async fn test_append_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let log = DiscussionLog::new(dir.path());

        log.append("demo", &format_round_line(0, false, "Ada", "first pass"))
            .await
            .unwrap();
        log.append("demo", &format_round_line(1, true, "Ada", "convinced now"))
            .await
            .unwrap();

        let contents = log.read("demo").await;
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("first pass"));
        assert!(lines[1].contains("convinced now"));
    }

    #[tokio::test]
    async fn test_round_counter() {
        let dir = tempfile::tempdir().unwrap();
        let log = DiscussionLog::new(dir.path());

        assert_eq!(log.current_round("demo").await, 1);
        assert_eq!(log.increment_round("demo").await.unwrap(), 2);
        assert_eq!(log.current_round("demo").await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let log = DiscussionLog::new(dir.path());

        let mut handles = Vec::new();
        for i in 0..20u32 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                let line = format_round_line(i, true, "Ada", &format!("message {}", i));
                log.append("demo", &line).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let contents = log.read("demo").await;
        let parsed: Vec<_> = contents.lines().filter_map(parse_round_line).collect();
        assert_eq!(parsed.len(), 20);
    }
}
