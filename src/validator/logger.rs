//! Per-validator file logging
//!
//! Each validator writes a categorized activity log under
//! `<logs>/<chainID>/<agentID>_<timestamp>.log`, alongside normal tracing
//! output. File writes are best-effort: a validator never fails an
//! operation because its log file is unavailable.

use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// Log categories mirrored in each file line.
#[derive(Debug, Clone, Copy)]
pub enum LogCategory {
    Memory,
    Social,
    Learning,
    Validation,
    Discussion,
    Task,
    Error,
    System,
}

impl LogCategory {
    fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Memory => "MEMORY",
            LogCategory::Social => "SOCIAL",
            LogCategory::Learning => "LEARNING",
            LogCategory::Validation => "VALIDATION",
            LogCategory::Discussion => "DISCUSSION",
            LogCategory::Task => "TASK",
            LogCategory::Error => "ERROR",
            LogCategory::System => "SYSTEM",
        }
    }
}

pub struct ValidatorLogger {
    validator_name: String,
    file: Option<Mutex<File>>,
}

impl ValidatorLogger {
    /// Open a log file for this validator. Directory creation or open
    /// failures degrade to tracing-only logging.
    pub fn new(log_dir: &Path, chain_id: &str, agent_id: &str, validator_name: &str) -> Self {
        let chain_dir = if chain_id.is_empty() {
            log_dir.to_path_buf()
        } else {
            log_dir.join(chain_id)
        };

        let file = std::fs::create_dir_all(&chain_dir).ok().and_then(|_| {
            let filename = format!("{}_{}.log", agent_id, Utc::now().format("%Y%m%d_%H%M%S"));
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(chain_dir.join(filename))
                .ok()
        });

        Self {
            validator_name: validator_name.to_string(),
            file: file.map(Mutex::new),
        }
    }

    /// Tracing-only logger for contexts without a filesystem (tests).
    pub fn disabled(validator_name: &str) -> Self {
        Self {
            validator_name: validator_name.to_string(),
            file: None,
        }
    }

    pub fn log(&self, category: LogCategory, action: &str, target: &str, message: &str) {
        let entry = format!(
            "[{}] [{}] [{}:{}] {}",
            self.validator_name,
            category.as_str(),
            action,
            target,
            message
        );
        debug!("{}", entry);

        if let Some(ref file) = self.file {
            if let Ok(mut f) = file.lock() {
                let _ = writeln!(f, "{} {}", Utc::now().format("%Y-%m-%d %H:%M:%S"), entry);
            }
        }
    }

    pub fn memory(&self, action: &str, message: &str) {
        self.log(LogCategory::Memory, action, "", message);
    }

    pub fn social(&self, action: &str, target: &str, message: &str) {
        self.log(LogCategory::Social, action, target, message);
    }

    pub fn learning(&self, action: &str, message: &str) {
        self.log(LogCategory::Learning, action, "", message);
    }

    pub fn validation(&self, height: u64, hash: &str, message: &str) {
        self.log(
            LogCategory::Validation,
            "Validate",
            &format!("Block:{}:{}", height, hash),
            message,
        );
    }

    pub fn discussion(&self, target: &str, message: &str) {
        self.log(LogCategory::Discussion, "Discuss", target, message);
    }

    pub fn task(&self, action: &str, target: &str, message: &str) {
        self.log(LogCategory::Task, action, target, message);
    }

    pub fn error(&self, context: &str, message: &str) {
        self.log(LogCategory::Error, context, "", message);
    }
}
