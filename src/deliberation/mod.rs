//! Agent deliberation engine
//!
//! Three review flavors share one multi-round structure (paper review, loan
//! review, generic discussion), plus the collaborative task-breakdown and
//! task-delegation pipelines: strategy selection → proposal rounds →
//! voting/coordination → assignment. All LLM calls go through the
//! [`crate::llm::LlmClient`] seam and are serialized per agent so prompts
//! always see consistent prior state.

pub mod breakdown;
pub mod delegation;
pub mod discussion;
pub mod loan;
pub mod paper;
pub mod similarity;
pub mod strategy;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use discussion::{validator_discussion, ValidatorOpinion};
pub use loan::{multi_round_loan_review, LoanReview};
pub use paper::{multi_round_paper_review, PaperReview, ResearchPaper};

pub const MSG_PROPOSAL: &str = "proposal";
pub const MSG_CRITIQUE: &str = "critique";
pub const MSG_REFINEMENT: &str = "refinement";
pub const MSG_AGREEMENT: &str = "agreement";
pub const MSG_QUESTION: &str = "question";
pub const MSG_SUMMARY: &str = "summary";
pub const MSG_FINAL_PROPOSAL: &str = "final_proposal";
pub const MSG_VOTE: &str = "vote";
pub const MSG_BID: &str = "bid";

/// One message in a deliberation thread. Ordering is chronological append
/// order; `message_id` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscussionMessage {
    #[serde(rename = "validatorId")]
    pub validator_id: String,
    #[serde(rename = "validatorName")]
    pub validator_name: String,
    #[serde(rename = "messageType")]
    pub message_type: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub proposal: Vec<String>,
    #[serde(default, rename = "replyTo", skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(rename = "messageId")]
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
}

impl DiscussionMessage {
    pub fn new(validator_id: &str, validator_name: &str, message_type: &str, content: &str) -> Self {
        Self {
            validator_id: validator_id.to_string(),
            validator_name: validator_name.to_string(),
            message_type: message_type.to_string(),
            content: content.to_string(),
            proposal: Vec::new(),
            reply_to: None,
            message_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_proposal(mut self, proposal: Vec<String>) -> Self {
        self.proposal = proposal;
        self
    }

    pub fn with_reply_to(mut self, reply_to: Option<String>) -> Self {
        self.reply_to = reply_to;
        self
    }
}

/// Numbered subtask list for prompts.
pub fn format_subtask_list(subtasks: &[String]) -> String {
    let mut out = String::new();
    for (i, task) in subtasks.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, task));
    }
    out
}

/// Readable history of a discussion so far, trimmed to the last 15 messages.
pub fn format_discussion_context(messages: &[DiscussionMessage]) -> String {
    let mut out = String::from("--- DISCUSSION HISTORY ---\n\n");
    let start = messages.len().saturating_sub(15);
    for msg in &messages[start..] {
        out.push_str(&format!(
            "[{}] {} ({}):\n{}\n\n",
            msg.timestamp.format("%H:%M:%S"),
            msg.validator_name,
            msg.message_type,
            msg.content
        ));
        if !msg.proposal.is_empty() {
            out.push_str("Proposed subtasks:\n");
            for (j, subtask) in msg.proposal.iter().enumerate() {
                out.push_str(&format!("{}. {}\n", j + 1, subtask));
            }
            out.push('\n');
        }
    }
    out
}

/// Fraction of messages whose type is `agreement` over total messages.
pub fn consensus_score(messages: &[DiscussionMessage]) -> f64 {
    if messages.is_empty() {
        return 0.0;
    }
    let agreements = messages
        .iter()
        .filter(|m| m.message_type == MSG_AGREEMENT)
        .count();
    agreements as f64 / messages.len() as f64
}

/// Fallback extraction of a final proposal from a discussion: prefer the
/// last summary carrying a proposal, then the last proposal of any kind.
pub fn extract_consensus_proposal(messages: &[DiscussionMessage]) -> Vec<String> {
    for msg in messages.iter().rev() {
        if msg.message_type == MSG_SUMMARY && !msg.proposal.is_empty() {
            return msg.proposal.clone();
        }
    }
    for msg in messages.iter().rev() {
        if !msg.proposal.is_empty() {
            return msg.proposal.clone();
        }
    }
    Vec::new()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consensus_score() {
        assert_eq!(consensus_score(&[]), 0.0);

        let messages = vec![
            DiscussionMessage::new("v1", "Ada", MSG_PROPOSAL, "plan"),
            DiscussionMessage::new("v2", "Bea", MSG_AGREEMENT, "agreed"),
            DiscussionMessage::new("v3", "Cal", MSG_AGREEMENT, "same"),
            DiscussionMessage::new("v1", "Ada", MSG_SUMMARY, "done"),
        ];
        assert!((consensus_score(&messages) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_extract_consensus_prefers_summary_with_proposal() {
        let messages = vec![
            DiscussionMessage::new("v1", "Ada", MSG_PROPOSAL, "first")
                .with_proposal(vec!["a".into()]),
            DiscussionMessage::new("v2", "Bea", MSG_SUMMARY, "wrap")
                .with_proposal(vec!["b".into()]),
            DiscussionMessage::new("v3", "Cal", MSG_PROPOSAL, "late")
                .with_proposal(vec!["c".into()]),
        ];
        assert_eq!(extract_consensus_proposal(&messages), vec!["b".to_string()]);
    }

    #[test]
    fn test_extract_consensus_falls_back_to_last_proposal() {
        let messages = vec![
            DiscussionMessage::new("v1", "Ada", MSG_PROPOSAL, "first")
                .with_proposal(vec!["a".into()]),
            DiscussionMessage::new("v3", "Cal", MSG_REFINEMENT, "late")
                .with_proposal(vec!["c".into()]),
            DiscussionMessage::new("v2", "Bea", MSG_AGREEMENT, "no proposal"),
        ];
        assert_eq!(extract_consensus_proposal(&messages), vec!["c".to_string()]);
        assert!(extract_consensus_proposal(&[]).is_empty());
    }

    #[test]
    fn test_discussion_context_trims_to_fifteen() {
        let messages: Vec<_> = (0..30)
            .map(|i| DiscussionMessage::new("v1", "Ada", MSG_PROPOSAL, &format!("msg {}", i)))
            .collect();
        let ctx = format_discussion_context(&messages);
        assert!(!ctx.contains("msg 14"));
        assert!(ctx.contains("msg 15"));
        assert!(ctx.contains("msg 29"));
    }
}
