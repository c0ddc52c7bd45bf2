//! Two-tier agent memory
//!
//! Short-term memory is a set of bounded ring buffers plus "current
//! block/task" pointers; oldest entries are evicted on overflow and a TTL
//! cleanup drops anything older than 24 hours. Long-term memory is
//! append-only records plus the relationship map with trust scores in
//! [0, 1]. Locks are never held across an LLM call: every method here is
//! synchronous.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::learner::ReinforcementLearner;
use super::logger::ValidatorLogger;
use crate::core::Block;
use crate::deliberation::breakdown::TaskBreakdownResults;
use crate::deliberation::delegation::TaskDelegationResults;
use crate::deliberation::strategy::DecisionStrategy;
use crate::deliberation::DiscussionMessage;
use crate::types::truncate;

/// Maximum entries per short-term ring buffer
pub const MAX_RECENT: usize = 100;
/// Default TTL for short-term entries
pub const SHORT_TERM_TTL_HOURS: i64 = 24;
/// Initial trust for a new relationship
pub const INITIAL_TRUST: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct MemoryEvent {
    pub event_type: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RelationshipEvent {
    pub event_type: String,
    pub impact: f64,
    pub context: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Relationship {
    pub validator_id: String,
    pub interactions: Vec<RelationshipEvent>,
    pub trust_score: f64,
    pub last_interaction: DateTime<Utc>,
    pub positive_count: u32,
    pub negative_count: u32,
}

#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    pub decision_type: String,
    pub my_choice: String,
    pub final_outcome: String,
    pub reward: f64,
    pub reasoning: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ValidationRecord {
    pub block_height: u64,
    pub block_hash: String,
    pub decision: String,
    pub reasoning: String,
    pub outcome: String,
    pub contributed_discussions: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub block_height: u64,
    pub block_hash: String,
    pub task_type: String,
    pub summary: String,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DiscussionRecord {
    pub validator_id: String,
    pub validator_name: String,
    pub message_type: String,
    pub summary: String,
    pub message_id: String,
    pub block_height: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Default)]
struct ShortTermMemory {
    current_block: Option<Block>,
    current_breakdown: Option<TaskBreakdownResults>,
    current_delegation: Option<TaskDelegationResults>,
    recent_events: Vec<MemoryEvent>,
    recent_discussions: Vec<DiscussionMessage>,
    recent_decisions: Vec<DecisionOutcome>,
    recent_mood: String,
    last_updated: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct LongTermMemory {
    relationships: HashMap<String, Relationship>,
    validation_records: Vec<ValidationRecord>,
    decision_records: Vec<DecisionOutcome>,
    task_records: Vec<TaskRecord>,
    discussion_records: Vec<DiscussionRecord>,
    observed_strategies: Vec<DecisionStrategy>,
}

pub struct AgentMemory {
    short: RwLock<ShortTermMemory>,
    long: RwLock<LongTermMemory>,
    learner: Arc<ReinforcementLearner>,
    logger: Arc<ValidatorLogger>,
}

fn push_bounded<T>(buf: &mut Vec<T>, item: T) {
    buf.push(item);
    if buf.len() > MAX_RECENT {
        buf.remove(0);
    }
}

impl AgentMemory {
    pub fn new(logger: Arc<ValidatorLogger>) -> Self {
        logger.memory("Initialize", "Created new memory system");
        let learner = Arc::new(ReinforcementLearner::new(Arc::clone(&logger)));
        Self {
            short: RwLock::new(ShortTermMemory::default()),
            long: RwLock::new(LongTermMemory::default()),
            learner,
            logger,
        }
    }

    pub fn learner(&self) -> &Arc<ReinforcementLearner> {
        &self.learner
    }

    // ---- short-term ------------------------------------------------------

    pub fn store_discussion(&self, discussion: DiscussionMessage) {
        self.logger.discussion(
            &discussion.message_id,
            &format!(
                "Storing discussion from {}: \"{}\"",
                discussion.validator_name,
                truncate(&discussion.content, 100)
            ),
        );
        let mut short = self.short.write().expect("memory lock poisoned");
        push_bounded(&mut short.recent_discussions, discussion);
    }

    pub fn store_event(&self, event_type: &str, data: Value) {
        let mut short = self.short.write().expect("memory lock poisoned");
        push_bounded(
            &mut short.recent_events,
            MemoryEvent {
                event_type: event_type.to_string(),
                data,
                timestamp: Utc::now(),
            },
        );
    }

    pub fn set_current_block(&self, block: &Block) {
        let mut short = self.short.write().expect("memory lock poisoned");
        short.current_block = Some(block.clone());
        self.logger.memory(
            "CurrentBlock",
            &format!("Updated current block to height {}", block.height),
        );
    }

    pub fn current_block(&self) -> Option<Block> {
        self.short
            .read()
            .expect("memory lock poisoned")
            .current_block
            .clone()
    }

    pub fn set_current_breakdown(&self, breakdown: &TaskBreakdownResults) {
        let mut short = self.short.write().expect("memory lock poisoned");
        short.current_breakdown = Some(breakdown.clone());
    }

    pub fn set_current_delegation(&self, delegation: &TaskDelegationResults) {
        let mut short = self.short.write().expect("memory lock poisoned");
        short.current_delegation = Some(delegation.clone());
    }

    pub fn set_recent_mood(&self, mood: &str) {
        let mut short = self.short.write().expect("memory lock poisoned");
        short.recent_mood = mood.to_string();
    }

    // ---- decisions & learning --------------------------------------------

    /// Record a decision outcome in short-term memory, long-term records and
    /// the reinforcement learner.
    pub fn record_decision(
        &self,
        decision_type: &str,
        my_choice: &str,
        final_outcome: &str,
        reward: f64,
        reasoning: &str,
    ) {
        let outcome = DecisionOutcome {
            decision_type: decision_type.to_string(),
            my_choice: my_choice.to_string(),
            final_outcome: final_outcome.to_string(),
            reward,
            reasoning: reasoning.to_string(),
            timestamp: Utc::now(),
        };

        {
            let mut short = self.short.write().expect("memory lock poisoned");
            push_bounded(&mut short.recent_decisions, outcome.clone());
        }
        {
            let mut long = self.long.write().expect("memory lock poisoned");
            long.decision_records.push(outcome);
        }

        self.logger.learning(
            "Decision",
            &format!(
                "{} decision: {}, final outcome: {}, reward: {:.2}",
                decision_type,
                truncate(my_choice, 80),
                truncate(final_outcome, 80),
                reward
            ),
        );

        self.learner
            .record_outcome(decision_type, my_choice, final_outcome, reward);
    }

    // ---- long-term records -----------------------------------------------

    pub fn record_validation(
        &self,
        block: &Block,
        decision: &str,
        reasoning: &str,
        outcome: &str,
        discussions: Vec<String>,
    ) {
        let mut long = self.long.write().expect("memory lock poisoned");
        long.validation_records.push(ValidationRecord {
            block_height: block.height,
            block_hash: block.hash.clone(),
            decision: decision.to_string(),
            reasoning: reasoning.to_string(),
            outcome: outcome.to_string(),
            contributed_discussions: discussions,
            timestamp: Utc::now(),
        });
        self.logger.validation(
            block.height,
            &block.hash,
            &format!("Recorded validation decision: {} ({})", decision, outcome),
        );
    }

    pub fn record_task_breakdown(
        &self,
        block_hash: &str,
        subtasks: &[String],
        my_contribution: &str,
        strategy: &str,
    ) {
        let Some(block) = self.current_block() else {
            self.logger
                .error("MEMORY", "record_task_breakdown called with no current block");
            return;
        };

        let mut long = self.long.write().expect("memory lock poisoned");
        long.task_records.push(TaskRecord {
            block_height: block.height,
            block_hash: block_hash.to_string(),
            task_type: "task_breakdown".to_string(),
            summary: format!(
                "Block {} was broken down into {} subtasks",
                block.height,
                subtasks.len()
            ),
            details: my_contribution.to_string(),
            timestamp: Utc::now(),
        });
        self.logger.task(
            "Breakdown",
            block_hash,
            &format!(
                "Recorded task breakdown with {} subtasks using {} strategy",
                subtasks.len(),
                strategy
            ),
        );
    }

    pub fn record_discussion(&self, record: DiscussionRecord) {
        let mut long = self.long.write().expect("memory lock poisoned");
        long.discussion_records.push(record);
    }

    pub fn observe_strategy(&self, strategy: DecisionStrategy) {
        let mut long = self.long.write().expect("memory lock poisoned");
        long.observed_strategies.push(strategy);
    }

    // ---- relationships ---------------------------------------------------

    /// Record an interaction with another validator and fold the impact into
    /// the trust score. Trust stays within [0, 1].
    pub fn update_relationship(
        &self,
        validator_id: &str,
        event_type: &str,
        context: &str,
        impact: f64,
    ) {
        let mut long = self.long.write().expect("memory lock poisoned");
        let rel = long
            .relationships
            .entry(validator_id.to_string())
            .or_insert_with(|| Relationship {
                validator_id: validator_id.to_string(),
                interactions: Vec::new(),
                trust_score: INITIAL_TRUST,
                last_interaction: Utc::now(),
                positive_count: 0,
                negative_count: 0,
            });

        rel.interactions.push(RelationshipEvent {
            event_type: event_type.to_string(),
            impact,
            context: context.to_string(),
            timestamp: Utc::now(),
        });
        rel.last_interaction = Utc::now();

        let old = rel.trust_score;
        if impact > 0.0 {
            rel.positive_count += 1;
            rel.trust_score = (rel.trust_score + impact) / 2.0;
        } else if impact < 0.0 {
            rel.negative_count += 1;
            rel.trust_score = (rel.trust_score + impact) / 2.0;
        }
        rel.trust_score = rel.trust_score.clamp(0.0, 1.0);

        self.logger.social(
            event_type,
            validator_id,
            &format!(
                "Trust {:.2} -> {:.2} (impact {:.2}) context: {}",
                old,
                rel.trust_score,
                impact,
                truncate(context, 60)
            ),
        );
    }

    pub fn relationship_trust(&self, validator_id: &str) -> Option<f64> {
        self.long
            .read()
            .expect("memory lock poisoned")
            .relationships
            .get(validator_id)
            .map(|r| r.trust_score)
    }

    // ---- context generation ----------------------------------------------

    pub fn recent_validations(&self, limit: usize) -> Vec<ValidationRecord> {
        let long = self.long.read().expect("memory lock poisoned");
        let mut records = long.validation_records.clone();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);
        records
    }

    /// Context string from current short-term memory for prompts.
    pub fn current_context(&self) -> String {
        let short = self.short.read().expect("memory lock poisoned");
        let mut context = String::new();

        if let Some(ref block) = short.current_block {
            context.push_str(&format!(
                "Current block: Height {}, Hash {}\n",
                block.height, block.hash
            ));
        }

        if !short.recent_discussions.is_empty() {
            context.push_str("Recent discussions:\n");
            for d in short.recent_discussions.iter().rev().take(5).rev() {
                context.push_str(&format!(
                    "- {} ({}): {}\n",
                    d.validator_name, d.message_type, d.content
                ));
            }
        }

        context
    }

    /// Historical context about specific validators for prompts.
    pub fn historical_context(&self, validator_ids: &[String], context_type: &str) -> String {
        let long = self.long.read().expect("memory lock poisoned");
        let mut context = String::new();

        match context_type {
            "relationships" => {
                if !validator_ids.is_empty() {
                    context.push_str("Validator relationships:\n");
                    for id in validator_ids {
                        if let Some(rel) = long.relationships.get(id) {
                            let level = if rel.trust_score > 0.7 {
                                "trusted"
                            } else if rel.trust_score < 0.3 {
                                "distrusted"
                            } else {
                                "neutral"
                            };
                            context.push_str(&format!(
                                "- Validator {}: {} ({} interactions, trust score: {:.2})\n",
                                id,
                                level,
                                rel.interactions.len(),
                                rel.trust_score
                            ));
                        }
                    }
                }
            }
            "tasks" => {
                let breakdowns: Vec<_> = long
                    .task_records
                    .iter()
                    .filter(|r| r.task_type == "task_breakdown")
                    .take(3)
                    .collect();
                if !breakdowns.is_empty() {
                    context.push_str("Past task breakdowns:\n");
                    for record in breakdowns {
                        context.push_str(&format!(
                            "- Block {}: {}\n",
                            record.block_height, record.summary
                        ));
                    }
                }
            }
            "validations" => {
                drop(long);
                let validations = self.recent_validations(3);
                if !validations.is_empty() {
                    context.push_str("Recent block validations:\n");
                    for v in validations {
                        context.push_str(&format!(
                            "- Block {}: {} (Outcome: {})\n",
                            v.block_height, v.decision, v.outcome
                        ));
                    }
                }
            }
            _ => context.push_str("No relevant historical context available."),
        }

        context
    }

    // ---- cleanup ---------------------------------------------------------

    /// Remove short-term entries older than the TTL. Long-term records are
    /// untouched.
    pub fn cleanup_expired(&self, ttl: Duration) {
        let cutoff = Utc::now() - ttl;
        let mut short = self.short.write().expect("memory lock poisoned");

        let before = (
            short.recent_events.len(),
            short.recent_discussions.len(),
            short.recent_decisions.len(),
        );

        short.recent_events.retain(|e| e.timestamp > cutoff);
        short.recent_discussions.retain(|d| d.timestamp > cutoff);
        short.recent_decisions.retain(|d| d.timestamp > cutoff);
        short.last_updated = Some(Utc::now());

        self.logger.memory(
            "Cleanup",
            &format!(
                "Cleaned expired data: events {}->{}, discussions {}->{}, decisions {}->{}",
                before.0,
                short.recent_events.len(),
                before.1,
                short.recent_discussions.len(),
                before.2,
                short.recent_decisions.len()
            ),
        );
    }

    #[cfg(test)]
    pub(crate) fn short_term_sizes(&self) -> (usize, usize, usize) {
        let short = self.short.read().expect("memory lock poisoned");
        (
            short.recent_events.len(),
            short.recent_discussions.len(),
            short.recent_decisions.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn memory() -> AgentMemory {
        AgentMemory::new(Arc::new(ValidatorLogger::disabled("test")))
    }

    fn message(i: u32) -> DiscussionMessage {
        DiscussionMessage::new("v1", "Ada", "proposal", &format!("message {}", i))
    }

    #[test]
    fn test_short_term_buffers_are_bounded() {
        let mem = memory();
        for i in 0..(MAX_RECENT as u32 + 50) {
            mem.store_discussion(message(i));
            mem.store_event("tick", json!({ "i": i }));
        }
        let (events, discussions, _) = mem.short_term_sizes();
        assert_eq!(events, MAX_RECENT);
        assert_eq!(discussions, MAX_RECENT);
    }

    #[test]
    fn test_eviction_is_fifo() {
        let mem = memory();
        for i in 0..(MAX_RECENT as u32 + 1) {
            mem.store_discussion(message(i));
        }
        let context = mem.current_context();
        // Oldest entry (message 0) evicted; newest retained
        assert!(context.contains(&format!("message {}", MAX_RECENT)));
    }

    #[test]
    fn test_trust_score_stays_in_unit_interval() {
        let mem = memory();
        for _ in 0..50 {
            mem.update_relationship("v2", "validation", "agreed", 0.9);
        }
        let trust = mem.relationship_trust("v2").unwrap();
        assert!((0.0..=1.0).contains(&trust));

        for _ in 0..50 {
            mem.update_relationship("v2", "validation", "disagreed", -0.9);
        }
        let trust = mem.relationship_trust("v2").unwrap();
        assert!((0.0..=1.0).contains(&trust));
    }

    #[test]
    fn test_new_relationship_starts_neutral() {
        let mem = memory();
        mem.update_relationship("v2", "observed", "first contact", 0.0);
        assert_eq!(mem.relationship_trust("v2").unwrap(), INITIAL_TRUST);
    }

    #[test]
    fn test_ttl_cleanup_removes_only_expired() {
        let mem = memory();
        mem.store_discussion(message(1));
        mem.store_event("tick", json!({}));

        // Nothing is older than a day yet
        mem.cleanup_expired(Duration::hours(SHORT_TERM_TTL_HOURS));
        let (events, discussions, _) = mem.short_term_sizes();
        assert_eq!(events, 1);
        assert_eq!(discussions, 1);

        // Everything is older than "zero seconds ago"
        mem.cleanup_expired(Duration::seconds(0));
        let (events, discussions, _) = mem.short_term_sizes();
        assert_eq!(events, 0);
        assert_eq!(discussions, 0);
    }

    #[test]
    fn test_record_decision_feeds_learner() {
        let mem = memory();
        mem.record_decision("validation", "VALID", "VALID", 1.0, "solid block");
        let stats = mem.learner().policy_stats("validation").unwrap();
        assert_eq!(stats.attempts, 1);
        assert_eq!(stats.successes, 1);
    }

    #[test]
    fn test_historical_context_kinds() {
        let mem = memory();
        mem.update_relationship("v2", "validation", "agreed", 0.3);

        let ctx = mem.historical_context(&["v2".to_string()], "relationships");
        assert!(ctx.contains("Validator v2"));

        let ctx = mem.historical_context(&[], "unknown-kind");
        assert!(ctx.contains("No relevant historical context"));
    }
}
