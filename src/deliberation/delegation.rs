//! Collaborative task delegation
//!
//! Takes a completed breakdown and assigns every subtask to a validator:
//! chain-of-thought proposals → two critique/refine rounds → coordination
//! under the breakdown's strategy → assignment notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::breakdown::TaskBreakdownResults;
use super::strategy::{DecisionStrategy, STRATEGY_AUCTION, STRATEGY_CONSENSUS, STRATEGY_LEADER};
use super::{format_subtask_list, DiscussionMessage, MSG_FINAL_PROPOSAL, MSG_PROPOSAL, MSG_SUMMARY};
use crate::events::{
    EventHub, EVENT_TASK_ASSIGNMENT, EVENT_TASK_DELEGATION_COMPLETED,
    EVENT_TASK_DELEGATION_MESSAGE, EVENT_TASK_DELEGATION_STARTED, EVENT_TASK_DELEGATION_VOTE,
};
use crate::llm::LlmClient;
use crate::types::truncate;
use crate::validator::{Validator, ValidatorStore};

const DELEGATION_DISCUSSION_ROUNDS: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDelegationProposal {
    #[serde(rename = "validatorId")]
    pub validator_id: String,
    #[serde(rename = "validatorName")]
    pub validator_name: String,
    /// subtask → validator name
    pub assignments: HashMap<String, String>,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationMessage {
    #[serde(rename = "validatorId")]
    pub validator_id: String,
    #[serde(rename = "validatorName")]
    pub validator_name: String,
    #[serde(rename = "messageType")]
    pub message_type: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub assignments: HashMap<String, String>,
    #[serde(rename = "messageId")]
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
}

impl DelegationMessage {
    fn new(validator_id: &str, validator_name: &str, message_type: &str, content: &str) -> Self {
        Self {
            validator_id: validator_id.to_string(),
            validator_name: validator_name.to_string(),
            message_type: message_type.to_string(),
            content: content.to_string(),
            assignments: HashMap::new(),
            message_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
        }
    }

    fn with_assignments(mut self, assignments: HashMap<String, String>) -> Self {
        self.assignments = assignments;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDelegationResults {
    /// subtask → validator name
    pub assignments: HashMap<String, String>,
    pub block: crate::core::Block,
    pub subtasks: Vec<String>,
    pub discussion: Vec<DelegationMessage>,
    pub strategy: Option<DecisionStrategy>,
}

#[derive(Debug, Deserialize)]
struct RawDelegationProposal {
    #[serde(default)]
    assignments: HashMap<String, String>,
    #[serde(default)]
    reasoning: String,
}

#[derive(Debug, Deserialize)]
struct RawFeedback {
    #[serde(rename = "messageType", default)]
    message_type: String,
    #[serde(default)]
    content: String,
    #[serde(rename = "refinedAssignments", default)]
    refined_assignments: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawDelegationVotes {
    #[serde(default)]
    votes: Vec<RawDelegationVote>,
}

#[derive(Debug, Deserialize)]
struct RawDelegationVote {
    #[serde(rename = "proposalIndex", default)]
    proposal_index: usize,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    reasoning: String,
}

#[derive(Debug, Deserialize)]
struct RawLeaderDelegation {
    #[serde(rename = "selectedProposal", default)]
    selected_proposal: usize,
    #[serde(rename = "consolidatedAssignments", default)]
    consolidated_assignments: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawDelegationBids {
    #[serde(default)]
    bids: Vec<RawDelegationBid>,
}

#[derive(Debug, Deserialize)]
struct RawDelegationBid {
    #[serde(rename = "proposalIndex", default)]
    proposal_index: usize,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    expertise: f64,
}

/// Run the full collaborative delegation for a completed breakdown.
/// Returns `None` when the breakdown produced no subtasks.
pub async fn run_task_delegation(
    llm: &dyn LlmClient,
    store: &ValidatorStore,
    hub: &EventHub,
    chain_id: &str,
    breakdown: &TaskBreakdownResults,
) -> Option<TaskDelegationResults> {
    if breakdown.final_subtasks.is_empty() {
        warn!("Cannot start task delegation with empty subtasks");
        return None;
    }

    info!(
        chain = %chain_id,
        subtasks = breakdown.final_subtasks.len(),
        "Starting collaborative task delegation"
    );

    let mut results = TaskDelegationResults {
        assignments: HashMap::new(),
        block: breakdown.block.clone(),
        subtasks: breakdown.final_subtasks.clone(),
        discussion: Vec::new(),
        strategy: breakdown.selected_strategy.clone(),
    };

    let validators = store.all(chain_id);
    if validators.is_empty() {
        warn!(chain = %chain_id, "No validators found for task delegation");
        return Some(results);
    }

    let thread_id = format!("task-delegation-{}", breakdown.block.hash);
    let strategy_name = breakdown
        .selected_strategy
        .as_ref()
        .map(|s| s.name.clone())
        .unwrap_or_else(|| STRATEGY_CONSENSUS.to_string());

    hub.broadcast(
        EVENT_TASK_DELEGATION_STARTED,
        json!({
            "blockHeight": breakdown.block.height,
            "threadId": thread_id,
            "subtasks": breakdown.final_subtasks,
            "strategy": strategy_name,
        }),
    );

    for v in &validators {
        v.memory.set_current_block(&breakdown.block);
        v.memory.set_current_breakdown(breakdown);
    }

    let subtasks_context = format_subtask_list(&breakdown.final_subtasks);
    let mut expertise = String::from("Validator expertise information:\n");
    for v in &validators {
        expertise.push_str(&format!("- {}: Traits: {}\n", v.name, v.traits.join(", ")));
    }

    // Phase 1: chain-of-thought proposals
    let mut proposals: Vec<TaskDelegationProposal> = Vec::new();
    for v in &validators {
        let peer_ids: Vec<String> = validators.iter().map(|o| o.id.clone()).collect();
        let historical = v.memory.historical_context(&peer_ids, "tasks");

        let prompt = format!(
            "Genesis Context: {}\n\n\
             You are {}, a blockchain validator with these traits: {}.\n\
             Task: Delegate {} subtasks from Block {} to the available validators\n\n\
             Subtasks to delegate:\n{}\n\n\
             {}\n\n\
             Historical Context:\n{}\n\n\
             Task breakdown was done using the '{}' strategy.\n\n\
             I want you to think step by step about the optimal task delegation. Consider:\n\n\
             1. Each validator's expertise based on their traits\n\
             2. Your past experiences with these validators\n\
             3. The nature of each subtask and which skills it requires\n\
             4. Potential dependencies between subtasks\n\
             5. How to optimize for successful completion\n\n\
             After your chain of thought reasoning, respond with a JSON object containing:\n\
             {{\n\
               \"assignments\": {{\"subtask1\": \"validator name\", \"subtask2\": \"validator name\"}},\n\
               \"reasoning\": \"Your complete chain of thought reasoning process\"\n\
             }}",
            v.genesis_prompt,
            v.name,
            v.traits.join(", "),
            breakdown.final_subtasks.len(),
            breakdown.block.height,
            subtasks_context,
            expertise,
            historical,
            strategy_name,
        );

        let response = match llm.complete(&prompt).await {
            Ok(r) => r,
            Err(e) => {
                warn!(validator = %v.name, "Delegation proposal LLM call failed: {}", e);
                continue;
            }
        };
        let raw: RawDelegationProposal = match serde_json::from_str(&response) {
            Ok(p) => p,
            Err(e) => {
                warn!(validator = %v.name, "Failed to parse delegation proposal: {}", e);
                continue;
            }
        };

        let message = DelegationMessage::new(&v.id, &v.name, MSG_PROPOSAL, &raw.reasoning)
            .with_assignments(raw.assignments.clone());
        hub.broadcast(
            EVENT_TASK_DELEGATION_MESSAGE,
            json!({
                "validatorId": v.id,
                "validatorName": v.name,
                "messageType": MSG_PROPOSAL,
                "content": truncate(&raw.reasoning, 500),
                "assignments": raw.assignments,
                "messageId": message.message_id,
                "blockHeight": breakdown.block.height,
            }),
        );
        v.memory.store_discussion(DiscussionMessage::new(
            &v.id,
            &v.name,
            "delegation_proposal",
            &raw.reasoning,
        ));
        results.discussion.push(message);

        proposals.push(TaskDelegationProposal {
            validator_id: v.id.clone(),
            validator_name: v.name.clone(),
            assignments: raw.assignments,
            reasoning: raw.reasoning,
        });
    }

    // Phase 2: critique / refine rounds
    for round in 1..=DELEGATION_DISCUSSION_ROUNDS {
        for v in &validators {
            let mut context = String::from("Current delegation proposals and discussions:\n\n");
            for p in &proposals {
                context.push_str(&format!("From {}:\n", p.validator_name));
                context.push_str(&format!("Reasoning: {}\n", p.reasoning));
                for (subtask, assignee) in &p.assignments {
                    context.push_str(&format!("- {} -> {}\n", subtask, assignee));
                }
                context.push('\n');
            }

            let prompt = if round == 1 {
                format!(
                    "You are {}, reviewing task delegation proposals.\n\n\
                     The subtasks are:\n{}\n\n\
                     {}\n\n\
                     Based on your expertise as {} and your traits ({}), analyze these proposals.\n\
                     Consider:\n\
                     1. Which assignments make sense and why?\n\
                     2. What potential issues do you see?\n\
                     3. What alternative assignments might work better?\n\n\
                     Respond with a JSON object:\n\
                     {{\n\
                       \"messageType\": \"critique\" or \"support\" or \"question\",\n\
                       \"content\": \"Your detailed analysis\",\n\
                       \"refinedAssignments\": {{}}\n\
                     }}\n\
                     Include refinedAssignments only when suggesting specific changes.",
                    v.name,
                    subtasks_context,
                    context,
                    v.name,
                    v.traits.join(", "),
                )
            } else {
                format!(
                    "You are {}, participating in the final round of task delegation discussion.\n\n\
                     The subtasks are:\n{}\n\n\
                     {}\n\n\
                     This is the final round. Your goal is to help reach the best possible assignments.\n\
                     Consider:\n\
                     1. Can you combine good ideas from different proposals?\n\
                     2. Are there any remaining issues that need to be addressed?\n\
                     3. What would be the optimal final assignments based on all discussion?\n\n\
                     Respond with a JSON object:\n\
                     {{\n\
                       \"messageType\": \"merge\" or \"refine\" or \"support\",\n\
                       \"content\": \"Your detailed contribution explaining your thinking\",\n\
                       \"refinedAssignments\": {{}}\n\
                     }}\n\
                     Include refinedAssignments when proposing merged or refined assignments.",
                    v.name,
                    subtasks_context,
                    context,
                )
            };

            let response = match llm.complete(&prompt).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(validator = %v.name, "Delegation feedback LLM call failed: {}", e);
                    continue;
                }
            };
            let feedback: RawFeedback = match serde_json::from_str(&response) {
                Ok(f) => f,
                Err(e) => {
                    warn!(validator = %v.name, "Failed to parse delegation feedback: {}", e);
                    continue;
                }
            };

            let message =
                DelegationMessage::new(&v.id, &v.name, &feedback.message_type, &feedback.content)
                    .with_assignments(feedback.refined_assignments.clone());
            hub.broadcast(
                EVENT_TASK_DELEGATION_MESSAGE,
                json!({
                    "validatorId": v.id,
                    "validatorName": v.name,
                    "messageType": feedback.message_type,
                    "content": feedback.content,
                    "assignments": feedback.refined_assignments,
                    "messageId": message.message_id,
                    "blockHeight": breakdown.block.height,
                }),
            );
            results.discussion.push(message);

            if !feedback.refined_assignments.is_empty() {
                proposals.push(TaskDelegationProposal {
                    validator_id: v.id.clone(),
                    validator_name: v.name.clone(),
                    assignments: feedback.refined_assignments,
                    reasoning: feedback.content,
                });
            }
        }
    }

    // Phase 3: coordination
    let strategy = results.strategy.clone().unwrap_or_else(|| DecisionStrategy {
        validator_id: String::new(),
        validator_name: String::new(),
        name: STRATEGY_CONSENSUS.to_string(),
        description: String::new(),
        reasoning: String::new(),
        timestamp: Utc::now(),
    });
    let final_assignments =
        coordinate_delegation(llm, &validators, &proposals, &strategy, hub).await;
    results.assignments = final_assignments.clone();

    // Summary + completion event
    let mut summary = String::from("Task delegation complete. Final assignments:\n\n");
    for (subtask, assignee) in &final_assignments {
        summary.push_str(&format!("- {} -> {}\n", subtask, assignee));
    }
    let summary_message = DelegationMessage::new("system", "System", MSG_SUMMARY, &summary)
        .with_assignments(final_assignments.clone());
    results.discussion.push(summary_message);

    hub.broadcast(
        EVENT_TASK_DELEGATION_COMPLETED,
        json!({
            "assignments": results.assignments,
            "summary": summary,
            "blockHeight": breakdown.block.height,
            "strategy": strategy.name,
        }),
    );

    // Memory updates, rewards and relationship deltas
    for v in &validators {
        v.memory.set_current_delegation(&results);

        let reward = proposals
            .iter()
            .find(|p| p.validator_id == v.id)
            .map(|p| assignment_reward(&p.assignments, &final_assignments))
            .unwrap_or(0.0);

        v.memory.record_decision(
            "task_delegation",
            &format!("delegate-{}", breakdown.block.hash),
            "delegation_complete",
            reward,
            &format!("Task delegation for block {}", breakdown.block.height),
        );

        for (subtask, assignee) in &final_assignments {
            let assignee_id = validators
                .iter()
                .find(|o| &o.name == assignee)
                .map(|o| o.id.clone());
            if let Some(assignee_id) = assignee_id {
                if assignee_id != v.id {
                    v.memory.update_relationship(
                        &assignee_id,
                        "task_delegation",
                        &format!("Delegated subtask: {}", subtask),
                        0.05,
                    );
                    v.adjust_relationship(&assignee_id, 0.05);
                }
            }
        }
    }

    info!(
        assignments = results.assignments.len(),
        strategy = %strategy.name,
        "Task delegation complete"
    );

    Some(results)
}

/// Fraction of this validator's proposed assignments that made it into the
/// final map unchanged.
pub fn assignment_reward(
    mine: &HashMap<String, String>,
    final_assignments: &HashMap<String, String>,
) -> f64 {
    if mine.is_empty() {
        return 0.0;
    }
    let matches = mine
        .iter()
        .filter(|(subtask, assignee)| final_assignments.get(*subtask) == Some(assignee))
        .count();
    matches as f64 / mine.len() as f64
}

fn format_delegation_context(proposals: &[TaskDelegationProposal]) -> String {
    let mut out = String::new();
    for (i, p) in proposals.iter().enumerate() {
        out.push_str(&format!("\nProposal {} (from {}):\n", i + 1, p.validator_name));
        out.push_str("Assignments:\n");
        for (subtask, assignee) in &p.assignments {
            out.push_str(&format!("- {} -> {}\n", subtask, assignee));
        }
        out.push_str(&format!("Reasoning: {}\n", p.reasoning));
    }
    out
}

fn winning_index(scores: &HashMap<usize, (f64, usize)>, count: usize) -> usize {
    let mut best = 0.0f64;
    let mut winner = 0usize;
    for idx in 1..=count {
        if let Some((total, n)) = scores.get(&idx) {
            if *n == 0 {
                continue;
            }
            let avg = total / *n as f64;
            if avg > best {
                best = avg;
                winner = idx;
            }
        }
    }
    winner
}

/// Apply the selected strategy to pick final assignments.
async fn coordinate_delegation(
    llm: &dyn LlmClient,
    validators: &[Arc<Validator>],
    proposals: &[TaskDelegationProposal],
    strategy: &DecisionStrategy,
    hub: &EventHub,
) -> HashMap<String, String> {
    if proposals.is_empty() {
        return HashMap::new();
    }

    let context = format_delegation_context(proposals);

    match strategy.name.to_uppercase().as_str() {
        STRATEGY_CONSENSUS => {
            // Round 1: each validator distills a final proposal
            let mut final_proposals: Vec<TaskDelegationProposal> = Vec::new();
            for v in validators {
                let prompt = format!(
                    "You are {}, with traits: {}.\n\
                     Based on all previous delegation proposals and discussions:\n{}\n\n\
                     Create your FINAL proposal for task delegation. Consider:\n\
                     1. The strengths of each existing proposal\n\
                     2. The feedback and discussions\n\
                     3. Each validator's expertise and traits\n\
                     4. Task dependencies and efficiency\n\n\
                     Respond with a JSON object:\n\
                     {{\n\
                         \"assignments\": {{\"subtask1\": \"validator name\"}},\n\
                         \"reasoning\": \"Explain why this is the optimal delegation\"\n\
                     }}",
                    v.name,
                    v.traits.join(", "),
                    context,
                );

                let Ok(response) = llm.complete(&prompt).await else {
                    continue;
                };
                let Ok(raw) = serde_json::from_str::<RawDelegationProposal>(&response) else {
                    warn!(validator = %v.name, "Failed to parse final delegation proposal");
                    continue;
                };

                hub.broadcast(
                    EVENT_TASK_DELEGATION_MESSAGE,
                    json!({
                        "validatorId": v.id,
                        "validatorName": v.name,
                        "messageType": MSG_FINAL_PROPOSAL,
                        "content": raw.reasoning,
                        "assignments": raw.assignments,
                    }),
                );
                final_proposals.push(TaskDelegationProposal {
                    validator_id: v.id.clone(),
                    validator_name: v.name.clone(),
                    assignments: raw.assignments,
                    reasoning: raw.reasoning,
                });
            }

            // Round 2: voting
            let voting_context = format_delegation_context(&final_proposals);
            let mut scores: HashMap<usize, (f64, usize)> = HashMap::new();
            for v in validators {
                let prompt = format!(
                    "You are {}, with traits: {}.\n\
                     Review these FINAL task delegation proposals:\n{}\n\n\
                     Vote on EACH proposal with:\n\
                     1. A score from 0.0 to 1.0 (where 1.0 means full support)\n\
                     2. Brief reasoning for your score\n\n\
                     Consider:\n\
                     - Appropriate matching of skills to tasks\n\
                     - Workload balance\n\
                     - Task dependencies\n\
                     - Overall efficiency\n\n\
                     Respond with a JSON object:\n\
                     {{\n\
                         \"votes\": [\n\
                             {{\"proposalIndex\": 1, \"score\": 0.8, \"reasoning\": \"...\"}}\n\
                         ]\n\
                     }}",
                    v.name,
                    v.traits.join(", "),
                    voting_context,
                );

                let Ok(response) = llm.complete(&prompt).await else {
                    continue;
                };
                let Ok(raw) = serde_json::from_str::<RawDelegationVotes>(&response) else {
                    warn!(validator = %v.name, "Failed to parse delegation votes");
                    continue;
                };

                for vote in raw.votes {
                    let entry = scores.entry(vote.proposal_index).or_insert((0.0, 0));
                    entry.0 += vote.score;
                    entry.1 += 1;

                    hub.broadcast(
                        EVENT_TASK_DELEGATION_VOTE,
                        json!({
                            "validatorId": v.id,
                            "validatorName": v.name,
                            "proposalIndex": vote.proposal_index,
                            "score": vote.score,
                            "reasoning": vote.reasoning,
                        }),
                    );
                }
            }

            let winner = winning_index(&scores, final_proposals.len());
            if winner > 0 {
                return final_proposals[winner - 1].assignments.clone();
            }
            final_proposals
                .first()
                .or(proposals.first())
                .map(|p| p.assignments.clone())
                .unwrap_or_default()
        }

        STRATEGY_LEADER => {
            let leader = validators.iter().find(|v| v.id == strategy.validator_id);
            let Some(leader) = leader else {
                return proposals[0].assignments.clone();
            };

            let prompt = format!(
                "As the designated leader {}, review these delegation proposals:\n{}\n\n\
                 Choose the best proposal or provide a consolidated assignment map.\n\n\
                 Respond with a JSON object:\n\
                 {{\n\
                     \"selectedProposal\": 1,\n\
                     \"consolidatedAssignments\": {{\"subtask\": \"validator name\"}},\n\
                     \"reasoning\": \"Explain your decision process\"\n\
                 }}\n\
                 Use selectedProposal 0 when providing consolidatedAssignments instead.",
                leader.name, context,
            );

            let Ok(response) = llm.complete(&prompt).await else {
                return proposals[0].assignments.clone();
            };
            let Ok(raw) = serde_json::from_str::<RawLeaderDelegation>(&response) else {
                return proposals[0].assignments.clone();
            };

            if raw.selected_proposal > 0 && raw.selected_proposal <= proposals.len() {
                proposals[raw.selected_proposal - 1].assignments.clone()
            } else if !raw.consolidated_assignments.is_empty() {
                raw.consolidated_assignments
            } else {
                proposals[0].assignments.clone()
            }
        }

        STRATEGY_AUCTION => {
            let mut weights: HashMap<usize, (f64, usize)> = HashMap::new();
            for v in validators {
                let prompt = format!(
                    "You are {}, with traits: {}.\n\
                     Review these task delegation proposals:\n{}\n\n\
                     For each proposal, evaluate your confidence (0.0 to 1.0) and your relevant\n\
                     expertise (0.0 to 1.0).\n\n\
                     Respond with a JSON object:\n\
                     {{\n\
                         \"bids\": [\n\
                             {{\"proposalIndex\": 1, \"confidence\": 0.8, \"expertise\": 0.9, \"reasoning\": \"...\"}}\n\
                         ]\n\
                     }}",
                    v.name,
                    v.traits.join(", "),
                    context,
                );

                let Ok(response) = llm.complete(&prompt).await else {
                    continue;
                };
                let Ok(raw) = serde_json::from_str::<RawDelegationBids>(&response) else {
                    continue;
                };

                for bid in raw.bids {
                    let weight = 0.6 * bid.expertise + 0.4 * bid.confidence;
                    let entry = weights.entry(bid.proposal_index).or_insert((0.0, 0));
                    entry.0 += weight;
                    entry.1 += 1;
                }
            }

            let winner = winning_index(&weights, proposals.len());
            if winner > 0 {
                return proposals[winner - 1].assignments.clone();
            }
            proposals[0].assignments.clone()
        }

        _ => proposals[0].assignments.clone(),
    }
}

/// Notify each assignee of its subtasks: one `TASK_ASSIGNMENT` event per
/// assignee, tasks grouped.
pub fn notify_assigned_validators(
    hub: &EventHub,
    store: &ValidatorStore,
    chain_id: &str,
    results: &TaskDelegationResults,
) {
    if results.assignments.is_empty() {
        warn!("No assignments to notify validators about");
        return;
    }

    let mut grouped: HashMap<&str, Vec<&str>> = HashMap::new();
    for (subtask, assignee) in &results.assignments {
        grouped.entry(assignee).or_default().push(subtask);
    }

    for (assignee, mut tasks) in grouped {
        tasks.sort();
        let validator_id = store
            .by_name(chain_id, assignee)
            .map(|v| v.id.clone())
            .unwrap_or_else(|| assignee.to_string());

        info!(
            assignee = %assignee,
            tasks = tasks.len(),
            "Notifying validator of assigned tasks"
        );
        hub.broadcast(
            EVENT_TASK_ASSIGNMENT,
            json!({
                "validatorId": validator_id,
                "validatorName": assignee,
                "subtasks": tasks,
                "blockHeight": results.block.height,
                "blockHash": results.block.hash,
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Block;
    use std::path::Path;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn block() -> Block {
        Block {
            height: 9,
            hash: "hash9".into(),
            prev_hash: "hash8".into(),
            proposer: "genesis".into(),
            timestamp: Utc::now(),
            txs: vec![],
        }
    }

    fn validator(id: &str, name: &str) -> Arc<Validator> {
        Arc::new(Validator::new(
            id,
            name,
            vec!["capable".into()],
            "",
            vec![],
            "test chain",
            "demo",
            Path::new("/nonexistent-logs-disabled"),
        ))
    }

    #[test]
    fn test_assignment_reward() {
        let final_map = map(&[("a", "Ada"), ("b", "Bea")]);

        assert_eq!(assignment_reward(&map(&[("a", "Ada"), ("b", "Bea")]), &final_map), 1.0);
        assert_eq!(assignment_reward(&map(&[("a", "Ada"), ("b", "Cal")]), &final_map), 0.5);
        assert_eq!(assignment_reward(&map(&[("c", "Ada")]), &final_map), 0.0);
        assert_eq!(assignment_reward(&HashMap::new(), &final_map), 0.0);
    }

    #[tokio::test]
    async fn test_notify_emits_one_event_per_assignee() {
        let hub = EventHub::new(32);
        let mut rx = hub.subscribe();
        let store = ValidatorStore::new();
        store.register(validator("v1", "Ada"));
        store.register(validator("v2", "Bea"));

        let results = TaskDelegationResults {
            assignments: map(&[("task a", "Ada"), ("task b", "Ada"), ("task c", "Bea")]),
            block: block(),
            subtasks: vec!["task a".into(), "task b".into(), "task c".into()],
            discussion: Vec::new(),
            strategy: None,
        };

        notify_assigned_validators(&hub, &store, "demo", &results);

        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            assert_eq!(ev.event, EVENT_TASK_ASSIGNMENT);
            events.push(ev);
        }
        assert_eq!(events.len(), 2);

        let ada = events
            .iter()
            .find(|e| e.payload["validatorName"] == "Ada")
            .unwrap();
        assert_eq!(ada.payload["subtasks"].as_array().unwrap().len(), 2);
        assert_eq!(ada.payload["validatorId"], "v1");

        let bea = events
            .iter()
            .find(|e| e.payload["validatorName"] == "Bea")
            .unwrap();
        assert_eq!(bea.payload["subtasks"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_notify_with_empty_assignments_is_silent() {
        let hub = EventHub::new(8);
        let mut rx = hub.subscribe();
        let store = ValidatorStore::new();
        let results = TaskDelegationResults {
            assignments: HashMap::new(),
            block: block(),
            subtasks: Vec::new(),
            discussion: Vec::new(),
            strategy: None,
        };
        notify_assigned_validators(&hub, &store, "demo", &results);
        assert!(rx.try_recv().is_err());
    }
}
