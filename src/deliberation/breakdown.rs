//! Collaborative task breakdown
//!
//! Phases: strategy proposals → strategy voting → contribution round →
//! final proposal round → coordination under the winning strategy →
//! consensus score. Every phase broadcasts its progress on the event hub
//! and feeds the participating validators' memories afterwards.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::similarity::is_same_task;
use super::strategy::{
    broadcast_strategy_proposal, conduct_strategy_voting, propose_strategy,
    select_winning_strategy, DecisionStrategy, StrategyMessage, STRATEGY_AUCTION,
    STRATEGY_CONSENSUS, STRATEGY_LEADER,
};
use super::{
    consensus_score, extract_consensus_proposal, format_discussion_context, format_subtask_list,
    DiscussionMessage, MSG_AGREEMENT, MSG_BID, MSG_CRITIQUE, MSG_FINAL_PROPOSAL, MSG_PROPOSAL,
    MSG_QUESTION, MSG_REFINEMENT, MSG_SUMMARY,
};
use crate::core::Block;
use crate::events::{
    EventHub, EVENT_STRATEGY_SELECTED, EVENT_TASK_BREAKDOWN_COMPLETED,
    EVENT_TASK_BREAKDOWN_MESSAGE, EVENT_TASK_BREAKDOWN_STARTED,
};
use crate::llm::LlmClient;
use crate::validator::memory::DiscussionRecord;
use crate::validator::{Validator, ValidatorStore};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskBreakdownProposal {
    #[serde(rename = "validatorId")]
    pub validator_id: String,
    #[serde(rename = "validatorName")]
    pub validator_name: String,
    pub subtasks: Vec<String>,
    pub reasoning: String,
}

/// A validator's score for one proposal. Index is 1-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalVote {
    #[serde(rename = "validatorId")]
    pub validator_id: String,
    #[serde(rename = "validatorName")]
    pub validator_name: String,
    #[serde(rename = "proposalIndex")]
    pub proposal_index: usize,
    pub score: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskBreakdownResults {
    pub final_subtasks: Vec<String>,
    pub discussion: Vec<DiscussionMessage>,
    pub consensus_score: f64,
    pub block: Block,
    pub transaction_details: String,
    pub selected_strategy: Option<DecisionStrategy>,
    pub strategy_discussion: Vec<StrategyMessage>,
}

impl TaskBreakdownResults {
    fn empty(block: &Block, transaction_details: &str) -> Self {
        Self {
            final_subtasks: Vec::new(),
            discussion: Vec::new(),
            consensus_score: 0.0,
            block: block.clone(),
            transaction_details: transaction_details.to_string(),
            selected_strategy: None,
            strategy_discussion: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawContribution {
    #[serde(default)]
    action: String,
    #[serde(default)]
    message: String,
    #[serde(rename = "replyToMessageID", default)]
    reply_to: String,
    #[serde(default)]
    subtasks: Vec<String>,
    #[serde(rename = "mergedFrom", default)]
    merged_from: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawFinalProposal {
    #[serde(default)]
    subtasks: Vec<String>,
    #[serde(default)]
    reasoning: String,
    #[serde(rename = "basedOn", default)]
    based_on: String,
}

#[derive(Debug, Deserialize)]
struct RawVotes {
    #[serde(default)]
    votes: Vec<RawVote>,
}

#[derive(Debug, Deserialize)]
struct RawVote {
    #[serde(rename = "proposalIndex", default)]
    proposal_index: usize,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    reasoning: String,
}

#[derive(Debug, Deserialize)]
struct RawLeaderDecision {
    #[serde(rename = "selectedProposal", default)]
    selected_proposal: usize,
    #[serde(rename = "consolidatedTasks", default)]
    consolidated_tasks: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawBids {
    #[serde(default)]
    bids: Vec<RawBid>,
}

#[derive(Debug, Deserialize)]
struct RawBid {
    #[serde(rename = "proposalIndex", default)]
    proposal_index: usize,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    expertise: f64,
    #[serde(default)]
    reasoning: String,
}

/// Run the full collaborative task breakdown for one block.
pub async fn run_task_breakdown(
    llm: &dyn LlmClient,
    store: &ValidatorStore,
    hub: &EventHub,
    chain_id: &str,
    block: &Block,
    transaction_details: &str,
) -> TaskBreakdownResults {
    info!(chain = %chain_id, height = block.height, "Starting collaborative task breakdown");

    let mut results = TaskBreakdownResults::empty(block, transaction_details);

    let validators = store.all(chain_id);
    if validators.is_empty() {
        warn!(chain = %chain_id, "No validators found for task breakdown");
        return results;
    }

    let thread_id = format!("task-breakdown-{}", block.hash);
    hub.broadcast(
        EVENT_TASK_BREAKDOWN_STARTED,
        json!({
            "blockHeight": block.height,
            "threadId": thread_id,
        }),
    );

    // Phase 1: strategy proposals + voting
    let mut proposed_strategies = Vec::new();
    for v in &validators {
        if let Some(strategy) = propose_strategy(llm, v, transaction_details).await {
            results.strategy_discussion.push(StrategyMessage {
                validator_id: v.id.clone(),
                validator_name: v.name.clone(),
                message_type: "propose".to_string(),
                content: strategy.description.clone(),
                strategy: Some(strategy.clone()),
                timestamp: chrono::Utc::now(),
            });
            broadcast_strategy_proposal(hub, &strategy, block.height);
            v.memory.observe_strategy(strategy.clone());
            proposed_strategies.push(strategy);
        }
    }

    let votes = conduct_strategy_voting(
        llm,
        &validators,
        &proposed_strategies,
        hub,
        block.height,
        &mut results.strategy_discussion,
    )
    .await;

    let selected = select_winning_strategy(&votes, &proposed_strategies);
    let Some(selected) = selected else {
        warn!(chain = %chain_id, "No strategy proposals survived, aborting breakdown");
        return results;
    };
    info!(strategy = %selected.name, "Selected decision strategy");
    results.selected_strategy = Some(selected.clone());

    hub.broadcast(
        EVENT_STRATEGY_SELECTED,
        json!({
            "strategy": selected,
            "blockHeight": block.height,
        }),
    );

    // Phase 2: one contribution per validator
    for v in &validators {
        let context = format_discussion_context(&results.discussion);
        let Some(message) = generate_contribution(llm, v, &context, transaction_details).await
        else {
            info!(validator = %v.name, "Chose to observe rather than contribute");
            continue;
        };

        hub.broadcast(
            EVENT_TASK_BREAKDOWN_MESSAGE,
            json!({
                "validatorId": message.validator_id,
                "validatorName": message.validator_name,
                "messageType": message.message_type,
                "content": message.content,
                "proposal": message.proposal,
                "messageId": message.message_id,
                "blockHeight": block.height,
            }),
        );
        v.memory.store_discussion(message.clone());
        results.discussion.push(message);
    }

    // Phase 3: final proposals
    let mut final_proposals: Vec<TaskBreakdownProposal> = Vec::new();
    for v in &validators {
        let mut context = String::from("Previous discussion and proposals:\n\n");
        for msg in &results.discussion {
            if msg.message_type == MSG_PROPOSAL || msg.message_type == MSG_REFINEMENT {
                context.push_str(&format!("From {} ({}):\n", msg.validator_name, msg.message_type));
                for (i, task) in msg.proposal.iter().enumerate() {
                    context.push_str(&format!("{}. {}\n", i + 1, task));
                }
                context.push_str(&format!("Reasoning: {}\n\n", msg.content));
            }
        }

        let prompt = format!(
            "You are {}, with traits: {}.\n\
             After participating in the discussion about task breakdown, it's time to submit your\n\
             FINAL proposal.\n\n\
             Discussion Context:\n{}\n\n\
             You can either:\n\
             1. Submit your own refined version of the task breakdown\n\
             2. Support and adopt another validator's proposal with minor refinements\n\
             3. Create a merged proposal combining the best elements from multiple proposals\n\n\
             Respond with a JSON object:\n\
             {{\n\
                 \"subtasks\": [\"task1\", \"task2\"],\n\
                 \"reasoning\": \"Explain your final choice and any refinements made\",\n\
                 \"basedOn\": \"If adopting/refining another's proposal, mention their name\"\n\
             }}",
            v.name,
            v.traits.join(", "),
            context,
        );

        let response = match llm.complete(&prompt).await {
            Ok(r) => r,
            Err(e) => {
                warn!(validator = %v.name, "Final proposal LLM call failed: {}", e);
                continue;
            }
        };
        let raw: RawFinalProposal = match serde_json::from_str(&response) {
            Ok(p) => p,
            Err(e) => {
                warn!(validator = %v.name, "Failed to parse final proposal: {}", e);
                continue;
            }
        };

        let based_on = if raw.based_on.is_empty() {
            String::new()
        } else {
            format!(" (based on {}'s proposal)", raw.based_on)
        };
        let content = format!(
            "Final Proposal{}\n\nSubtasks:\n{}\nReasoning: {}",
            based_on,
            format_subtask_list(&raw.subtasks),
            raw.reasoning
        );

        let message = DiscussionMessage::new(&v.id, &v.name, MSG_FINAL_PROPOSAL, &content)
            .with_proposal(raw.subtasks.clone());
        hub.broadcast(
            EVENT_TASK_BREAKDOWN_MESSAGE,
            json!({
                "validatorId": v.id,
                "validatorName": v.name,
                "messageType": MSG_FINAL_PROPOSAL,
                "content": message.content,
                "proposal": raw.subtasks,
                "messageId": message.message_id,
                "blockHeight": block.height,
            }),
        );
        results.discussion.push(message);

        final_proposals.push(TaskBreakdownProposal {
            validator_id: v.id.clone(),
            validator_name: v.name.clone(),
            subtasks: raw.subtasks,
            reasoning: raw.reasoning,
        });
    }

    // Phase 4: coordination under the selected strategy
    let mut final_subtasks =
        coordinate_decision(llm, &validators, &final_proposals, &results.discussion, &selected, hub)
            .await;
    if final_subtasks.is_empty() {
        info!("Coordinator produced no results, falling back to consensus extraction");
        final_subtasks = extract_consensus_proposal(&results.discussion);
    }

    // Phase 5: consensus score (summary message excluded) and final summary
    results.consensus_score = consensus_score(&results.discussion);
    results.final_subtasks = final_subtasks.clone();

    let summary = generate_final_summary(&validators, &results);
    results.discussion.push(summary.clone());

    hub.broadcast(
        EVENT_TASK_BREAKDOWN_COMPLETED,
        json!({
            "subtasks": results.final_subtasks,
            "consensusScore": results.consensus_score,
            "decisionStrategy": selected.name,
            "blockHeight": block.height,
            "summary": summary.content,
        }),
    );

    // Memory updates and rewards
    for v in &validators {
        let my_first_proposal = results
            .discussion
            .iter()
            .find(|m| m.validator_id == v.id && m.message_type == MSG_PROPOSAL)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        v.memory
            .record_task_breakdown(&block.hash, &final_subtasks, &my_first_proposal, &selected.name);

        let my_last_proposal = results
            .discussion
            .iter()
            .rev()
            .find(|m| m.validator_id == v.id && !m.proposal.is_empty())
            .map(|m| m.proposal.clone())
            .unwrap_or_default();

        let reward = proposal_reward(&my_last_proposal, &final_subtasks);
        v.memory.record_decision(
            "task_breakdown",
            &my_last_proposal.join(","),
            &final_subtasks.join(","),
            reward,
            "Collaborative task breakdown",
        );

        v.memory.record_discussion(DiscussionRecord {
            validator_id: summary.validator_id.clone(),
            validator_name: summary.validator_name.clone(),
            message_type: summary.message_type.clone(),
            summary: crate::types::truncate(&summary.content, 200),
            message_id: summary.message_id.clone(),
            block_height: block.height,
            timestamp: summary.timestamp,
        });
    }

    info!(
        score = results.consensus_score,
        strategy = %selected.name,
        subtasks = results.final_subtasks.len(),
        "Task breakdown complete"
    );

    results
}

/// Reward = fraction of the validator's own last proposal that survived
/// into the final outcome, by the similarity rule.
pub fn proposal_reward(my_proposal: &[String], final_subtasks: &[String]) -> f64 {
    if my_proposal.is_empty() {
        return 0.0;
    }
    let overlap = my_proposal
        .iter()
        .filter(|task| final_subtasks.iter().any(|f| is_same_task(task, f)))
        .count();
    overlap as f64 / my_proposal.len() as f64
}

/// One contribution decision for a validator: what kind of message, if any.
async fn generate_contribution(
    llm: &dyn LlmClient,
    v: &Validator,
    discussion_context: &str,
    transaction_details: &str,
) -> Option<DiscussionMessage> {
    let prompt = format!(
        "You are {}, a validator with traits: {}.\n\n\
         You are participating in a collaborative task breakdown discussion. Below is the context\n\
         of the discussion so far:\n\n\
         TRANSACTION DETAILS:\n{}\n\n\
         DISCUSSION CONTEXT:\n{}\n\n\
         Based on your personality and the discussion so far, decide how you want to contribute:\n\n\
         1. PROPOSE NEW IDEAS: Suggest a completely new breakdown of subtasks\n\
         2. MERGE AND IMPROVE: Combine and refine existing proposals into a better solution\n\
         3. CRITIQUE: Point out specific issues or concerns with existing proposals\n\
         4. AGREE AND ENHANCE: Support a proposal while suggesting minor improvements\n\
         5. ASK: Request clarification about specific aspects of proposals\n\
         6. SUMMARIZE: Synthesize the discussion and identify emerging consensus\n\
         7. STAY SILENT: If others' contributions already cover what you would say\n\n\
         Respond with a JSON object:\n\
         {{\n\
           \"action\": \"PROPOSE_NEW|MERGE_IMPROVE|CRITIQUE|AGREE_ENHANCE|ASK|SUMMARIZE|SILENT\",\n\
           \"message\": \"Your detailed contribution\",\n\
           \"replyToMessageID\": \"ID of message you're building upon (if applicable)\",\n\
           \"subtasks\": [\"Include if you're proposing or refining tasks\"],\n\
           \"mergedFrom\": [\"IDs of messages whose ideas you're incorporating (if merging)\"]\n\
         }}",
        v.name,
        v.traits.join(", "),
        transaction_details,
        discussion_context,
    );

    let response = match llm.complete(&prompt).await {
        Ok(r) => r,
        Err(e) => {
            warn!(validator = %v.name, "Contribution LLM call failed: {}", e);
            return None;
        }
    };
    let raw: RawContribution = match serde_json::from_str(&response) {
        Ok(c) => c,
        Err(e) => {
            warn!(validator = %v.name, "Failed to parse contribution: {}", e);
            return None;
        }
    };

    let message_type = match raw.action.as_str() {
        "PROPOSE_NEW" => MSG_PROPOSAL,
        "MERGE_IMPROVE" => MSG_REFINEMENT,
        "CRITIQUE" => MSG_CRITIQUE,
        "AGREE_ENHANCE" => MSG_AGREEMENT,
        "ASK" => MSG_QUESTION,
        "SUMMARIZE" => MSG_SUMMARY,
        _ => return None, // SILENT or unrecognized
    };

    let mut content = raw.message;
    if !raw.merged_from.is_empty() {
        content.push_str(&format!(
            "\n\nThis proposal merges and improves ideas from messages: {}",
            raw.merged_from.join(", ")
        ));
    }

    let reply_to = if raw.reply_to.is_empty() {
        None
    } else {
        Some(raw.reply_to)
    };

    Some(
        DiscussionMessage::new(&v.id, &v.name, message_type, &content)
            .with_proposal(raw.subtasks)
            .with_reply_to(reply_to),
    )
}

/// Context block listing the proposals with nested numbering for prompts.
fn format_proposals_context(proposals: &[TaskBreakdownProposal]) -> String {
    let mut out = String::new();
    for (i, p) in proposals.iter().enumerate() {
        out.push_str(&format!("\nProposal {} (from {}):\n", i + 1, p.validator_name));
        for (j, task) in p.subtasks.iter().enumerate() {
            out.push_str(&format!("{}.{}. {}\n", i + 1, j + 1, task));
        }
        out.push_str(&format!("Reasoning: {}\n", p.reasoning));
    }
    out
}

/// Winner by highest mean score; ties resolve to the first-seen (lowest)
/// index. Indexes are 1-based; 0 means no winner.
fn winning_index(scores: &HashMap<usize, (f64, usize)>, proposal_count: usize) -> usize {
    let mut best_score = 0.0f64;
    let mut winner = 0usize;
    for idx in 1..=proposal_count {
        if let Some((total, count)) = scores.get(&idx) {
            if *count == 0 {
                continue;
            }
            let avg = total / *count as f64;
            if avg > best_score {
                best_score = avg;
                winner = idx;
            }
        }
    }
    winner
}

/// Apply the selected strategy to pick the final subtask list.
pub async fn coordinate_decision(
    llm: &dyn LlmClient,
    validators: &[Arc<Validator>],
    proposals: &[TaskBreakdownProposal],
    discussion: &[DiscussionMessage],
    strategy: &DecisionStrategy,
    hub: &EventHub,
) -> Vec<String> {
    if proposals.is_empty() {
        return Vec::new();
    }
    info!(strategy = %strategy.name, "Coordinating decision");

    let context = format_proposals_context(proposals);

    match strategy.name.to_uppercase().as_str() {
        STRATEGY_CONSENSUS => {
            let mut scores: HashMap<usize, (f64, usize)> = HashMap::new();

            for v in validators {
                let prompt = format!(
                    "You are {}, with traits: {}.\n\
                     Review these FINAL task breakdown proposals:\n{}\n\n\
                     Vote on EACH proposal with:\n\
                     1. A score from 0.0 to 1.0 (where 1.0 means full support)\n\
                     2. Brief reasoning for your score\n\n\
                     Consider:\n\
                     - Clarity and completeness\n\
                     - Feasibility of implementation\n\
                     - Coverage of requirements\n\
                     - Logical organization\n\n\
                     Respond with a JSON object:\n\
                     {{\n\
                         \"votes\": [\n\
                             {{\"proposalIndex\": 1, \"score\": 0.8, \"reasoning\": \"...\"}},\n\
                             {{\"proposalIndex\": 2, \"score\": 0.4, \"reasoning\": \"...\"}}\n\
                         ]\n\
                     }}",
                    v.name,
                    v.traits.join(", "),
                    context,
                );

                let response = match llm.complete(&prompt).await {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(validator = %v.name, "Vote LLM call failed: {}", e);
                        continue;
                    }
                };
                let raw: RawVotes = match serde_json::from_str(&response) {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(validator = %v.name, "Failed to parse votes: {}", e);
                        continue;
                    }
                };

                for vote in raw.votes {
                    let entry = scores.entry(vote.proposal_index).or_insert((0.0, 0));
                    entry.0 += vote.score;
                    entry.1 += 1;

                    hub.broadcast(
                        EVENT_TASK_BREAKDOWN_MESSAGE,
                        json!({
                            "validatorId": v.id,
                            "validatorName": v.name,
                            "messageType": "vote",
                            "proposalIndex": vote.proposal_index,
                            "score": vote.score,
                            "reasoning": vote.reasoning,
                        }),
                    );
                }
            }

            let winner = winning_index(&scores, proposals.len());
            if winner > 0 {
                return proposals[winner - 1].subtasks.clone();
            }
            proposals.first().map(|p| p.subtasks.clone()).unwrap_or_default()
        }

        STRATEGY_LEADER => {
            let leader = validators.iter().find(|v| v.id == strategy.validator_id);
            let Some(leader) = leader else {
                warn!("Leader not found, falling back to consensus extraction");
                return extract_consensus_proposal(discussion);
            };

            let prompt = format!(
                "As the designated leader {}, review these proposals:\n{}\n\n\
                 Choose the best proposal or create a consolidated version.\n\
                 Consider:\n\
                 - Team alignment and buy-in\n\
                 - Clear direction and coordination\n\
                 - Efficient execution path\n\n\
                 Respond with a JSON object:\n\
                 {{\n\
                     \"selectedProposal\": 1,\n\
                     \"consolidatedTasks\": [\"task1\", \"task2\"],\n\
                     \"reasoning\": \"Explain your decision process\"\n\
                 }}\n\
                 Use selectedProposal 0 when providing a consolidated version instead.",
                leader.name, context,
            );

            let Ok(response) = llm.complete(&prompt).await else {
                return extract_consensus_proposal(discussion);
            };
            let Ok(raw) = serde_json::from_str::<RawLeaderDecision>(&response) else {
                warn!("Failed to parse leader decision, falling back");
                return extract_consensus_proposal(discussion);
            };

            if raw.selected_proposal > 0 && raw.selected_proposal <= proposals.len() {
                proposals[raw.selected_proposal - 1].subtasks.clone()
            } else if !raw.consolidated_tasks.is_empty() {
                raw.consolidated_tasks
            } else {
                extract_consensus_proposal(discussion)
            }
        }

        STRATEGY_AUCTION => {
            let mut weights: HashMap<usize, (f64, usize)> = HashMap::new();

            for v in validators {
                let prompt = format!(
                    "You are {}, with traits: {}.\n\
                     Review these task breakdown proposals:\n{}\n\n\
                     For each proposal, evaluate:\n\
                     1. Your confidence in implementing this breakdown (0.0 to 1.0)\n\
                     2. Your expertise relevant to this approach (0.0 to 1.0)\n\
                     3. Why you believe you're well-suited for this approach\n\n\
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

                let response = match llm.complete(&prompt).await {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(validator = %v.name, "Bid LLM call failed: {}", e);
                        continue;
                    }
                };
                let raw: RawBids = match serde_json::from_str(&response) {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(validator = %v.name, "Failed to parse bids: {}", e);
                        continue;
                    }
                };

                for bid in raw.bids {
                    let weight = 0.6 * bid.expertise + 0.4 * bid.confidence;
                    let entry = weights.entry(bid.proposal_index).or_insert((0.0, 0));
                    entry.0 += weight;
                    entry.1 += 1;

                    hub.broadcast(
                        EVENT_TASK_BREAKDOWN_MESSAGE,
                        json!({
                            "validatorId": v.id,
                            "validatorName": v.name,
                            "messageType": MSG_BID,
                            "proposalIndex": bid.proposal_index,
                            "confidence": bid.confidence,
                            "expertise": bid.expertise,
                            "reasoning": bid.reasoning,
                        }),
                    );
                }
            }

            let winner = winning_index(&weights, proposals.len());
            if winner > 0 {
                return proposals[winner - 1].subtasks.clone();
            }
            proposals.first().map(|p| p.subtasks.clone()).unwrap_or_default()
        }

        other => {
            warn!(strategy = %other, "Strategy not handled, falling back to consensus extraction");
            extract_consensus_proposal(discussion)
        }
    }
}

/// Summary message authored by a validator with leadership-flavored traits,
/// else the first one.
fn generate_final_summary(
    validators: &[Arc<Validator>],
    results: &TaskBreakdownResults,
) -> DiscussionMessage {
    let summarizer = validators
        .iter()
        .find(|v| {
            v.traits.iter().any(|t| {
                let t = t.to_lowercase();
                t.contains("leader") || t.contains("organiz") || t.contains("systemat")
            })
        })
        .or_else(|| validators.first());

    let (id, name) = match summarizer {
        Some(v) => (v.id.clone(), v.name.clone()),
        None => ("system".to_string(), "System".to_string()),
    };

    let content = format!(
        "I'd like to summarize our discussion on task breakdown. After our collaborative \
         analysis, we've reached a consensus (score: {:.2}) on the following subtasks:\n\n{}\n\
         This breakdown represents our collective wisdom and addresses the key components of \
         the task at hand. Thank you all for your contributions to this discussion.",
        results.consensus_score,
        format_subtask_list(&results.final_subtasks),
    );

    DiscussionMessage::new(&id, &name, MSG_SUMMARY, &content)
        .with_proposal(results.final_subtasks.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deliberation::testutil::ScriptedLlm;
    use chrono::Utc;
    use std::path::Path;

    fn validator(id: &str, name: &str, traits: &[&str]) -> Arc<Validator> {
        Arc::new(Validator::new(
            id,
            name,
            traits.iter().map(|s| s.to_string()).collect(),
            "",
            vec![],
            "test chain",
            "demo",
            Path::new("/nonexistent-logs-disabled"),
        ))
    }

    fn proposal(name: &str, subtasks: &[&str]) -> TaskBreakdownProposal {
        TaskBreakdownProposal {
            validator_id: name.to_lowercase(),
            validator_name: name.to_string(),
            subtasks: subtasks.iter().map(|s| s.to_string()).collect(),
            reasoning: String::new(),
        }
    }

    fn consensus_strategy(proposer_id: &str) -> DecisionStrategy {
        DecisionStrategy {
            validator_id: proposer_id.to_string(),
            validator_name: proposer_id.to_string(),
            name: STRATEGY_CONSENSUS.to_string(),
            description: String::new(),
            reasoning: String::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_proposal_reward() {
        let final_tasks = vec!["design the api".to_string(), "write the tests".to_string()];

        // Both of mine survived
        let mine = vec!["Design the API".to_string(), "write the tests".to_string()];
        assert_eq!(proposal_reward(&mine, &final_tasks), 1.0);

        // One of two survived
        let mine = vec!["design the api".to_string(), "paint the shed".to_string()];
        assert_eq!(proposal_reward(&mine, &final_tasks), 0.5);

        // Empty proposal earns nothing
        assert_eq!(proposal_reward(&[], &final_tasks), 0.0);
    }

    #[tokio::test]
    async fn test_consensus_coordination_picks_highest_mean() {
        let hub = EventHub::new(64);
        let validators = vec![
            validator("v1", "Ada", &["analytical"]),
            validator("v2", "Bea", &["creative"]),
            validator("v3", "Cal", &["organized"]),
        ];
        let proposals = vec![
            proposal("Ada", &["a1", "a2"]),
            proposal("Bea", &["b1", "b2"]),
            proposal("Cal", &["c1"]),
        ];

        // Every voter scores proposal #2 highest
        let vote_json = r#"{"votes":[
            {"proposalIndex":1,"score":0.3,"reasoning":"thin"},
            {"proposalIndex":2,"score":0.9,"reasoning":"thorough"},
            {"proposalIndex":3,"score":0.5,"reasoning":"partial"}
        ]}"#;
        let llm = ScriptedLlm::repeating(vote_json);

        let result = coordinate_decision(
            &llm,
            &validators,
            &proposals,
            &[],
            &consensus_strategy("v1"),
            &hub,
        )
        .await;
        assert_eq!(result, vec!["b1".to_string(), "b2".to_string()]);
    }

    #[tokio::test]
    async fn test_consensus_tie_goes_to_first_seen() {
        let hub = EventHub::new(64);
        let validators = vec![validator("v1", "Ada", &[])];
        let proposals = vec![proposal("Ada", &["a1"]), proposal("Bea", &["b1"])];

        let vote_json = r#"{"votes":[
            {"proposalIndex":1,"score":0.7,"reasoning":""},
            {"proposalIndex":2,"score":0.7,"reasoning":""}
        ]}"#;
        let llm = ScriptedLlm::repeating(vote_json);

        let result = coordinate_decision(
            &llm,
            &validators,
            &proposals,
            &[],
            &consensus_strategy("v1"),
            &hub,
        )
        .await;
        assert_eq!(result, vec!["a1".to_string()]);
    }

    #[tokio::test]
    async fn test_leader_coordination_selects_by_index() {
        let hub = EventHub::new(64);
        let validators = vec![validator("v1", "Ada", &["leadership"])];
        let proposals = vec![proposal("Ada", &["a1"]), proposal("Bea", &["b1", "b2"])];

        let mut strategy = consensus_strategy("v1");
        strategy.name = STRATEGY_LEADER.to_string();

        let llm = ScriptedLlm::repeating(
            r#"{"selectedProposal":2,"consolidatedTasks":[],"reasoning":"Bea's is cleaner"}"#,
        );
        let result =
            coordinate_decision(&llm, &validators, &proposals, &[], &strategy, &hub).await;
        assert_eq!(result, vec!["b1".to_string(), "b2".to_string()]);
    }

    #[tokio::test]
    async fn test_leader_coordination_consolidated_list() {
        let hub = EventHub::new(64);
        let validators = vec![validator("v1", "Ada", &["leadership"])];
        let proposals = vec![proposal("Ada", &["a1"])];

        let mut strategy = consensus_strategy("v1");
        strategy.name = STRATEGY_LEADER.to_string();

        let llm = ScriptedLlm::repeating(
            r#"{"selectedProposal":0,"consolidatedTasks":["merged 1","merged 2"],"reasoning":"combined"}"#,
        );
        let result =
            coordinate_decision(&llm, &validators, &proposals, &[], &strategy, &hub).await;
        assert_eq!(result, vec!["merged 1".to_string(), "merged 2".to_string()]);
    }

    #[tokio::test]
    async fn test_auction_coordination_weights_expertise() {
        let hub = EventHub::new(64);
        let validators = vec![validator("v1", "Ada", &[])];
        let proposals = vec![proposal("Ada", &["a1"]), proposal("Bea", &["b1"])];

        let mut strategy = consensus_strategy("v1");
        strategy.name = STRATEGY_AUCTION.to_string();

        // Proposal 1: weight 0.6*0.2 + 0.4*1.0 = 0.52
        // Proposal 2: weight 0.6*0.9 + 0.4*0.1 = 0.58, expertise dominates
        let llm = ScriptedLlm::repeating(
            r#"{"bids":[
                {"proposalIndex":1,"confidence":1.0,"expertise":0.2,"reasoning":""},
                {"proposalIndex":2,"confidence":0.1,"expertise":0.9,"reasoning":""}
            ]}"#,
        );
        let result =
            coordinate_decision(&llm, &validators, &proposals, &[], &strategy, &hub).await;
        assert_eq!(result, vec!["b1".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_proposals_yield_empty() {
        let hub = EventHub::new(64);
        let llm = ScriptedLlm::repeating("{}");
        let result = coordinate_decision(
            &llm,
            &[],
            &[],
            &[],
            &consensus_strategy("v1"),
            &hub,
        )
        .await;
        assert!(result.is_empty());
    }

    #[test]
    fn test_summary_prefers_leadership_traits() {
        let validators = vec![
            validator("v1", "Ada", &["curious"]),
            validator("v2", "Bea", &["natural leader"]),
        ];
        let block = Block {
            height: 1,
            hash: "h".into(),
            prev_hash: "p".into(),
            proposer: "genesis".into(),
            timestamp: Utc::now(),
            txs: vec![],
        };
        let mut results = TaskBreakdownResults::empty(&block, "task");
        results.final_subtasks = vec!["one".into()];

        let summary = generate_final_summary(&validators, &results);
        assert_eq!(summary.validator_name, "Bea");
        assert_eq!(summary.message_type, MSG_SUMMARY);
        assert_eq!(summary.proposal, vec!["one".to_string()]);
    }
}
