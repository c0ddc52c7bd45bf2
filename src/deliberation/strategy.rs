//! Decision strategies for collaborative pipelines
//!
//! Validators pick from the fixed set {CONSENSUS, LEADER, AUCTION}, vote on
//! the proposals, and the most-voted strategy governs the coordination
//! phase. Invalid picks default to CONSENSUS with a note; vote ties resolve
//! to the first proposed strategy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use tracing::warn;

use crate::events::{EventHub, EVENT_DECISION_STRATEGY, EVENT_STRATEGY_VOTE};
use crate::llm::LlmClient;
use crate::validator::Validator;

pub const STRATEGY_CONSENSUS: &str = "CONSENSUS";
pub const STRATEGY_LEADER: &str = "LEADER";
pub const STRATEGY_AUCTION: &str = "AUCTION";

/// The three fixed strategies with their prompt descriptions.
pub const STRATEGIES: &[(&str, &str, &str)] = &[
    (
        STRATEGY_CONSENSUS,
        "All validators have equal voting power. Each validator reviews and votes on proposals. The proposal with the highest average score wins.",
        "Tasks that benefit from collective wisdom and require broad agreement.",
    ),
    (
        STRATEGY_LEADER,
        "A validator with strong leadership traits guides the decision process. Other validators provide input, but the leader makes the final decision.",
        "Complex tasks needing clear direction and quick decisions.",
    ),
    (
        STRATEGY_AUCTION,
        "Validators bid on tasks based on their expertise and capacity. Tasks are assigned to those best positioned to complete them.",
        "Tasks where specific expertise and resource availability are crucial.",
    ),
];

fn description_for(name: &str) -> Option<&'static str> {
    STRATEGIES
        .iter()
        .find(|(n, _, _)| *n == name)
        .map(|(_, d, _)| *d)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionStrategy {
    #[serde(rename = "validatorId")]
    pub validator_id: String,
    #[serde(rename = "validatorName")]
    pub validator_name: String,
    pub name: String,
    pub description: String,
    pub reasoning: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyVote {
    #[serde(rename = "validatorId")]
    pub validator_id: String,
    #[serde(rename = "validatorName")]
    pub validator_name: String,
    #[serde(rename = "strategyName")]
    pub strategy_name: String,
    pub reasoning: String,
    pub timestamp: DateTime<Utc>,
}

/// A message in the strategy-selection discussion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyMessage {
    #[serde(rename = "validatorId")]
    pub validator_id: String,
    #[serde(rename = "validatorName")]
    pub validator_name: String,
    #[serde(rename = "messageType")]
    pub message_type: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<DecisionStrategy>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct RawStrategyPick {
    #[serde(rename = "selectedStrategy", default)]
    selected_strategy: String,
    #[serde(default)]
    reasoning: String,
}

/// Ask one validator to pick a strategy from the fixed set.
pub async fn propose_strategy(
    llm: &dyn LlmClient,
    validator: &Validator,
    task_details: &str,
) -> Option<DecisionStrategy> {
    let prompt = format!(
        "You are {}, with traits: {}.\n\
         You need to select a decision-making strategy for this task:\n{}\n\n\
         Available strategies:\n\n\
         1. CONSENSUS:\n   - {}\n   - Best for: {}\n\n\
         2. LEADER:\n   - {}\n   - Best for: {}\n\n\
         3. AUCTION:\n   - {}\n   - Best for: {}\n\n\
         Based on:\n\
         1. Your traits and past experience\n\
         2. The nature and complexity of the current task\n\
         3. The need for efficient decision-making\n\
         4. The importance of validator participation\n\n\
         Choose ONE of these three strategies.\n\n\
         Respond with a JSON object:\n\
         {{\n\
             \"selectedStrategy\": \"REQUIRED: One of: CONSENSUS | LEADER | AUCTION\",\n\
             \"reasoning\": \"REQUIRED: Why this strategy is most appropriate for this task\"\n\
         }}",
        validator.name,
        validator.traits.join(", "),
        task_details,
        STRATEGIES[0].1,
        STRATEGIES[0].2,
        STRATEGIES[1].1,
        STRATEGIES[1].2,
        STRATEGIES[2].1,
        STRATEGIES[2].2,
    );

    let response = match llm.complete(&prompt).await {
        Ok(r) => r,
        Err(e) => {
            warn!(validator = %validator.name, "Strategy proposal LLM call failed: {}", e);
            return None;
        }
    };

    let mut pick: RawStrategyPick = match serde_json::from_str(&response) {
        Ok(p) => p,
        Err(e) => {
            warn!(validator = %validator.name, "Failed to parse strategy proposal: {}", e);
            return None;
        }
    };

    let upper = pick.selected_strategy.to_uppercase();
    let (name, description) = match description_for(&upper) {
        Some(desc) => (upper, desc),
        None => {
            warn!(
                validator = %validator.name,
                picked = %pick.selected_strategy,
                "Invalid strategy pick, defaulting to CONSENSUS"
            );
            pick.reasoning
                .push_str(" (Defaulted to consensus due to invalid selection)");
            (
                STRATEGY_CONSENSUS.to_string(),
                description_for(STRATEGY_CONSENSUS).unwrap(),
            )
        }
    };

    Some(DecisionStrategy {
        validator_id: validator.id.clone(),
        validator_name: validator.name.clone(),
        name,
        description: description.to_string(),
        reasoning: pick.reasoning,
        timestamp: Utc::now(),
    })
}

/// Each validator votes for one proposed strategy. Votes are broadcast and
/// recorded in the strategy discussion.
pub async fn conduct_strategy_voting(
    llm: &dyn LlmClient,
    validators: &[std::sync::Arc<Validator>],
    strategies: &[DecisionStrategy],
    hub: &EventHub,
    block_height: u64,
    discussion: &mut Vec<StrategyMessage>,
) -> Vec<StrategyVote> {
    let mut votes = Vec::new();

    let mut context = String::new();
    for s in strategies {
        context.push_str(&format!(
            "\nStrategy: {}\nProposed by: {}\nDescription: {}\nReasoning: {}\n\n",
            s.name, s.validator_name, s.description, s.reasoning
        ));
    }

    for v in validators {
        let prompt = format!(
            "You are {}, with traits: {}.\n\
             Review these proposed decision-making strategies:\n{}\n\n\
             Based on your expertise and the task requirements:\n\
             1. Which strategy do you think is best?\n\
             2. Why do you support this strategy?\n\n\
             Respond with a JSON object:\n\
             {{\n\
                 \"selectedStrategy\": \"Exact name of the strategy you're voting for\",\n\
                 \"reasoning\": \"Your detailed reasoning for this choice\"\n\
             }}",
            v.name,
            v.traits.join(", "),
            context,
        );

        let response = match llm.complete(&prompt).await {
            Ok(r) => r,
            Err(e) => {
                warn!(validator = %v.name, "Strategy vote LLM call failed: {}", e);
                continue;
            }
        };

        let pick: RawStrategyPick = match serde_json::from_str(&response) {
            Ok(p) => p,
            Err(e) => {
                warn!(validator = %v.name, "Failed to parse strategy vote: {}", e);
                continue;
            }
        };

        let vote = StrategyVote {
            validator_id: v.id.clone(),
            validator_name: v.name.clone(),
            strategy_name: pick.selected_strategy.to_uppercase(),
            reasoning: pick.reasoning.clone(),
            timestamp: Utc::now(),
        };

        discussion.push(StrategyMessage {
            validator_id: v.id.clone(),
            validator_name: v.name.clone(),
            message_type: "vote".to_string(),
            content: pick.reasoning.clone(),
            strategy: None,
            timestamp: Utc::now(),
        });

        hub.broadcast(
            EVENT_STRATEGY_VOTE,
            json!({
                "validatorId": v.id,
                "validatorName": v.name,
                "strategyName": vote.strategy_name,
                "reasoning": format!("{}'s reasoning: {}", v.name, vote.reasoning),
                "blockHeight": block_height,
            }),
        );

        votes.push(vote);
    }

    votes
}

/// Most-voted strategy wins; ties resolve to the first proposed; no votes at
/// all also resolves to the first proposed.
pub fn select_winning_strategy(
    votes: &[StrategyVote],
    strategies: &[DecisionStrategy],
) -> Option<DecisionStrategy> {
    if strategies.is_empty() {
        return None;
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for vote in votes {
        *counts.entry(vote.strategy_name.as_str()).or_default() += 1;
    }

    let mut winner: Option<&DecisionStrategy> = None;
    let mut best = 0usize;
    for strategy in strategies {
        let count = counts.get(strategy.name.as_str()).copied().unwrap_or(0);
        if count > best {
            best = count;
            winner = Some(strategy);
        }
    }

    Some(winner.unwrap_or(&strategies[0]).clone())
}

/// Broadcast a strategy proposal on the hub.
pub fn broadcast_strategy_proposal(hub: &EventHub, strategy: &DecisionStrategy, block_height: u64) {
    hub.broadcast(
        EVENT_DECISION_STRATEGY,
        json!({
            "validatorId": strategy.validator_id,
            "validatorName": strategy.validator_name,
            "strategy": strategy,
            "blockHeight": block_height,
        }),
    );
}
