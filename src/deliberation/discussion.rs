//! Single-shot validator discussion
//!
//! One LLM call per validator per `discuss_transaction`. Exactly one of
//! support/oppose/question ends up true; any failure (timeout, parse error)
//! degrades to the no-support default, which rejects the proposal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::core::{Agent, Transaction};
use crate::llm::LlmClient;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorOpinion {
    pub id: String,
    #[serde(rename = "validatorId")]
    pub validator_id: String,
    #[serde(rename = "validatorName")]
    pub validator_name: String,
    pub message: String,
    pub support: bool,
    pub oppose: bool,
    pub question: bool,
    pub round: u32,
    pub timestamp: DateTime<Utc>,
}

impl ValidatorOpinion {
    /// Default when the agent could not produce an opinion. Not support, so
    /// the enclosing proposal is rejected.
    pub fn no_support(agent: &Agent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            validator_id: agent.id.clone(),
            validator_name: agent.name.clone(),
            message: String::new(),
            support: false,
            oppose: false,
            question: true,
            round: 1,
            timestamp: Utc::now(),
        }
    }

    /// Force the exactly-one-of-three invariant, preferring the strongest
    /// stated stance.
    fn normalize_stance(&mut self) {
        if self.support {
            self.oppose = false;
            self.question = false;
        } else if self.oppose {
            self.question = false;
        } else {
            self.question = true;
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawOpinion {
    #[serde(default)]
    message: String,
    #[serde(default)]
    support: bool,
    #[serde(default)]
    oppose: bool,
    #[serde(default)]
    question: bool,
}

/// Ask one validator agent for its stance on a discussion topic.
pub async fn validator_discussion(
    llm: &dyn LlmClient,
    agent: &Agent,
    tx: &Transaction,
) -> ValidatorOpinion {
    if !agent.is_validator {
        return ValidatorOpinion::no_support(agent);
    }

    let prompt = format!(
        "You are {}, with these traits: {}.\n\n\
         You're participating in a group discussion about this topic:\n{}\n\n\
         IMPORTANT FORMAT: When referencing any validator, you MUST use the exact format: |@Name|\n\
         The pipes (|) are required at the start and end of EVERY mention.\n\n\
         Share your thoughts naturally, as if you're in a real conversation. If you're the first to\n\
         speak, just give your honest thoughts about the topic. If others have spoken, feel free to\n\
         build on or challenge their ideas based on your personality traits.\n\n\
         Important: Your analysis must be fully consistent. This means:\n\
         - If you agree with the statement, your stance is support.\n\
         - If you disagree with the statement, your stance is oppose.\n\
         - If you are unsure, your stance is question.\n\n\
         Additional rules:\n\
         - Exactly one of support, oppose, question must be true.\n\
         - When referencing another validator, you MUST use the format |@Name|.\n\
         - Never invent or mention validators that aren't shown in the previous discussions.\n\n\
         Your response MUST be a JSON object with exactly these fields:\n\
         {{\n\
             \"message\": \"Your detailed discussion message here\",\n\
             \"support\": false,\n\
             \"oppose\": false,\n\
             \"question\": false\n\
         }}\n\n\
         Do not include any additional text or formatting.",
        agent.name,
        agent.traits.join(", "),
        tx.content,
    );

    let response = match llm.complete(&prompt).await {
        Ok(r) => r,
        Err(e) => {
            warn!(agent = %agent.name, "Discussion LLM call failed: {}", e);
            return ValidatorOpinion::no_support(agent);
        }
    };

    let raw: RawOpinion = match serde_json::from_str(&response) {
        Ok(r) => r,
        Err(e) => {
            warn!(agent = %agent.name, "Failed to parse discussion response: {}", e);
            return ValidatorOpinion::no_support(agent);
        }
    };

    let mut opinion = ValidatorOpinion {
        id: Uuid::new_v4().to_string(),
        validator_id: agent.id.clone(),
        validator_name: agent.name.clone(),
        message: raw.message,
        support: raw.support,
        oppose: raw.oppose,
        question: raw.question,
        round: 1,
        timestamp: Utc::now(),
    };
    opinion.normalize_stance();
    opinion
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AgentRole;
    use crate::deliberation::testutil::{FailingLlm, ScriptedLlm};

    fn agent() -> Agent {
        let mut agent = Agent::new("v1", "Ada", AgentRole::Validator)
            .with_traits(vec!["analytical".into()]);
        agent.is_validator = true;
        agent
    }

    fn tx() -> Transaction {
        Transaction::discussion("demo", "client", "should we adopt proposal X?")
    }

    #[tokio::test]
    async fn test_supporting_opinion() {
        let llm = ScriptedLlm::repeating(
            r#"{"message":"sound idea","support":true,"oppose":false,"question":false}"#,
        );
        let opinion = validator_discussion(&llm, &agent(), &tx()).await;
        assert!(opinion.support);
        assert!(!opinion.oppose);
        assert!(!opinion.question);
        assert_eq!(opinion.validator_name, "Ada");
    }

    #[tokio::test]
    async fn test_exactly_one_stance_enforced() {
        // Model claimed both support and oppose; support wins
        let llm = ScriptedLlm::repeating(
            r#"{"message":"confused","support":true,"oppose":true,"question":true}"#,
        );
        let opinion = validator_discussion(&llm, &agent(), &tx()).await;
        assert!(opinion.support && !opinion.oppose && !opinion.question);

        // Model set none; question becomes the stance
        let llm = ScriptedLlm::repeating(
            r#"{"message":"hmm","support":false,"oppose":false,"question":false}"#,
        );
        let opinion = validator_discussion(&llm, &agent(), &tx()).await;
        assert!(!opinion.support && !opinion.oppose && opinion.question);
    }

    #[tokio::test]
    async fn test_llm_failure_defaults_to_no_support() {
        let opinion = validator_discussion(&FailingLlm, &agent(), &tx()).await;
        assert!(!opinion.support);
        assert!(opinion.question);
    }

    #[tokio::test]
    async fn test_unparseable_response_defaults_to_no_support() {
        let llm = ScriptedLlm::repeating("I simply cannot answer in JSON");
        let opinion = validator_discussion(&llm, &agent(), &tx()).await;
        assert!(!opinion.support);
    }

    #[tokio::test]
    async fn test_non_validator_agent_yields_no_support() {
        let mut producer = agent();
        producer.is_validator = false;
        let llm = ScriptedLlm::repeating(
            r#"{"message":"x","support":true,"oppose":false,"question":false}"#,
        );
        let opinion = validator_discussion(&llm, &producer, &tx()).await;
        assert!(!opinion.support);
    }
}
