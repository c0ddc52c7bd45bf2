//! Multi-round loan review
//!
//! Same shape as paper review with four pre-rounds and the banker schema.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::Agent;
use crate::discussions::{format_round_line, DiscussionLog};
use crate::llm::LlmClient;

/// Pre-rounds before the final review call
pub const LOAN_PRE_ROUNDS: u32 = 4;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoanReview {
    #[serde(default)]
    pub summary: String,
    #[serde(rename = "risk_factors", default)]
    pub risk_factors: Vec<String>,
    #[serde(default)]
    pub terms: Vec<String>,
    #[serde(default)]
    pub approval: bool,
}

pub async fn multi_round_loan_review(
    llm: &dyn LlmClient,
    agent: &Agent,
    loan: &str,
    chain_id: &str,
    log: &DiscussionLog,
) -> LoanReview {
    for round in 0..LOAN_PRE_ROUNDS {
        let previous = log.read(chain_id).await;
        let review = loan_review(llm, agent, loan, &previous).await;

        let line = format_round_line(round, review.approval, &agent.name, &review.summary);
        if let Err(e) = log.append(chain_id, &line).await {
            warn!(chain = %chain_id, "Failed to append loan review round: {}", e);
        }
    }

    let previous = log.read(chain_id).await;
    loan_review(llm, agent, loan, &previous).await
}

pub async fn loan_review(
    llm: &dyn LlmClient,
    agent: &Agent,
    loan: &str,
    previous_discussion: &str,
) -> LoanReview {
    if !agent.is_validator {
        return LoanReview::default();
    }

    let prompt = format!(
        "You are {}, a DeFi banker with the following traits: {}.\n\n\
         You are participating in a multi-round review of this loan request:\n\n\
         Request Details: {}\n\n\
         --- Previous Discussion Log ---\n\
         {}\n\
         --- End of Discussion Log ---\n\n\
         Please write your review in the style of an ongoing discussion. Share your thoughts\n\
         naturally, as if you're in a real conversation with other bankers. You may reference\n\
         previous discussion points and tag other reviewers using the format |@Name|.\n\n\
         When reviewing, consider:\n\
         1. Collateralization ratio and risk\n\
         2. Borrower's reputation and history\n\
         3. Purpose and viability of the loan\n\
         4. Market conditions and volatility\n\n\
         You must respond with a valid JSON object in this exact format, with no additional\n\
         text or formatting:\n\
         {{\n\
             \"summary\": \"<your discussion summary>\",\n\
             \"risk_factors\": [\"<risk1>\", \"<risk2>\"],\n\
             \"terms\": [\"<term1>\", \"<term2>\"],\n\
             \"approval\": true\n\
         }}\n\n\
         Your response must be valid JSON. The approval field must be a boolean, not a string.",
        agent.name,
        agent.traits.join(", "),
        loan,
        previous_discussion,
    );

    let response = match llm.complete(&prompt).await {
        Ok(r) => r,
        Err(e) => {
            warn!(agent = %agent.name, "Loan review LLM call failed: {}", e);
            return LoanReview::default();
        }
    };

    match serde_json::from_str(&response) {
        Ok(review) => review,
        Err(e) => {
            warn!(agent = %agent.name, "Failed to parse loan review: {}", e);
            LoanReview::default()
        }
    }
}
