//! Multi-round paper review
//!
//! Three discussion rounds plus one final. Each round reads the chain's
//! global discussion log, asks the agent's LLM for a structured review and
//! appends a round line to the log. The returned review is the final call's;
//! its approval gates block acceptance.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::Agent;
use crate::discussions::{format_round_line, DiscussionLog};
use crate::llm::LlmClient;

/// Pre-rounds before the final review call
pub const PAPER_PRE_ROUNDS: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchPaper {
    pub title: String,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    pub content: String,
    #[serde(default)]
    pub author: String,
    #[serde(rename = "topic_tags", default)]
    pub topic_tags: Vec<String>,
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaperReview {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub flaws: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(rename = "is_reproducible", default)]
    pub is_reproducible: bool,
    #[serde(default)]
    pub approval: bool,
}

/// Run the full multi-round review for one agent. The discussion log grows
/// by one line per pre-round; the final call is returned without appending.
pub async fn multi_round_paper_review(
    llm: &dyn LlmClient,
    agent: &Agent,
    paper: &ResearchPaper,
    chain_id: &str,
    log: &DiscussionLog,
) -> PaperReview {
    for round in 0..PAPER_PRE_ROUNDS {
        let previous = log.read(chain_id).await;
        let review = paper_review(llm, agent, paper, &previous).await;

        let line = format_round_line(round, review.approval, &agent.name, &review.summary);
        if let Err(e) = log.append(chain_id, &line).await {
            warn!(chain = %chain_id, "Failed to append review round: {}", e);
        }
    }

    let previous = log.read(chain_id).await;
    paper_review(llm, agent, paper, &previous).await
}

/// One review call. Timeouts and parse failures yield the default review,
/// which does not approve.
pub async fn paper_review(
    llm: &dyn LlmClient,
    agent: &Agent,
    paper: &ResearchPaper,
    previous_discussion: &str,
) -> PaperReview {
    if !agent.is_validator {
        return PaperReview::default();
    }

    let prompt = format!(
        "You are {}, a scientific reviewer with the following traits: {}.\n\n\
         You are participating in a multi-round review of the following research paper:\n\n\
         Title: {}\n\
         Abstract: {}\n\
         Content: {}\n\n\
         --- Previous Discussion Log ---\n\
         {}\n\
         --- End of Discussion Log ---\n\n\
         Please write your review in the style of an ongoing academic discussion. Share your\n\
         thoughts naturally, as if you're in a real conversation with other experts. You may\n\
         reference previous discussion points and tag other reviewers using the format |@Name|,\n\
         for example: \"I agree with |@Marie Curie| on the reproducibility concern...\"\n\n\
         If there are previous discussion messages, consider them carefully before responding.\n\
         Build upon, critique, or clarify others' points respectfully.\n\n\
         When reviewing, consider:\n\
         1. Scientific merit and methodology\n\
         2. Reproducibility of results\n\
         3. Clarity and organization\n\
         4. Significance of contribution\n\n\
         Your 'approval' should be true if you think the paper is good, and false if you think\n\
         it is bad.\n\n\
         Respond ONLY with a JSON object in this format:\n\
         {{\n\
         \"summary\": \"Brief overview of the paper and any evolution of opinion from prior rounds\",\n\
         \"flaws\": [\"major issues you've identified or agree with from others\"],\n\
         \"suggestions\": [\"constructive feedback, possibly extending others' ideas\"],\n\
         \"is_reproducible\": true,\n\
         \"approval\": true\n\
         }}\n\n\
         Do not include any additional text or formatting.",
        agent.name,
        agent.traits.join(", "),
        paper.title,
        paper.abstract_text,
        paper.content,
        previous_discussion,
    );

    let response = match llm.complete(&prompt).await {
        Ok(r) => r,
        Err(e) => {
            warn!(agent = %agent.name, "Paper review LLM call failed: {}", e);
            return PaperReview::default();
        }
    };

    match serde_json::from_str(&response) {
        Ok(review) => review,
        Err(e) => {
            warn!(agent = %agent.name, "Failed to parse paper review: {}", e);
            PaperReview::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AgentRole;
    use crate::deliberation::testutil::{FailingLlm, ScriptedLlm};
    use crate::discussions::parse_round_line;
    use crate::llm::LlmClient;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn agent() -> Agent {
        let mut agent =
            Agent::new("v1", "Marie Curie", AgentRole::Validator).with_traits(vec!["rigorous".into()]);
        agent.is_validator = true;
        agent
    }

    fn paper() -> ResearchPaper {
        ResearchPaper {
            title: "P".into(),
            abstract_text: "A".into(),
            content: "C".into(),
            author: "author".into(),
            topic_tags: vec!["physics".into()],
            timestamp: 0,
        }
    }

    fn approve_json(summary: &str) -> String {
        format!(
            r#"{{"summary":"{}","flaws":[],"suggestions":[],"is_reproducible":true,"approval":true}}"#,
            summary
        )
    }

    /// Counts calls to verify the 3 + 1 round structure.
    struct CountingLlm {
        calls: AtomicU32,
        response: String,
    }

    #[async_trait]
    impl LlmClient for CountingLlm {
        async fn complete(&self, _prompt: &str) -> crate::types::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    #[tokio::test]
    async fn test_runs_exactly_three_pre_rounds_plus_final() {
        let dir = tempfile::tempdir().unwrap();
        let log = DiscussionLog::new(dir.path());
        let llm = CountingLlm {
            calls: AtomicU32::new(0),
            response: approve_json("fine work"),
        };

        let review = multi_round_paper_review(&llm, &agent(), &paper(), "demo", &log).await;
        assert!(review.approval);
        assert_eq!(llm.calls.load(Ordering::SeqCst), PAPER_PRE_ROUNDS + 1);

        // Only pre-rounds were appended to the log, numbered from 0
        let contents = log.read("demo").await;
        let votes: Vec<_> = contents.lines().filter_map(parse_round_line).collect();
        assert_eq!(votes.len(), PAPER_PRE_ROUNDS as usize);
        assert_eq!(votes[0].round, 0);
        assert_eq!(votes[2].round, 2);
        assert!(votes.iter().all(|v| v.validator_name == "Marie Curie"));
    }

    #[tokio::test]
    async fn test_final_round_verdict_wins() {
        let dir = tempfile::tempdir().unwrap();
        let log = DiscussionLog::new(dir.path());

        // Approve in all pre-rounds, reject in the final call
        let llm = ScriptedLlm::new(vec![
            approve_json("round 0"),
            approve_json("round 1"),
            approve_json("round 2"),
            r#"{"summary":"flawed after all","flaws":["bad stats"],"suggestions":[],"is_reproducible":false,"approval":false}"#.to_string(),
        ]);

        let review = multi_round_paper_review(&llm, &agent(), &paper(), "demo", &log).await;
        assert!(!review.approval);
        assert_eq!(review.flaws, vec!["bad stats".to_string()]);
    }

    #[tokio::test]
    async fn test_llm_failure_rejects() {
        let dir = tempfile::tempdir().unwrap();
        let log = DiscussionLog::new(dir.path());
        let review = multi_round_paper_review(&FailingLlm, &agent(), &paper(), "demo", &log).await;
        assert!(!review.approval);
    }

    #[tokio::test]
    async fn test_non_validator_does_not_approve() {
        let mut producer = agent();
        producer.is_validator = false;
        let llm = ScriptedLlm::repeating(&approve_json("x"));
        let review = paper_review(&llm, &producer, &paper(), "").await;
        assert!(!review.approval);
    }
}
