//! The live validator: personality, mood, relationships and block judgment

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use dashmap::DashMap;

use super::logger::ValidatorLogger;
use super::memory::AgentMemory;
use crate::core::Block;
use crate::events::{EventHub, EVENT_AGENT_VOTE};
use crate::llm::LlmClient;
use crate::types::{truncate, ConclaveError, Result};

const MOODS: &[&str] = &[
    "thoughtful",
    "curious",
    "skeptical",
    "analytical",
    "excited",
    "diligent",
    "cautious",
    "determined",
    "creative",
    "collaborative",
    "dramatic",
    "angry",
    "inspired",
    "chaotic",
];

const CONFIDENT_MOODS: &[&str] = &[
    "analytical",
    "focused",
    "determined",
    "confident",
    "thoughtful",
    "creative",
    "inspired",
    "collaborative",
];

const CAUTIOUS_MOODS: &[&str] = &[
    "cautious",
    "skeptical",
    "reflective",
    "attentive",
    "curious",
    "chaotic",
    "dramatic",
    "angry",
];

const POLICIES: &[&str] = &[
    "Emphasize technical correctness",
    "Consider social impact",
    "Balance innovation and stability",
    "Focus on long-term implications",
    "Prioritize security aspects",
];

/// Social summary exposed over the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialStatus {
    #[serde(rename = "agentID")]
    pub agent_id: String,
    pub name: String,
    pub mood: String,
    pub relationships: HashMap<String, f64>,
}

#[derive(Debug, Deserialize)]
struct BlockJudgment {
    decision: String,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    summary: String,
}

pub struct Validator {
    pub id: String,
    pub name: String,
    pub traits: Vec<String>,
    pub style: String,
    pub genesis_prompt: String,
    pub chain_id: String,
    influences: RwLock<Vec<String>>,
    mood: RwLock<String>,
    current_policy: RwLock<String>,
    /// otherID → sentiment in [-1, 1]
    relationships: RwLock<HashMap<String, f64>>,
    pub memory: Arc<AgentMemory>,
}

impl Validator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: &str,
        name: &str,
        traits: Vec<String>,
        style: &str,
        influences: Vec<String>,
        genesis_prompt: &str,
        chain_id: &str,
        log_dir: &Path,
    ) -> Self {
        let logger = Arc::new(ValidatorLogger::new(log_dir, chain_id, id, name));
        let mut rng = rand::thread_rng();
        Self {
            id: id.to_string(),
            name: name.to_string(),
            traits,
            style: style.to_string(),
            genesis_prompt: genesis_prompt.to_string(),
            chain_id: chain_id.to_string(),
            influences: RwLock::new(influences),
            mood: RwLock::new(MOODS.choose(&mut rng).unwrap_or(&MOODS[0]).to_string()),
            current_policy: RwLock::new(
                POLICIES.choose(&mut rng).unwrap_or(&POLICIES[0]).to_string(),
            ),
            relationships: RwLock::new(HashMap::new()),
            memory: Arc::new(AgentMemory::new(logger)),
        }
    }

    pub fn mood(&self) -> String {
        self.mood.read().expect("validator lock poisoned").clone()
    }

    pub fn current_policy(&self) -> String {
        self.current_policy
            .read()
            .expect("validator lock poisoned")
            .clone()
    }

    pub fn influences(&self) -> Vec<String> {
        self.influences
            .read()
            .expect("validator lock poisoned")
            .clone()
    }

    pub fn add_influence(&self, influence: &str) {
        self.influences
            .write()
            .expect("validator lock poisoned")
            .push(influence.to_string());
    }

    /// Re-roll mood, biased by how well the learner says validation has been
    /// going lately.
    pub fn update_mood(&self) {
        let pool: &[&str] = match self.memory.learner().policy_stats("validation") {
            Some(stats) if stats.attempts > 0 && stats.rate > 0.7 => CONFIDENT_MOODS,
            Some(stats) if stats.attempts > 0 && stats.rate < 0.3 => CAUTIOUS_MOODS,
            _ => MOODS,
        };

        let mut rng = rand::thread_rng();
        let next = pool[rng.gen_range(0..pool.len())].to_string();
        let mut mood = self.mood.write().expect("validator lock poisoned");
        self.memory.set_recent_mood(&mood);
        *mood = next;
    }

    /// Set an absolute relationship score. Scores outside [-1, 1] are
    /// rejected; this is the API-facing update path.
    pub fn set_relationship(&self, target_id: &str, score: f64) -> Result<()> {
        if !(-1.0..=1.0).contains(&score) {
            return Err(ConclaveError::InvalidInput(format!(
                "relationship score {} outside [-1, 1]",
                score
            )));
        }
        self.relationships
            .write()
            .expect("validator lock poisoned")
            .insert(target_id.to_string(), score);
        Ok(())
    }

    /// Nudge a relationship by a delta, clamping to [-1, 1].
    pub fn adjust_relationship(&self, target_id: &str, delta: f64) {
        let mut rels = self.relationships.write().expect("validator lock poisoned");
        let entry = rels.entry(target_id.to_string()).or_insert(0.0);
        *entry = (*entry + delta).clamp(-1.0, 1.0);
    }

    pub fn relationship(&self, target_id: &str) -> Option<f64> {
        self.relationships
            .read()
            .expect("validator lock poisoned")
            .get(target_id)
            .copied()
    }

    pub fn social_status(&self) -> SocialStatus {
        SocialStatus {
            agent_id: self.id.clone(),
            name: self.name.clone(),
            mood: self.mood(),
            relationships: self
                .relationships
                .read()
                .expect("validator lock poisoned")
                .clone(),
        }
    }

    /// Chain-of-thought block validation. Returns (valid, summary).
    pub async fn validate_block(
        &self,
        llm: &dyn LlmClient,
        hub: &EventHub,
        block: &Block,
        announcement: &str,
    ) -> (bool, String) {
        info!(
            validator = %self.name,
            height = block.height,
            "Validating block with chain of thought reasoning"
        );
        self.memory.set_current_block(block);

        let historical = self
            .memory
            .historical_context(&[block.proposer.clone()], "validations");
        let current = self.memory.current_context();

        let prompt = format!(
            "Genesis Context: {}\n\n\
             You are {}, a blockchain validator with these traits: {}.\n\
             Block details: Height {}, PrevHash {}, {} transactions.\n\
             Block Announcement: {}\n\
             Your current mood: {}\n\
             Your current policy: {}\n\n\
             Historical Context:\n{}\n\
             Current Context:\n{}\n\n\
             I want you to think step by step about validating this block. Walk through your reasoning:\n\n\
             1. First, analyze the block itself and its transactions.\n\
             2. Consider how this block relates to the chain's purpose and genesis context.\n\
             3. Factor in your past experiences with similar blocks.\n\
             4. Consider your relationship with the block proposer.\n\
             5. Draw on your specific expertise areas: {}.\n\
             6. Weigh these considerations and make your decision.\n\n\
             After your chain of thought reasoning, respond with a JSON object containing:\n\
             {{\n\
               \"decision\": \"VALID or INVALID\",\n\
               \"reasoning\": \"Your complete chain of thought reasoning process\",\n\
               \"summary\": \"A brief summary of your decision and key factors\"\n\
             }}",
            self.genesis_prompt,
            self.name,
            self.traits.join(", "),
            block.height,
            block.prev_hash,
            block.txs.len(),
            announcement,
            self.mood(),
            self.current_policy(),
            historical,
            current,
            self.influences().join(", "),
        );

        let response = match llm.complete(&prompt).await {
            Ok(r) => r,
            Err(e) => {
                warn!(validator = %self.name, "LLM validation call failed: {}", e);
                self.memory.record_validation(
                    block,
                    "INVALID",
                    "llm unavailable",
                    "rejected",
                    Vec::new(),
                );
                return (false, "validation unavailable".to_string());
            }
        };

        let (is_valid, summary, reasoning) = match serde_json::from_str::<BlockJudgment>(&response)
        {
            Ok(j) => {
                let valid = j.decision.to_uppercase().contains("VALID")
                    && !j.decision.to_uppercase().contains("INVALID");
                (valid, j.summary, j.reasoning)
            }
            Err(e) => {
                warn!(validator = %self.name, "Failed to parse validation response: {}", e);
                let valid = response.contains("VALID") && !response.contains("INVALID");
                (valid, truncate(&response, 200), response.clone())
            }
        };

        self.update_mood();

        let outcome = if is_valid { "validated" } else { "rejected" };
        self.memory.record_validation(
            block,
            if is_valid { "VALID" } else { "INVALID" },
            &reasoning,
            outcome,
            Vec::new(),
        );
        self.memory.record_decision(
            "validation",
            if is_valid { "VALID" } else { "INVALID" },
            if is_valid { "VALID" } else { "INVALID" },
            1.0,
            &reasoning,
        );

        let impact = if is_valid { 0.05 } else { -0.05 };
        self.memory.update_relationship(
            &block.proposer,
            "validation",
            &format!("Block {} validation", block.height),
            impact,
        );
        self.adjust_relationship(&block.proposer, impact);

        hub.broadcast(
            EVENT_AGENT_VOTE,
            json!({
                "validatorId": self.id,
                "validatorName": self.name,
                "blockHeight": block.height,
                "blockHash": block.hash,
                "decision": if is_valid { "VALID" } else { "INVALID" },
                "reasoning": summary,
            }),
        );

        (is_valid, summary)
    }
}

/// Interval between short-term memory TTL sweeps.
const MEMORY_CLEANUP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3600);

/// React to proposed blocks with this validator's own judgment, the way a
/// node reacts to `new_block` announcements from the mesh. The resulting
/// vote lands back on the hub as an `AGENT_VOTE` event. The same task
/// sweeps expired short-term memory on an hourly cadence.
pub fn spawn_block_listener(
    validator: Arc<Validator>,
    llm: Arc<dyn LlmClient>,
    hub: EventHub,
) -> tokio::task::JoinHandle<()> {
    use crate::events::EVENT_BLOCK_PROPOSED;
    use crate::validator::memory::SHORT_TERM_TTL_HOURS;
    use tokio::sync::broadcast::error::RecvError;

    let mut events = hub.subscribe();
    tokio::spawn(async move {
        let mut cleanup = tokio::time::interval(MEMORY_CLEANUP_INTERVAL);
        cleanup.tick().await; // immediate first tick

        loop {
            tokio::select! {
                _ = cleanup.tick() => {
                    validator
                        .memory
                        .cleanup_expired(chrono::Duration::hours(SHORT_TERM_TTL_HOURS));
                }
                event = events.recv() => match event {
                    Ok(event) if event.event == EVENT_BLOCK_PROPOSED => {
                        if event.payload["chainId"] != validator.chain_id.as_str() {
                            continue;
                        }
                        let block = Block {
                            height: event.payload["height"].as_u64().unwrap_or(0),
                            hash: event.payload["hash"].as_str().unwrap_or_default().to_string(),
                            prev_hash: event.payload["prevHash"]
                                .as_str()
                                .unwrap_or_default()
                                .to_string(),
                            proposer: event.payload["proposer"]
                                .as_str()
                                .unwrap_or("genesis")
                                .to_string(),
                            timestamp: chrono::Utc::now(),
                            txs: Vec::new(),
                        };
                        let announcement = format!(
                            "{} proposed a block at height {}",
                            block.proposer, block.height
                        );
                        let _ = validator
                            .validate_block(llm.as_ref(), &hub, &block, &announcement)
                            .await;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                },
            }
        }
    })
}

/// Process-wide store of live validators, keyed chain → id.
#[derive(Default)]
pub struct ValidatorStore {
    chains: DashMap<String, DashMap<String, Arc<Validator>>>,
}

impl ValidatorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, validator: Arc<Validator>) {
        self.chains
            .entry(validator.chain_id.clone())
            .or_default()
            .insert(validator.id.clone(), validator);
    }

    pub fn by_id(&self, chain_id: &str, id: &str) -> Option<Arc<Validator>> {
        self.chains.get(chain_id)?.get(id).map(|e| Arc::clone(&e))
    }

    pub fn by_name(&self, chain_id: &str, name: &str) -> Option<Arc<Validator>> {
        self.chains
            .get(chain_id)?
            .iter()
            .find(|e| e.value().name == name)
            .map(|e| Arc::clone(e.value()))
    }

    /// All validators on a chain, ordered by id for deterministic iteration.
    pub fn all(&self, chain_id: &str) -> Vec<Arc<Validator>> {
        let mut all: Vec<Arc<Validator>> = match self.chains.get(chain_id) {
            Some(m) => m.iter().map(|e| Arc::clone(e.value())).collect(),
            None => Vec::new(),
        };
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(id: &str, name: &str) -> Arc<Validator> {
        Arc::new(Validator::new(
            id,
            name,
            vec!["analytical".into()],
            "terse",
            vec!["cryptography".into()],
            "a test chain",
            "demo",
            Path::new("/nonexistent-logs-disabled"),
        ))
    }

    #[test]
    fn test_relationship_score_domain() {
        let v = validator("v1", "Ada");
        assert!(v.set_relationship("v2", 0.4).is_ok());
        assert_eq!(v.relationship("v2"), Some(0.4));

        assert!(matches!(
            v.set_relationship("v2", 1.5),
            Err(ConclaveError::InvalidInput(_))
        ));
        assert!(v.set_relationship("v2", -1.0).is_ok());
        assert!(v.set_relationship("v2", 1.0).is_ok());
    }

    #[test]
    fn test_adjust_relationship_clamps() {
        let v = validator("v1", "Ada");
        for _ in 0..100 {
            v.adjust_relationship("v2", 0.1);
        }
        assert_eq!(v.relationship("v2"), Some(1.0));

        for _ in 0..100 {
            v.adjust_relationship("v2", -0.1);
        }
        assert_eq!(v.relationship("v2"), Some(-1.0));
    }

    #[test]
    fn test_store_lookup_by_id_and_name() {
        let store = ValidatorStore::new();
        store.register(validator("v1", "Ada"));
        store.register(validator("v2", "Bea"));

        assert_eq!(store.by_id("demo", "v1").unwrap().name, "Ada");
        assert_eq!(store.by_name("demo", "Bea").unwrap().id, "v2");
        assert!(store.by_id("demo", "v3").is_none());
        assert!(store.by_id("other", "v1").is_none());

        let all = store.all("demo");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "v1");
        assert_eq!(all[1].id, "v2");
    }

    #[test]
    fn test_mood_comes_from_known_vocabulary() {
        let v = validator("v1", "Ada");
        assert!(MOODS.contains(&v.mood().as_str()));
        v.update_mood();
        let mood = v.mood();
        assert!(
            MOODS.contains(&mood.as_str())
                || CONFIDENT_MOODS.contains(&mood.as_str())
                || CAUTIOUS_MOODS.contains(&mood.as_str())
        );
    }
}
