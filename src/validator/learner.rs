//! Reinforcement learner
//!
//! Per decision type, tracks policy statistics and an action-value map
//! updated with `Q ← Q + α·(reward − Q)`. Suggestions are ε-greedy over the
//! caller-provided action set.

use rand::Rng;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::Arc;

use super::logger::ValidatorLogger;

const DEFAULT_EXPLORATION_RATE: f64 = 0.2;
const DEFAULT_LEARNING_RATE: f64 = 0.1;

#[derive(Debug, Clone, Default)]
pub struct PolicyStats {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub rate: f64,
}

struct LearnerState {
    policy_stats: HashMap<String, PolicyStats>,
    action_values: HashMap<String, HashMap<String, f64>>,
}

pub struct ReinforcementLearner {
    exploration_rate: f64,
    learning_rate: f64,
    state: Mutex<LearnerState>,
    logger: Arc<ValidatorLogger>,
}

impl ReinforcementLearner {
    pub fn new(logger: Arc<ValidatorLogger>) -> Self {
        logger.learning(
            "Initialize",
            &format!(
                "Created learner with exploration rate {:.2}",
                DEFAULT_EXPLORATION_RATE
            ),
        );
        Self {
            exploration_rate: DEFAULT_EXPLORATION_RATE,
            learning_rate: DEFAULT_LEARNING_RATE,
            state: Mutex::new(LearnerState {
                policy_stats: HashMap::new(),
                action_values: HashMap::new(),
            }),
            logger,
        }
    }

    /// Override ε. Used by tests to force pure exploitation or exploration.
    pub fn with_exploration_rate(mut self, rate: f64) -> Self {
        self.exploration_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Record one decision outcome: updates policy stats and the Q-value for
    /// the chosen action.
    pub fn record_outcome(&self, decision_type: &str, action: &str, outcome: &str, reward: f64) {
        let mut state = self.state.lock().expect("learner lock poisoned");

        let stats = state
            .policy_stats
            .entry(decision_type.to_string())
            .or_default();
        stats.attempts += 1;
        if reward > 0.0 {
            stats.successes += 1;
        } else {
            stats.failures += 1;
        }
        stats.rate = stats.successes as f64 / stats.attempts as f64;

        let values = state
            .action_values
            .entry(decision_type.to_string())
            .or_default();
        let current = values.get(action).copied().unwrap_or(0.0);
        let updated = current + self.learning_rate * (reward - current);
        values.insert(action.to_string(), updated);

        self.logger.learning(
            "Update",
            &format!(
                "{} action '{}' value {:.3} -> {:.3} (reward {:.2}, outcome {})",
                decision_type, action, current, updated, reward, outcome
            ),
        );
    }

    /// ε-greedy suggestion restricted to the available actions. With no
    /// prior information the pick is uniform.
    pub fn suggest(&self, decision_type: &str, available: &[String]) -> Option<String> {
        if available.is_empty() {
            return None;
        }

        let mut rng = rand::thread_rng();
        if rng.gen::<f64>() < self.exploration_rate {
            let pick = available[rng.gen_range(0..available.len())].clone();
            self.logger.learning(
                "Explore",
                &format!("{}: randomly chose '{}'", decision_type, pick),
            );
            return Some(pick);
        }

        let state = self.state.lock().expect("learner lock poisoned");
        let best = state.action_values.get(decision_type).and_then(|values| {
            available
                .iter()
                .filter_map(|a| values.get(a).map(|q| (a, *q)))
                .max_by(|(_, qa), (_, qb)| qa.total_cmp(qb))
                .map(|(a, _)| a.clone())
        });
        drop(state);

        match best {
            Some(action) => {
                self.logger
                    .learning("Exploit", &format!("{}: chose '{}'", decision_type, action));
                Some(action)
            }
            None => {
                let pick = available[rng.gen_range(0..available.len())].clone();
                self.logger.learning(
                    "Default",
                    &format!("{}: no prior experience, chose '{}'", decision_type, pick),
                );
                Some(pick)
            }
        }
    }

    pub fn policy_stats(&self, decision_type: &str) -> Option<PolicyStats> {
        self.state
            .lock()
            .expect("learner lock poisoned")
            .policy_stats
            .get(decision_type)
            .cloned()
    }

    pub fn action_value(&self, decision_type: &str, action: &str) -> Option<f64> {
        self.state
            .lock()
            .expect("learner lock poisoned")
            .action_values
            .get(decision_type)?
            .get(action)
            .copied()
    }
}
