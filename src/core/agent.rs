//! Agent identity — the logical AI participant behind a validator

use serde::{Deserialize, Serialize};

/// Role an agent plays on its chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Producer,
    Validator,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Producer => "producer",
            AgentRole::Validator => "validator",
        }
    }
}

impl std::str::FromStr for AgentRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "producer" => Ok(AgentRole::Producer),
            "validator" => Ok(AgentRole::Validator),
            other => Err(format!("unknown agent role: {}", other)),
        }
    }
}

/// A logical AI participant. The validator address is bound once the agent's
/// `register_validator` transaction commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub role: AgentRole,
    #[serde(default)]
    pub traits: Vec<String>,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub influences: Vec<String>,
    #[serde(default)]
    pub mood: String,
    /// Hex validator address, set when the registration tx commits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator_address: Option<String>,
    #[serde(default)]
    pub is_validator: bool,
}

impl Agent {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: AgentRole) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
            traits: Vec::new(),
            style: String::new(),
            influences: Vec::new(),
            mood: String::new(),
            validator_address: None,
            is_validator: false,
        }
    }

    pub fn with_traits(mut self, traits: Vec<String>) -> Self {
        self.traits = traits;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        assert_eq!("validator".parse::<AgentRole>().unwrap(), AgentRole::Validator);
        assert_eq!("producer".parse::<AgentRole>().unwrap(), AgentRole::Producer);
        assert!("oracle".parse::<AgentRole>().is_err());
    }

    #[test]
    fn test_agent_serde_defaults() {
        let json = r#"{"id":"a1","name":"Ada","role":"validator"}"#;
        let agent: Agent = serde_json::from_str(json).unwrap();
        assert_eq!(agent.id, "a1");
        assert!(agent.traits.is_empty());
        assert!(agent.validator_address.is_none());
        assert!(!agent.is_validator);
    }
}
