//! LLM provider seam
//!
//! The provider's entire surface is prompt → completion string. Calls carry
//! an explicit timeout so a stalled provider can never hold a consensus hook
//! past the engine deadline; callers fall back to their reject/no-support
//! default when `complete` errors out.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::LlmArgs;
use crate::types::{ConclaveError, Result};

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// OpenAI-compatible chat-completions client.
pub struct HttpLlmClient {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: String,
}

impl HttpLlmClient {
    pub fn new(args: &LlmArgs) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(args.llm_timeout_secs))
            .build()
            .map_err(|e| ConclaveError::Internal(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            url: args.llm_url.clone(),
            model: args.llm_model.clone(),
            api_key: args.llm_api_key.clone(),
        })
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            warn!("LLM request failed: {}", e);
            ConclaveError::Internal(format!("llm request: {}", e))
        })?;

        if !response.status().is_success() {
            return Err(ConclaveError::Internal(format!(
                "llm provider returned {}",
                response.status()
            )));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ConclaveError::Internal(format!("llm response: {}", e)))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ConclaveError::Internal("llm returned no choices".into()))?;

        debug!(chars = content.len(), "LLM completion received");
        Ok(strip_code_fences(&content))
    }
}

/// Providers often wrap JSON answers in markdown fences; strip them so the
/// deliberator can parse the payload directly.
fn strip_code_fences(s: &str) -> String {
    let trimmed = s.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // Skip an optional language tag on the opening fence
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches(['\r', '\n']);
    match rest.rfind("```") {
        Some(end) => rest[..end].trim().to_string(),
        None => rest.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
    }
}
