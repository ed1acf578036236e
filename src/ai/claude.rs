//! Claude API integration.
//!
//! Streams the Messages API as server-sent events and keeps only
//! `content_block_delta` text.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::stream::fragments;
use super::{ChatMessage, ChatProvider, CompletionRequest, FragmentStream};
use crate::core::AiConfig;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Claude API provider.
pub struct ClaudeProvider {
    client: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl ClaudeProvider {
    /// Create a new Claude provider.
    ///
    /// Reads API key from ANTHROPIC_API_KEY environment variable.
    pub fn new() -> anyhow::Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| anyhow::anyhow!("ANTHROPIC_API_KEY not set"))?;

        Ok(Self {
            client: Client::new(),
            api_key,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 2048,
            temperature: 0.7,
        })
    }

    /// Create from the `[ai]` config section. Still needs the API key in the environment.
    pub fn from_config(config: &AiConfig) -> anyhow::Result<Self> {
        let mut provider = Self::new()?;
        if let Some(model) = &config.claude.model {
            provider.model = model.clone();
        }
        provider.max_tokens = config.max_tokens;
        provider.temperature = config.temperature;
        Ok(provider)
    }

    /// Create with a specific model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn build_request(&self, request: &CompletionRequest) -> ClaudeRequest {
        ClaudeRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: request.system_prompt.clone(),
            messages: request.conversation(),
            stream: true,
        }
    }
}

#[async_trait]
impl ChatProvider for ClaudeProvider {
    async fn stream_chat(&self, request: &CompletionRequest) -> anyhow::Result<FragmentStream> {
        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&self.build_request(request))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        Ok(fragments(response.bytes_stream()))
    }

    fn name(&self) -> &str {
        "claude"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// Claude API request structure.
#[derive(Debug, Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    system: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> ClaudeProvider {
        ClaudeProvider {
            client: Client::new(),
            api_key: "test-key".to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 512,
            temperature: 0.2,
        }
    }

    #[test]
    #[serial_test::serial]
    fn test_claude_provider_creation_fails_without_key() {
        std::env::remove_var("ANTHROPIC_API_KEY");
        let result = ClaudeProvider::new();
        assert!(result.is_err());
    }

    #[test]
    fn test_request_keeps_system_separate() {
        let request = CompletionRequest::new("coach rules", "I like maps");
        let body = serde_json::to_value(provider().with_model("claude-x").build_request(&request)).unwrap();

        assert_eq!(body["model"], "claude-x");
        assert_eq!(body["system"], "coach rules");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["stream"], true);
    }
}
