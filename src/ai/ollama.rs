//! Ollama local LLM integration.
//!
//! Streams `/api/chat` responses, one JSON object per line.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::stream::fragments;
use super::{ChatMessage, ChatProvider, CompletionRequest, FragmentStream, Role};
use crate::core::AiConfig;

const DEFAULT_HOST: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.2";

/// Ollama API provider for local LLM.
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaProvider {
    /// Create a new Ollama provider with default settings.
    ///
    /// Honors `OLLAMA_HOST` and `OLLAMA_MODEL`, else localhost:11434.
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: std::env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
            model: std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            temperature: 0.7,
        }
    }

    /// Create from the `[ai]` config section; unset fields keep the env defaults.
    pub fn from_config(config: &AiConfig) -> Self {
        let mut provider = Self::new();
        if let Some(url) = &config.ollama.base_url {
            provider = provider.with_base_url(url.clone());
        }
        if let Some(model) = &config.ollama.model {
            provider = provider.with_model(model.clone());
        }
        provider.temperature = config.temperature;
        provider
    }

    /// Create with a specific base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Create with a specific model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn build_request(&self, request: &CompletionRequest) -> OllamaChatRequest {
        let mut messages = vec![ChatMessage { role: Role::System, content: request.system_prompt.clone() }];
        messages.extend(request.conversation());
        OllamaChatRequest {
            model: self.model.clone(),
            messages,
            stream: true,
            options: OllamaOptions { temperature: self.temperature },
        }
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatProvider for OllamaProvider {
    async fn stream_chat(&self, request: &CompletionRequest) -> anyhow::Result<FragmentStream> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&self.build_request(request))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama API error ({}): {}", status, body);
        }

        Ok(fragments(response.bytes_stream()))
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn is_available(&self) -> bool {
        // Try to reach the Ollama API
        let result = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(std::time::Duration::from_secs(2))
            .send()
            .await;

        result.is_ok()
    }
}

/// Ollama chat request structure.
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_provider_creation() {
        let provider = OllamaProvider::new();
        assert_eq!(provider.name(), "ollama");
    }

    #[test]
    fn test_ollama_with_custom_url() {
        let provider = OllamaProvider::new().with_base_url("http://custom:8080/");
        assert_eq!(provider.base_url, "http://custom:8080");
    }

    #[test]
    fn test_ollama_with_custom_model() {
        let provider = OllamaProvider::new().with_model("mistral");
        assert_eq!(provider.model(), "mistral");
    }

    #[test]
    fn test_chat_request_layout() {
        let provider = OllamaProvider::new().with_model("llama3.2");
        let request = CompletionRequest::new("be kind", "hello")
            .with_history(vec![ChatMessage::assistant("Welcome")]);
        let body = serde_json::to_value(provider.build_request(&request)).unwrap();

        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "assistant");
        assert_eq!(body["messages"][2]["content"], "hello");
    }
}
