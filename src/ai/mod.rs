//! AI collaborators.
//!
//! The session engine talks to models through narrow traits:
//!
//! - [`ChatProvider`] - streamed conversational completion
//! - [`PhaseSummarizer`], [`OverlapComputer`], [`WhyExtractor`] - one-shot
//!   structured analysis, implemented by [`LlmAnalyst`] on top of any chat provider
//!
//! Concrete HTTP providers (Ollama, Claude) are behind the `ai` feature.

mod analysis;
pub mod prompts;
mod stream;

#[cfg(feature = "ai")]
mod claude;
#[cfg(feature = "ai")]
mod ollama;

pub use analysis::{
    parse_overlaps, parse_phase_summary, parse_strengths, parse_why_extraction, CandidateStrength,
    LlmAnalyst, OverlapComputer, OverlapRequest, PhaseSummarizer, PhaseSummary, WhyExtraction,
    WhyExtractor,
};
pub use stream::{decode_fragment, LineBuffer, WireFragment};

#[cfg(feature = "ai")]
pub use claude::ClaudeProvider;
#[cfg(feature = "ai")]
pub use ollama::OllamaProvider;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a chat history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Everything a provider needs to produce one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub history: Vec<ChatMessage>,
    pub user_message: String,
}

impl CompletionRequest {
    pub fn new(system_prompt: impl Into<String>, user_message: impl Into<String>) -> Self {
        Self { system_prompt: system_prompt.into(), history: Vec::new(), user_message: user_message.into() }
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    /// History followed by the new user message, without the system prompt.
    pub fn conversation(&self) -> Vec<ChatMessage> {
        let mut messages = self.history.clone();
        messages.push(ChatMessage::user(self.user_message.clone()));
        messages
    }
}

/// Text fragments of a streamed response, in order.
pub type FragmentStream = BoxStream<'static, anyhow::Result<String>>;

/// Trait for conversational model providers.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Start a streamed completion. Dropping the stream cancels it.
    async fn stream_chat(&self, request: &CompletionRequest) -> anyhow::Result<FragmentStream>;

    /// Run a completion to the end and return the full text.
    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<String> {
        let mut stream = self.stream_chat(request).await?;
        let mut text = String::new();
        while let Some(fragment) = stream.next().await {
            text.push_str(&fragment?);
        }
        if text.trim().is_empty() {
            return Err(AIError::NoResponse.into());
        }
        Ok(text)
    }

    /// Get the provider name.
    fn name(&self) -> &str;

    /// Model identifier recorded on saved profiles.
    fn model(&self) -> &str;

    /// Check if the provider is available.
    async fn is_available(&self) -> bool;
}

/// AI error types.
#[derive(Debug, thiserror::Error)]
pub enum AIError {
    #[error("Provider not available: {0}")]
    ProviderNotAvailable(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("No response from AI")]
    NoResponse,

    #[error("Model output could not be parsed: {0}")]
    MalformedOutput(String),
}

/// Chat provider chain with fallback support.
///
/// Providers are tried in order; a provider that fails to start a stream is
/// skipped with a warning.
pub struct AIManager {
    providers: Vec<Arc<dyn ChatProvider>>,
}

impl AIManager {
    pub fn new(providers: Vec<Arc<dyn ChatProvider>>) -> Self {
        Self { providers }
    }

    /// Build the chain from configuration, keeping reachable providers only.
    ///
    /// Claude is tried first when an API key is present, then Ollama.
    #[cfg(feature = "ai")]
    pub async fn from_config(config: &crate::core::AiConfig) -> Self {
        let mut candidates: Vec<Arc<dyn ChatProvider>> = Vec::new();

        let prefer_ollama = config.provider.eq_ignore_ascii_case("ollama");
        let claude = ClaudeProvider::from_config(config).ok().map(|p| Arc::new(p) as Arc<dyn ChatProvider>);
        let ollama: Arc<dyn ChatProvider> = Arc::new(OllamaProvider::from_config(config));

        if prefer_ollama {
            candidates.push(ollama);
            candidates.extend(claude);
        } else {
            candidates.extend(claude);
            candidates.push(ollama);
        }

        let mut providers = Vec::new();
        for provider in candidates {
            if provider.is_available().await {
                providers.push(provider);
            } else {
                tracing::debug!(provider = provider.name(), "Provider not reachable");
            }
        }

        Self { providers }
    }

    /// Check if any AI provider is available.
    pub fn is_available(&self) -> bool {
        !self.providers.is_empty()
    }

    /// Get the active provider name.
    pub fn active_provider(&self) -> Option<&str> {
        self.providers.first().map(|p| p.name())
    }
}

#[async_trait]
impl ChatProvider for AIManager {
    async fn stream_chat(&self, request: &CompletionRequest) -> anyhow::Result<FragmentStream> {
        for provider in &self.providers {
            match provider.stream_chat(request).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    tracing::warn!(provider = provider.name(), error = %e, "Provider failed, trying next");
                }
            }
        }

        Err(AIError::ProviderNotAvailable("No AI provider available".to_string()).into())
    }

    fn name(&self) -> &str {
        self.active_provider().unwrap_or("none")
    }

    fn model(&self) -> &str {
        self.providers.first().map_or("none", |p| p.model())
    }

    async fn is_available(&self) -> bool {
        !self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    #[async_trait]
    impl ChatProvider for Failing {
        async fn stream_chat(&self, _: &CompletionRequest) -> anyhow::Result<FragmentStream> {
            anyhow::bail!("connection refused")
        }
        fn name(&self) -> &str {
            "failing"
        }
        fn model(&self) -> &str {
            "none"
        }
        async fn is_available(&self) -> bool {
            true
        }
    }

    struct Canned(&'static [&'static str]);

    #[async_trait]
    impl ChatProvider for Canned {
        async fn stream_chat(&self, _: &CompletionRequest) -> anyhow::Result<FragmentStream> {
            let items: Vec<anyhow::Result<String>> = self.0.iter().map(|s| Ok(s.to_string())).collect();
            Ok(futures::stream::iter(items).boxed())
        }
        fn name(&self) -> &str {
            "canned"
        }
        fn model(&self) -> &str {
            "canned-1"
        }
        async fn is_available(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_conversation_appends_user_message() {
        let request = CompletionRequest::new("sys", "hello")
            .with_history(vec![ChatMessage::assistant("Welcome")]);
        let conversation = request.conversation();
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation[1], ChatMessage::user("hello"));
    }

    #[tokio::test]
    async fn test_empty_manager_is_unavailable() {
        let manager = AIManager::new(Vec::new());
        assert!(!manager.is_available());
        assert_eq!(manager.name(), "none");
        let err = manager.stream_chat(&CompletionRequest::new("s", "u")).await.err().unwrap();
        assert!(err.to_string().contains("No AI provider available"));
    }

    #[tokio::test]
    async fn test_manager_falls_back_to_next_provider() {
        let manager = AIManager::new(vec![Arc::new(Failing), Arc::new(Canned(&["Hel", "lo"]))]);
        let text = manager.complete(&CompletionRequest::new("s", "u")).await.unwrap();
        assert_eq!(text, "Hello");
        assert_eq!(manager.active_provider(), Some("failing"));
    }

    #[tokio::test]
    async fn test_complete_rejects_blank_output() {
        let err = Canned(&["  ", "\n"]).complete(&CompletionRequest::new("s", "u")).await.unwrap_err();
        assert!(err.downcast_ref::<AIError>().is_some());
    }
}
