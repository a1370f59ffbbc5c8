//! In-process providers for testing and development.

use crate::count_tokens;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;
use waypoint_abstraction::{
    ChatOptions, ChatResponse, FinishReason, Provider, ProviderError, TokenUsage,
};

/// A deterministic mock provider that echoes its input.
///
/// Useful for development runs and as the default backend in examples; every
/// call succeeds and reports word-count token usage.
#[derive(Debug)]
pub struct MockProvider {
    name: String,
    /// Optional simulated latency per call.
    latency: Option<Duration>,
}

impl MockProvider {
    /// Creates a mock provider answering to the given provider name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), latency: None }
    }

    /// Adds a fixed simulated latency to every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, options: ChatOptions) -> Result<ChatResponse, ProviderError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        debug!(
            provider = %self.name,
            model = %options.model,
            message_count = options.messages.len(),
            "MockProvider serving chat call"
        );

        let prompt = options
            .messages
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let content = format!("[{}:{}] {}", self.name, options.model, prompt);

        let input_tokens = options
            .messages
            .iter()
            .map(|m| count_tokens(&m.content))
            .sum::<u32>();
        let output_tokens = count_tokens(&content);

        Ok(ChatResponse {
            content,
            usage: Some(TokenUsage { input_tokens, output_tokens }),
            finish_reason: FinishReason::Stop,
        })
    }
}

/// A scripted outcome for one `FlakyProvider` call.
type ScriptedOutcome = Result<String, ProviderError>;

/// A provider whose responses follow a pre-loaded script.
///
/// Each call pops the next scripted outcome; once the script is exhausted,
/// calls succeed with a default response. The call counter lets tests assert
/// exactly how many attempts reached the provider.
pub struct FlakyProvider {
    name: String,
    script: Mutex<VecDeque<ScriptedOutcome>>,
    calls: AtomicU64,
}

impl FlakyProvider {
    /// Creates a provider with an empty script (every call succeeds).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            calls: AtomicU64::new(0),
        }
    }

    /// Appends a successful response to the script.
    pub fn then_ok(self, content: impl Into<String>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(content.into()));
        }
        self
    }

    /// Appends a failure to the script.
    pub fn then_err(self, error: ProviderError) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(error));
        }
        self
    }

    /// Number of calls that reached this provider so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for FlakyProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, options: ChatOptions) -> Result<ChatResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let scripted = self.script.lock().ok().and_then(|mut s| s.pop_front());
        let content = match scripted {
            Some(Ok(content)) => content,
            Some(Err(error)) => {
                debug!(
                    provider = %self.name,
                    model = %options.model,
                    error = %error,
                    "FlakyProvider returning scripted failure"
                );
                return Err(error);
            }
            None => format!("[{}:{}] ok", self.name, options.model),
        };

        let output_tokens = count_tokens(&content);
        let input_tokens = options
            .messages
            .iter()
            .map(|m| count_tokens(&m.content))
            .sum::<u32>();

        Ok(ChatResponse {
            content,
            usage: Some(TokenUsage { input_tokens, output_tokens }),
            finish_reason: FinishReason::Stop,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_abstraction::ChatMessage;

    fn options(model: &str, prompt: &str) -> ChatOptions {
        ChatOptions::new(model, vec![ChatMessage::user(prompt)])
    }

    #[tokio::test]
    async fn mock_provider_echoes_prompt() {
        let provider = MockProvider::new("anthropic");
        let response = provider.chat(options("claude-haiku-4.5", "hello")).await.unwrap();

        assert!(response.content.contains("hello"));
        assert!(response.usage.is_some());
        assert_eq!(response.finish_reason, FinishReason::Stop);
    }

    #[tokio::test]
    async fn flaky_provider_follows_script() {
        let provider = FlakyProvider::new("openai")
            .then_err(ProviderError::Http { status: 429, message: "rate limit".to_string() })
            .then_ok("recovered");

        let first = provider.chat(options("gpt-4o", "x")).await;
        assert!(matches!(first, Err(ProviderError::Http { status: 429, .. })));

        let second = provider.chat(options("gpt-4o", "x")).await.unwrap();
        assert_eq!(second.content, "recovered");

        // Script exhausted: default success.
        let third = provider.chat(options("gpt-4o", "x")).await.unwrap();
        assert!(third.content.contains("ok"));
        assert_eq!(provider.calls(), 3);
    }
}
