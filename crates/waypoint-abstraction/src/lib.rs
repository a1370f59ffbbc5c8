//! Provider abstraction layer for Waypoint.
//!
//! This crate defines the uniform capability every model backend exposes to
//! the routing core, along with the wire types exchanged across that boundary.
//! Concrete HTTP adapters live outside the core; the dispatcher only ever
//! talks to a `dyn Provider`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Represents an error raised by a provider adapter.
///
/// Adapters are expected to surface the HTTP status code when one exists;
/// the dispatcher classifies errors from the status first and falls back to
/// message inspection.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderError {
    /// The backend answered with a non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// The HTTP status code the backend returned.
        status: u16,
        /// The error body or reason phrase.
        message: String,
    },

    /// The attempt exceeded its deadline.
    #[error("request timed out after {elapsed_ms}ms")]
    Timeout {
        /// How long the attempt ran before the deadline fired.
        elapsed_ms: u64,
    },

    /// Connection-level failure before any HTTP response was received.
    #[error("network error: {0}")]
    Network(String),

    /// Anything the adapter could not express more precisely.
    #[error("provider error: {0}")]
    Other(String),
}

impl ProviderError {
    /// Returns the HTTP status code, if this error carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the human-readable message for classification and traces.
    pub fn message(&self) -> String {
        match self {
            Self::Http { message, .. } => message.clone(),
            Self::Timeout { elapsed_ms } => format!("request timed out after {}ms", elapsed_ms),
            Self::Network(msg) | Self::Other(msg) => msg.clone(),
        }
    }
}

/// Represents a message in a conversation with a chat model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message sender (e.g., "user", "assistant", "system").
    pub role: String,
    /// The content of the message.
    pub content: String,
}

impl ChatMessage {
    /// Creates a message with an arbitrary role.
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: role.into(), content: content.into() }
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }

    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }
}

/// Requested shape of the completion body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseFormat {
    /// Free-form text (the default).
    Text,
    /// The backend must return a valid JSON document.
    Json,
}

/// Options for a single chat completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOptions {
    /// The model identifier to invoke.
    pub model: String,

    /// The conversation history, oldest first.
    pub messages: Vec<ChatMessage>,

    /// Sampling temperature, between 0 and 2. Higher values mean the model
    /// will take more risks.
    pub temperature: Option<f32>,

    /// The maximum number of tokens to generate.
    pub max_tokens: Option<u32>,

    /// Requested response body shape.
    pub response_format: Option<ResponseFormat>,
}

impl ChatOptions {
    /// Creates options for the given model and messages with default sampling.
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            response_format: None,
        }
    }
}

/// Token usage reported by a provider for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of tokens in the prompt.
    pub input_tokens: u32,

    /// Number of tokens in the completion.
    pub output_tokens: u32,
}

impl TokenUsage {
    /// Total tokens consumed by the call.
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Why the backend stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishReason {
    /// The model produced a natural stop.
    Stop,
    /// The completion hit the max-token limit.
    Length,
    /// The backend filtered the content.
    ContentFilter,
    /// Any other backend-specific reason.
    Other(String),
}

/// The response from a chat completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The generated content.
    pub content: String,

    /// Optional: usage statistics for the request.
    pub usage: Option<TokenUsage>,

    /// Why generation stopped.
    pub finish_reason: FinishReason,
}

/// Uniform capability a model backend exposes to the routing core.
///
/// All providers must be `Send + Sync` to allow concurrent use across tasks.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable provider name (e.g., "anthropic", "openai"), used for registry
    /// keying and exclusion lists.
    fn name(&self) -> &str;

    /// Executes one chat completion against the backend.
    ///
    /// # Errors
    /// Returns a `ProviderError` if the call fails; the dispatcher classifies
    /// the error and walks the fallback chain.
    async fn chat(&self, options: ChatOptions) -> Result<ChatResponse, ProviderError>;

    /// Liveness probe. Used for capacity checks only, never on the request
    /// hot path.
    async fn is_available(&self) -> bool {
        true
    }
}
