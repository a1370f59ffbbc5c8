//! Core types for the routing system.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Task role a request is routed as.
///
/// Each role maps to exactly one static [`RoleModelConfig`](crate::config::RoleModelConfig);
/// the mapping is startup configuration, never derived at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentRole {
    /// Short conversational exchanges.
    LightChat,
    /// Project and feature planning.
    Planning,
    /// UX/UI ideation and design discussion.
    UxIdeation,
    /// Writing new code.
    CodeGeneration,
    /// Reviewing or debugging existing code.
    CodeReview,
    /// Long-form analysis over large inputs.
    ComplexAnalysis,
    /// Cheap background work (summaries, titles, labels).
    FastBackground,
    /// The guaranteed last-resort role.
    SafeFallback,
}

impl AgentRole {
    /// All roles, in configuration order.
    pub const ALL: [Self; 8] = [
        Self::LightChat,
        Self::Planning,
        Self::UxIdeation,
        Self::CodeGeneration,
        Self::CodeReview,
        Self::ComplexAnalysis,
        Self::FastBackground,
        Self::SafeFallback,
    ];

    /// Converts a kebab-case string to a role.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "light-chat" => Some(Self::LightChat),
            "planning" => Some(Self::Planning),
            "ux-ideation" => Some(Self::UxIdeation),
            "code-generation" => Some(Self::CodeGeneration),
            "code-review" => Some(Self::CodeReview),
            "complex-analysis" => Some(Self::ComplexAnalysis),
            "fast-background" => Some(Self::FastBackground),
            "safe-fallback" => Some(Self::SafeFallback),
            _ => None,
        }
    }

    /// Default sampling temperature when the caller does not override it.
    ///
    /// Code tasks run cold; conversational and ideation tasks run warm.
    pub fn default_temperature(self) -> f32 {
        match self {
            Self::CodeGeneration => 0.2,
            Self::CodeReview | Self::FastBackground => 0.3,
            Self::ComplexAnalysis => 0.4,
            Self::SafeFallback => 0.5,
            Self::Planning => 0.7,
            Self::LightChat => 0.8,
            Self::UxIdeation => 0.9,
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LightChat => "light-chat",
            Self::Planning => "planning",
            Self::UxIdeation => "ux-ideation",
            Self::CodeGeneration => "code-generation",
            Self::CodeReview => "code-review",
            Self::ComplexAnalysis => "complex-analysis",
            Self::FastBackground => "fast-background",
            Self::SafeFallback => "safe-fallback",
        };
        write!(f, "{}", name)
    }
}

/// Tenant subscription tier, constraining model access and spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserTier {
    /// Free plan: no premium models, tight ceilings.
    Free,
    /// Paid plan: premium models, moderate ceilings.
    Pro,
    /// Contract plan: premium models, wide ceilings.
    Enterprise,
}

impl UserTier {
    /// All tiers, cheapest first.
    pub const ALL: [Self; 3] = [Self::Free, Self::Pro, Self::Enterprise];

    /// Converts a string to a tier.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "free" => Some(Self::Free),
            "pro" => Some(Self::Pro),
            "enterprise" => Some(Self::Enterprise),
            _ => None,
        }
    }
}

impl fmt::Display for UserTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Pro => write!(f, "pro"),
            Self::Enterprise => write!(f, "enterprise"),
        }
    }
}

/// Request-level hint biasing selection toward cheaper or more capable models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criticality {
    /// Cost-biased: pick the cheapest eligible model.
    Low,
    /// Balanced (the default).
    #[default]
    Medium,
    /// Capability-biased.
    High,
    /// Capability-biased, user-blocking work.
    Critical,
}

impl fmt::Display for Criticality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Hard and soft constraints applied during route selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteConstraints {
    /// Providers that must not be used.
    pub excluded_providers: Vec<String>,
    /// The chosen model must support vision input.
    pub require_vision: bool,
    /// The chosen model must support streaming output.
    pub require_streaming: bool,
    /// Skip selection entirely and use this model.
    pub force_model: Option<String>,
}

/// Everything the router needs to produce a decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingContext {
    /// Task role to route.
    pub role: AgentRole,
    /// Tenant tier.
    pub tier: UserTier,
    /// Selection bias.
    pub criticality: Criticality,
    /// Estimated prompt size in tokens.
    pub estimated_input_tokens: u32,
    /// Estimated completion size in tokens.
    pub estimated_output_tokens: u32,
    /// Hard/soft constraints.
    pub constraints: RouteConstraints,
}

impl RoutingContext {
    /// Creates a context with medium criticality, small token estimates, and
    /// no constraints.
    pub fn new(role: AgentRole, tier: UserTier) -> Self {
        Self {
            role,
            tier,
            criticality: Criticality::default(),
            estimated_input_tokens: 500,
            estimated_output_tokens: 500,
            constraints: RouteConstraints::default(),
        }
    }
}

/// The router's output: one preferred model plus an ordered fallback list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDecision {
    /// The model to attempt first. Always satisfies every hard constraint.
    pub preferred: String,
    /// Ordered fallback model ids.
    pub fallbacks: Vec<String>,
    /// Human-readable explanation of the selection.
    pub reason: String,
}

/// Classified provider failure, derived from status codes and messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 429 or a rate-limit message.
    RateLimit,
    /// 401/403 or an auth message.
    Auth,
    /// Deadline overrun or an explicit timeout signal.
    Timeout,
    /// 5xx.
    Server,
    /// 400.
    BadRequest,
    /// Connection-level failure.
    Network,
    /// Anything else, including injected test failures.
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RateLimit => "rate_limit",
            Self::Auth => "auth_error",
            Self::Timeout => "timeout",
            Self::Server => "server_error",
            Self::BadRequest => "bad_request",
            Self::Network => "network",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// One failed attempt in a fallback chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackAttempt {
    /// Model that was attempted.
    pub model: String,
    /// Provider that served the attempt.
    pub provider: String,
    /// Classified failure.
    pub error: ErrorKind,
    /// Raw error message from the provider.
    pub message: String,
    /// How long the attempt ran, when known.
    pub latency_ms: Option<u64>,
}

/// The complete ordered record of every attempt made for one request.
///
/// Built once per request and never mutated after the request completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackTrace {
    /// The model attempted first.
    pub primary_model: String,
    /// The provider of the primary model.
    pub primary_provider: String,
    /// Every failed attempt, in order.
    pub attempts: Vec<FallbackAttempt>,
    /// Model that finally served the request, if any succeeded.
    pub final_model: Option<String>,
    /// Provider that finally served the request.
    pub final_provider: Option<String>,
    /// Total number of attempts, including the successful one.
    pub total_attempts: u32,
    /// Wall time across the whole chain.
    pub total_latency_ms: u64,
}

impl FallbackTrace {
    /// Starts a trace for the given primary model.
    pub fn new(primary_model: impl Into<String>, primary_provider: impl Into<String>) -> Self {
        Self {
            primary_model: primary_model.into(),
            primary_provider: primary_provider.into(),
            attempts: Vec::new(),
            final_model: None,
            final_provider: None,
            total_attempts: 0,
            total_latency_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_strings() {
        for role in AgentRole::ALL {
            assert_eq!(AgentRole::from_str(&role.to_string()), Some(role));
        }
        assert_eq!(AgentRole::from_str("nonsense"), None);
    }

    #[test]
    fn tier_round_trips_through_strings() {
        for tier in UserTier::ALL {
            assert_eq!(UserTier::from_str(&tier.to_string()), Some(tier));
        }
    }

    #[test]
    fn code_roles_run_colder_than_chat() {
        assert!(
            AgentRole::CodeGeneration.default_temperature()
                < AgentRole::LightChat.default_temperature()
        );
    }

    #[test]
    fn error_kind_display_is_snake_case() {
        assert_eq!(ErrorKind::RateLimit.to_string(), "rate_limit");
        assert_eq!(ErrorKind::Auth.to_string(), "auth_error");
        assert_eq!(ErrorKind::Server.to_string(), "server_error");
    }
}
