//! Fallback-executing dispatcher.
//!
//! Walks one request through its attempt sequence: the preferred model
//! first, then the ordered fallback list, then exactly one guaranteed safe
//! model. Every provider failure is classified and appended to the trace;
//! every attempt (success or failure) is recorded with the benchmark
//! aggregator. Provider calls are the only awaits, each bounded by the
//! role's latency ceiling; no lock is held across them.

use crate::bench::{BenchmarkAggregator, BenchmarkRun};
use crate::config::RouterConfig;
use crate::registry::{ModelConfig, ModelRegistry};
use crate::types::{AgentRole, ErrorKind, FallbackAttempt, FallbackTrace, RouteDecision};
use crate::{Result, RouterError};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use waypoint_abstraction::{ChatMessage, ChatOptions, ChatResponse, ProviderError, TokenUsage};
use waypoint_providers::ProviderRegistry;

/// Classifies a provider error into the fallback taxonomy.
///
/// The HTTP status decides when present; otherwise the message is
/// inspected. Every classified kind is fallback-eligible.
pub fn classify_error(error: &ProviderError) -> ErrorKind {
    match error {
        ProviderError::Timeout { .. } => ErrorKind::Timeout,
        ProviderError::Network(_) => ErrorKind::Network,
        ProviderError::Http { status, message } => match status {
            429 => ErrorKind::RateLimit,
            401 | 403 => ErrorKind::Auth,
            400 => ErrorKind::BadRequest,
            500..=599 => ErrorKind::Server,
            _ => classify_message(message),
        },
        ProviderError::Other(message) => classify_message(message),
    }
}

fn classify_message(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    if lower.contains("rate limit") || lower.contains("too many requests") {
        ErrorKind::RateLimit
    } else if lower.contains("unauthorized")
        || lower.contains("invalid key")
        || lower.contains("api key")
        || lower.contains("forbidden")
    {
        ErrorKind::Auth
    } else if lower.contains("timed out") || lower.contains("timeout") {
        ErrorKind::Timeout
    } else if lower.contains("connection") || lower.contains("network") {
        ErrorKind::Network
    } else if lower.contains("bad request") {
        ErrorKind::BadRequest
    } else if lower.contains("internal server")
        || lower.contains("overloaded")
        || lower.contains("unavailable")
    {
        ErrorKind::Server
    } else {
        ErrorKind::Unknown
    }
}

/// Per-call overrides; unset fields fall back to role defaults.
#[derive(Debug, Clone, Default)]
pub struct CallOverrides {
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Completion token cap.
    pub max_tokens: Option<u32>,
    /// Per-attempt deadline in milliseconds.
    pub max_latency_ms: Option<u64>,
}

/// Result of walking one request's attempt sequence.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// Whether any attempt succeeded.
    pub success: bool,
    /// The winning response body.
    pub content: Option<String>,
    /// Token usage of the winning attempt.
    pub usage: Option<TokenUsage>,
    /// Model that served the request.
    pub model_used: Option<String>,
    /// Provider that served the request.
    pub provider_used: Option<String>,
    /// The role actually served; the safe-fallback role when the request
    /// was rescued by the safe model.
    pub role_served: AgentRole,
    /// How many fallback attempts ran before success.
    pub fallbacks_used: u32,
    /// The full attempt record.
    pub trace: FallbackTrace,
    /// The terminal failure, when every attempt failed.
    pub terminal_error: Option<FallbackAttempt>,
}

enum AttemptOutcome {
    Success(ChatResponse, u64),
    Failure(FallbackAttempt),
}

/// Executes attempt sequences against the provider registry.
pub struct Dispatcher {
    registry: Arc<ModelRegistry>,
    providers: Arc<ProviderRegistry>,
    config: Arc<RouterConfig>,
    bench: Arc<BenchmarkAggregator>,
}

impl Dispatcher {
    /// Creates a dispatcher over the given collaborators.
    pub fn new(
        registry: Arc<ModelRegistry>,
        providers: Arc<ProviderRegistry>,
        config: Arc<RouterConfig>,
        bench: Arc<BenchmarkAggregator>,
    ) -> Self {
        Self { registry, providers, config, bench }
    }

    /// Executes a router decision: preferred model, then its fallback list.
    pub async fn execute_decision(
        &self,
        decision: &RouteDecision,
        role: AgentRole,
        messages: &[ChatMessage],
        overrides: &CallOverrides,
        cancel: Option<&CancellationToken>,
    ) -> Result<DispatchOutcome> {
        let mut chain = vec![decision.preferred.clone()];
        for id in &decision.fallbacks {
            if !chain.contains(id) {
                chain.push(id.clone());
            }
        }
        self.run_chain(&chain, role, messages, overrides, cancel).await
    }

    /// Executes the role's static model chain (primary + configured
    /// fallbacks), skipping the tier-aware router entirely.
    pub async fn execute_role(
        &self,
        role: AgentRole,
        messages: &[ChatMessage],
        overrides: &CallOverrides,
        cancel: Option<&CancellationToken>,
    ) -> Result<DispatchOutcome> {
        let role_config = self.config.role_config(role)?;
        let mut chain = vec![role_config.primary.clone()];
        for id in &role_config.fallbacks {
            if !chain.contains(id) {
                chain.push(id.clone());
            }
        }
        self.run_chain(&chain, role, messages, overrides, cancel).await
    }

    /// Liveness probe over every registered provider. Off the hot path.
    pub async fn available_providers(&self) -> Vec<(String, bool)> {
        let mut results = Vec::new();
        for name in self.providers.names() {
            let available = match self.providers.get(&name) {
                Some(provider) => provider.is_available().await,
                None => false,
            };
            results.push((name, available));
        }
        results
    }

    async fn run_chain(
        &self,
        chain: &[String],
        role: AgentRole,
        messages: &[ChatMessage],
        overrides: &CallOverrides,
        cancel: Option<&CancellationToken>,
    ) -> Result<DispatchOutcome> {
        let role_config = self.config.role_config(role)?;
        let deadline =
            Duration::from_millis(overrides.max_latency_ms.unwrap_or(role_config.max_latency_ms));
        let temperature = overrides.temperature.unwrap_or_else(|| role.default_temperature());

        // Resolve the whole chain up front: an unknown model id is a
        // configuration error, surfaced before any network attempt.
        let models: Vec<&ModelConfig> = chain
            .iter()
            .map(|id| {
                self.registry.get(id).ok_or_else(|| RouterError::UnknownModel(id.clone()))
            })
            .collect::<Result<_>>()?;

        let primary = models[0];
        let mut trace = FallbackTrace::new(primary.id.clone(), primary.provider.clone());
        let chain_started = Instant::now();

        for (index, model) in models.iter().enumerate() {
            match self
                .attempt(model, role, messages, temperature, overrides.max_tokens, deadline, cancel)
                .await?
            {
                AttemptOutcome::Success(response, _) => {
                    return Ok(Self::success_outcome(
                        trace,
                        chain_started,
                        model,
                        role,
                        index as u32,
                        response,
                    ));
                }
                AttemptOutcome::Failure(attempt) => trace.attempts.push(attempt),
            }
        }

        // Every configured model failed: one guaranteed safe attempt, unless
        // the safe model was already part of the chain.
        let safe_id = &self.config.safe_fallback_model;
        if !chain.contains(safe_id) {
            let safe = self
                .registry
                .get(safe_id)
                .ok_or_else(|| RouterError::UnknownModel(safe_id.clone()))?;
            match self
                .attempt(safe, role, messages, temperature, overrides.max_tokens, deadline, cancel)
                .await?
            {
                AttemptOutcome::Success(response, _) => {
                    let fallbacks_used = trace.attempts.len() as u32;
                    let mut outcome = Self::success_outcome(
                        trace,
                        chain_started,
                        safe,
                        role,
                        fallbacks_used,
                        response,
                    );
                    outcome.role_served = AgentRole::SafeFallback;
                    return Ok(outcome);
                }
                AttemptOutcome::Failure(attempt) => trace.attempts.push(attempt),
            }
        }

        trace.total_attempts = trace.attempts.len() as u32;
        trace.total_latency_ms = chain_started.elapsed().as_millis() as u64;
        let terminal_error = trace.attempts.last().cloned();

        warn!(
            role = %role,
            attempts = trace.total_attempts,
            "every model in the chain failed, including the safe fallback"
        );

        Ok(DispatchOutcome {
            success: false,
            content: None,
            usage: None,
            model_used: None,
            provider_used: None,
            role_served: role,
            fallbacks_used: (trace.attempts.len() as u32).saturating_sub(1),
            trace,
            terminal_error,
        })
    }

    fn success_outcome(
        mut trace: FallbackTrace,
        chain_started: Instant,
        model: &ModelConfig,
        role: AgentRole,
        fallbacks_used: u32,
        response: ChatResponse,
    ) -> DispatchOutcome {
        trace.final_model = Some(model.id.clone());
        trace.final_provider = Some(model.provider.clone());
        trace.total_attempts = trace.attempts.len() as u32 + 1;
        trace.total_latency_ms = chain_started.elapsed().as_millis() as u64;

        DispatchOutcome {
            success: true,
            content: Some(response.content),
            usage: response.usage,
            model_used: Some(model.id.clone()),
            provider_used: Some(model.provider.clone()),
            role_served: role,
            fallbacks_used,
            trace,
            terminal_error: None,
        }
    }

    /// Runs one attempt against one model, bounded by the deadline.
    ///
    /// Classified failures come back as `AttemptOutcome::Failure`; only
    /// configuration errors and caller cancellation escape as `Err`.
    #[allow(clippy::too_many_arguments)]
    async fn attempt(
        &self,
        model: &ModelConfig,
        role: AgentRole,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: Option<u32>,
        deadline: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<AttemptOutcome> {
        let provider = self
            .providers
            .get(&model.provider)
            .ok_or_else(|| RouterError::ProviderNotRegistered(model.provider.clone()))?;

        let mut options = ChatOptions::new(model.id.clone(), messages.to_vec());
        options.temperature = Some(temperature);
        options.max_tokens = max_tokens;

        let started = Instant::now();
        let call = provider.chat(options);
        let result = if let Some(token) = cancel {
            tokio::select! {
                // Abandoned caller: stop the in-flight attempt and record
                // nothing; partial accounting is simply dropped.
                () = token.cancelled() => return Err(RouterError::Cancelled),
                result = tokio::time::timeout(deadline, call) => result,
            }
        } else {
            tokio::time::timeout(deadline, call).await
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(response)) => {
                let usage = response.usage.unwrap_or(TokenUsage {
                    input_tokens: 0,
                    output_tokens: 0,
                });
                let cost_usd = self
                    .registry
                    .estimate_cost(&model.id, usage.input_tokens, usage.output_tokens)
                    .unwrap_or(0.0);
                info!(
                    role = %role,
                    model = %model.id,
                    provider = %model.provider,
                    outcome = "success",
                    latency_ms,
                    cost_usd,
                    "attempt completed"
                );
                self.record_run(model, role, latency_ms, usage, cost_usd, true);
                Ok(AttemptOutcome::Success(response, latency_ms))
            }
            Ok(Err(error)) => {
                let kind = classify_error(&error);
                let message = error.message();
                info!(
                    role = %role,
                    model = %model.id,
                    provider = %model.provider,
                    outcome = "failure",
                    error_kind = %kind,
                    latency_ms,
                    "attempt failed"
                );
                self.record_run(
                    model,
                    role,
                    latency_ms,
                    TokenUsage { input_tokens: 0, output_tokens: 0 },
                    0.0,
                    false,
                );
                Ok(AttemptOutcome::Failure(FallbackAttempt {
                    model: model.id.clone(),
                    provider: model.provider.clone(),
                    error: kind,
                    message,
                    latency_ms: Some(latency_ms),
                }))
            }
            Err(_elapsed) => {
                // Deadline overrun is treated identically to a
                // provider-thrown timeout.
                info!(
                    role = %role,
                    model = %model.id,
                    provider = %model.provider,
                    outcome = "failure",
                    error_kind = %ErrorKind::Timeout,
                    latency_ms,
                    "attempt exceeded the role deadline"
                );
                self.record_run(
                    model,
                    role,
                    latency_ms,
                    TokenUsage { input_tokens: 0, output_tokens: 0 },
                    0.0,
                    false,
                );
                Ok(AttemptOutcome::Failure(FallbackAttempt {
                    model: model.id.clone(),
                    provider: model.provider.clone(),
                    error: ErrorKind::Timeout,
                    message: format!("attempt exceeded {}ms deadline", deadline.as_millis()),
                    latency_ms: Some(latency_ms),
                }))
            }
        }
    }

    /// Benchmark recording; must never raise into the routing result.
    fn record_run(
        &self,
        model: &ModelConfig,
        role: AgentRole,
        latency_ms: u64,
        usage: TokenUsage,
        cost_usd: f64,
        success: bool,
    ) {
        self.bench.record_run(BenchmarkRun {
            model: model.id.clone(),
            task: role,
            timestamp: Utc::now(),
            latency_ms,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cost_usd,
            success,
            quality_score: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_status_codes() {
        let http = |status: u16| ProviderError::Http { status, message: "x".to_string() };
        assert_eq!(classify_error(&http(429)), ErrorKind::RateLimit);
        assert_eq!(classify_error(&http(401)), ErrorKind::Auth);
        assert_eq!(classify_error(&http(403)), ErrorKind::Auth);
        assert_eq!(classify_error(&http(400)), ErrorKind::BadRequest);
        assert_eq!(classify_error(&http(500)), ErrorKind::Server);
        assert_eq!(classify_error(&http(503)), ErrorKind::Server);
    }

    #[test]
    fn classifies_messages_when_status_is_unhelpful() {
        let other = |msg: &str| ProviderError::Other(msg.to_string());
        assert_eq!(classify_error(&other("Rate limit reached")), ErrorKind::RateLimit);
        assert_eq!(classify_error(&other("invalid key supplied")), ErrorKind::Auth);
        assert_eq!(classify_error(&other("request timed out")), ErrorKind::Timeout);
        assert_eq!(classify_error(&other("connection reset")), ErrorKind::Network);
        assert_eq!(classify_error(&other("model overloaded")), ErrorKind::Server);
        assert_eq!(classify_error(&other("injected test failure")), ErrorKind::Unknown);
    }

    #[test]
    fn classifies_transport_variants() {
        assert_eq!(
            classify_error(&ProviderError::Timeout { elapsed_ms: 10 }),
            ErrorKind::Timeout
        );
        assert_eq!(
            classify_error(&ProviderError::Network("refused".to_string())),
            ErrorKind::Network
        );
    }
}
