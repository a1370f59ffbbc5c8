//! The routing service: the constructible entry point of the core.
//!
//! One `RoutingService` owns every shared-state component (ledger, cache,
//! benchmark buffer) as instance fields, so tests and embedders can build
//! isolated instances instead of sharing hidden globals. Requests flow:
//! intent resolution → tier-aware routing → cost pre-flight (with possible
//! substitution) → cache short-circuit → fallback dispatch → spend
//! accounting and cache fill.

use crate::bench::BenchmarkAggregator;
use crate::budget::{CostOptimizer, RecommendationKind, SpendingRecord};
use crate::cache::ResponseCache;
use crate::config::RouterConfig;
use crate::dispatch::{CallOverrides, Dispatcher};
use crate::intent::{IntentContext, IntentResolution, IntentStrategy, RuleBasedResolver};
use crate::registry::ModelRegistry;
use crate::router::ModelRouter;
use crate::types::{
    AgentRole, Criticality, FallbackTrace, RouteConstraints, RoutingContext, UserTier,
};
use crate::Result;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use waypoint_abstraction::{ChatMessage, TokenUsage};
use waypoint_providers::ProviderRegistry;

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct RouteOptions {
    /// Selection bias.
    pub criticality: Criticality,
    /// Providers that must not be used.
    pub excluded_providers: Vec<String>,
    /// Require vision capability.
    pub require_vision: bool,
    /// Require streaming capability.
    pub require_streaming: bool,
    /// Sampling temperature override.
    pub temperature: Option<f32>,
    /// Completion token cap; also used as the output-size estimate.
    pub max_tokens: Option<u32>,
    /// Path of a file the user attached, if any.
    pub attached_file: Option<String>,
    /// Skip the response cache for this request.
    pub bypass_cache: bool,
}

/// One routing request.
#[derive(Debug, Clone)]
pub struct RoutingRequest {
    /// The user's message for this turn.
    pub message: String,
    /// Prior conversation turns, oldest first.
    pub history: Vec<ChatMessage>,
    /// Pre-resolved role; when absent the intent resolver decides.
    pub role: Option<AgentRole>,
    /// Tenant identifier for budget accounting.
    pub user_id: String,
    /// Tenant tier; defaults to free.
    pub user_tier: Option<UserTier>,
    /// Role resolved for the previous turn of this conversation.
    pub previous_role: Option<AgentRole>,
    /// Skip selection and use this model.
    pub force_model: Option<String>,
    /// Everything else.
    pub options: RouteOptions,
}

impl RoutingRequest {
    /// Creates a request with defaults for everything but tenant and text.
    pub fn new(user_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            history: Vec::new(),
            role: None,
            user_id: user_id.into(),
            user_tier: None,
            previous_role: None,
            force_model: None,
            options: RouteOptions::default(),
        }
    }
}

/// The outcome of one routed request.
#[derive(Debug, Clone)]
pub struct RoutingResult {
    /// Whether a model produced a response.
    pub success: bool,
    /// The response body, on success.
    pub response: Option<String>,
    /// The role the request was served as.
    pub role: AgentRole,
    /// Intent resolution, when the resolver ran.
    pub intent: Option<IntentResolution>,
    /// Model that served the request.
    pub model_used: Option<String>,
    /// Provider that served the request.
    pub provider_used: Option<String>,
    /// Fallback attempts before success.
    pub fallbacks_used: u32,
    /// End-to-end latency.
    pub latency_ms: u64,
    /// Whether the response came from the cache.
    pub cached: bool,
    /// Actual (or estimated) cost of the call.
    pub cost_usd: f64,
    /// Failure description, when `success` is false.
    pub error: Option<String>,
    /// The full attempt record, when the dispatcher ran.
    pub trace: Option<FallbackTrace>,
}

/// Rough token estimate from text length.
///
/// Four characters per token is the usual planning heuristic; exactness is
/// not required because budget enforcement is soft by design.
fn estimate_tokens(text: &str) -> u32 {
    ((text.chars().count() + 3) / 4).max(1) as u32
}

/// The request-routing core, assembled.
pub struct RoutingService {
    registry: Arc<ModelRegistry>,
    config: Arc<RouterConfig>,
    resolver: Box<dyn IntentStrategy>,
    router: ModelRouter,
    optimizer: CostOptimizer,
    cache: ResponseCache,
    dispatcher: Dispatcher,
    bench: Arc<BenchmarkAggregator>,
}

impl RoutingService {
    /// Assembles a service over a catalog, configuration, and providers.
    pub fn new(registry: ModelRegistry, config: RouterConfig, providers: ProviderRegistry) -> Self {
        let registry = Arc::new(registry);
        let config = Arc::new(config);
        let providers = Arc::new(providers);
        let bench = Arc::new(BenchmarkAggregator::new(config.benchmark_capacity));

        Self {
            router: ModelRouter::new(Arc::clone(&registry), Arc::clone(&config)),
            optimizer: CostOptimizer::new(Arc::clone(&registry), Arc::clone(&config)),
            cache: ResponseCache::new(config.cache_ttl),
            dispatcher: Dispatcher::new(
                Arc::clone(&registry),
                providers,
                Arc::clone(&config),
                Arc::clone(&bench),
            ),
            resolver: Box::new(RuleBasedResolver::new()),
            registry,
            config,
            bench,
        }
    }

    /// Replaces the intent resolution strategy.
    pub fn with_resolver(mut self, resolver: Box<dyn IntentStrategy>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Routes one request end to end.
    ///
    /// # Errors
    /// Configuration errors (unknown role, model, or provider) surface as
    /// `Err`. Provider failures and budget denials come back as an `Ok`
    /// result with `success == false` and the failure recorded.
    pub async fn route(&self, request: RoutingRequest) -> Result<RoutingResult> {
        self.route_with_cancel(request, None).await
    }

    /// [`route`](Self::route), with caller cancellation.
    pub async fn route_with_cancel(
        &self,
        request: RoutingRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<RoutingResult> {
        let started = Instant::now();
        let tier = request.user_tier.unwrap_or(UserTier::Free);

        // Resolve the role unless the caller pinned one.
        let (role, intent) = match request.role {
            Some(role) => (role, None),
            None => {
                let context = IntentContext {
                    attached_file: request.options.attached_file.clone(),
                    previous_role: request.previous_role,
                };
                let resolution = self.resolver.resolve(&request.message, &context);
                debug!(
                    role = %resolution.role,
                    confidence = resolution.confidence,
                    reason = %resolution.reason,
                    "intent resolved"
                );
                (resolution.role, Some(resolution))
            }
        };

        let mut messages = request.history.clone();
        messages.push(ChatMessage::user(request.message.clone()));

        let estimated_input: u32 =
            messages.iter().map(|m| estimate_tokens(&m.content)).sum::<u32>();
        let estimated_output = request.options.max_tokens.unwrap_or(1024);

        let context = RoutingContext {
            role,
            tier,
            criticality: request.options.criticality,
            estimated_input_tokens: estimated_input,
            estimated_output_tokens: estimated_output,
            constraints: RouteConstraints {
                excluded_providers: request.options.excluded_providers.clone(),
                require_vision: request.options.require_vision,
                require_streaming: request.options.require_streaming,
                force_model: request.force_model.clone(),
            },
        };

        let mut decision = self.router.route(&context)?;

        // Cost pre-flight: possibly substitute a cheaper capable model, then
        // check the tenant's ceilings against the estimate.
        if request.force_model.is_none() {
            let recommendation = self.optimizer.recommend(
                role,
                &decision.preferred,
                tier,
                estimated_input,
                estimated_output,
            );
            if recommendation.kind == RecommendationKind::Downgrade {
                if let Some(substitute) = recommendation.suggested_model {
                    if substitute != decision.preferred {
                        info!(
                            from = %decision.preferred,
                            to = %substitute,
                            savings_usd = recommendation.estimated_savings_usd,
                            "substituting cheaper model before dispatch"
                        );
                        decision.fallbacks.retain(|id| id != &substitute);
                        let displaced = std::mem::replace(&mut decision.preferred, substitute);
                        if !decision.fallbacks.contains(&displaced) {
                            decision.fallbacks.insert(0, displaced);
                        }
                        decision.reason = format!("{} (cost substitution)", decision.reason);
                    }
                }
            }
        }

        let estimated_cost = self
            .registry
            .estimate_cost(&decision.preferred, estimated_input, estimated_output)
            .unwrap_or(0.0);

        let verdict = self.optimizer.can_proceed(&request.user_id, tier, estimated_cost)?;
        if !verdict.allowed {
            let reason = verdict
                .reason
                .unwrap_or_else(|| "budget exceeded".to_string());
            info!(
                user_id = %request.user_id,
                tier = %tier,
                role = %role,
                "pre-flight budget denial: {}",
                reason
            );
            return Ok(RoutingResult {
                success: false,
                response: None,
                role,
                intent,
                model_used: None,
                provider_used: None,
                fallbacks_used: 0,
                latency_ms: started.elapsed().as_millis() as u64,
                cached: false,
                cost_usd: 0.0,
                error: Some(format!("budget exceeded: {}", reason)),
                trace: None,
            });
        }

        // Cache short-circuit: a hit returns byte-identical stored content
        // and skips both dispatch and spend accounting.
        let cache_key = ResponseCache::key(role, &messages);
        if !request.options.bypass_cache {
            if let Some(hit) = self.cache.get(&cache_key) {
                debug!(role = %role, model = %hit.model, "cache hit");
                return Ok(RoutingResult {
                    success: true,
                    response: Some(hit.content),
                    role,
                    intent,
                    model_used: Some(hit.model),
                    provider_used: None,
                    fallbacks_used: 0,
                    latency_ms: started.elapsed().as_millis() as u64,
                    cached: true,
                    cost_usd: 0.0,
                    error: None,
                    trace: None,
                });
            }
        }

        let overrides = CallOverrides {
            temperature: request.options.temperature,
            max_tokens: request.options.max_tokens,
            max_latency_ms: None,
        };
        let outcome = self
            .dispatcher
            .execute_decision(&decision, role, &messages, &overrides, cancel)
            .await?;

        let mut cost_usd = 0.0;
        if outcome.success {
            let usage = outcome.usage.unwrap_or(TokenUsage {
                input_tokens: estimated_input,
                output_tokens: estimated_output,
            });
            let model_used = outcome.model_used.clone().unwrap_or_default();
            cost_usd = self
                .registry
                .estimate_cost(&model_used, usage.input_tokens, usage.output_tokens)
                .unwrap_or(estimated_cost);

            // Actual spend, applied once, after the call resolved.
            self.optimizer.record_spending(
                &request.user_id,
                tier,
                &SpendingRecord {
                    cost_usd,
                    input_tokens: usage.input_tokens,
                    output_tokens: usage.output_tokens,
                },
            )?;

            if let Some(content) = &outcome.content {
                self.cache.insert(cache_key, content.clone(), model_used, usage);
            }
        }

        let error = outcome
            .terminal_error
            .as_ref()
            .map(|attempt| format!("{} ({}): {}", attempt.model, attempt.error, attempt.message));

        Ok(RoutingResult {
            success: outcome.success,
            response: outcome.content,
            role: outcome.role_served,
            intent,
            model_used: outcome.model_used,
            provider_used: outcome.provider_used,
            fallbacks_used: outcome.fallbacks_used,
            latency_ms: started.elapsed().as_millis() as u64,
            cached: false,
            cost_usd,
            error,
            trace: Some(outcome.trace),
        })
    }

    /// Routes a code task, skipping intent resolution.
    pub async fn route_code(
        &self,
        user_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<RoutingResult> {
        let mut request = RoutingRequest::new(user_id, message);
        request.role = Some(AgentRole::CodeGeneration);
        self.route(request).await
    }

    /// Routes a chat turn, skipping intent resolution.
    pub async fn route_chat(
        &self,
        user_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<RoutingResult> {
        let mut request = RoutingRequest::new(user_id, message);
        request.role = Some(AgentRole::LightChat);
        self.route(request).await
    }

    /// Routes a planning task, skipping intent resolution.
    pub async fn route_planning(
        &self,
        user_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<RoutingResult> {
        let mut request = RoutingRequest::new(user_id, message);
        request.role = Some(AgentRole::Planning);
        self.route(request).await
    }

    /// The model catalog.
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// The active configuration.
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// The benchmark aggregator, for stats queries and offline tuning.
    pub fn benchmarks(&self) -> &BenchmarkAggregator {
        &self.bench
    }

    /// The cost optimizer, for recommendations, snapshots, and resets.
    pub fn cost_optimizer(&self) -> &CostOptimizer {
        &self.optimizer
    }

    /// Cache counters.
    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.cache.stats()
    }

    /// External-scheduler hook: zero all daily windows. Idempotent.
    pub fn reset_daily_budgets(&self) -> Result<()> {
        self.optimizer.ledger().reset_daily()
    }

    /// External-scheduler hook: zero all monthly windows. Idempotent.
    pub fn reset_monthly_budgets(&self) -> Result<()> {
        self.optimizer.ledger().reset_monthly()
    }

    /// Liveness probe over registered providers. Off the hot path.
    pub async fn available_providers(&self) -> Vec<(String, bool)> {
        self.dispatcher.available_providers().await
    }
}
