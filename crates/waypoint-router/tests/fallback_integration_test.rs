//! Integration tests for the fallback dispatcher.
//!
//! Scenarios covered:
//! - Deterministic fallback walk: primary rate-limited, first fallback
//!   timed out, second fallback succeeds
//! - Total exhaustion, with and without a working safe fallback
//! - Deadline overrun treated as a timeout and fed to the fallback path

use std::sync::Arc;
use std::time::Duration;
use waypoint_abstraction::{ChatMessage, Provider, ProviderError};
use waypoint_providers::{FlakyProvider, MockProvider, ProviderRegistry};
use waypoint_router::{
    AgentRole, BenchmarkAggregator, CallOverrides, Dispatcher, ErrorKind, ModelConfig,
    ModelRegistry, RoleModelConfig, RouterConfig,
};

/// Catalog of four test models, each on its own provider so failures can be
/// scripted per model.
fn test_registry() -> ModelRegistry {
    let model = |id: &str, provider: &str| ModelConfig {
        id: id.to_string(),
        provider: provider.to_string(),
        context_window: 100_000,
        cost_per_1k_input: 0.001,
        cost_per_1k_output: 0.002,
        strengths: vec![AgentRole::CodeGeneration, AgentRole::SafeFallback],
        supports_vision: false,
        supports_streaming: true,
        premium: false,
    };
    ModelRegistry::new(vec![
        model("alpha", "alpha-ai"),
        model("beta", "beta-ai"),
        model("gamma", "gamma-ai"),
        model("safety-net", "safety-ai"),
    ])
}

/// Config whose code-generation chain is alpha → beta → gamma, with
/// safety-net as the guaranteed safe model.
fn test_config() -> RouterConfig {
    let mut config = RouterConfig::default();
    config.roles.insert(
        AgentRole::CodeGeneration,
        RoleModelConfig {
            primary: "alpha".to_string(),
            fallbacks: vec!["beta".to_string(), "gamma".to_string()],
            max_latency_ms: 2_000,
            max_cost_usd: 0.25,
        },
    );
    config.task_preferences.insert(
        AgentRole::CodeGeneration,
        vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()],
    );
    config.safe_fallback_model = "safety-net".to_string();
    config
}

fn dispatcher_with(providers: ProviderRegistry) -> (Dispatcher, Arc<BenchmarkAggregator>) {
    let bench = Arc::new(BenchmarkAggregator::new(100));
    let dispatcher = Dispatcher::new(
        Arc::new(test_registry()),
        Arc::new(providers),
        Arc::new(test_config()),
        Arc::clone(&bench),
    );
    (dispatcher, bench)
}

fn messages() -> Vec<ChatMessage> {
    vec![ChatMessage::user("write a parser")]
}

#[tokio::test]
async fn fallback_walk_stops_at_first_success() {
    let alpha = Arc::new(FlakyProvider::new("alpha-ai").then_err(ProviderError::Http {
        status: 429,
        message: "rate limit exceeded".to_string(),
    }));
    let beta = Arc::new(
        FlakyProvider::new("beta-ai").then_err(ProviderError::Timeout { elapsed_ms: 1500 }),
    );
    let gamma = Arc::new(FlakyProvider::new("gamma-ai").then_ok("gamma says hi"));
    let safety = Arc::new(FlakyProvider::new("safety-ai"));

    let mut providers = ProviderRegistry::new();
    for provider in [&alpha, &beta, &gamma, &safety] {
        providers.register(Arc::clone(provider) as Arc<dyn Provider>);
    }
    let (dispatcher, _) = dispatcher_with(providers);

    let outcome = dispatcher
        .execute_role(AgentRole::CodeGeneration, &messages(), &CallOverrides::default(), None)
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.model_used.as_deref(), Some("gamma"));
    assert_eq!(outcome.fallbacks_used, 2);
    assert_eq!(outcome.response_content(), "gamma says hi");

    // The trace records exactly the two failures, in order, classified.
    let chain: Vec<(&str, ErrorKind)> = outcome
        .trace
        .attempts
        .iter()
        .map(|a| (a.model.as_str(), a.error))
        .collect();
    assert_eq!(chain, vec![("alpha", ErrorKind::RateLimit), ("beta", ErrorKind::Timeout)]);
    assert_eq!(outcome.trace.primary_model, "alpha");
    assert_eq!(outcome.trace.final_model.as_deref(), Some("gamma"));
    assert_eq!(outcome.trace.total_attempts, 3);

    // The safe model was never touched.
    assert_eq!(safety.calls(), 0);
}

#[tokio::test]
async fn safe_fallback_rescues_total_chain_failure() {
    let rate_limited = |name: &str| {
        Arc::new(FlakyProvider::new(name).then_err(ProviderError::Http {
            status: 429,
            message: "rate limit".to_string(),
        }))
    };
    let alpha = rate_limited("alpha-ai");
    let beta = rate_limited("beta-ai");
    let gamma = rate_limited("gamma-ai");
    let safety = Arc::new(FlakyProvider::new("safety-ai").then_ok("rescued"));

    let mut providers = ProviderRegistry::new();
    for provider in [&alpha, &beta, &gamma, &safety] {
        providers.register(Arc::clone(provider) as Arc<dyn Provider>);
    }
    let (dispatcher, _) = dispatcher_with(providers);

    let outcome = dispatcher
        .execute_role(AgentRole::CodeGeneration, &messages(), &CallOverrides::default(), None)
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.model_used.as_deref(), Some("safety-net"));
    // A safe-fallback rescue reports the safe-fallback role.
    assert_eq!(outcome.role_served, AgentRole::SafeFallback);
    assert_eq!(outcome.trace.attempts.len(), 3);
    assert_eq!(outcome.trace.total_attempts, 4);
    assert_eq!(safety.calls(), 1);
}

#[tokio::test]
async fn exhaustion_of_everything_reports_the_full_trace() {
    let failing = |name: &str, status: u16| {
        Arc::new(FlakyProvider::new(name).then_err(ProviderError::Http {
            status,
            message: format!("{name} down"),
        }))
    };
    let alpha = failing("alpha-ai", 429);
    let beta = failing("beta-ai", 500);
    let gamma = failing("gamma-ai", 503);
    let safety = failing("safety-ai", 500);

    let mut providers = ProviderRegistry::new();
    for provider in [&alpha, &beta, &gamma, &safety] {
        providers.register(Arc::clone(provider) as Arc<dyn Provider>);
    }
    let (dispatcher, bench) = dispatcher_with(providers);

    let outcome = dispatcher
        .execute_role(AgentRole::CodeGeneration, &messages(), &CallOverrides::default(), None)
        .await
        .unwrap();

    assert!(!outcome.success);
    assert!(outcome.content.is_none());
    // primary + 2 configured fallbacks + 1 safe attempt.
    assert_eq!(outcome.trace.attempts.len(), 4);
    // Exactly one attempt hit the safe model.
    assert_eq!(safety.calls(), 1);
    // The terminal error is the safe-fallback attempt's error.
    let terminal = outcome.terminal_error.unwrap();
    assert_eq!(terminal.model, "safety-net");
    assert_eq!(terminal.error, ErrorKind::Server);

    // Every attempt landed in the benchmark history, failures included.
    for model in ["alpha", "beta", "gamma", "safety-net"] {
        let stats = bench.stats(model, AgentRole::CodeGeneration).unwrap();
        assert_eq!(stats.run_count, 1);
        assert_eq!(stats.success_rate, 0.0);
    }
}

#[tokio::test]
async fn deadline_overrun_is_classified_as_timeout_and_falls_back() {
    // alpha answers, but slower than the 50ms deadline override.
    let alpha = Arc::new(MockProvider::new("alpha-ai").with_latency(Duration::from_millis(400)));
    let beta = Arc::new(FlakyProvider::new("beta-ai").then_ok("beta wins"));
    let gamma = Arc::new(FlakyProvider::new("gamma-ai"));
    let safety = Arc::new(FlakyProvider::new("safety-ai"));

    let mut providers = ProviderRegistry::new();
    providers.register(alpha as Arc<dyn Provider>);
    for provider in [&beta, &gamma, &safety] {
        providers.register(Arc::clone(provider) as Arc<dyn Provider>);
    }
    let (dispatcher, _) = dispatcher_with(providers);

    let overrides = CallOverrides { max_latency_ms: Some(50), ..CallOverrides::default() };
    let outcome = dispatcher
        .execute_role(AgentRole::CodeGeneration, &messages(), &overrides, None)
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.model_used.as_deref(), Some("beta"));
    assert_eq!(outcome.fallbacks_used, 1);
    assert_eq!(outcome.trace.attempts[0].error, ErrorKind::Timeout);
}

#[tokio::test]
async fn success_on_primary_touches_nothing_else() {
    let alpha = Arc::new(FlakyProvider::new("alpha-ai").then_ok("first try"));
    let beta = Arc::new(FlakyProvider::new("beta-ai"));
    let gamma = Arc::new(FlakyProvider::new("gamma-ai"));
    let safety = Arc::new(FlakyProvider::new("safety-ai"));

    let mut providers = ProviderRegistry::new();
    for provider in [&alpha, &beta, &gamma, &safety] {
        providers.register(Arc::clone(provider) as Arc<dyn Provider>);
    }
    let (dispatcher, _) = dispatcher_with(providers);

    let outcome = dispatcher
        .execute_role(AgentRole::CodeGeneration, &messages(), &CallOverrides::default(), None)
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.fallbacks_used, 0);
    assert!(outcome.trace.attempts.is_empty());
    assert_eq!(outcome.trace.total_attempts, 1);
    assert_eq!(beta.calls() + gamma.calls() + safety.calls(), 0);
}

/// Small helper so assertions read naturally.
trait OutcomeExt {
    fn response_content(&self) -> &str;
}

impl OutcomeExt for waypoint_router::DispatchOutcome {
    fn response_content(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}
