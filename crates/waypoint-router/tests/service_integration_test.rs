//! End-to-end tests for the routing service: intent resolution through
//! dispatch, caching, substitution, and benchmark recording.

use std::sync::Arc;
use waypoint_providers::ProviderRegistry;
use waypoint_router::{
    AgentRole, ModelRegistry, RankBy, RouteOptions, RouterConfig, RoutingRequest, RoutingService,
    UserTier,
};

fn service() -> RoutingService {
    RoutingService::new(
        ModelRegistry::builtin(),
        RouterConfig::default(),
        ProviderRegistry::with_mocks(&["anthropic", "openai", "google"]),
    )
}

fn request(message: &str) -> RoutingRequest {
    RoutingRequest::new("tenant-a", message)
}

#[tokio::test]
async fn greeting_routes_as_light_chat() {
    let service = service();
    let result = service.route(request("hi")).await.unwrap();

    assert!(result.success);
    assert_eq!(result.role, AgentRole::LightChat);
    let intent = result.intent.unwrap();
    assert!(intent.confidence >= 0.8);
    assert_eq!(result.model_used.as_deref(), Some("claude-haiku-4.5"));
    assert_eq!(result.fallbacks_used, 0);
}

#[tokio::test]
async fn arabic_planning_message_routes_as_planning() {
    let service = service();
    let result = service.route(request("عايز خطة لإطلاق SaaS")).await.unwrap();

    assert!(result.success);
    assert_eq!(result.role, AgentRole::Planning);
}

#[tokio::test]
async fn long_message_routes_as_complex_analysis() {
    let service = service();
    let result = service.route(request(&"x".repeat(3500))).await.unwrap();

    assert!(result.success);
    assert_eq!(result.role, AgentRole::ComplexAnalysis);
}

#[tokio::test]
async fn code_block_with_review_word_routes_as_code_review() {
    let service = service();
    let message = "review this:\n```rust\nfn main() {}\n```";
    let result = service.route(request(message)).await.unwrap();

    assert!(result.success);
    assert_eq!(result.role, AgentRole::CodeReview);
}

#[tokio::test]
async fn fixed_role_wrappers_skip_intent_resolution() {
    let service = service();

    let code = service.route_code("tenant-a", "add a retry helper").await.unwrap();
    assert_eq!(code.role, AgentRole::CodeGeneration);
    assert!(code.intent.is_none());

    let chat = service.route_chat("tenant-a", "how are you").await.unwrap();
    assert_eq!(chat.role, AgentRole::LightChat);
    assert!(chat.intent.is_none());

    let planning = service.route_planning("tenant-a", "q3 milestones").await.unwrap();
    assert_eq!(planning.role, AgentRole::Planning);
    assert!(planning.intent.is_none());
}

#[tokio::test]
async fn forced_model_bypasses_selection() {
    let service = service();
    let mut req = request("hello");
    req.role = Some(AgentRole::LightChat);
    req.force_model = Some("gpt-4o".to_string());

    let result = service.route(req).await.unwrap();
    assert!(result.success);
    assert_eq!(result.model_used.as_deref(), Some("gpt-4o"));
    assert_eq!(result.provider_used.as_deref(), Some("openai"));
}

#[tokio::test]
async fn repeat_requests_hit_the_cache() {
    let service = service();

    let first = service.route_chat("tenant-a", "what is a monad").await.unwrap();
    let second = service.route_chat("tenant-a", "what is a monad").await.unwrap();

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(second.response, first.response);
    assert_eq!(second.model_used, first.model_used);

    let stats = service.cache_stats();
    assert_eq!(stats.hits, 1);
    assert!(stats.misses >= 1);
}

#[tokio::test]
async fn different_roles_do_not_share_cache_entries() {
    let service = service();

    let chat = service.route_chat("tenant-a", "same words").await.unwrap();
    let planning = service.route_planning("tenant-a", "same words").await.unwrap();

    assert!(!chat.cached);
    assert!(!planning.cached, "role is part of the cache key");
}

#[tokio::test]
async fn every_attempt_is_benchmarked() {
    let service = service();
    let result = service.route_chat("tenant-a", "hello").await.unwrap();
    assert!(result.success);

    let stats = service
        .benchmarks()
        .stats("claude-haiku-4.5", AgentRole::LightChat)
        .expect("the successful attempt must be recorded");
    assert_eq!(stats.run_count, 1);
    assert_eq!(stats.success_rate, 1.0);
    assert!(stats.total_tokens > 0);

    let best = service.benchmarks().best_model_for_task(AgentRole::LightChat, RankBy::Speed);
    assert_eq!(best.as_deref(), Some("claude-haiku-4.5"));
}

#[tokio::test]
async fn expensive_projection_substitutes_a_cheaper_model() {
    let service = service();
    let mut req = request("summarize the architecture across these services");
    req.role = Some(AgentRole::ComplexAnalysis);
    req.user_tier = Some(UserTier::Pro);
    // A 30K-token completion cap pushes the gpt-4o projection past half the
    // pro per-request ceiling, triggering the downgrade recommendation.
    req.options = RouteOptions { max_tokens: Some(30_000), ..RouteOptions::default() };

    let result = service.route(req).await.unwrap();
    assert!(result.success);
    assert_eq!(result.model_used.as_deref(), Some("gemini-pro"));
    // The displaced preferred model leads the fallback chain.
    let trace = result.trace.unwrap();
    assert_eq!(trace.primary_model, "gemini-pro");
}

#[tokio::test]
async fn excluded_provider_is_honored_end_to_end() {
    let service = service();
    let mut req = request("hello");
    req.role = Some(AgentRole::LightChat);
    req.options = RouteOptions {
        excluded_providers: vec!["anthropic".to_string()],
        ..RouteOptions::default()
    };

    let result = service.route(req).await.unwrap();
    assert!(result.success);
    assert_ne!(result.provider_used.as_deref(), Some("anthropic"));
}

#[tokio::test]
async fn liveness_probe_reports_all_mock_providers() {
    let service = service();
    let mut probes = service.available_providers().await;
    probes.sort();
    assert_eq!(
        probes,
        vec![
            ("anthropic".to_string(), true),
            ("google".to_string(), true),
            ("openai".to_string(), true),
        ]
    );
}

#[tokio::test]
async fn previous_role_carries_across_turns() {
    let service = service();
    let mut req = request("and after that?");
    req.previous_role = Some(AgentRole::Planning);

    let result = service.route(req).await.unwrap();
    assert_eq!(result.role, AgentRole::Planning);
    assert!((result.intent.unwrap().confidence - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn cancellation_surfaces_without_recording_spend() {
    use tokio_util::sync::CancellationToken;
    use waypoint_router::RouterError;

    let service = Arc::new(service());
    let token = CancellationToken::new();
    token.cancel();

    let result = service
        .route_with_cancel(request("hello"), Some(&token))
        .await;
    assert!(matches!(result, Err(RouterError::Cancelled)));

    // Nothing was accounted for the abandoned request.
    let tracker = service.cost_optimizer().ledger().snapshot("tenant-a").unwrap();
    assert!(tracker.is_none_or(|t| t.requests_today == 0 && t.daily_spent_usd == 0.0));
}
