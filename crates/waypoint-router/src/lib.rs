//! Request-routing core for an AI coding assistant.
//!
//! Given a task (chat, code generation, review, planning) and a tenant's
//! subscription tier, this crate selects which backend model to invoke,
//! executes the call through a provider adapter, and on failure walks a
//! classified fallback chain until one model succeeds or every option is
//! exhausted — while enforcing per-tenant spending budgets and caching
//! repeat requests.
//!
//! The entry point is [`RoutingService`]; every shared-state component
//! (spend ledger, response cache, benchmark buffer) is an instance field of
//! the service, so embedders and tests construct isolated instances.

pub mod bench;
pub mod budget;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod intent;
pub mod registry;
pub mod router;
pub mod service;
pub mod types;

pub use bench::{BenchmarkAggregator, BenchmarkRun, ModelTaskStats, RankBy};
pub use budget::{
    BudgetDecision, CeilingKind, CostBudget, CostOptimizer, CostRecommendation, CostTracker,
    LedgerSummary, QualityImpact, RecommendationKind, SpendLedger, SpendingRecord,
};
pub use cache::{CacheStats, CachedResponse, ResponseCache};
pub use config::{ConfigError, RoleModelConfig, RouterConfig};
pub use dispatch::{CallOverrides, DispatchOutcome, Dispatcher, classify_error};
pub use error::{Result, RouterError};
pub use intent::{IntentContext, IntentResolution, IntentStrategy, RuleBasedResolver};
pub use registry::{ModelConfig, ModelRegistry};
pub use router::ModelRouter;
pub use service::{RouteOptions, RoutingRequest, RoutingResult, RoutingService};
pub use types::{
    AgentRole, Criticality, ErrorKind, FallbackAttempt, FallbackTrace, RouteConstraints,
    RouteDecision, RoutingContext, UserTier,
};
