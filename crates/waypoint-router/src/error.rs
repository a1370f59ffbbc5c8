//! Error types for the routing core.

use crate::budget::CeilingKind;
use crate::config::ConfigError;
use crate::types::AgentRole;
use thiserror::Error;

/// Result type for routing operations.
pub type Result<T> = std::result::Result<T, RouterError>;

/// Routing errors.
///
/// Configuration errors (`UnknownRole`, `UnknownModel`,
/// `ProviderNotRegistered`) surface synchronously, before any network
/// attempt. Provider failures never appear here: they are classified and
/// carried in the request's [`FallbackTrace`](crate::types::FallbackTrace).
#[derive(Debug, Error)]
pub enum RouterError {
    /// The role has no routing configuration.
    #[error("no routing configuration for role '{0}'")]
    UnknownRole(AgentRole),

    /// A model id was not found in the registry.
    #[error("unknown model id '{0}'")]
    UnknownModel(String),

    /// No provider is registered under the name a model declares.
    #[error("no provider registered for '{0}'")]
    ProviderNotRegistered(String),

    /// The catalog has no model at all for the task.
    #[error("no model in the catalog supports task '{0}'")]
    NoModelForTask(AgentRole),

    /// A pre-flight budget check denied the request. Terminal for the
    /// attempt; never retried against a provider.
    #[error(
        "budget exceeded ({ceiling} ceiling): estimated ${estimated_usd:.4} against limit ${limit_usd:.2}"
    )]
    BudgetExceeded {
        /// Which ceiling was breached.
        ceiling: CeilingKind,
        /// The cost estimate that tripped the check.
        estimated_usd: f64,
        /// The configured ceiling.
        limit_usd: f64,
    },

    /// The caller abandoned the request mid-flight.
    #[error("request cancelled")]
    Cancelled,

    /// A shared-state lock was poisoned by a panicking writer.
    #[error("ledger state poisoned: {0}")]
    LedgerPoisoned(String),

    /// Configuration loading or validation failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
