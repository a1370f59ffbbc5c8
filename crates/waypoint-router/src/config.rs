//! Static startup configuration for the routing core.
//!
//! Everything here is supplied at startup and never discovered at runtime:
//! the role→model map, the task-preference tables, the tier budget table,
//! the cache TTL, and the benchmark buffer capacity. A TOML loader with
//! validation is provided for deployments that override the defaults.

use crate::budget::CostBudget;
use crate::registry::ModelRegistry;
use crate::types::{AgentRole, UserTier};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading the file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Per-role model chain and ceilings.
#[derive(Debug, Clone, Deserialize)]
pub struct RoleModelConfig {
    /// The model attempted first for this role.
    pub primary: String,
    /// Ordered fallback model ids, tried after the primary fails.
    pub fallbacks: Vec<String>,
    /// Per-attempt deadline in milliseconds.
    pub max_latency_ms: u64,
    /// Soft per-request cost ceiling for this role.
    pub max_cost_usd: f64,
}

/// Full routing configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Role → model chain and ceilings.
    pub roles: HashMap<AgentRole, RoleModelConfig>,
    /// Task → ranked model-preference list, independent of tier.
    pub task_preferences: HashMap<AgentRole, Vec<String>>,
    /// Tier → budget table.
    pub tier_budgets: HashMap<UserTier, CostBudget>,
    /// The fixed, always-available low-cost model attempted after every
    /// configured fallback has failed.
    pub safe_fallback_model: String,
    /// Response cache time-to-live.
    pub cache_ttl: Duration,
    /// Benchmark ring-buffer capacity.
    pub benchmark_capacity: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        use AgentRole::*;

        let role = |primary: &str, fallbacks: &[&str], max_latency_ms: u64, max_cost_usd: f64| {
            RoleModelConfig {
                primary: primary.to_string(),
                fallbacks: fallbacks.iter().map(|s| (*s).to_string()).collect(),
                max_latency_ms,
                max_cost_usd,
            }
        };

        let mut roles = HashMap::new();
        roles.insert(LightChat, role("claude-haiku-4.5", &["gemini-flash", "gpt-4o-mini"], 10_000, 0.01));
        roles.insert(Planning, role("claude-sonnet-4.5", &["gpt-4o", "gemini-pro"], 30_000, 0.15));
        roles.insert(UxIdeation, role("gpt-4o", &["claude-sonnet-4.5", "gemini-pro"], 30_000, 0.12));
        roles.insert(CodeGeneration, role("claude-sonnet-4.5", &["gpt-4o", "gemini-pro"], 45_000, 0.25));
        roles.insert(CodeReview, role("claude-sonnet-4.5", &["gpt-4o", "gemini-pro"], 45_000, 0.20));
        roles.insert(ComplexAnalysis, role("gpt-4o", &["claude-sonnet-4.5", "gemini-pro"], 60_000, 0.30));
        roles.insert(FastBackground, role("gemini-flash", &["gpt-4o-mini", "claude-haiku-4.5"], 8_000, 0.005));
        roles.insert(SafeFallback, role("claude-haiku-4.5", &["gemini-flash"], 15_000, 0.01));

        // Ranked task preferences; the tier-aware router filters these.
        let prefs = |ids: &[&str]| ids.iter().map(|s| (*s).to_string()).collect::<Vec<_>>();
        let mut task_preferences = HashMap::new();
        task_preferences.insert(LightChat, prefs(&["claude-haiku-4.5", "gemini-flash", "gpt-4o-mini"]));
        task_preferences.insert(Planning, prefs(&["claude-sonnet-4.5", "gpt-4o", "gemini-pro"]));
        task_preferences.insert(UxIdeation, prefs(&["gpt-4o", "claude-sonnet-4.5", "gemini-pro", "gemini-flash"]));
        task_preferences.insert(CodeGeneration, prefs(&["claude-sonnet-4.5", "gpt-4o", "gemini-pro"]));
        task_preferences.insert(CodeReview, prefs(&["claude-sonnet-4.5", "gemini-pro", "gpt-4o"]));
        task_preferences.insert(ComplexAnalysis, prefs(&["gpt-4o", "claude-sonnet-4.5", "gemini-pro"]));
        task_preferences.insert(FastBackground, prefs(&["gemini-flash", "gpt-4o-mini", "claude-haiku-4.5"]));
        task_preferences.insert(SafeFallback, prefs(&["claude-haiku-4.5", "gemini-flash"]));

        let mut tier_budgets = HashMap::new();
        tier_budgets.insert(
            UserTier::Free,
            CostBudget {
                per_request_max_usd: 0.05,
                daily_budget_usd: 1.0,
                monthly_budget_usd: 10.0,
                warning_threshold: 0.8,
                allow_premium: false,
            },
        );
        tier_budgets.insert(
            UserTier::Pro,
            CostBudget {
                per_request_max_usd: 0.50,
                daily_budget_usd: 20.0,
                monthly_budget_usd: 300.0,
                warning_threshold: 0.8,
                allow_premium: true,
            },
        );
        tier_budgets.insert(
            UserTier::Enterprise,
            CostBudget {
                per_request_max_usd: 2.0,
                daily_budget_usd: 200.0,
                monthly_budget_usd: 3000.0,
                warning_threshold: 0.9,
                allow_premium: true,
            },
        );

        Self {
            roles,
            task_preferences,
            tier_budgets,
            safe_fallback_model: "claude-haiku-4.5".to_string(),
            cache_ttl: Duration::from_secs(300),
            benchmark_capacity: 1000,
        }
    }
}

impl RouterConfig {
    /// The role's model chain and ceilings.
    ///
    /// # Errors
    /// An unconfigured role is a configuration error, surfaced synchronously.
    pub fn role_config(&self, role: AgentRole) -> Result<&RoleModelConfig, crate::RouterError> {
        self.roles.get(&role).ok_or(crate::RouterError::UnknownRole(role))
    }

    /// The ranked model-preference list for the role's task type.
    pub fn task_preference(&self, role: AgentRole) -> Result<&[String], crate::RouterError> {
        self.task_preferences
            .get(&role)
            .map(Vec::as_slice)
            .ok_or(crate::RouterError::UnknownRole(role))
    }

    /// The budget table entry for a tier. Every tier is guaranteed present
    /// by validation.
    pub fn budget_for(&self, tier: UserTier) -> &CostBudget {
        self.tier_budgets
            .get(&tier)
            .unwrap_or_else(|| unreachable_budget(tier))
    }

    /// Loads configuration from a TOML file, overlaying the defaults.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed, or fails
    /// validation against the registry.
    pub fn from_toml_path(path: &Path, registry: &ModelRegistry) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content, registry)
    }

    /// Loads configuration from a TOML string, overlaying the defaults.
    pub fn from_toml_str(content: &str, registry: &ModelRegistry) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content)?;
        let mut config = Self::default();

        if let Some(model) = raw.safe_fallback_model {
            config.safe_fallback_model = model;
        }
        if let Some(seconds) = raw.cache_ttl_seconds {
            config.cache_ttl = Duration::from_secs(seconds);
        }
        if let Some(capacity) = raw.benchmark_capacity {
            config.benchmark_capacity = capacity;
        }
        for (name, role_config) in raw.roles {
            let role = AgentRole::from_str(&name)
                .ok_or_else(|| ConfigError::Validation(format!("unknown role '{}'", name)))?;
            config.task_preferences.insert(role, {
                let mut prefs = vec![role_config.primary.clone()];
                prefs.extend(role_config.fallbacks.iter().cloned());
                prefs
            });
            config.roles.insert(role, role_config);
        }
        for (name, budget) in raw.tiers {
            let tier = UserTier::from_str(&name)
                .ok_or_else(|| ConfigError::Validation(format!("unknown tier '{}'", name)))?;
            config.tier_budgets.insert(tier, budget);
        }

        config.validate(registry)?;
        Ok(config)
    }

    /// Validates the configuration against a model catalog.
    ///
    /// # Errors
    /// Returns error if any referenced model id is unknown, a chain is
    /// empty, a threshold is out of range, or a role/tier is missing.
    pub fn validate(&self, registry: &ModelRegistry) -> Result<(), ConfigError> {
        for role in AgentRole::ALL {
            let Some(role_config) = self.roles.get(&role) else {
                return Err(ConfigError::Validation(format!("role '{}' has no model chain", role)));
            };
            if role_config.primary.is_empty() {
                return Err(ConfigError::Validation(format!("role '{}' has an empty primary", role)));
            }
            for id in std::iter::once(&role_config.primary).chain(&role_config.fallbacks) {
                if !registry.contains(id) {
                    return Err(ConfigError::Validation(format!(
                        "role '{}' references unknown model '{}'",
                        role, id
                    )));
                }
            }
            if role_config.max_latency_ms == 0 {
                return Err(ConfigError::Validation(format!(
                    "role '{}' must have a nonzero latency ceiling",
                    role
                )));
            }
            let Some(prefs) = self.task_preferences.get(&role) else {
                return Err(ConfigError::Validation(format!(
                    "role '{}' has no task preference list",
                    role
                )));
            };
            if prefs.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "role '{}' has an empty task preference list",
                    role
                )));
            }
            for id in prefs {
                if !registry.contains(id) {
                    return Err(ConfigError::Validation(format!(
                        "task preference for '{}' references unknown model '{}'",
                        role, id
                    )));
                }
            }
        }

        for tier in UserTier::ALL {
            let Some(budget) = self.tier_budgets.get(&tier) else {
                return Err(ConfigError::Validation(format!("tier '{}' has no budget", tier)));
            };
            if budget.per_request_max_usd <= 0.0
                || budget.daily_budget_usd <= 0.0
                || budget.monthly_budget_usd <= 0.0
            {
                return Err(ConfigError::Validation(format!(
                    "tier '{}' budgets must be positive",
                    tier
                )));
            }
            if budget.warning_threshold <= 0.0 || budget.warning_threshold > 1.0 {
                return Err(ConfigError::Validation(format!(
                    "tier '{}' warning threshold must be in (0, 1]",
                    tier
                )));
            }
        }

        if !registry.contains(&self.safe_fallback_model) {
            return Err(ConfigError::Validation(format!(
                "safe fallback model '{}' is not in the catalog",
                self.safe_fallback_model
            )));
        }
        if self.benchmark_capacity == 0 {
            return Err(ConfigError::Validation(
                "benchmark capacity must be nonzero".to_string(),
            ));
        }

        Ok(())
    }
}

fn unreachable_budget(tier: UserTier) -> ! {
    // Validation guarantees every tier has a budget; reaching this means the
    // config was constructed by hand and skipped validation.
    panic!("no budget configured for tier '{}'", tier)
}

/// Raw TOML document shape.
#[derive(Debug, Deserialize)]
struct RawConfig {
    safe_fallback_model: Option<String>,
    cache_ttl_seconds: Option<u64>,
    benchmark_capacity: Option<usize>,
    #[serde(default)]
    roles: HashMap<String, RoleModelConfig>,
    #[serde(default)]
    tiers: HashMap<String, CostBudget>,
}
