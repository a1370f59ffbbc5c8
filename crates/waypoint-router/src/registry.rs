//! Static model catalog.
//!
//! Pure lookup table over the models the router may choose from. Unknown ids
//! resolve to `None`/empty results, never errors, and nothing here mutates
//! after construction.

use crate::types::AgentRole;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A callable model, as the routing layer sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identifier (e.g., "claude-sonnet-4.5").
    pub id: String,
    /// Owning provider name (e.g., "anthropic").
    pub provider: String,
    /// Context window size in tokens.
    pub context_window: u32,
    /// USD per 1K input tokens.
    pub cost_per_1k_input: f64,
    /// USD per 1K output tokens.
    pub cost_per_1k_output: f64,
    /// Task roles this model is declared strong at.
    pub strengths: Vec<AgentRole>,
    /// Whether the model accepts image input.
    pub supports_vision: bool,
    /// Whether the model supports streaming output.
    pub supports_streaming: bool,
    /// Premium models are gated by tenant tier.
    pub premium: bool,
}

impl ModelConfig {
    /// Whether this model declares strength at the given task.
    pub fn supports(&self, role: AgentRole) -> bool {
        self.strengths.contains(&role)
    }

    /// Summed input+output cost per 1K tokens, used for cheapness ordering.
    pub fn cost_per_1k_total(&self) -> f64 {
        self.cost_per_1k_input + self.cost_per_1k_output
    }
}

/// Immutable catalog of callable models.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: HashMap<String, ModelConfig>,
}

impl ModelRegistry {
    /// Creates a registry from an explicit model list.
    pub fn new(models: Vec<ModelConfig>) -> Self {
        Self {
            models: models.into_iter().map(|m| (m.id.clone(), m)).collect(),
        }
    }

    /// The built-in catalog used when no custom catalog is supplied.
    pub fn builtin() -> Self {
        use AgentRole::*;

        let model = |id: &str,
                     provider: &str,
                     context_window: u32,
                     cost_in: f64,
                     cost_out: f64,
                     strengths: Vec<AgentRole>,
                     vision: bool,
                     premium: bool| ModelConfig {
            id: id.to_string(),
            provider: provider.to_string(),
            context_window,
            cost_per_1k_input: cost_in,
            cost_per_1k_output: cost_out,
            strengths,
            supports_vision: vision,
            supports_streaming: true,
            premium,
        };

        Self::new(vec![
            model(
                "claude-sonnet-4.5",
                "anthropic",
                200_000,
                0.003,
                0.015,
                vec![CodeGeneration, CodeReview, Planning, ComplexAnalysis],
                true,
                true,
            ),
            model(
                "claude-haiku-4.5",
                "anthropic",
                200_000,
                0.000_25,
                0.001_25,
                vec![LightChat, FastBackground, SafeFallback],
                false,
                false,
            ),
            model(
                "gpt-4o",
                "openai",
                128_000,
                0.002_5,
                0.01,
                vec![ComplexAnalysis, UxIdeation, CodeGeneration, Planning],
                true,
                true,
            ),
            model(
                "gpt-4o-mini",
                "openai",
                128_000,
                0.000_15,
                0.000_6,
                vec![LightChat, FastBackground],
                true,
                false,
            ),
            model(
                "gemini-pro",
                "google",
                1_000_000,
                0.001_25,
                0.005,
                vec![ComplexAnalysis, CodeReview, CodeGeneration, Planning, UxIdeation],
                true,
                false,
            ),
            model(
                "gemini-flash",
                "google",
                1_000_000,
                0.000_2,
                0.000_8,
                vec![LightChat, FastBackground, SafeFallback, UxIdeation],
                true,
                false,
            ),
        ])
    }

    /// Looks up a model by id.
    pub fn get(&self, id: &str) -> Option<&ModelConfig> {
        self.models.get(id)
    }

    /// Whether the catalog contains the given id.
    pub fn contains(&self, id: &str) -> bool {
        self.models.contains_key(id)
    }

    /// All models declaring strength at the given task, cheapest last.
    ///
    /// Order is deterministic: by descending total per-1K cost, then id.
    pub fn models_for_task(&self, role: AgentRole) -> Vec<&ModelConfig> {
        let mut models: Vec<&ModelConfig> =
            self.models.values().filter(|m| m.supports(role)).collect();
        models.sort_by(|a, b| {
            b.cost_per_1k_total()
                .partial_cmp(&a.cost_per_1k_total())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        models
    }

    /// The cheapest model declaring strength at the given task.
    pub fn cheapest_for_task(&self, role: AgentRole) -> Option<&ModelConfig> {
        self.models_for_task(role).into_iter().last()
    }

    /// Estimates the USD cost of a call, or `None` for an unknown id.
    pub fn estimate_cost(&self, id: &str, input_tokens: u32, output_tokens: u32) -> Option<f64> {
        let model = self.get(id)?;
        Some(
            (f64::from(input_tokens) / 1000.0) * model.cost_per_1k_input
                + (f64::from(output_tokens) / 1000.0) * model.cost_per_1k_output,
        )
    }

    /// All catalog ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.models.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Number of models in the catalog.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
