//! Tier-aware model selection.
//!
//! Turns a routing context (role, tenant tier, criticality, constraints)
//! into a [`RouteDecision`]: one preferred model plus an ordered fallback
//! list. The preferred model always satisfies every hard constraint in the
//! context; cost ceilings are soft and resolved by substitution rather than
//! rejection.

use crate::config::RouterConfig;
use crate::registry::{ModelConfig, ModelRegistry};
use crate::types::{Criticality, RouteDecision, RoutingContext};
use crate::{Result, RouterError};
use std::sync::Arc;
use tracing::{debug, info};

/// Maximum number of task-peer fallbacks before the safe terminator.
const MAX_PEER_FALLBACKS: usize = 2;

/// Tier-aware router over a static catalog and preference tables.
pub struct ModelRouter {
    registry: Arc<ModelRegistry>,
    config: Arc<RouterConfig>,
}

impl ModelRouter {
    /// Creates a router over the given catalog and configuration.
    pub fn new(registry: Arc<ModelRegistry>, config: Arc<RouterConfig>) -> Self {
        Self { registry, config }
    }

    /// Produces a routing decision for the context.
    ///
    /// Never fails for a configured role: when tier constraints exclude
    /// every preferred model, the decision falls back to the cheapest model
    /// that supports the task at all.
    ///
    /// # Errors
    /// An unknown forced model or an unconfigured role is a configuration
    /// error, surfaced synchronously.
    pub fn route(&self, context: &RoutingContext) -> Result<RouteDecision> {
        // Forced model short-circuits selection but keeps a real fallback
        // chain derived from its task peers.
        if let Some(forced) = &context.constraints.force_model {
            let model = self
                .registry
                .get(forced)
                .ok_or_else(|| RouterError::UnknownModel(forced.clone()))?;
            let fallbacks = self.build_fallbacks(context, &model.id);
            debug!(model = %model.id, role = %context.role, "forced model override");
            return Ok(RouteDecision {
                preferred: model.id.clone(),
                fallbacks,
                reason: "forced model override".to_string(),
            });
        }

        let preferences = self.config.task_preference(context.role)?;
        let eligible: Vec<&ModelConfig> = preferences
            .iter()
            .filter_map(|id| self.registry.get(id))
            .filter(|m| self.satisfies_hard_constraints(m, context))
            .filter(|m| self.within_cost_ceiling(m, context))
            .collect();

        if eligible.is_empty() {
            return self.rescue_decision(context);
        }

        let chosen = match context.criticality {
            Criticality::Critical | Criticality::High | Criticality::Medium => eligible[0],
            Criticality::Low => eligible
                .iter()
                .copied()
                .min_by(|a, b| {
                    a.cost_per_1k_total()
                        .partial_cmp(&b.cost_per_1k_total())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .unwrap_or(eligible[0]),
        };

        let fallbacks = self.build_fallbacks(context, &chosen.id);
        let reason = format!(
            "selected for {} at {} criticality on {} tier",
            context.role, context.criticality, context.tier
        );

        info!(
            role = %context.role,
            tier = %context.tier,
            criticality = %context.criticality,
            preferred = %chosen.id,
            fallback_count = fallbacks.len(),
            "routing decision made"
        );

        Ok(RouteDecision { preferred: chosen.id.clone(), fallbacks, reason })
    }

    /// Provider exclusions and capability requirements. These are hard:
    /// no selection path may violate them.
    fn capability_ok(model: &ModelConfig, context: &RoutingContext) -> bool {
        let constraints = &context.constraints;
        if constraints.excluded_providers.iter().any(|p| p == &model.provider) {
            return false;
        }
        if constraints.require_vision && !model.supports_vision {
            return false;
        }
        if constraints.require_streaming && !model.supports_streaming {
            return false;
        }
        true
    }

    /// Hard constraints plus the tier's premium gate.
    fn satisfies_hard_constraints(&self, model: &ModelConfig, context: &RoutingContext) -> bool {
        Self::capability_ok(model, context)
            && (!model.premium || self.config.budget_for(context.tier).allow_premium)
    }

    /// Soft projected-cost filter against the tier's per-request ceiling.
    fn within_cost_ceiling(&self, model: &ModelConfig, context: &RoutingContext) -> bool {
        let ceiling = self.config.budget_for(context.tier).per_request_max_usd;
        self.registry
            .estimate_cost(
                &model.id,
                context.estimated_input_tokens,
                context.estimated_output_tokens,
            )
            .is_none_or(|cost| cost <= ceiling)
    }

    /// The never-empty rescue path: the cheapest model that supports the
    /// task at all, ignoring the tier's premium gate and cost ceiling.
    /// Capability constraints and provider exclusions still apply.
    fn rescue_decision(&self, context: &RoutingContext) -> Result<RouteDecision> {
        let cheapest = self
            .registry
            .models_for_task(context.role)
            .into_iter()
            .filter(|m| Self::capability_ok(m, context))
            .min_by(|a, b| {
                a.cost_per_1k_total()
                    .partial_cmp(&b.cost_per_1k_total())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .ok_or(RouterError::NoModelForTask(context.role))?;

        let fallbacks = self.build_fallbacks(context, &cheapest.id);
        info!(
            role = %context.role,
            tier = %context.tier,
            model = %cheapest.id,
            "no eligible model for tier constraints, using cheapest capable fallback"
        );
        Ok(RouteDecision {
            preferred: cheapest.id.clone(),
            fallbacks,
            reason: "no eligible model, using fallback".to_string(),
        })
    }

    /// Builds the fallback list: up to two task-relevant peers that satisfy
    /// the hard constraints, terminated by the safe universal model when it
    /// qualifies and is not already present.
    fn build_fallbacks(&self, context: &RoutingContext, selected: &str) -> Vec<String> {
        let mut fallbacks: Vec<String> = Vec::new();

        if let Ok(preferences) = self.config.task_preference(context.role) {
            for id in preferences {
                if fallbacks.len() >= MAX_PEER_FALLBACKS {
                    break;
                }
                if id == selected || fallbacks.contains(id) {
                    continue;
                }
                if let Some(model) = self.registry.get(id) {
                    if self.satisfies_hard_constraints(model, context) {
                        fallbacks.push(id.clone());
                    }
                }
            }
        }

        let safe = &self.config.safe_fallback_model;
        if safe != selected && !fallbacks.contains(safe) {
            if let Some(model) = self.registry.get(safe) {
                if self.satisfies_hard_constraints(model, context) {
                    fallbacks.push(safe.clone());
                }
            }
        }

        fallbacks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentRole, RouteConstraints, UserTier};

    fn router() -> ModelRouter {
        ModelRouter::new(
            Arc::new(ModelRegistry::builtin()),
            Arc::new(RouterConfig::default()),
        )
    }

    fn context(role: AgentRole, tier: UserTier) -> RoutingContext {
        RoutingContext::new(role, tier)
    }

    #[test]
    fn unconstrained_route_returns_role_primary() {
        let router = router();
        let config = RouterConfig::default();
        for role in AgentRole::ALL {
            let decision = router.route(&context(role, UserTier::Enterprise)).unwrap();
            assert_eq!(
                decision.preferred, config.roles[&role].primary,
                "role {} should route to its configured primary",
                role
            );
        }
    }

    #[test]
    fn free_tier_never_gets_premium_models() {
        let router = router();
        let registry = ModelRegistry::builtin();
        for role in AgentRole::ALL {
            let decision = router.route(&context(role, UserTier::Free)).unwrap();
            let model = registry.get(&decision.preferred).unwrap();
            assert!(!model.premium, "free tier routed to premium model {}", model.id);
            for id in &decision.fallbacks {
                assert!(!registry.get(id).unwrap().premium);
            }
        }
    }

    #[test]
    fn excluded_provider_is_never_selected() {
        let router = router();
        let registry = ModelRegistry::builtin();
        let mut ctx = context(AgentRole::CodeGeneration, UserTier::Enterprise);
        ctx.constraints = RouteConstraints {
            excluded_providers: vec!["anthropic".to_string()],
            ..RouteConstraints::default()
        };

        let decision = router.route(&ctx).unwrap();
        assert_ne!(registry.get(&decision.preferred).unwrap().provider, "anthropic");
        for id in &decision.fallbacks {
            assert_ne!(registry.get(id).unwrap().provider, "anthropic");
        }
    }

    #[test]
    fn vision_requirement_is_honored() {
        let router = router();
        let registry = ModelRegistry::builtin();
        let mut ctx = context(AgentRole::LightChat, UserTier::Pro);
        ctx.constraints.require_vision = true;

        let decision = router.route(&ctx).unwrap();
        assert!(registry.get(&decision.preferred).unwrap().supports_vision);
        for id in &decision.fallbacks {
            assert!(registry.get(id).unwrap().supports_vision);
        }
    }

    #[test]
    fn low_criticality_picks_cheapest_eligible() {
        let router = router();
        let registry = ModelRegistry::builtin();
        let mut ctx = context(AgentRole::CodeGeneration, UserTier::Enterprise);
        ctx.criticality = Criticality::Low;

        let decision = router.route(&ctx).unwrap();
        let chosen = registry.get(&decision.preferred).unwrap();
        // gemini-pro is the cheapest code-generation-capable model.
        assert_eq!(chosen.id, "gemini-pro");
    }

    #[test]
    fn high_criticality_picks_head_of_preference_list() {
        let router = router();
        let mut ctx = context(AgentRole::CodeGeneration, UserTier::Enterprise);
        ctx.criticality = Criticality::Critical;
        let decision = router.route(&ctx).unwrap();
        assert_eq!(decision.preferred, "claude-sonnet-4.5");
    }

    #[test]
    fn forced_model_short_circuits() {
        let router = router();
        let mut ctx = context(AgentRole::LightChat, UserTier::Free);
        ctx.constraints.force_model = Some("gpt-4o".to_string());

        let decision = router.route(&ctx).unwrap();
        assert_eq!(decision.preferred, "gpt-4o");
        assert_eq!(decision.reason, "forced model override");
        assert!(!decision.fallbacks.is_empty());
    }

    #[test]
    fn unknown_forced_model_is_a_config_error() {
        let router = router();
        let mut ctx = context(AgentRole::LightChat, UserTier::Free);
        ctx.constraints.force_model = Some("no-such-model".to_string());
        assert!(matches!(router.route(&ctx), Err(RouterError::UnknownModel(_))));
    }

    #[test]
    fn rescue_path_never_returns_empty_decision() {
        let router = router();
        // Free tier + google excluded leaves no eligible code-generation
        // model in the preference list: the premium gate removes the rest.
        let mut ctx = context(AgentRole::CodeGeneration, UserTier::Free);
        ctx.constraints.excluded_providers = vec!["google".to_string()];

        let decision = router.route(&ctx).unwrap();
        assert_eq!(decision.reason, "no eligible model, using fallback");
        let registry = ModelRegistry::builtin();
        let chosen = registry.get(&decision.preferred).unwrap();
        assert!(chosen.supports(AgentRole::CodeGeneration));
        // The rescue ignores the premium gate but still honors exclusions.
        assert_ne!(chosen.provider, "google");
        // Cheapest capable non-google model is gpt-4o.
        assert_eq!(chosen.id, "gpt-4o");
    }

    #[test]
    fn fallback_chain_ends_with_safe_model() {
        let router = router();
        let decision = router.route(&context(AgentRole::Planning, UserTier::Pro)).unwrap();
        assert_eq!(decision.fallbacks.last().map(String::as_str), Some("claude-haiku-4.5"));
        assert!(decision.fallbacks.len() <= 3);
    }

    #[test]
    fn safe_fallback_not_duplicated_when_selected() {
        let router = router();
        let decision = router.route(&context(AgentRole::LightChat, UserTier::Pro)).unwrap();
        assert_eq!(decision.preferred, "claude-haiku-4.5");
        assert!(!decision.fallbacks.contains(&"claude-haiku-4.5".to_string()));
    }
}
