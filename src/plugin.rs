//! Binds the resolver and routing engine to the request lifecycle, the
//! way the teacher's `Gateway` struct (`gateway/mod.rs`) binds its
//! collaborators to a request — but scoped to the governance decision
//! only, with no HTTP transport and no provider call.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config_store::PricingManager;
use crate::expr::ExprVariables;
use crate::model::VirtualKey;
use crate::resolver::{BudgetAndRateLimitStatus, Decision, EvaluationRequest, Resolver};
use crate::routing::{RoutingContext, RoutingEngine, apply_routing_decision};
use crate::store::GovernanceStore;

#[derive(Clone, Copy, Debug, Default)]
pub struct PluginConfig {
    pub is_vk_mandatory: bool,
}

/// The plugin's own short-circuit outcomes are the resolver's closed
/// `Decision` set plus the one case that never reaches the resolver at
/// all: a missing virtual key on a deployment that requires one.
#[derive(Clone, Copy, Debug)]
pub enum PluginDecision {
    VirtualKeyRequired,
    Resolved(Decision),
}

impl PluginDecision {
    pub fn status_code(self) -> u16 {
        match self {
            PluginDecision::VirtualKeyRequired => 400,
            PluginDecision::Resolved(decision) => decision.status_code(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ShortCircuit {
    pub decision: PluginDecision,
    pub status_code: u16,
    pub message: String,
}

#[derive(Clone, Debug, Default)]
pub struct PreHookRequest {
    pub virtual_key_value: String,
    pub team_hint: Option<String>,
    pub customer_hint: Option<String>,
    pub provider: String,
    pub model: String,
    pub headers: HashMap<String, String>,
    pub params: HashMap<String, String>,
    pub request_id: String,
}

pub struct PreHookOutcome {
    pub provider: String,
    pub model: String,
    pub virtual_key: Option<Arc<VirtualKey>>,
    pub status: BudgetAndRateLimitStatus,
    pub matched_rule_id: String,
}

#[derive(Clone, Debug, Default)]
pub struct UsageUpdate {
    pub virtual_key: Option<Arc<VirtualKey>>,
    pub provider: String,
    pub model: String,
    pub success: bool,
    pub tokens_used: u64,
    pub cost: f64,
    pub request_id: String,
    pub is_streaming: bool,
    pub is_final_chunk: bool,
    pub has_usage_data: bool,
}

pub struct GovernancePlugin {
    store: Arc<GovernanceStore>,
    config: PluginConfig,
    pricing: Option<Arc<dyn PricingManager>>,
}

impl GovernancePlugin {
    pub fn new(store: Arc<GovernanceStore>, config: PluginConfig) -> Self {
        Self { store, config, pricing: None }
    }

    /// Attaches the pricing collaborator used by `post_response_for` to
    /// compute `UsageUpdate.cost` from a raw response body.
    pub fn with_pricing_manager(mut self, pricing: Arc<dyn PricingManager>) -> Self {
        self.pricing = Some(pricing);
        self
    }

    pub fn store(&self) -> &Arc<GovernanceStore> {
        &self.store
    }

    pub fn pre_request(&self, request: PreHookRequest) -> Result<PreHookOutcome, ShortCircuit> {
        if request.virtual_key_value.is_empty() && self.config.is_vk_mandatory {
            return Err(ShortCircuit {
                decision: PluginDecision::VirtualKeyRequired,
                status_code: 400,
                message: "virtual_key_required".into(),
            });
        }

        let resolver = Resolver::new(&self.store);
        let outcome = resolver.evaluate(&EvaluationRequest {
            virtual_key_value: request.virtual_key_value.clone(),
            provider: request.provider.clone(),
            model: request.model.clone(),
            headers: request.headers.clone(),
            request_id: request.request_id.clone(),
        });

        if !outcome.decision.is_allow() {
            return Err(ShortCircuit {
                status_code: outcome.decision.status_code(),
                message: format!("{:?}", outcome.decision),
                decision: PluginDecision::Resolved(outcome.decision),
            });
        }

        let routing_ctx = self.routing_context(&request, &outcome.virtual_key, &outcome.status);
        let decision = RoutingEngine::new(&self.store).route(&routing_ctx);
        let applied = apply_routing_decision(&routing_ctx, &decision);

        Ok(PreHookOutcome {
            provider: applied.provider,
            model: applied.model,
            virtual_key: outcome.virtual_key,
            status: outcome.status,
            matched_rule_id: decision.matched_rule_id,
        })
    }

    fn routing_context(
        &self,
        request: &PreHookRequest,
        vk: &Option<Arc<VirtualKey>>,
        status: &BudgetAndRateLimitStatus,
    ) -> RoutingContext {
        let mut vars = ExprVariables {
            model: request.model.clone(),
            provider: request.provider.clone(),
            headers: request.headers.clone(),
            params: request.params.clone(),
            budget_used: status.budget_percent_used,
            ..Default::default()
        };
        vars.rate_limit
            .insert("token_percent_used".into(), status.rate_limit_token_percent_used);
        vars.rate_limit
            .insert("request_percent_used".into(), status.rate_limit_request_percent_used);
        vars.budget
            .insert("percent_used".into(), status.budget_percent_used);

        let mut team_id = None;
        let mut customer_id = None;
        if let Some(vk) = vk {
            vars.virtual_key_id = vk.id.clone();
            vars.virtual_key_name = vk.name.clone();
            if let Some(id) = &vk.team_id {
                if let Some(team) = self.store.get_team(id) {
                    vars.team_id = team.id.clone();
                    vars.team_name = team.name.clone();
                    team_id = Some(team.id.clone());
                    if let Some(id) = &team.customer_id {
                        if let Some(customer) = self.store.get_customer(id) {
                            vars.customer_id = customer.id.clone();
                            vars.customer_name = customer.name.clone();
                            customer_id = Some(customer.id.clone());
                        }
                    }
                }
            }
        }

        RoutingContext {
            provider: request.provider.clone(),
            model: request.model.clone(),
            virtual_key_id: vk.as_ref().map(|vk| vk.id.clone()),
            team_id,
            customer_id,
            vars,
        }
    }

    /// Computes `update.cost` from `response` via the pricing collaborator,
    /// then applies the usage update — spec.md §6's PostHook order.
    /// Skipped on non-final streaming chunks, where there is nothing to
    /// price yet, and when no pricing collaborator is attached, in which
    /// case `update.cost` passes through unchanged.
    pub async fn post_response_for(&self, response: &serde_json::Value, mut update: UsageUpdate) {
        let priceable = !update.is_streaming || update.is_final_chunk;
        if priceable {
            if let Some(pricing) = &self.pricing {
                update.cost = pricing.calculate_cost(response).await;
            }
        }
        self.post_response(update);
    }

    /// `success = false` leaves every counter untouched. Otherwise,
    /// non-streaming responses update tokens/requests/budget exactly once;
    /// streaming responses apply tokens and cost only on chunks carrying
    /// usage data, and count exactly one request, on the final chunk.
    /// Provider- and model-level defaults update regardless of whether a
    /// virtual key was present; the VK-hierarchy update only runs when one
    /// was.
    pub fn post_response(&self, update: UsageUpdate) {
        if !update.success {
            return;
        }

        let (inc_tokens, inc_requests, apply_cost) = if update.is_streaming {
            (update.has_usage_data, update.is_final_chunk, update.has_usage_data)
        } else {
            (true, true, true)
        };

        if let Some(vk) = &update.virtual_key {
            if inc_tokens || inc_requests {
                self.store.update_virtual_key_rate_limit_usage(
                    vk,
                    &update.provider,
                    update.tokens_used,
                    inc_tokens,
                    inc_requests,
                );
            }
            if apply_cost {
                self.store
                    .update_virtual_key_budget_usage(vk, &update.provider, update.cost);
            }
        }

        if inc_tokens || inc_requests {
            self.store.update_provider_and_model_rate_limit_usage(
                &update.model,
                &update.provider,
                update.tokens_used,
                inc_tokens,
                inc_requests,
            );
        }
        if apply_cost {
            self.store
                .update_provider_and_model_budget_usage(&update.model, &update.provider, update.cost);
        }
    }
}
