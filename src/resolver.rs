//! The budget/rate-limit decision engine: given a request, walk the
//! virtual-key → team → customer → provider/model hierarchy and produce a
//! typed allow/deny verdict plus a percent-used snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use crate::model::{Budget, RateLimit, VirtualKey};
use crate::store::GovernanceStore;

/// The closed set of outcomes the resolver can return. Never represented
/// as a `Result::Err` — a blocked or exhausted request is a normal,
/// typed decision, not a failure of the resolver itself.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Decision {
    Allow,
    VirtualKeyNotFound,
    VirtualKeyBlocked,
    ModelBlocked,
    ProviderBlocked,
    RateLimited,
    TokenLimited,
    RequestLimited,
    BudgetExceeded,
}

impl Decision {
    pub fn status_code(self) -> u16 {
        match self {
            Decision::Allow => 200,
            Decision::VirtualKeyNotFound
            | Decision::VirtualKeyBlocked
            | Decision::ModelBlocked
            | Decision::ProviderBlocked => 403,
            Decision::RateLimited | Decision::TokenLimited | Decision::RequestLimited => 429,
            Decision::BudgetExceeded => 402,
        }
    }

    pub fn is_allow(self) -> bool {
        matches!(self, Decision::Allow)
    }
}

#[derive(Clone, Debug, Default)]
pub struct EvaluationRequest {
    pub virtual_key_value: String,
    pub provider: String,
    pub model: String,
    pub headers: HashMap<String, String>,
    pub request_id: String,
}

/// `0 <= x <= 100`, each computed from the most specific applicable
/// record in the hierarchy; `0.0` when no such record exists.
#[derive(Clone, Copy, Debug, Default)]
pub struct BudgetAndRateLimitStatus {
    pub budget_percent_used: f64,
    pub rate_limit_token_percent_used: f64,
    pub rate_limit_request_percent_used: f64,
}

pub struct EvaluationOutcome {
    pub decision: Decision,
    pub status: BudgetAndRateLimitStatus,
    pub virtual_key: Option<Arc<VirtualKey>>,
}

pub struct Resolver<'a> {
    store: &'a GovernanceStore,
}

impl<'a> Resolver<'a> {
    pub fn new(store: &'a GovernanceStore) -> Self {
        Self { store }
    }

    pub fn evaluate(&self, request: &EvaluationRequest) -> EvaluationOutcome {
        if request.virtual_key_value.is_empty() {
            return EvaluationOutcome {
                decision: Decision::Allow,
                status: BudgetAndRateLimitStatus::default(),
                virtual_key: None,
            };
        }

        let vk = match self.store.get_virtual_key(&request.virtual_key_value) {
            Some(vk) => vk,
            None => {
                return EvaluationOutcome {
                    decision: Decision::VirtualKeyNotFound,
                    status: BudgetAndRateLimitStatus::default(),
                    virtual_key: None,
                };
            }
        };

        if !vk.is_active {
            return self.outcome(Decision::VirtualKeyBlocked, Some(vk), None, None);
        }

        if !vk.provider_configs.is_empty() {
            match vk.provider_config(&request.provider) {
                None => return self.outcome(Decision::ProviderBlocked, Some(vk), None, None),
                Some(provider_config) => {
                    if !provider_config.allowed_models.is_empty()
                        && !provider_config
                            .allowed_models
                            .iter()
                            .any(|allowed| allowed == &request.model)
                    {
                        return self.outcome(Decision::ModelBlocked, Some(vk), None, None);
                    }
                }
            }
        }

        let rate_limits = self.rate_limit_chain(&vk, &request.provider, &request.model);
        for rate_limit in &rate_limits {
            if rate_limit.is_token_exhausted() {
                return self.outcome(Decision::TokenLimited, Some(vk), None, Some(&rate_limits));
            }
            if rate_limit.is_request_exhausted() {
                return self.outcome(Decision::RequestLimited, Some(vk), None, Some(&rate_limits));
            }
        }

        let budgets = self.budget_chain(&vk, &request.provider, &request.model);
        for budget in &budgets {
            if budget.is_exhausted() {
                return self.outcome(Decision::BudgetExceeded, Some(vk), Some(&budgets), Some(&rate_limits));
            }
        }

        self.outcome(Decision::Allow, Some(vk), Some(&budgets), Some(&rate_limits))
    }

    fn outcome(
        &self,
        decision: Decision,
        vk: Option<Arc<VirtualKey>>,
        budgets: Option<&[Arc<Budget>]>,
        rate_limits: Option<&[Arc<RateLimit>]>,
    ) -> EvaluationOutcome {
        let status = BudgetAndRateLimitStatus {
            budget_percent_used: budgets
                .and_then(|chain| chain.first())
                .map(|budget| budget.percent_used())
                .unwrap_or(0.0),
            rate_limit_token_percent_used: rate_limits
                .and_then(|chain| chain.first())
                .map(|rate_limit| rate_limit.token_percent_used())
                .unwrap_or(0.0),
            rate_limit_request_percent_used: rate_limits
                .and_then(|chain| chain.first())
                .map(|rate_limit| rate_limit.request_percent_used())
                .unwrap_or(0.0),
        };
        EvaluationOutcome {
            decision,
            status,
            virtual_key: vk,
        }
    }

    /// Most-specific-first: virtual key, then the VK's per-provider
    /// override, then the provider default, then the model default.
    fn rate_limit_chain(
        &self,
        vk: &VirtualKey,
        provider: &str,
        model: &str,
    ) -> Vec<Arc<RateLimit>> {
        let mut chain = Vec::new();
        if let Some(id) = &vk.rate_limit_id {
            if let Some(rate_limit) = self.store.get_rate_limit(id) {
                chain.push(rate_limit);
            }
        }
        if let Some(provider_config) = vk.provider_config(provider) {
            if let Some(id) = &provider_config.rate_limit_id {
                if let Some(rate_limit) = self.store.get_rate_limit(id) {
                    chain.push(rate_limit);
                }
            }
        }
        if let Some(provider_entity) = self.store.get_provider(provider) {
            if let Some(id) = &provider_entity.rate_limit_id {
                if let Some(rate_limit) = self.store.get_rate_limit(id) {
                    chain.push(rate_limit);
                }
            }
        }
        if let Some(model_config) = self.store.get_model_config(provider, model) {
            if let Some(id) = &model_config.rate_limit_id {
                if let Some(rate_limit) = self.store.get_rate_limit(id) {
                    chain.push(rate_limit);
                }
            }
        }
        chain
    }

    /// VK, then team, then customer, then provider, then model.
    fn budget_chain(&self, vk: &VirtualKey, provider: &str, model: &str) -> Vec<Arc<Budget>> {
        let mut chain = Vec::new();
        if let Some(id) = &vk.budget_id {
            if let Some(budget) = self.store.get_budget(id) {
                chain.push(budget);
            }
        }
        if let Some(team_id) = &vk.team_id {
            if let Some(team) = self.store.get_team(team_id) {
                if let Some(id) = &team.budget_id {
                    if let Some(budget) = self.store.get_budget(id) {
                        chain.push(budget);
                    }
                }
                if let Some(customer_id) = &team.customer_id {
                    if let Some(customer) = self.store.get_customer(customer_id) {
                        if let Some(id) = &customer.budget_id {
                            if let Some(budget) = self.store.get_budget(id) {
                                chain.push(budget);
                            }
                        }
                    }
                }
            }
        }
        if let Some(provider_entity) = self.store.get_provider(provider) {
            if let Some(id) = &provider_entity.budget_id {
                if let Some(budget) = self.store.get_budget(id) {
                    chain.push(budget);
                }
            }
        }
        if let Some(model_config) = self.store.get_model_config(provider, model) {
            if let Some(id) = &model_config.budget_id {
                if let Some(budget) = self.store.get_budget(id) {
                    chain.push(budget);
                }
            }
        }
        chain
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::model::{Budget, ProviderOverride, RateLimit};

    fn vk_fixture(store: &GovernanceStore, budget_id: Option<&str>) -> VirtualKey {
        let vk = VirtualKey {
            id: "vk-1".into(),
            value: "sk-test".into(),
            name: "test key".into(),
            is_active: true,
            budget_id: budget_id.map(str::to_string),
            rate_limit_id: None,
            team_id: None,
            provider_configs: Vec::new(),
        };
        store.upsert_virtual_key(vk.clone());
        vk
    }

    #[test]
    fn missing_virtual_key_is_not_found() {
        let store = GovernanceStore::new();
        let resolver = Resolver::new(&store);
        let outcome = resolver.evaluate(&EvaluationRequest {
            virtual_key_value: "sk-unknown".into(),
            provider: "openai".into(),
            model: "gpt-4o".into(),
            ..Default::default()
        });
        assert_eq!(outcome.decision, Decision::VirtualKeyNotFound);
    }

    #[test]
    fn empty_virtual_key_value_allows() {
        let store = GovernanceStore::new();
        let resolver = Resolver::new(&store);
        let outcome = resolver.evaluate(&EvaluationRequest::default());
        assert_eq!(outcome.decision, Decision::Allow);
    }

    #[test]
    fn inactive_key_is_blocked() {
        let store = GovernanceStore::new();
        let mut vk = vk_fixture(&store, None);
        vk.is_active = false;
        store.upsert_virtual_key(vk);

        let resolver = Resolver::new(&store);
        let outcome = resolver.evaluate(&EvaluationRequest {
            virtual_key_value: "sk-test".into(),
            provider: "openai".into(),
            model: "gpt-4o".into(),
            ..Default::default()
        });
        assert_eq!(outcome.decision, Decision::VirtualKeyBlocked);
    }

    #[test]
    fn provider_not_in_overrides_is_blocked() {
        let store = GovernanceStore::new();
        let mut vk = vk_fixture(&store, None);
        vk.provider_configs.push(ProviderOverride {
            provider: "anthropic".into(),
            allowed_models: Vec::new(),
            budget_id: None,
            rate_limit_id: None,
        });
        store.upsert_virtual_key(vk);

        let resolver = Resolver::new(&store);
        let outcome = resolver.evaluate(&EvaluationRequest {
            virtual_key_value: "sk-test".into(),
            provider: "openai".into(),
            model: "gpt-4o".into(),
            ..Default::default()
        });
        assert_eq!(outcome.decision, Decision::ProviderBlocked);
    }

    #[test]
    fn model_not_in_allowed_models_is_blocked() {
        let store = GovernanceStore::new();
        let mut vk = vk_fixture(&store, None);
        vk.provider_configs.push(ProviderOverride {
            provider: "openai".into(),
            allowed_models: vec!["gpt-4o-mini".into()],
            budget_id: None,
            rate_limit_id: None,
        });
        store.upsert_virtual_key(vk);

        let resolver = Resolver::new(&store);
        let outcome = resolver.evaluate(&EvaluationRequest {
            virtual_key_value: "sk-test".into(),
            provider: "openai".into(),
            model: "gpt-4o".into(),
            ..Default::default()
        });
        assert_eq!(outcome.decision, Decision::ModelBlocked);
    }

    /// Budget exhaustion is `current_usage >= max_limit` — equality
    /// exhausts, per the spec's pinned scenario.
    #[test]
    fn budget_exhaustion_at_equality_blocks() {
        let store = GovernanceStore::new();
        store.upsert_budget(Budget::new("b1", 100.0, Duration::from_secs(3600)));
        store.get_budget("b1").unwrap().add_usage(100.0);
        vk_fixture(&store, Some("b1"));

        let resolver = Resolver::new(&store);
        let outcome = resolver.evaluate(&EvaluationRequest {
            virtual_key_value: "sk-test".into(),
            provider: "openai".into(),
            model: "gpt-4o".into(),
            ..Default::default()
        });
        assert_eq!(outcome.decision, Decision::BudgetExceeded);
        assert_eq!(outcome.status.budget_percent_used, 100.0);
    }

    #[test]
    fn rate_limit_most_specific_wins() {
        let store = GovernanceStore::new();
        store.upsert_rate_limit(RateLimit::new(
            "rl-vk",
            Some(10),
            Duration::from_secs(60),
            None,
            Duration::from_secs(60),
        ));
        store.get_rate_limit("rl-vk").unwrap().add_tokens(10);

        let mut vk = vk_fixture(&store, None);
        vk.rate_limit_id = Some("rl-vk".into());
        store.upsert_virtual_key(vk);

        let resolver = Resolver::new(&store);
        let outcome = resolver.evaluate(&EvaluationRequest {
            virtual_key_value: "sk-test".into(),
            provider: "openai".into(),
            model: "gpt-4o".into(),
            ..Default::default()
        });
        assert_eq!(outcome.decision, Decision::TokenLimited);
    }
}
