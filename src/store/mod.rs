//! The indexed, concurrently-readable snapshot of governance entities.
//!
//! Configuration entities (`VirtualKey`, `Team`, `Customer`, `Provider`,
//! `ModelConfig`, `RoutingRule`) are stored as `Arc<T>` behind a `DashMap`
//! and replaced wholesale on administrative update — copy-on-write, no
//! torn reads. `Budget` and `RateLimit` are field-level atomic structs
//! (see `model.rs`) and are never replaced wholesale; an administrative
//! edit mutates only their config fields, which is what keeps counters
//! intact across config edits without a lock spanning the whole record.

mod bootstrap;
mod counters;
mod reset;

use std::sync::Arc;

use dashmap::DashMap;

use crate::error::GovernanceError;
use crate::expr::ExpressionRuntime;
use crate::model::{
    Budget, Customer, ModelConfig, Provider, RateLimit, RoutingRule, Scope, Team, VirtualKey,
    model_config_key,
};

pub use reset::{ResetBudgetOutcome, ResetRateLimitOutcome};

pub struct GovernanceStore {
    virtual_keys_by_value: DashMap<String, Arc<VirtualKey>>,
    virtual_keys_by_id: DashMap<String, Arc<VirtualKey>>,
    teams: DashMap<String, Arc<Team>>,
    customers: DashMap<String, Arc<Customer>>,
    providers: DashMap<String, Arc<Provider>>,
    model_configs: DashMap<String, Arc<ModelConfig>>,
    budgets: DashMap<String, Arc<Budget>>,
    rate_limits: DashMap<String, Arc<RateLimit>>,
    routing_rules: DashMap<String, Arc<RoutingRule>>,
    expr_runtime: ExpressionRuntime,
}

impl Default for GovernanceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GovernanceStore {
    pub fn new() -> Self {
        Self {
            virtual_keys_by_value: DashMap::new(),
            virtual_keys_by_id: DashMap::new(),
            teams: DashMap::new(),
            customers: DashMap::new(),
            providers: DashMap::new(),
            model_configs: DashMap::new(),
            budgets: DashMap::new(),
            rate_limits: DashMap::new(),
            routing_rules: DashMap::new(),
            expr_runtime: ExpressionRuntime::new(),
        }
    }

    pub fn expr_runtime(&self) -> &ExpressionRuntime {
        &self.expr_runtime
    }

    // -- reads --------------------------------------------------------

    /// Lock-free lookup by the credential's opaque value: `DashMap::get`
    /// only takes the shard lock for the shard the key hashes into, and
    /// returns a clone of the `Arc`, so the caller holds a consistent
    /// snapshot of the entity regardless of concurrent writers.
    pub fn get_virtual_key(&self, value: &str) -> Option<Arc<VirtualKey>> {
        self.virtual_keys_by_value.get(value).map(|entry| entry.clone())
    }

    pub fn get_virtual_key_by_id(&self, id: &str) -> Option<Arc<VirtualKey>> {
        self.virtual_keys_by_id.get(id).map(|entry| entry.clone())
    }

    pub fn get_team(&self, id: &str) -> Option<Arc<Team>> {
        self.teams.get(id).map(|entry| entry.clone())
    }

    pub fn get_customer(&self, id: &str) -> Option<Arc<Customer>> {
        self.customers.get(id).map(|entry| entry.clone())
    }

    pub fn get_provider(&self, id: &str) -> Option<Arc<Provider>> {
        self.providers.get(id).map(|entry| entry.clone())
    }

    pub fn get_model_config(&self, provider: &str, model: &str) -> Option<Arc<ModelConfig>> {
        self.model_configs
            .get(&model_config_key(provider, model))
            .map(|entry| entry.clone())
    }

    pub fn get_budget(&self, id: &str) -> Option<Arc<Budget>> {
        self.budgets.get(id).map(|entry| entry.clone())
    }

    pub fn get_rate_limit(&self, id: &str) -> Option<Arc<RateLimit>> {
        self.rate_limits.get(id).map(|entry| entry.clone())
    }

    pub fn get_routing_rule(&self, id: &str) -> Option<Arc<RoutingRule>> {
        self.routing_rules.get(id).map(|entry| entry.clone())
    }

    pub fn rules_for_scope(&self, scope: Scope, scope_id: Option<&str>) -> Vec<Arc<RoutingRule>> {
        let mut rules: Vec<Arc<RoutingRule>> = self
            .routing_rules
            .iter()
            .filter(|entry| {
                let rule = entry.value();
                rule.enabled
                    && rule.scope == scope
                    && match scope {
                        Scope::Global => true,
                        _ => rule.scope_id.as_deref() == scope_id,
                    }
            })
            .map(|entry| entry.clone())
            .collect();
        rules.sort_by_key(|rule| rule.priority);
        rules
    }

    pub fn all_budgets(&self) -> Vec<Arc<Budget>> {
        self.budgets.iter().map(|entry| entry.clone()).collect()
    }

    pub fn all_rate_limits(&self) -> Vec<Arc<RateLimit>> {
        self.rate_limits.iter().map(|entry| entry.clone()).collect()
    }

    // -- writes ---------------------------------------------------------

    /// Replaces the virtual key's config pointer wholesale. Counter state
    /// lives in the separate `budgets`/`rate_limits` maps keyed by id, so
    /// this can never clobber usage — there is nothing counter-shaped in
    /// `VirtualKey` itself to preserve.
    pub fn upsert_virtual_key(&self, key: VirtualKey) {
        let key = Arc::new(key);
        self.virtual_keys_by_value
            .insert(key.value.clone(), key.clone());
        self.virtual_keys_by_id.insert(key.id.clone(), key);
    }

    pub fn remove_virtual_key(&self, id: &str) {
        if let Some((_, key)) = self.virtual_keys_by_id.remove(id) {
            self.virtual_keys_by_value.remove(&key.value);
        }
    }

    pub fn upsert_team(&self, team: Team) {
        self.teams.insert(team.id.clone(), Arc::new(team));
    }

    pub fn upsert_customer(&self, customer: Customer) {
        self.customers.insert(customer.id.clone(), Arc::new(customer));
    }

    pub fn upsert_provider(&self, provider: Provider) {
        self.providers.insert(provider.id.clone(), Arc::new(provider));
    }

    pub fn upsert_model_config(&self, model_config: ModelConfig) {
        let key = model_config_key(&model_config.provider, &model_config.model);
        self.model_configs.insert(key, Arc::new(model_config));
    }

    pub fn upsert_budget(&self, budget: Budget) {
        self.budgets.insert(budget.id.clone(), Arc::new(budget));
    }

    pub fn upsert_rate_limit(&self, rate_limit: RateLimit) {
        self.rate_limits
            .insert(rate_limit.id.clone(), Arc::new(rate_limit));
    }

    pub fn upsert_routing_rule(&self, rule: RoutingRule) -> Result<(), GovernanceError> {
        ExpressionRuntime::validate(&rule.cel_expression)?;
        self.expr_runtime.invalidate(&rule.id);
        self.routing_rules.insert(rule.id.clone(), Arc::new(rule));
        Ok(())
    }

    pub fn remove_routing_rule(&self, id: &str) {
        self.routing_rules.remove(id);
        self.expr_runtime.invalidate(id);
    }
}
