//! The configuration-store collaborator: the core only ever reads
//! whole-table snapshots and writes counter columns through this narrow
//! trait, never raw SQL — mirroring the teacher's `SqliteStore` (see
//! `sqlite_store.rs`) as a collaborator the governance core is handed,
//! not something it owns the schema of.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::GovernanceError;
use crate::model::{
    BudgetSnapshot, Customer, ModelConfig, Provider, RateLimitSnapshot, RoutingRule, Team,
    VirtualKey,
};

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn load_virtual_keys(&self) -> Result<Vec<VirtualKey>, GovernanceError>;
    async fn load_teams(&self) -> Result<Vec<Team>, GovernanceError>;
    async fn load_customers(&self) -> Result<Vec<Customer>, GovernanceError>;
    async fn load_providers(&self) -> Result<Vec<Provider>, GovernanceError>;
    async fn load_model_configs(&self) -> Result<Vec<ModelConfig>, GovernanceError>;
    async fn load_budgets(&self) -> Result<Vec<BudgetSnapshot>, GovernanceError>;
    async fn load_rate_limits(&self) -> Result<Vec<RateLimitSnapshot>, GovernanceError>;
    async fn load_routing_rules(&self) -> Result<Vec<RoutingRule>, GovernanceError>;

    /// Column-selective: only `{current_usage, last_reset}` per budget.
    async fn persist_budget_counters(
        &self,
        counters: Vec<BudgetSnapshot>,
    ) -> Result<(), GovernanceError>;

    /// Column-selective: only `{token_current_usage, token_last_reset,
    /// request_current_usage, request_last_reset}` per rate limit.
    async fn persist_rate_limit_counters(
        &self,
        counters: Vec<RateLimitSnapshot>,
    ) -> Result<(), GovernanceError>;
}

/// A single method, returning `0` when pricing is unavailable rather than
/// an error — cost accounting degrades gracefully, it never blocks a
/// response on the pricing collaborator being down.
#[async_trait]
pub trait PricingManager: Send + Sync {
    async fn calculate_cost(&self, response: &serde_json::Value) -> f64;
}

/// An in-memory `ConfigStore` for tests. Plain `Mutex`-guarded vectors —
/// there is no concurrent-map concern here, only one test thread touches
/// it at a time per instance.
#[derive(Default)]
pub struct InMemoryConfigStore {
    virtual_keys: Mutex<Vec<VirtualKey>>,
    teams: Mutex<Vec<Team>>,
    customers: Mutex<Vec<Customer>>,
    providers: Mutex<Vec<Provider>>,
    model_configs: Mutex<Vec<ModelConfig>>,
    budgets: Mutex<Vec<BudgetSnapshot>>,
    rate_limits: Mutex<Vec<RateLimitSnapshot>>,
    routing_rules: Mutex<Vec<RoutingRule>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_virtual_key(&self, key: VirtualKey) {
        self.virtual_keys.lock().unwrap().push(key);
    }

    pub fn seed_budget(&self, budget: BudgetSnapshot) {
        self.budgets.lock().unwrap().push(budget);
    }

    pub fn seed_rate_limit(&self, rate_limit: RateLimitSnapshot) {
        self.rate_limits.lock().unwrap().push(rate_limit);
    }

    pub fn seed_routing_rule(&self, rule: RoutingRule) {
        self.routing_rules.lock().unwrap().push(rule);
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn load_virtual_keys(&self) -> Result<Vec<VirtualKey>, GovernanceError> {
        Ok(self.virtual_keys.lock().unwrap().clone())
    }

    async fn load_teams(&self) -> Result<Vec<Team>, GovernanceError> {
        Ok(self.teams.lock().unwrap().clone())
    }

    async fn load_customers(&self) -> Result<Vec<Customer>, GovernanceError> {
        Ok(self.customers.lock().unwrap().clone())
    }

    async fn load_providers(&self) -> Result<Vec<Provider>, GovernanceError> {
        Ok(self.providers.lock().unwrap().clone())
    }

    async fn load_model_configs(&self) -> Result<Vec<ModelConfig>, GovernanceError> {
        Ok(self.model_configs.lock().unwrap().clone())
    }

    async fn load_budgets(&self) -> Result<Vec<BudgetSnapshot>, GovernanceError> {
        Ok(self.budgets.lock().unwrap().clone())
    }

    async fn load_rate_limits(&self) -> Result<Vec<RateLimitSnapshot>, GovernanceError> {
        Ok(self.rate_limits.lock().unwrap().clone())
    }

    async fn load_routing_rules(&self) -> Result<Vec<RoutingRule>, GovernanceError> {
        Ok(self.routing_rules.lock().unwrap().clone())
    }

    async fn persist_budget_counters(
        &self,
        counters: Vec<BudgetSnapshot>,
    ) -> Result<(), GovernanceError> {
        let mut stored = self.budgets.lock().unwrap();
        for counter in counters {
            match stored.iter_mut().find(|existing| existing.id == counter.id) {
                Some(existing) => {
                    existing.current_usage = counter.current_usage;
                    existing.last_reset_ms = counter.last_reset_ms;
                }
                None => stored.push(counter),
            }
        }
        Ok(())
    }

    async fn persist_rate_limit_counters(
        &self,
        counters: Vec<RateLimitSnapshot>,
    ) -> Result<(), GovernanceError> {
        let mut stored = self.rate_limits.lock().unwrap();
        for counter in counters {
            match stored.iter_mut().find(|existing| existing.id == counter.id) {
                Some(existing) => {
                    existing.token_current_usage = counter.token_current_usage;
                    existing.token_last_reset_ms = counter.token_last_reset_ms;
                    existing.request_current_usage = counter.request_current_usage;
                    existing.request_last_reset_ms = counter.request_last_reset_ms;
                }
                None => stored.push(counter),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn persist_budget_counters_only_touches_counter_columns() {
        let store = InMemoryConfigStore::new();
        store.seed_budget(BudgetSnapshot {
            id: "b1".into(),
            max_limit: 100.0,
            current_usage: 0.0,
            reset_duration: "1h".into(),
            last_reset_ms: 0,
        });

        store
            .persist_budget_counters(vec![BudgetSnapshot {
                id: "b1".into(),
                max_limit: 999.0,
                current_usage: 42.0,
                reset_duration: "1h".into(),
                last_reset_ms: 123,
            }])
            .await
            .unwrap();

        let loaded = store.load_budgets().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].current_usage, 42.0);
        assert_eq!(loaded[0].last_reset_ms, 123);
        // max_limit is untouched by a counter-only persist.
        assert_eq!(loaded[0].max_limit, 100.0);
    }
}
