use crate::config_store::ConfigStore;
use crate::error::GovernanceError;
use crate::model::{Budget, RateLimit};

use super::GovernanceStore;

impl GovernanceStore {
    /// Materializes every entity from `config_store` into the in-memory
    /// index. Run at startup and again on change notifications; never on
    /// the request path (spec.md §3's lifecycle note).
    pub async fn hydrate_from(&self, config_store: &dyn ConfigStore) -> Result<(), GovernanceError> {
        for key in config_store.load_virtual_keys().await? {
            self.upsert_virtual_key(key);
        }
        for team in config_store.load_teams().await? {
            self.upsert_team(team);
        }
        for customer in config_store.load_customers().await? {
            self.upsert_customer(customer);
        }
        for provider in config_store.load_providers().await? {
            self.upsert_provider(provider);
        }
        for model_config in config_store.load_model_configs().await? {
            self.upsert_model_config(model_config);
        }
        for snapshot in config_store.load_budgets().await? {
            self.upsert_budget(Budget::from_snapshot(&snapshot)?);
        }
        for snapshot in config_store.load_rate_limits().await? {
            self.upsert_rate_limit(RateLimit::from_snapshot(&snapshot)?);
        }
        for rule in config_store.load_routing_rules().await? {
            self.upsert_routing_rule(rule)?;
        }
        Ok(())
    }
}
