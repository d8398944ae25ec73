use crate::model::VirtualKey;

use super::GovernanceStore;

impl GovernanceStore {
    /// Atomically applies a rate-limit usage delta to the virtual key's own
    /// rate limit and, if the request's provider has a per-key override
    /// with its own rate limit, to that override's rate limit too. Each
    /// counter is a separate atomic add; the two updates are independent
    /// and unordered relative to each other.
    pub fn update_virtual_key_rate_limit_usage(
        &self,
        vk: &VirtualKey,
        provider: &str,
        tokens: u64,
        inc_tokens: bool,
        inc_requests: bool,
    ) {
        if let Some(rate_limit_id) = &vk.rate_limit_id {
            if let Some(rate_limit) = self.get_rate_limit(rate_limit_id) {
                apply_rate_limit_delta(&rate_limit, tokens, inc_tokens, inc_requests);
            }
        }

        if let Some(provider_config) = vk.provider_config(provider) {
            if let Some(rate_limit_id) = &provider_config.rate_limit_id {
                if let Some(rate_limit) = self.get_rate_limit(rate_limit_id) {
                    apply_rate_limit_delta(&rate_limit, tokens, inc_tokens, inc_requests);
                }
            }
        }
    }

    /// Applies the same delta to the provider- and model-level default
    /// rate limits, independent of whether a virtual key was present at
    /// all.
    pub fn update_provider_and_model_rate_limit_usage(
        &self,
        model: &str,
        provider: &str,
        tokens: u64,
        inc_tokens: bool,
        inc_requests: bool,
    ) {
        if let Some(provider_entity) = self.get_provider(provider) {
            if let Some(rate_limit_id) = &provider_entity.rate_limit_id {
                if let Some(rate_limit) = self.get_rate_limit(rate_limit_id) {
                    apply_rate_limit_delta(&rate_limit, tokens, inc_tokens, inc_requests);
                }
            }
        }

        if let Some(model_config) = self.get_model_config(provider, model) {
            if let Some(rate_limit_id) = &model_config.rate_limit_id {
                if let Some(rate_limit) = self.get_rate_limit(rate_limit_id) {
                    apply_rate_limit_delta(&rate_limit, tokens, inc_tokens, inc_requests);
                }
            }
        }
    }

    /// Walks virtual key → team → customer, adding `cost` to every budget
    /// that exists along the way. `_provider` is accepted for symmetry
    /// with the rate-limit updater and future per-provider VK budget
    /// overrides; the hierarchy walk itself does not branch on it today.
    pub fn update_virtual_key_budget_usage(&self, vk: &VirtualKey, _provider: &str, cost: f64) {
        if cost == 0.0 {
            return;
        }

        if let Some(budget_id) = &vk.budget_id {
            if let Some(budget) = self.get_budget(budget_id) {
                budget.add_usage(cost);
            }
        }

        if let Some(team_id) = &vk.team_id {
            if let Some(team) = self.get_team(team_id) {
                if let Some(budget_id) = &team.budget_id {
                    if let Some(budget) = self.get_budget(budget_id) {
                        budget.add_usage(cost);
                    }
                }

                if let Some(customer_id) = &team.customer_id {
                    if let Some(customer) = self.get_customer(customer_id) {
                        if let Some(budget_id) = &customer.budget_id {
                            if let Some(budget) = self.get_budget(budget_id) {
                                budget.add_usage(cost);
                            }
                        }
                    }
                }
            }
        }
    }

    /// As above, for the provider- and model-level default budgets.
    pub fn update_provider_and_model_budget_usage(&self, model: &str, provider: &str, cost: f64) {
        if cost == 0.0 {
            return;
        }

        if let Some(provider_entity) = self.get_provider(provider) {
            if let Some(budget_id) = &provider_entity.budget_id {
                if let Some(budget) = self.get_budget(budget_id) {
                    budget.add_usage(cost);
                }
            }
        }

        if let Some(model_config) = self.get_model_config(provider, model) {
            if let Some(budget_id) = &model_config.budget_id {
                if let Some(budget) = self.get_budget(budget_id) {
                    budget.add_usage(cost);
                }
            }
        }
    }
}

fn apply_rate_limit_delta(
    rate_limit: &crate::model::RateLimit,
    tokens: u64,
    inc_tokens: bool,
    inc_requests: bool,
) {
    if inc_tokens && tokens > 0 {
        rate_limit.add_tokens(tokens);
    }
    if inc_requests {
        rate_limit.add_request();
    }
}
