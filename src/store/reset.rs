use std::sync::Arc;

use crate::model::{Budget, RateLimit, now_millis};

use super::GovernanceStore;

/// What the in-memory sweep actually reset, so the flush step can issue a
/// column-selective persist for exactly those rows and nothing else.
pub struct ResetRateLimitOutcome {
    pub rate_limit: Arc<RateLimit>,
    pub token_reset: bool,
    pub request_reset: bool,
}

pub struct ResetBudgetOutcome {
    pub budget: Arc<Budget>,
}

impl GovernanceStore {
    /// Scans every rate limit and resets whichever window (token,
    /// request, or both) has expired. Idempotent within a window: a
    /// second call before the window elapses again finds nothing to do.
    pub fn reset_expired_rate_limits_in_memory(&self) -> Vec<ResetRateLimitOutcome> {
        let now = now_millis();
        self.all_rate_limits()
            .into_iter()
            .filter_map(|rate_limit| {
                let (token_reset, request_reset) = rate_limit.reset_if_expired(now);
                if token_reset || request_reset {
                    Some(ResetRateLimitOutcome {
                        rate_limit,
                        token_reset,
                        request_reset,
                    })
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn reset_expired_budgets_in_memory(&self) -> Vec<ResetBudgetOutcome> {
        let now = now_millis();
        self.all_budgets()
            .into_iter()
            .filter_map(|budget| {
                if budget.reset_if_expired(now) {
                    Some(ResetBudgetOutcome { budget })
                } else {
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Budget, BudgetSnapshot, RateLimit, RateLimitSnapshot, now_millis};

    #[test]
    fn reset_is_idempotent_within_one_window() {
        let store = GovernanceStore::new();
        // A 1s window whose last reset was 2s ago: genuinely expired. A
        // zero-duration window is never treated as due by `is_expired`, so
        // it cannot stand in for "already elapsed" here.
        let budget = Budget::from_snapshot(&BudgetSnapshot {
            id: "b1".into(),
            max_limit: 100.0,
            current_usage: 50.0,
            reset_duration: "1s".into(),
            last_reset_ms: now_millis().saturating_sub(2_000),
        })
        .unwrap();
        store.upsert_budget(budget);

        let first = store.reset_expired_budgets_in_memory();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].budget.current_usage(), 0.0);

        let second = store.reset_expired_budgets_in_memory();
        // The window just reset, so it has not elapsed again yet.
        assert_eq!(second.len(), 0);
        assert_eq!(store.get_budget("b1").unwrap().current_usage(), 0.0);
    }

    #[test]
    fn rate_limit_windows_reset_independently() {
        let store = GovernanceStore::new();
        // Token window: long duration, not yet due. Request window: 1s
        // duration whose last reset is 2s in the past, genuinely expired.
        let rate_limit = RateLimit::from_snapshot(&RateLimitSnapshot {
            id: "r1".into(),
            token_max_limit: Some(100),
            token_current_usage: 50,
            token_reset_duration: Some("1h".into()),
            token_last_reset_ms: now_millis(),
            request_max_limit: Some(10),
            request_current_usage: 1,
            request_reset_duration: Some("1s".into()),
            request_last_reset_ms: now_millis().saturating_sub(2_000),
        })
        .unwrap();
        store.upsert_rate_limit(rate_limit);

        let outcomes = store.reset_expired_rate_limits_in_memory();
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].token_reset);
        assert!(outcomes[0].request_reset);
        assert_eq!(outcomes[0].rate_limit.token_current_usage(), 50);
        assert_eq!(outcomes[0].rate_limit.request_current_usage(), 0);
    }
}
