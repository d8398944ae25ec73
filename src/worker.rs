//! The reset/flush worker: a single periodic task that resets expired
//! counters in memory, then persists them, on a fixed tick. Cancellable
//! via `tokio_util::sync::CancellationToken`, mirroring the teacher's use
//! of the same crate for graceful shutdown elsewhere in `gateway/`.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::config_store::ConfigStore;
use crate::store::GovernanceStore;

const TICK: Duration = Duration::from_secs(10);

pub struct ResetFlushWorker {
    store: Arc<GovernanceStore>,
    config_store: Arc<dyn ConfigStore>,
    cancel: CancellationToken,
}

impl ResetFlushWorker {
    pub fn new(store: Arc<GovernanceStore>, config_store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            config_store,
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// A one-shot sweep run at startup over every rate limit and budget
    /// currently loaded, to catch windows that expired while the process
    /// was down. Persists whatever it resets, same as a regular tick.
    pub async fn startup_reset_sweep(&self) {
        self.reset_and_flush().await;
    }

    /// Runs until cancelled. Cancellation stops the ticker immediately but
    /// lets an in-flight iteration finish before returning.
    pub async fn run(&self) {
        let mut ticker = interval(TICK);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("reset/flush worker cancelled");
                    return;
                }
                _ = ticker.tick() => {
                    self.reset_and_flush().await;
                }
            }
        }
    }

    async fn reset_and_flush(&self) {
        let rate_limit_outcomes = self.store.reset_expired_rate_limits_in_memory();
        if !rate_limit_outcomes.is_empty() {
            let counters = rate_limit_outcomes
                .iter()
                .map(|outcome| outcome.rate_limit.snapshot())
                .collect();
            if let Err(err) = self.config_store.persist_rate_limit_counters(counters).await {
                tracing::error!(error = %err, "failed to persist rate limit counters");
            }
        }

        let budget_outcomes = self.store.reset_expired_budgets_in_memory();
        if !budget_outcomes.is_empty() {
            let counters = budget_outcomes
                .iter()
                .map(|outcome| outcome.budget.snapshot())
                .collect();
            if let Err(err) = self.config_store.persist_budget_counters(counters).await {
                tracing::error!(error = %err, "failed to persist budget counters");
            }
        }

        let all_rate_limits = self
            .store
            .all_rate_limits()
            .iter()
            .map(|rate_limit| rate_limit.snapshot())
            .collect::<Vec<_>>();
        if let Err(err) = self
            .config_store
            .persist_rate_limit_counters(all_rate_limits)
            .await
        {
            tracing::error!(error = %err, "failed to flush all rate limit counters");
        }

        let all_budgets = self
            .store
            .all_budgets()
            .iter()
            .map(|budget| budget.snapshot())
            .collect::<Vec<_>>();
        if let Err(err) = self.config_store.persist_budget_counters(all_budgets).await {
            tracing::error!(error = %err, "failed to flush all budget counters");
        }
    }
}
