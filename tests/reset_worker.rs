//! Reset idempotence and the startup sweep, driven through the public
//! worker API rather than the in-memory store directly.

use std::sync::Arc;

use quotagate::config_store::{ConfigStore, InMemoryConfigStore};
use quotagate::model::{Budget, BudgetSnapshot, RateLimit, RateLimitSnapshot, now_millis};
use quotagate::store::GovernanceStore;
use quotagate::worker::ResetFlushWorker;

#[tokio::test]
async fn reset_sweep_is_idempotent_within_one_window() {
    let store = Arc::new(GovernanceStore::new());
    // A 1s window whose last reset was 2s ago: genuinely expired. A
    // zero-duration window is never due, per `Budget::is_expired`'s guard.
    let budget = Budget::from_snapshot(&BudgetSnapshot {
        id: "b1".into(),
        max_limit: 100.0,
        current_usage: 80.0,
        reset_duration: "1s".into(),
        last_reset_ms: now_millis().saturating_sub(2_000),
    })
    .unwrap();
    store.upsert_budget(budget);

    let config_store: Arc<dyn ConfigStore> = Arc::new(InMemoryConfigStore::new());
    let worker = ResetFlushWorker::new(store.clone(), config_store.clone());

    worker.startup_reset_sweep().await;
    assert_eq!(store.get_budget("b1").unwrap().current_usage(), 0.0);

    worker.startup_reset_sweep().await;
    assert_eq!(store.get_budget("b1").unwrap().current_usage(), 0.0);

    let persisted = config_store.load_budgets().await.unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].current_usage, 0.0);
}

#[tokio::test]
async fn startup_sweep_covers_both_rate_limit_windows_independently() {
    let store = Arc::new(GovernanceStore::new());
    // Token window: long duration, not yet due. Request window: 1s
    // duration whose last reset is 2s in the past, genuinely expired.
    let rate_limit = RateLimit::from_snapshot(&RateLimitSnapshot {
        id: "rl1".into(),
        token_max_limit: Some(100),
        token_current_usage: 40,
        token_reset_duration: Some("1h".into()),
        token_last_reset_ms: now_millis(),
        request_max_limit: Some(10),
        request_current_usage: 1,
        request_reset_duration: Some("1s".into()),
        request_last_reset_ms: now_millis().saturating_sub(2_000),
    })
    .unwrap();
    store.upsert_rate_limit(rate_limit);

    let config_store: Arc<dyn ConfigStore> = Arc::new(InMemoryConfigStore::new());
    let worker = ResetFlushWorker::new(store.clone(), config_store);
    worker.startup_reset_sweep().await;

    let rl = store.get_rate_limit("rl1").unwrap();
    // Token window has a long reset duration and has not expired.
    assert_eq!(rl.token_current_usage(), 40);
    // Request window's 1s duration has elapsed since its last reset.
    assert_eq!(rl.request_current_usage(), 0);
}
