//! Streaming vs. non-streaming counter-update rules: exactly one request
//! increment per logical call, cost/tokens applied only when usage data
//! is present, and provider/model defaults updating independent of a VK.

use std::sync::Arc;
use std::time::Duration;

use quotagate::model::{RateLimit, VirtualKey};
use quotagate::plugin::{GovernancePlugin, PluginConfig, UsageUpdate};
use quotagate::store::GovernanceStore;

fn plugin_with_rate_limit() -> (GovernancePlugin, Arc<VirtualKey>) {
    let store = Arc::new(GovernanceStore::new());
    store.upsert_rate_limit(RateLimit::new(
        "rl-1",
        None,
        Duration::from_secs(3600),
        Some(1_000_000),
        Duration::from_secs(3600),
    ));
    let key = VirtualKey {
        id: "vk-1".into(),
        value: "sk-test".into(),
        name: "streaming test key".into(),
        is_active: true,
        budget_id: None,
        rate_limit_id: Some("rl-1".into()),
        team_id: None,
        provider_configs: Vec::new(),
    };
    store.upsert_virtual_key(key);
    let plugin = GovernancePlugin::new(store.clone(), PluginConfig { is_vk_mandatory: false });
    let vk = store.get_virtual_key("sk-test").unwrap();
    (plugin, vk)
}

#[test]
fn streaming_chunks_only_count_one_request_on_final_chunk() {
    let (plugin, vk) = plugin_with_rate_limit();

    for (is_final, has_usage) in [(false, false), (false, false), (false, true), (true, true)] {
        plugin.post_response(UsageUpdate {
            virtual_key: Some(vk.clone()),
            provider: "openai".into(),
            model: "gpt-4o".into(),
            success: true,
            tokens_used: 20,
            cost: 0.0,
            is_streaming: true,
            is_final_chunk: is_final,
            has_usage_data: has_usage,
            ..Default::default()
        });
    }

    let rate_limit = plugin.store().get_rate_limit("rl-1").unwrap();
    assert_eq!(rate_limit.request_current_usage(), 1);
    // Tokens only accrue on the two chunks that carried usage data.
    assert_eq!(rate_limit.token_current_usage(), 40);
}

#[test]
fn non_streaming_success_applies_tokens_requests_and_cost_exactly_once() {
    let (plugin, vk) = plugin_with_rate_limit();

    plugin.post_response(UsageUpdate {
        virtual_key: Some(vk),
        provider: "openai".into(),
        model: "gpt-4o".into(),
        success: true,
        tokens_used: 50,
        cost: 1.5,
        is_streaming: false,
        is_final_chunk: true,
        has_usage_data: true,
        ..Default::default()
    });

    let rate_limit = plugin.store().get_rate_limit("rl-1").unwrap();
    assert_eq!(rate_limit.request_current_usage(), 1);
    assert_eq!(rate_limit.token_current_usage(), 50);
}

#[test]
fn provider_and_model_defaults_update_even_without_a_virtual_key() {
    let store = Arc::new(GovernanceStore::new());
    store.upsert_provider(quotagate::model::Provider {
        id: "openai".into(),
        budget_id: None,
        rate_limit_id: Some("rl-provider".into()),
    });
    store.upsert_rate_limit(RateLimit::new(
        "rl-provider",
        None,
        Duration::from_secs(3600),
        None,
        Duration::from_secs(3600),
    ));
    let plugin = GovernancePlugin::new(store.clone(), PluginConfig { is_vk_mandatory: false });

    plugin.post_response(UsageUpdate {
        virtual_key: None,
        provider: "openai".into(),
        model: "gpt-4o".into(),
        success: true,
        tokens_used: 10,
        cost: 0.0,
        is_streaming: false,
        is_final_chunk: true,
        has_usage_data: true,
        ..Default::default()
    });

    let rate_limit = store.get_rate_limit("rl-provider").unwrap();
    assert_eq!(rate_limit.token_current_usage(), 10);
}
