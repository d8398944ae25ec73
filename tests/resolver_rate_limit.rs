//! Rate-limit tie-breaking (most specific first), token vs. request
//! exhaustion, and the provider/model allow-list checks ahead of them.

use std::time::Duration;

use quotagate::model::{ProviderOverride, RateLimit, VirtualKey};
use quotagate::resolver::{Decision, EvaluationRequest, Resolver};
use quotagate::store::GovernanceStore;

fn vk(id: &str, value: &str) -> VirtualKey {
    VirtualKey {
        id: id.into(),
        value: value.into(),
        name: "rate limit test key".into(),
        is_active: true,
        budget_id: None,
        rate_limit_id: None,
        team_id: None,
        provider_configs: Vec::new(),
    }
}

#[test]
fn most_specific_rate_limit_decides_even_when_a_less_specific_one_also_exhausted() {
    let store = GovernanceStore::new();
    store.upsert_rate_limit(RateLimit::new(
        "rl-vk",
        Some(100),
        Duration::from_secs(60),
        None,
        Duration::from_secs(60),
    ));
    // vk-level rate limit is not exhausted.
    store.get_rate_limit("rl-vk").unwrap().add_tokens(1);

    store.upsert_rate_limit(RateLimit::new(
        "rl-model",
        Some(10),
        Duration::from_secs(60),
        None,
        Duration::from_secs(60),
    ));
    store.get_rate_limit("rl-model").unwrap().add_tokens(10);

    let mut key = vk("vk-1", "sk-test");
    key.rate_limit_id = Some("rl-vk".into());
    store.upsert_virtual_key(key);
    store.upsert_model_config(quotagate::model::ModelConfig {
        id: "mc-1".into(),
        provider: "openai".into(),
        model: "gpt-4o".into(),
        budget_id: None,
        rate_limit_id: Some("rl-model".into()),
    });

    let outcome = Resolver::new(&store).evaluate(&EvaluationRequest {
        virtual_key_value: "sk-test".into(),
        provider: "openai".into(),
        model: "gpt-4o".into(),
        ..Default::default()
    });

    // The vk-level limit is checked first and is not exhausted, so the
    // resolver proceeds and finds the model-level limit exhausted.
    assert_eq!(outcome.decision, Decision::TokenLimited);
}

#[test]
fn request_limit_is_distinguished_from_token_limit() {
    let store = GovernanceStore::new();
    store.upsert_rate_limit(RateLimit::new(
        "rl-vk",
        None,
        Duration::from_secs(60),
        Some(1),
        Duration::from_secs(60),
    ));
    store.get_rate_limit("rl-vk").unwrap().add_request();

    let mut key = vk("vk-1", "sk-test");
    key.rate_limit_id = Some("rl-vk".into());
    store.upsert_virtual_key(key);

    let outcome = Resolver::new(&store).evaluate(&EvaluationRequest {
        virtual_key_value: "sk-test".into(),
        provider: "openai".into(),
        model: "gpt-4o".into(),
        ..Default::default()
    });

    assert_eq!(outcome.decision, Decision::RequestLimited);
    assert_eq!(outcome.decision.status_code(), 429);
}

#[test]
fn provider_not_listed_in_vk_overrides_is_blocked_before_rate_limits_are_checked() {
    let store = GovernanceStore::new();
    let mut key = vk("vk-1", "sk-test");
    key.provider_configs.push(ProviderOverride {
        provider: "anthropic".into(),
        allowed_models: Vec::new(),
        budget_id: None,
        rate_limit_id: None,
    });
    store.upsert_virtual_key(key);

    let outcome = Resolver::new(&store).evaluate(&EvaluationRequest {
        virtual_key_value: "sk-test".into(),
        provider: "openai".into(),
        model: "gpt-4o".into(),
        ..Default::default()
    });

    assert_eq!(outcome.decision, Decision::ProviderBlocked);
}
