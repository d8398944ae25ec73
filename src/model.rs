use std::sync::atomic::Ordering;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::atomics::{AtomicCurrency, AtomicOptionU64};
use crate::duration::parse_duration_literal;

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// A budget's counter fields are mutated through atomics and never
/// replaced wholesale; `max_limit`/`reset_duration` are the only fields an
/// administrative edit may touch, and it touches them the same way —
/// an atomic store, leaving `current_usage`/`last_reset` untouched.
#[derive(Debug)]
pub struct Budget {
    pub id: String,
    max_limit: AtomicCurrency,
    current_usage: AtomicCurrency,
    reset_duration_secs: std::sync::atomic::AtomicU64,
    last_reset_ms: std::sync::atomic::AtomicU64,
}

impl Budget {
    pub fn new(id: impl Into<String>, max_limit: f64, reset_duration: Duration) -> Self {
        Self {
            id: id.into(),
            max_limit: AtomicCurrency::new(max_limit),
            current_usage: AtomicCurrency::new(0.0),
            reset_duration_secs: std::sync::atomic::AtomicU64::new(reset_duration.as_secs()),
            last_reset_ms: std::sync::atomic::AtomicU64::new(now_millis()),
        }
    }

    pub fn from_snapshot(snapshot: &BudgetSnapshot) -> Result<Self, crate::error::GovernanceError> {
        Ok(Self {
            id: snapshot.id.clone(),
            max_limit: AtomicCurrency::new(snapshot.max_limit),
            current_usage: AtomicCurrency::new(snapshot.current_usage),
            reset_duration_secs: std::sync::atomic::AtomicU64::new(
                parse_duration_literal(&snapshot.reset_duration)?.as_secs(),
            ),
            last_reset_ms: std::sync::atomic::AtomicU64::new(snapshot.last_reset_ms),
        })
    }

    pub fn max_limit(&self) -> f64 {
        self.max_limit.load()
    }

    pub fn current_usage(&self) -> f64 {
        self.current_usage.load()
    }

    pub fn reset_duration(&self) -> Duration {
        Duration::from_secs(self.reset_duration_secs.load(Ordering::SeqCst))
    }

    pub fn last_reset_ms(&self) -> u64 {
        self.last_reset_ms.load(Ordering::SeqCst)
    }

    /// `current_usage >= max_limit` exhausts the budget. Equality counts —
    /// this is pinned by the concrete test scenario in the spec and is not
    /// negotiable (see the open question in DESIGN.md).
    pub fn is_exhausted(&self) -> bool {
        self.current_usage() >= self.max_limit()
    }

    pub fn percent_used(&self) -> f64 {
        percent_used(self.current_usage(), self.max_limit())
    }

    /// Administrative update: only `max_limit`/`reset_duration` change.
    pub fn set_config(&self, max_limit: f64, reset_duration: Duration) {
        self.max_limit.store(max_limit);
        self.reset_duration_secs
            .store(reset_duration.as_secs(), Ordering::SeqCst);
    }

    pub fn add_usage(&self, delta: f64) -> f64 {
        self.current_usage.fetch_add(delta)
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        let window_ms = self.reset_duration().as_millis() as u64;
        window_ms > 0 && now_ms.saturating_sub(self.last_reset_ms()) >= window_ms
    }

    /// Resets the usage counter and timestamp; returns `true` if a reset
    /// actually happened (idempotent — calling this again inside the same
    /// window is a no-op).
    pub fn reset_if_expired(&self, now_ms: u64) -> bool {
        if !self.is_expired(now_ms) {
            return false;
        }
        self.current_usage.store(0.0);
        self.last_reset_ms.store(now_ms, Ordering::SeqCst);
        true
    }

    pub fn snapshot(&self) -> BudgetSnapshot {
        BudgetSnapshot {
            id: self.id.clone(),
            max_limit: self.max_limit(),
            current_usage: self.current_usage(),
            reset_duration: format!("{}s", self.reset_duration().as_secs()),
            last_reset_ms: self.last_reset_ms(),
        }
    }
}

/// The plain-data shape a `ConfigStore` loads and persists. `Budget` itself
/// is never serialized directly — it lives behind atomics.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    pub id: String,
    pub max_limit: f64,
    pub current_usage: f64,
    pub reset_duration: String,
    pub last_reset_ms: u64,
}

/// Same atomic-field approach as `Budget`: token and request windows reset
/// independently, each with its own max/usage/last-reset triple, and a
/// nil max means that dimension is unconstrained.
#[derive(Debug)]
pub struct RateLimit {
    pub id: String,
    token_max_limit: AtomicOptionU64,
    token_current_usage: std::sync::atomic::AtomicU64,
    token_reset_duration_secs: std::sync::atomic::AtomicU64,
    token_last_reset_ms: std::sync::atomic::AtomicU64,
    request_max_limit: AtomicOptionU64,
    request_current_usage: std::sync::atomic::AtomicU64,
    request_reset_duration_secs: std::sync::atomic::AtomicU64,
    request_last_reset_ms: std::sync::atomic::AtomicU64,
}

impl RateLimit {
    pub fn new(
        id: impl Into<String>,
        token_max_limit: Option<u64>,
        token_reset_duration: Duration,
        request_max_limit: Option<u64>,
        request_reset_duration: Duration,
    ) -> Self {
        let now = now_millis();
        Self {
            id: id.into(),
            token_max_limit: AtomicOptionU64::new(token_max_limit),
            token_current_usage: std::sync::atomic::AtomicU64::new(0),
            token_reset_duration_secs: std::sync::atomic::AtomicU64::new(
                token_reset_duration.as_secs(),
            ),
            token_last_reset_ms: std::sync::atomic::AtomicU64::new(now),
            request_max_limit: AtomicOptionU64::new(request_max_limit),
            request_current_usage: std::sync::atomic::AtomicU64::new(0),
            request_reset_duration_secs: std::sync::atomic::AtomicU64::new(
                request_reset_duration.as_secs(),
            ),
            request_last_reset_ms: std::sync::atomic::AtomicU64::new(now),
        }
    }

    pub fn from_snapshot(
        snapshot: &RateLimitSnapshot,
    ) -> Result<Self, crate::error::GovernanceError> {
        let token_reset = match &snapshot.token_reset_duration {
            Some(literal) => parse_duration_literal(literal)?,
            None => Duration::ZERO,
        };
        let request_reset = match &snapshot.request_reset_duration {
            Some(literal) => parse_duration_literal(literal)?,
            None => Duration::ZERO,
        };
        Ok(Self {
            id: snapshot.id.clone(),
            token_max_limit: AtomicOptionU64::new(snapshot.token_max_limit),
            token_current_usage: std::sync::atomic::AtomicU64::new(snapshot.token_current_usage),
            token_reset_duration_secs: std::sync::atomic::AtomicU64::new(token_reset.as_secs()),
            token_last_reset_ms: std::sync::atomic::AtomicU64::new(snapshot.token_last_reset_ms),
            request_max_limit: AtomicOptionU64::new(snapshot.request_max_limit),
            request_current_usage: std::sync::atomic::AtomicU64::new(
                snapshot.request_current_usage,
            ),
            request_reset_duration_secs: std::sync::atomic::AtomicU64::new(
                request_reset.as_secs(),
            ),
            request_last_reset_ms: std::sync::atomic::AtomicU64::new(
                snapshot.request_last_reset_ms,
            ),
        })
    }

    pub fn token_max_limit(&self) -> Option<u64> {
        self.token_max_limit.load()
    }

    pub fn token_current_usage(&self) -> u64 {
        self.token_current_usage.load(Ordering::SeqCst)
    }

    pub fn request_max_limit(&self) -> Option<u64> {
        self.request_max_limit.load()
    }

    pub fn request_current_usage(&self) -> u64 {
        self.request_current_usage.load(Ordering::SeqCst)
    }

    pub fn token_last_reset_ms(&self) -> u64 {
        self.token_last_reset_ms.load(Ordering::SeqCst)
    }

    pub fn request_last_reset_ms(&self) -> u64 {
        self.request_last_reset_ms.load(Ordering::SeqCst)
    }

    pub fn is_token_exhausted(&self) -> bool {
        match self.token_max_limit() {
            Some(limit) => self.token_current_usage() >= limit,
            None => false,
        }
    }

    pub fn is_request_exhausted(&self) -> bool {
        match self.request_max_limit() {
            Some(limit) => self.request_current_usage() >= limit,
            None => false,
        }
    }

    pub fn token_percent_used(&self) -> f64 {
        match self.token_max_limit() {
            Some(limit) => percent_used(self.token_current_usage() as f64, limit as f64),
            None => 0.0,
        }
    }

    pub fn request_percent_used(&self) -> f64 {
        match self.request_max_limit() {
            Some(limit) => percent_used(self.request_current_usage() as f64, limit as f64),
            None => 0.0,
        }
    }

    pub fn add_tokens(&self, tokens: u64) -> u64 {
        self.token_current_usage.fetch_add(tokens, Ordering::SeqCst) + tokens
    }

    pub fn add_request(&self) -> u64 {
        self.request_current_usage
            .fetch_add(1, Ordering::SeqCst)
            + 1
    }

    pub fn token_is_expired(&self, now_ms: u64) -> bool {
        let window_ms = Duration::from_secs(self.token_reset_duration_secs.load(Ordering::SeqCst))
            .as_millis() as u64;
        window_ms > 0 && now_ms.saturating_sub(self.token_last_reset_ms()) >= window_ms
    }

    pub fn request_is_expired(&self, now_ms: u64) -> bool {
        let window_ms =
            Duration::from_secs(self.request_reset_duration_secs.load(Ordering::SeqCst))
                .as_millis() as u64;
        window_ms > 0 && now_ms.saturating_sub(self.request_last_reset_ms()) >= window_ms
    }

    /// Resets whichever of the two independent windows has expired.
    /// Returns `(token_reset, request_reset)`.
    pub fn reset_if_expired(&self, now_ms: u64) -> (bool, bool) {
        let token_reset = if self.token_is_expired(now_ms) {
            self.token_current_usage.store(0, Ordering::SeqCst);
            self.token_last_reset_ms.store(now_ms, Ordering::SeqCst);
            true
        } else {
            false
        };
        let request_reset = if self.request_is_expired(now_ms) {
            self.request_current_usage.store(0, Ordering::SeqCst);
            self.request_last_reset_ms.store(now_ms, Ordering::SeqCst);
            true
        } else {
            false
        };
        (token_reset, request_reset)
    }

    pub fn snapshot(&self) -> RateLimitSnapshot {
        RateLimitSnapshot {
            id: self.id.clone(),
            token_max_limit: self.token_max_limit(),
            token_current_usage: self.token_current_usage(),
            token_reset_duration: Some(format!(
                "{}s",
                self.token_reset_duration_secs.load(Ordering::SeqCst)
            )),
            token_last_reset_ms: self.token_last_reset_ms(),
            request_max_limit: self.request_max_limit(),
            request_current_usage: self.request_current_usage(),
            request_reset_duration: Some(format!(
                "{}s",
                self.request_reset_duration_secs.load(Ordering::SeqCst)
            )),
            request_last_reset_ms: self.request_last_reset_ms(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub id: String,
    pub token_max_limit: Option<u64>,
    pub token_current_usage: u64,
    pub token_reset_duration: Option<String>,
    pub token_last_reset_ms: u64,
    pub request_max_limit: Option<u64>,
    pub request_current_usage: u64,
    pub request_reset_duration: Option<String>,
    pub request_last_reset_ms: u64,
}

fn percent_used(current: f64, max: f64) -> f64 {
    if max <= 0.0 {
        return 100.0;
    }
    (100.0 * current / max).clamp(0.0, 100.0)
}

/// A virtual key's per-provider override: a restricted model allow-list
/// plus its own budget/rate-limit, resolved ahead of the provider- and
/// model-level defaults.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProviderOverride {
    pub provider: String,
    #[serde(default)]
    pub allowed_models: Vec<String>,
    #[serde(default)]
    pub budget_id: Option<String>,
    #[serde(default)]
    pub rate_limit_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VirtualKey {
    pub id: String,
    pub value: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub budget_id: Option<String>,
    #[serde(default)]
    pub rate_limit_id: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub provider_configs: Vec<ProviderOverride>,
}

impl VirtualKey {
    pub fn provider_config(&self, provider: &str) -> Option<&ProviderOverride> {
        self.provider_configs
            .iter()
            .find(|config| config.provider == provider)
    }
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub budget_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub budget_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    #[serde(default)]
    pub budget_id: Option<String>,
    #[serde(default)]
    pub rate_limit_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub budget_id: Option<String>,
    #[serde(default)]
    pub rate_limit_id: Option<String>,
}

pub fn model_config_key(provider: &str, model: &str) -> String {
    format!("{provider}::{model}")
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Global,
    Customer,
    Team,
    VirtualKey,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoutingRule {
    pub id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub cel_expression: String,
    pub provider: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub fallbacks: Vec<String>,
    pub scope: Scope,
    #[serde(default)]
    pub scope_id: Option<String>,
    pub priority: i64,
}
