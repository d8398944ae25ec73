//! A governance layer for an LLM request-dispatch gateway: budgets, rate
//! limits, virtual keys, and expression-gated routing rules, evaluated
//! in-memory against a lock-free indexed store and periodically flushed
//! to a configuration-store collaborator.

pub mod atomics;
pub mod config_store;
pub mod duration;
pub mod error;
pub mod expr;
pub mod model;
pub mod plugin;
pub mod resolver;
pub mod routing;
pub mod store;
pub mod worker;

#[cfg(feature = "store-sqlite")]
pub mod sqlite_store;

pub use config_store::{ConfigStore, InMemoryConfigStore, PricingManager};
pub use error::{GovernanceError, Result};
pub use plugin::{
    GovernancePlugin, PluginConfig, PluginDecision, PreHookOutcome, PreHookRequest, ShortCircuit,
    UsageUpdate,
};
pub use resolver::{BudgetAndRateLimitStatus, Decision, EvaluationOutcome, EvaluationRequest, Resolver};
pub use routing::{apply_routing_decision, validate_routing_decision, RoutingContext, RoutingDecision, RoutingEngine};
pub use store::GovernanceStore;
pub use worker::ResetFlushWorker;

#[cfg(feature = "store-sqlite")]
pub use sqlite_store::SqliteConfigStore;
