use thiserror::Error;

/// Errors the governance core can fail with. Policy outcomes (budget
/// exhaustion, a blocked key, a missing virtual key) are never represented
/// here — they are `Decision` values, returned, not raised. This enum is
/// reserved for validation and programmer-error contract violations.
#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("invalid expression: {0}")]
    InvalidExpression(String),
    #[error("nil program passed to evaluator")]
    NilProgram,
    #[error("routing decision missing provider")]
    InvalidRoutingDecision,
    #[error("invalid duration literal: {0}")]
    InvalidDuration(String),
    #[error("configuration store error: {0}")]
    Store(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GovernanceError>;
