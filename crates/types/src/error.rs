use thiserror::Error;

use crate::Capability;

/// Engine-wide error taxonomy.
///
/// Business-rule and authorization errors surface verbatim to the caller.
/// `ConcurrencyConflict` is retryable by the caller; nothing here is
/// retried automatically inside the engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Bad release date, incident freeze, exhausted rate budget.
    #[error("policy violation: {0}")]
    PolicyViolation(String),

    #[error("actor {actor} lacks capability {capability:?}")]
    Unauthorized {
        actor: String,
        capability: Capability,
    },

    /// Execution lock held elsewhere or idempotency key in progress.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// The selected gateway's circuit breaker is open.
    #[error("circuit open for resource {0}")]
    CircuitOpen(String),

    /// External transfer call failed; recorded on the disbursement row.
    #[error("gateway failure: {0}")]
    GatewayFailure(String),

    /// Bad webhook signature or unknown reference. Logged and dropped,
    /// never applied.
    #[error("integrity error: {0}")]
    IntegrityError(String),

    /// A transition attempted from a non-matching source state.
    #[error("state violation on {entity}: {from} -> {to} not permitted")]
    StateViolation {
        entity: String,
        from: String,
        to: String,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    /// Whether the caller may reasonably retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::ConcurrencyConflict(_))
    }
}
