use thiserror::Error;

/// Per-position error taxonomy.
///
/// Failures are isolated per position: the orchestrator logs and skips, never
/// aborting sibling positions in the same tick.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Not enough history bars to trust derived signals.
    #[error("insufficient history: have {have} bars, need {need}")]
    InsufficientHistory { have: u64, need: u64 },

    /// Indicator features missing or older than the tick allows.
    #[error("stale or missing features for position {0}")]
    StaleFeatures(String),

    /// A position violated a data-model invariant; it is skipped this tick.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The execution service rejected or failed the order.
    #[error("execution failed ({code}): {message}")]
    ExecutionRejected { code: String, message: String },

    /// A second execution attempt landed inside the idempotency window.
    #[error("duplicate execution suppressed for position {0}")]
    DuplicateExecution(String),
}
