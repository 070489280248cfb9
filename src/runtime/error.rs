use thiserror::Error;

use super::phase::Phase;

/// Failure reported by a provider CRUD call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PluginError {
    /// Retryable failure (rate limit, timeout, eventual consistency)
    #[error("transient provider error: {0}")]
    Transient(String),
    /// Failure that will not resolve without a spec change
    #[error("permanent provider error: {0}")]
    Permanent(String),
    /// The external resource does not exist
    #[error("external resource not found")]
    NotFound,
}

impl PluginError {
    /// Create a transient error
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Create a permanent error
    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }
}

/// Failure reported by the object store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The object's resource version advanced since it was read
    #[error("conflict: {0} was modified concurrently")]
    Conflict(String),
    /// The object does not exist
    #[error("object {0} not found")]
    NotFound(String),
    /// Any other storage failure
    #[error("object store error: {0}")]
    Backend(String),
}

/// Failure of a reconciliation pass that the controller must handle.
///
/// Provider errors are not in here: they are recorded in the object's
/// Status and turned into a requeue decision by the engine.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Reading or writing the object failed
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The engine attempted a transition the phase machine forbids
    #[error("invalid phase transition {from} -> {to}")]
    InvalidTransition {
        /// Phase before
        from: Phase,
        /// Requested phase
        to: Phase,
    },
    /// A controller task stopped unexpectedly
    #[error("controller task failed: {0}")]
    Task(String),
    /// The pass was abandoned because its object changed
    #[error("reconciliation pass cancelled")]
    Cancelled,
}

impl ReconcileError {
    /// Whether the pass lost an optimistic-concurrency race
    pub fn is_conflict(&self) -> bool {
        matches!(self, ReconcileError::Store(StoreError::Conflict(_)))
    }
}
