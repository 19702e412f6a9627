//! Error types for queue operations.

use thiserror::Error;

use crate::util::serde::OperationId;

/// Errors surfaced to callers of the admission queue.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The action kept failing until the retry budget ran out.
    #[error("operation {id} failed after {retries} retries: {source}")]
    RetriesExhausted {
        /// Operation identifier.
        id: OperationId,
        /// Retries performed before giving up.
        retries: u32,
        /// Last error returned by the action.
        #[source]
        source: anyhow::Error,
    },
    /// The action reported a failure that must not be retried.
    #[error("operation {id} rejected: {source}")]
    Rejected {
        /// Operation identifier.
        id: OperationId,
        /// Error returned by the action.
        #[source]
        source: anyhow::Error,
    },
    /// The queue stopped before the operation finished.
    #[error("queue shut down")]
    Shutdown,
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// No async runtime was available to drive the queue.
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl QueueError {
    /// Whether this error means the queue gave up after retrying.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. })
    }
}

/// Marker error for failures that retrying cannot fix.
///
/// Return it (directly or as the root of an `anyhow` chain) from an action to
/// dead-letter the operation without spending its retry budget.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct PermanentFailure(pub String);

impl PermanentFailure {
    /// Build a permanent failure from any message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
