//! Tokio runtime spawner implementation.

use std::sync::Arc;

use crate::core::{BoxFuture, QueueError, Spawn};

/// Tokio-based spawner that executes tasks on a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioSpawner {
    handle: Arc<tokio::runtime::Handle>,
}

impl TokioSpawner {
    /// Create a new `TokioSpawner` from a tokio runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle: Arc::new(handle),
        }
    }

    /// Spawner bound to the runtime the caller is running on.
    pub fn current() -> Result<Self, QueueError> {
        tokio::runtime::Handle::try_current()
            .map(Self::new)
            .map_err(|e| QueueError::Runtime(e.to_string()))
    }
}

impl Spawn for TokioSpawner {
    fn spawn(&self, fut: BoxFuture) {
        self.handle.spawn(fut);
    }
}
