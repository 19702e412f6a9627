//! Execution boundary: the caller's action, how attempts report back, and
//! how futures are spawned onto a runtime.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::core::error::{AppResult, PermanentFailure, QueueError};

/// Boxed future accepted by [`Spawn`].
pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Abstraction for spawning work on a runtime.
pub trait Spawn: Send + Sync {
    /// Spawn a future that runs to completion in the background.
    fn spawn(&self, fut: BoxFuture);
}

/// Tagged result of one attempt.
///
/// Retry and dead-letter decisions are made from the tag alone, never by
/// intercepting errors.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The action succeeded.
    Success(T),
    /// The action failed in a way a later attempt may fix.
    TransientFailure(anyhow::Error),
    /// The action failed permanently; do not retry.
    TerminalFailure(anyhow::Error),
}

impl<T> Outcome<T> {
    /// Classify an action result. Errors are transient unless their chain
    /// contains a [`PermanentFailure`].
    pub fn from_result(result: AppResult<T>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(err) if err.chain().any(|cause| cause.is::<PermanentFailure>()) => {
                Self::TerminalFailure(err)
            }
            Err(err) => Self::TransientFailure(err),
        }
    }

    /// Transform the success value, keeping failure tags.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Success(value) => Outcome::Success(f(value)),
            Self::TransientFailure(err) => Outcome::TransientFailure(err),
            Self::TerminalFailure(err) => Outcome::TerminalFailure(err),
        }
    }

    /// Whether the attempt succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Deferred delivery of a successful result. Only run once the scheduler has
/// confirmed the attempt still holds its lease.
pub(crate) type Settle = Box<dyn FnOnce() + Send>;

/// Type-erased, repeatable unit of work held by an operation.
#[async_trait]
pub(crate) trait Job: Send + Sync {
    /// Run the action once.
    async fn attempt(&self) -> Outcome<Settle>;
    /// Fail the caller's future. Later calls are no-ops.
    fn reject(&self, error: QueueError);
}

type Reply<T> = Arc<Mutex<Option<oneshot::Sender<Result<T, QueueError>>>>>;

/// [`Job`] wrapping a caller-supplied action factory and its reply channel.
pub(crate) struct ActionJob<F, T> {
    action: F,
    reply: Reply<T>,
}

impl<F, T> ActionJob<F, T> {
    pub(crate) fn new(action: F, reply: oneshot::Sender<Result<T, QueueError>>) -> Self {
        Self {
            action,
            reply: Arc::new(Mutex::new(Some(reply))),
        }
    }
}

#[async_trait]
impl<F, Fut, T> Job for ActionJob<F, T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<T>> + Send + 'static,
    T: Send + 'static,
{
    async fn attempt(&self) -> Outcome<Settle> {
        let reply = Arc::clone(&self.reply);
        Outcome::from_result((self.action)().await).map(move |value| {
            Box::new(move || {
                if let Some(tx) = reply.lock().take() {
                    let _ = tx.send(Ok(value));
                }
            }) as Settle
        })
    }

    fn reject(&self, error: QueueError) {
        if let Some(tx) = self.reply.lock().take() {
            let _ = tx.send(Err(error));
        }
    }
}
