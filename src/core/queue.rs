//! Caller-facing handle to the admission loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::config::QueueConfig;
use crate::core::audit::AuditSink;
use crate::core::controller::{AdmissionController, Command};
use crate::core::dead_letter::DeadLetterEntry;
use crate::core::error::{AppResult, QueueError};
use crate::core::executor::{ActionJob, Spawn};
use crate::core::operation::Operation;
use crate::core::sampler::{ResourceSampler, ResourceSnapshot};
use crate::core::stats::QueueStats;
use crate::core::throttle::Throttle;
use crate::util::serde::{OperationId, Priority};

/// Pending result of a submitted operation.
#[derive(Debug)]
pub struct OperationHandle<T> {
    id: OperationId,
    priority: Priority,
    reply: oneshot::Receiver<Result<T, QueueError>>,
}

impl<T> OperationHandle<T> {
    /// Identifier assigned at submission.
    #[must_use]
    pub const fn id(&self) -> OperationId {
        self.id
    }

    /// Priority the operation was submitted with.
    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    /// Wait until the operation succeeds, is dead-lettered, or the queue
    /// shuts down.
    pub async fn wait(self) -> Result<T, QueueError> {
        self.reply.await.unwrap_or(Err(QueueError::Shutdown))
    }
}

/// Resource-aware priority queue for asynchronous work.
///
/// Cloning is cheap; all clones feed the same admission loop. The loop stops
/// on [`OperationQueue::shutdown`] or once every clone is dropped.
#[derive(Clone)]
pub struct OperationQueue {
    commands: mpsc::UnboundedSender<Command>,
    sampler: Arc<ResourceSampler>,
    throttle: Arc<Throttle>,
    config: Arc<QueueConfig>,
}

impl OperationQueue {
    /// Start the admission loop on `spawner`.
    pub(crate) fn start(
        config: QueueConfig,
        sampler: Arc<ResourceSampler>,
        spawner: Arc<dyn Spawn>,
        audit: Option<Arc<dyn AuditSink>>,
    ) -> Self {
        let config = Arc::new(config);
        let throttle = Arc::new(Throttle::new(config.throttle.clone(), Arc::clone(&sampler)));
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = AdmissionController::new(
            Arc::clone(&config),
            Arc::clone(&sampler),
            Arc::clone(&throttle),
            Arc::clone(&spawner),
            audit,
            tx.downgrade(),
        );
        spawner.spawn(Box::pin(controller.run(rx)));
        Self {
            commands: tx,
            sampler,
            throttle,
            config,
        }
    }

    /// Submit an action and return a handle to its eventual result.
    ///
    /// `action` is called once per attempt. An error is retried unless it
    /// wraps a [`PermanentFailure`](crate::core::PermanentFailure).
    pub fn submit<F, Fut, T>(&self, priority: Priority, action: F) -> Result<OperationHandle<T>, QueueError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.submit_inner(None, priority, action)
    }

    /// Submit an action with a diagnostic name.
    pub fn submit_named<F, Fut, T>(
        &self,
        name: impl Into<String>,
        priority: Priority,
        action: F,
    ) -> Result<OperationHandle<T>, QueueError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.submit_inner(Some(name.into()), priority, action)
    }

    /// Submit an action and wait for its result.
    pub async fn enqueue<F, Fut, T>(&self, priority: Priority, action: F) -> Result<T, QueueError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(priority, action)?.wait().await
    }

    /// Submit a named action and wait for its result.
    pub async fn enqueue_named<F, Fut, T>(
        &self,
        name: impl Into<String>,
        priority: Priority,
        action: F,
    ) -> Result<T, QueueError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.submit_named(name, priority, action)?.wait().await
    }

    fn submit_inner<F, Fut, T>(
        &self,
        name: Option<String>,
        priority: Priority,
        action: F,
    ) -> Result<OperationHandle<T>, QueueError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let id = OperationId::new();
        let operation = Operation::new(id, name, priority, Arc::new(ActionJob::new(action, tx)));
        self.commands
            .send(Command::Submit(operation))
            .map_err(|_| QueueError::Shutdown)?;
        Ok(OperationHandle {
            id,
            priority,
            reply: rx,
        })
    }

    /// Extend the lease of an in-flight operation. `false` if it is not
    /// currently leased.
    pub async fn heartbeat(&self, id: OperationId) -> Result<bool, QueueError> {
        self.request(|reply| Command::Heartbeat { id, reply }).await
    }

    /// Current statistics.
    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        self.request(Command::Stats).await
    }

    /// Dead letters still within retention, oldest first.
    pub async fn dead_letters(&self) -> Result<Vec<DeadLetterEntry>, QueueError> {
        self.request(Command::DeadLetters).await
    }

    /// Delete one dead letter.
    pub async fn remove_dead_letter(&self, id: OperationId) -> Result<bool, QueueError> {
        self.request(|reply| Command::RemoveDeadLetter { id, reply })
            .await
    }

    /// Delete every dead letter and return how many there were.
    pub async fn clear_dead_letters(&self) -> Result<usize, QueueError> {
        self.request(Command::ClearDeadLetters).await
    }

    /// Put a dead-lettered operation back at the tail of its lane with a
    /// fresh retry budget. The replayed run's result is not delivered to the
    /// original caller.
    pub async fn replay_dead_letter(&self, id: OperationId) -> Result<bool, QueueError> {
        self.request(|reply| Command::ReplayDeadLetter { id, reply })
            .await
    }

    /// Stop the admission loop and reject every waiting, in-flight, or
    /// backing-off operation with [`QueueError::Shutdown`]. Calling it again
    /// is a no-op.
    pub async fn shutdown(&self) {
        if self.request(Command::Shutdown).await.is_err() {
            tracing::debug!("queue already shut down");
        }
    }

    /// Pace a request that bypasses the queue. Returns the applied delay.
    pub async fn acquire_throttle(&self, priority: Priority) -> Duration {
        self.throttle.acquire(priority).await
    }

    /// Throttle shared by this queue's clones.
    #[must_use]
    pub fn throttle(&self) -> &Throttle {
        &self.throttle
    }

    /// Last resource snapshot, without sampling.
    #[must_use]
    pub fn resources(&self) -> Arc<ResourceSnapshot> {
        self.sampler.latest()
    }

    /// Shared resource sampler.
    #[must_use]
    pub const fn sampler(&self) -> &Arc<ResourceSampler> {
        &self.sampler
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn request<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<R>) -> Command,
    ) -> Result<R, QueueError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .map_err(|_| QueueError::Shutdown)?;
        rx.await.map_err(|_| QueueError::Shutdown)
    }
}

impl std::fmt::Debug for OperationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationQueue")
            .field("config", &self.config)
            .field("closed", &self.commands.is_closed())
            .finish_non_exhaustive()
    }
}
