//! Builder assembling an [`OperationQueue`] from configuration.

use std::sync::Arc;

use crate::config::QueueConfig;
use crate::core::{AuditSink, OperationQueue, QueueError, ResourceProbe, ResourceSampler, Spawn};
use crate::infra::probe::ProcfsProbe;
use crate::runtime::TokioSpawner;

/// Collects the queue's collaborators before starting it.
///
/// Unset parts fall back to [`ProcfsProbe`] and a [`TokioSpawner`] on the
/// current runtime.
pub struct QueueBuilder {
    config: QueueConfig,
    probe: Option<Box<dyn ResourceProbe>>,
    spawner: Option<Arc<dyn Spawn>>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl QueueBuilder {
    /// Start from a configuration.
    #[must_use]
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            probe: None,
            spawner: None,
            audit: None,
        }
    }

    /// Read telemetry from `probe`.
    #[must_use]
    pub fn with_probe(mut self, probe: impl ResourceProbe + 'static) -> Self {
        self.probe = Some(Box::new(probe));
        self
    }

    /// Spawn the loop and attempts through `spawner`.
    #[must_use]
    pub fn with_spawner(mut self, spawner: impl Spawn + 'static) -> Self {
        self.spawner = Some(Arc::new(spawner));
        self
    }

    /// Report lifecycle events to `sink`.
    #[must_use]
    pub fn with_audit(mut self, sink: impl AuditSink + 'static) -> Self {
        self.audit = Some(Arc::new(sink));
        self
    }

    /// Configuration the queue will use.
    #[must_use]
    pub const fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Validate the configuration and start the admission loop.
    pub fn build(self) -> Result<OperationQueue, QueueError> {
        self.config.validate().map_err(QueueError::InvalidConfig)?;

        let spawner: Arc<dyn Spawn> = match self.spawner {
            Some(spawner) => spawner,
            None => Arc::new(TokioSpawner::current()?),
        };
        let probe: Box<dyn ResourceProbe> = match self.probe {
            Some(probe) => probe,
            None => Box::new(ProcfsProbe::new()),
        };
        let sampler = Arc::new(ResourceSampler::from_boxed(
            probe,
            self.config.sample_cache(),
        ));

        tracing::info!(
            max_cpu_percent = self.config.max_cpu_percent,
            max_ram_percent = self.config.max_ram_percent,
            lease_timeout_ms = self.config.lease_timeout_ms,
            max_retries = self.config.max_retries,
            "starting operation queue"
        );
        Ok(OperationQueue::start(
            self.config,
            sampler,
            spawner,
            self.audit,
        ))
    }
}

impl std::fmt::Debug for QueueBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueBuilder")
            .field("config", &self.config)
            .field("custom_probe", &self.probe.is_some())
            .field("custom_spawner", &self.spawner.is_some())
            .field("audit", &self.audit.is_some())
            .finish()
    }
}
