//! Point-in-time queue statistics.

use serde::Serialize;

use crate::config::QueueConfig;
use crate::core::sampler::ResourceSnapshot;
use crate::util::serde::Priority;

/// Configured limits echoed in [`QueueStats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueLimits {
    /// CPU admission limit.
    pub max_cpu_percent: f64,
    /// RAM admission limit.
    pub max_ram_percent: f64,
    /// Backlog warning threshold.
    pub high_water_mark: usize,
    /// Retry budget per operation.
    pub max_retries: u32,
    /// Concurrency cap, if any.
    pub max_in_flight: Option<usize>,
    /// Lease length in milliseconds.
    pub lease_timeout_ms: u64,
    /// Aging step in milliseconds.
    pub aging_threshold_ms: u64,
}

impl From<&QueueConfig> for QueueLimits {
    fn from(cfg: &QueueConfig) -> Self {
        Self {
            max_cpu_percent: cfg.max_cpu_percent,
            max_ram_percent: cfg.max_ram_percent,
            high_water_mark: cfg.high_water_mark,
            max_retries: cfg.max_retries,
            max_in_flight: cfg.max_in_flight,
            lease_timeout_ms: cfg.lease_timeout_ms,
            aging_threshold_ms: cfg.aging_threshold_ms,
        }
    }
}

/// Snapshot of scheduler state. Reading it has no side effects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStats {
    /// Waiting operations per priority, `Critical` first.
    pub queue_lengths: [usize; Priority::COUNT],
    /// Waiting operations across all lanes.
    pub total_queued: usize,
    /// Leased operations.
    pub in_flight: usize,
    /// Operations parked for a retry or waiting in a lane after a failure.
    pub pending_retries: usize,
    /// Retries scheduled since start.
    pub total_retries: u64,
    /// Successful completions since start.
    pub total_completed: u64,
    /// Operations dead-lettered since start.
    pub total_dead_lettered: u64,
    /// Admissions since start, retries included.
    pub total_admitted: u64,
    /// Current dead letter store size.
    pub dlq_size: usize,
    /// Mean time between lane entry and admission.
    pub avg_wait_ms: f64,
    /// Ticks where resource limits blocked admission.
    pub throttled_ticks: u64,
    /// Whether the backlog is at or above the high-water mark.
    pub backlog_warning: bool,
    /// Throttle acquisitions slowed by CPU pressure.
    pub throttle_events: u64,
    /// Tokens left in the throttle bucket.
    pub tokens_available: f64,
    /// Last resource reading.
    pub resources: ResourceSnapshot,
    /// Configured limits.
    pub limits: QueueLimits,
}

impl QueueStats {
    /// Waiting operations at one priority.
    #[must_use]
    pub const fn queue_length(&self, priority: Priority) -> usize {
        self.queue_lengths[priority.level()]
    }
}
