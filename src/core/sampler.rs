//! Cached resource telemetry.
//!
//! The sampler reads a [`ResourceProbe`] at most once per cache window and
//! publishes each reading as an immutable `Arc<ResourceSnapshot>`. A failed
//! read keeps the previous snapshot; callers judge staleness from its age.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;

/// Number of CPU samples kept for [`ResourceSampler::average_cpu`].
const CPU_HISTORY_LEN: usize = 10;

/// Errors produced by telemetry probes.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The probe cannot read telemetry on this platform.
    #[error("telemetry unsupported: {0}")]
    Unsupported(&'static str),
    /// Reading the telemetry source failed.
    #[error("telemetry io error: {0}")]
    Io(#[from] std::io::Error),
    /// The telemetry source had an unexpected format.
    #[error("telemetry parse error: {0}")]
    Parse(String),
    /// The probe is temporarily unable to produce a reading.
    #[error("telemetry unavailable: {0}")]
    Unavailable(String),
}

/// Raw system load reading.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceReading {
    /// CPU utilization, 0-100.
    pub cpu_percent: f64,
    /// RAM utilization, 0-100.
    pub ram_percent: f64,
    /// Free (available) RAM in bytes.
    pub free_ram_bytes: u64,
    /// Total RAM in bytes.
    pub total_ram_bytes: u64,
    /// One-minute load average.
    pub load_avg_1m: f64,
    /// Logical CPUs, used to normalize the load average.
    pub cpu_count: usize,
}

/// Source of system load readings.
pub trait ResourceProbe: Send + Sync {
    /// Take one reading.
    fn read(&self) -> Result<ResourceReading, ProbeError>;
}

/// Immutable point-in-time reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceSnapshot {
    /// CPU utilization, 0-100.
    pub cpu_percent: f64,
    /// RAM utilization, 0-100.
    pub ram_percent: f64,
    /// Free (available) RAM in bytes.
    pub free_ram_bytes: u64,
    /// Total RAM in bytes.
    pub total_ram_bytes: u64,
    /// One-minute load average.
    pub load_avg_1m: f64,
    /// Logical CPUs.
    pub cpu_count: usize,
    /// When the reading was captured.
    #[serde(skip)]
    pub captured_at: Instant,
}

impl ResourceSnapshot {
    /// Snapshot of a reading captured at `captured_at`.
    #[must_use]
    pub const fn from_reading(reading: ResourceReading, captured_at: Instant) -> Self {
        Self {
            cpu_percent: reading.cpu_percent,
            ram_percent: reading.ram_percent,
            free_ram_bytes: reading.free_ram_bytes,
            total_ram_bytes: reading.total_ram_bytes,
            load_avg_1m: reading.load_avg_1m,
            cpu_count: reading.cpu_count,
            captured_at,
        }
    }

    /// Placeholder used before the first successful reading.
    #[must_use]
    pub fn empty(captured_at: Instant) -> Self {
        Self::from_reading(ResourceReading::default(), captured_at)
    }

    /// Time since capture.
    #[must_use]
    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.captured_at)
    }

    /// Whether the snapshot is older than `threshold`.
    #[must_use]
    pub fn is_stale(&self, threshold: Duration) -> bool {
        self.age() > threshold
    }

    /// Whether either limit is reached.
    #[must_use]
    pub fn exceeds(&self, max_cpu_percent: f64, max_ram_percent: f64) -> bool {
        self.cpu_percent >= max_cpu_percent || self.ram_percent >= max_ram_percent
    }

    /// Load average as a percentage of available CPUs.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn load_percent(&self) -> f64 {
        self.load_avg_1m / self.cpu_count.max(1) as f64 * 100.0
    }
}

/// Rate-limited, cached sampler over a [`ResourceProbe`].
pub struct ResourceSampler {
    probe: Box<dyn ResourceProbe>,
    cache_window: Duration,
    current: RwLock<Arc<ResourceSnapshot>>,
    last_read: Mutex<Option<Instant>>,
    cpu_history: Mutex<VecDeque<f64>>,
    unsupported_reported: AtomicBool,
}

impl ResourceSampler {
    /// Create a sampler reusing readings for `cache_window`.
    pub fn new(probe: impl ResourceProbe + 'static, cache_window: Duration) -> Self {
        Self::from_boxed(Box::new(probe), cache_window)
    }

    /// Create a sampler from an already boxed probe.
    #[must_use]
    pub fn from_boxed(probe: Box<dyn ResourceProbe>, cache_window: Duration) -> Self {
        Self {
            probe,
            cache_window,
            current: RwLock::new(Arc::new(ResourceSnapshot::empty(Instant::now()))),
            last_read: Mutex::new(None),
            cpu_history: Mutex::new(VecDeque::with_capacity(CPU_HISTORY_LEN)),
            unsupported_reported: AtomicBool::new(false),
        }
    }

    /// Current snapshot, reading the probe if the cache window has passed.
    ///
    /// A failed read is logged and the previous snapshot is returned.
    pub fn sample(&self) -> Arc<ResourceSnapshot> {
        let now = Instant::now();
        let mut last_read = self.last_read.lock();
        if let Some(at) = *last_read {
            if now.saturating_duration_since(at) < self.cache_window {
                return self.latest();
            }
        }
        *last_read = Some(now);

        match self.probe.read() {
            Ok(reading) => {
                let snapshot = Arc::new(ResourceSnapshot::from_reading(reading, now));
                {
                    let mut history = self.cpu_history.lock();
                    if history.len() == CPU_HISTORY_LEN {
                        history.pop_front();
                    }
                    history.push_back(reading.cpu_percent);
                }
                *self.current.write() = Arc::clone(&snapshot);
                snapshot
            }
            Err(ProbeError::Unsupported(reason)) => {
                // The platform will not change, so this is reported once.
                if !self.unsupported_reported.swap(true, Ordering::Relaxed) {
                    tracing::warn!(
                        reason,
                        "resource probe unsupported; admission runs without resource limits"
                    );
                }
                self.latest()
            }
            Err(e) => {
                let previous = self.latest();
                tracing::warn!(
                    error = %e,
                    age_ms = u64::try_from(previous.age().as_millis()).unwrap_or(u64::MAX),
                    "resource sampling failed; keeping last snapshot"
                );
                previous
            }
        }
    }

    /// Last published snapshot without reading the probe.
    #[must_use]
    pub fn latest(&self) -> Arc<ResourceSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Mean CPU utilization over recent successful samples.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average_cpu(&self) -> f64 {
        let history = self.cpu_history.lock();
        if history.is_empty() {
            return self.latest().cpu_percent;
        }
        history.iter().sum::<f64>() / history.len() as f64
    }

    /// Cache window.
    #[must_use]
    pub const fn cache_window(&self) -> Duration {
        self.cache_window
    }
}

impl std::fmt::Debug for ResourceSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceSampler")
            .field("cache_window", &self.cache_window)
            .field("current", &self.latest())
            .finish_non_exhaustive()
    }
}
