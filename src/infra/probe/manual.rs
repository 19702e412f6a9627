//! Probe driven by explicit writes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::sampler::{ProbeError, ResourceProbe, ResourceReading};

#[derive(Debug)]
struct ManualState {
    reading: Mutex<ResourceReading>,
    failing: Mutex<bool>,
    reads: AtomicU64,
}

/// Probe whose readings are set by the host.
///
/// Clones share state, so a test can keep one clone and hand the other to the
/// queue.
#[derive(Debug, Clone)]
pub struct ManualProbe {
    state: Arc<ManualState>,
}

impl ManualProbe {
    /// Probe reporting the given CPU and RAM utilization.
    #[must_use]
    pub fn new(cpu_percent: f64, ram_percent: f64) -> Self {
        Self::from_reading(ResourceReading {
            cpu_percent,
            ram_percent,
            cpu_count: 1,
            ..ResourceReading::default()
        })
    }

    /// Probe reporting a full reading.
    #[must_use]
    pub fn from_reading(reading: ResourceReading) -> Self {
        Self {
            state: Arc::new(ManualState {
                reading: Mutex::new(reading),
                failing: Mutex::new(false),
                reads: AtomicU64::new(0),
            }),
        }
    }

    /// Set CPU utilization.
    pub fn set_cpu(&self, cpu_percent: f64) {
        self.state.reading.lock().cpu_percent = cpu_percent;
    }

    /// Set RAM utilization.
    pub fn set_ram(&self, ram_percent: f64) {
        self.state.reading.lock().ram_percent = ram_percent;
    }

    /// Replace the whole reading.
    pub fn set_reading(&self, reading: ResourceReading) {
        *self.state.reading.lock() = reading;
    }

    /// Make subsequent reads fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        *self.state.failing.lock() = failing;
    }

    /// Number of reads attempted.
    #[must_use]
    pub fn reads(&self) -> u64 {
        self.state.reads.load(Ordering::Relaxed)
    }
}

impl Default for ManualProbe {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

impl ResourceProbe for ManualProbe {
    fn read(&self) -> Result<ResourceReading, ProbeError> {
        self.state.reads.fetch_add(1, Ordering::Relaxed);
        if *self.state.failing.lock() {
            return Err(ProbeError::Unavailable("manual probe set to fail".into()));
        }
        Ok(*self.state.reading.lock())
    }
}
