//! Queue configuration structures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Prefix for environment overrides read by [`QueueConfig::from_env`].
pub const ENV_PREFIX: &str = "QOMS_";

/// Pacing configuration for work that bypasses the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Base delay applied to every acquisition before multipliers.
    pub base_delay_ms: u64,
    /// Token refill rate.
    pub max_requests_per_second: f64,
    /// Bucket capacity.
    pub burst_limit: u32,
    /// Delay multiplier per priority level, `Critical` first.
    pub priority_multipliers: [f64; 5],
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 50,
            max_requests_per_second: 20.0,
            burst_limit: 10,
            priority_multipliers: [0.1, 0.5, 1.0, 2.0, 4.0],
        }
    }
}

impl ThrottleConfig {
    /// Validate throttle values.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.max_requests_per_second > 0.0) {
            return Err("max_requests_per_second must be greater than 0".into());
        }
        if self.burst_limit == 0 {
            return Err("burst_limit must be greater than 0".into());
        }
        if self.priority_multipliers.iter().any(|m| *m < 0.0 || !m.is_finite()) {
            return Err("priority_multipliers must be finite and non-negative".into());
        }
        Ok(())
    }
}

/// Admission queue configuration.
///
/// Durations are stored in milliseconds so the struct maps one-to-one onto
/// JSON and `QOMS_*` environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// CPU utilization at or above which nothing is admitted.
    pub max_cpu_percent: f64,
    /// RAM utilization at or above which nothing is admitted.
    pub max_ram_percent: f64,
    /// How long a resource snapshot is reused before the probe is read again.
    pub sample_cache_ms: u64,
    /// Scheduling tick interval.
    pub tick_interval_ms: u64,
    /// Waiting time after which an operation competes one level higher.
    pub aging_threshold_ms: u64,
    /// Lease granted to an admitted operation.
    pub lease_timeout_ms: u64,
    /// Advisory backlog size that raises the backlog warning.
    pub high_water_mark: usize,
    /// Retries allowed before an operation is dead-lettered.
    pub max_retries: u32,
    /// First retry delay; doubled on every further retry.
    pub base_retry_delay_ms: u64,
    /// Upper bound for the retry delay.
    pub max_retry_delay_ms: u64,
    /// Maximum number of dead-letter entries kept.
    pub dlq_max_size: usize,
    /// Maximum age of a dead-letter entry.
    pub dlq_retention_ms: u64,
    /// Optional hard cap on concurrently leased operations.
    ///
    /// Every admission within one tick checks the same cached resource
    /// snapshot, so without a cap a single tick can admit the whole backlog
    /// before the added load shows up in telemetry.
    pub max_in_flight: Option<usize>,
    /// Pacing for non-queued work.
    pub throttle: ThrottleConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_cpu_percent: 75.0,
            max_ram_percent: 60.0,
            sample_cache_ms: 500,
            tick_interval_ms: 100,
            aging_threshold_ms: 30_000,
            lease_timeout_ms: 60_000,
            high_water_mark: 100,
            max_retries: 3,
            base_retry_delay_ms: 1_000,
            max_retry_delay_ms: 30_000,
            dlq_max_size: 500,
            dlq_retention_ms: 3_600_000,
            max_in_flight: None,
            throttle: ThrottleConfig::default(),
        }
    }
}

fn check_percent(name: &str, value: f64) -> Result<(), String> {
    if value > 0.0 && value <= 100.0 {
        Ok(())
    } else {
        Err(format!("{name} must be in (0, 100], got {value}"))
    }
}

impl QueueConfig {
    /// Validate queue configuration values.
    pub fn validate(&self) -> Result<(), String> {
        check_percent("max_cpu_percent", self.max_cpu_percent)?;
        check_percent("max_ram_percent", self.max_ram_percent)?;
        if self.tick_interval_ms == 0 {
            return Err("tick_interval_ms must be greater than 0".into());
        }
        if self.aging_threshold_ms == 0 {
            return Err("aging_threshold_ms must be greater than 0".into());
        }
        if self.lease_timeout_ms == 0 {
            return Err("lease_timeout_ms must be greater than 0".into());
        }
        if self.high_water_mark == 0 {
            return Err("high_water_mark must be greater than 0".into());
        }
        if self.base_retry_delay_ms > self.max_retry_delay_ms {
            return Err(format!(
                "base_retry_delay_ms ({}) exceeds max_retry_delay_ms ({})",
                self.base_retry_delay_ms, self.max_retry_delay_ms
            ));
        }
        if self.dlq_max_size == 0 {
            return Err("dlq_max_size must be greater than 0".into());
        }
        if self.dlq_retention_ms == 0 {
            return Err("dlq_retention_ms must be greater than 0".into());
        }
        if self.max_in_flight == Some(0) {
            return Err("max_in_flight must be greater than 0 when set".into());
        }
        self.throttle
            .validate()
            .map_err(|e| format!("throttle invalid: {e}"))
    }

    /// Parse queue configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from defaults overridden by `QOMS_*` variables.
    ///
    /// A `.env` file in the working directory (or a parent) is loaded first;
    /// variables already present in the process environment win.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_vars(std::env::vars())
    }

    /// Apply `QOMS_*` overrides from an explicit variable list and validate.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut cfg = Self::default();
        for (key, value) in vars {
            let Some(field) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            cfg.apply_override(&field.to_ascii_lowercase(), value.as_ref().trim())?;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_override(&mut self, field: &str, raw: &str) -> Result<(), String> {
        fn parse<T: std::str::FromStr>(field: &str, raw: &str) -> Result<T, String>
        where
            T::Err: std::fmt::Display,
        {
            raw.parse()
                .map_err(|e| format!("{ENV_PREFIX}{} invalid: {e}", field.to_ascii_uppercase()))
        }

        match field {
            "max_cpu_percent" => self.max_cpu_percent = parse(field, raw)?,
            "max_ram_percent" => self.max_ram_percent = parse(field, raw)?,
            "sample_cache_ms" => self.sample_cache_ms = parse(field, raw)?,
            "tick_interval_ms" => self.tick_interval_ms = parse(field, raw)?,
            "aging_threshold_ms" => self.aging_threshold_ms = parse(field, raw)?,
            "lease_timeout_ms" => self.lease_timeout_ms = parse(field, raw)?,
            "high_water_mark" => self.high_water_mark = parse(field, raw)?,
            "max_retries" => self.max_retries = parse(field, raw)?,
            "base_retry_delay_ms" => self.base_retry_delay_ms = parse(field, raw)?,
            "max_retry_delay_ms" => self.max_retry_delay_ms = parse(field, raw)?,
            "dlq_max_size" => self.dlq_max_size = parse(field, raw)?,
            "dlq_retention_ms" => self.dlq_retention_ms = parse(field, raw)?,
            "max_in_flight" => {
                self.max_in_flight = if raw.is_empty() {
                    None
                } else {
                    Some(parse(field, raw)?)
                };
            }
            "throttle_base_delay_ms" => self.throttle.base_delay_ms = parse(field, raw)?,
            "throttle_max_requests_per_second" => {
                self.throttle.max_requests_per_second = parse(field, raw)?;
            }
            "throttle_burst_limit" => self.throttle.burst_limit = parse(field, raw)?,
            other => tracing::debug!(variable = other, "ignoring unknown QOMS_ override"),
        }
        Ok(())
    }

    /// Snapshot cache window.
    #[must_use]
    pub const fn sample_cache(&self) -> Duration {
        Duration::from_millis(self.sample_cache_ms)
    }

    /// Scheduling tick interval.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Aging promotion threshold.
    #[must_use]
    pub const fn aging_threshold(&self) -> Duration {
        Duration::from_millis(self.aging_threshold_ms)
    }

    /// Lease timeout.
    #[must_use]
    pub const fn lease_timeout(&self) -> Duration {
        Duration::from_millis(self.lease_timeout_ms)
    }

    /// Dead-letter retention window.
    #[must_use]
    pub const fn dlq_retention(&self) -> Duration {
        Duration::from_millis(self.dlq_retention_ms)
    }
}
