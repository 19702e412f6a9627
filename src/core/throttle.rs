//! Pacing for requests that do not go through the queue.
//!
//! A token bucket bounds the request rate; every acquisition additionally
//! waits a base delay scaled by priority and by current CPU pressure.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::ThrottleConfig;
use crate::core::sampler::ResourceSampler;
use crate::util::serde::Priority;

/// Delay multiplier for a CPU utilization reading.
#[must_use]
pub fn cpu_multiplier(cpu_percent: f64) -> f64 {
    if cpu_percent > 85.0 {
        10.0
    } else if cpu_percent > 70.0 {
        4.0
    } else if cpu_percent > 50.0 {
        2.0
    } else if cpu_percent > 30.0 {
        1.5
    } else {
        1.0
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token-bucket throttle with priority and CPU scaling.
#[derive(Debug)]
pub struct Throttle {
    config: ThrottleConfig,
    sampler: Arc<ResourceSampler>,
    bucket: Mutex<Bucket>,
    throttle_events: AtomicU64,
}

impl Throttle {
    /// Create a throttle reading CPU pressure from `sampler`.
    #[must_use]
    pub fn new(config: ThrottleConfig, sampler: Arc<ResourceSampler>) -> Self {
        let tokens = f64::from(config.burst_limit);
        Self {
            config,
            sampler,
            bucket: Mutex::new(Bucket {
                tokens,
                last_refill: Instant::now(),
            }),
            throttle_events: AtomicU64::new(0),
        }
    }

    /// Take a token and compute the delay to apply, without sleeping.
    pub fn delay_for(&self, priority: Priority) -> Duration {
        let cpu = cpu_multiplier(self.sampler.sample().cpu_percent);
        if cpu > 1.0 {
            self.throttle_events.fetch_add(1, Ordering::Relaxed);
        }
        let base = Duration::from_millis(self.config.base_delay_ms)
            .mul_f64(self.config.priority_multipliers[priority.level()] * cpu);
        base + self.take_token()
    }

    /// Wait for the computed delay and return it.
    pub async fn acquire(&self, priority: Priority) -> Duration {
        let delay = self.delay_for(priority);
        if !delay.is_zero() {
            tracing::debug!(
                %priority,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "throttling request"
            );
            tokio::time::sleep(delay).await;
        }
        delay
    }

    /// Acquisitions slowed down by CPU pressure.
    #[must_use]
    pub fn throttle_events(&self) -> u64 {
        self.throttle_events.load(Ordering::Relaxed)
    }

    /// Whole and fractional tokens left in the bucket, never below zero.
    #[must_use]
    pub fn tokens_available(&self) -> f64 {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket, Instant::now());
        bucket.tokens.max(0.0)
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let rate = self.config.max_requests_per_second;
        let burst = f64::from(self.config.burst_limit);
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens = elapsed.as_secs_f64().mul_add(rate, bucket.tokens).min(burst);
        bucket.last_refill = now;
    }

    fn take_token(&self) -> Duration {
        let rate = self.config.max_requests_per_second;
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket, Instant::now());

        let wait = if bucket.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - bucket.tokens) / rate)
        };
        // Callers past the burst queue up behind each other.
        bucket.tokens -= 1.0;
        wait
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::probe::ManualProbe;

    fn throttle(cpu: f64, config: ThrottleConfig) -> (Throttle, ManualProbe) {
        let probe = ManualProbe::new(cpu, 0.0);
        let sampler = Arc::new(ResourceSampler::new(probe.clone(), Duration::ZERO));
        (Throttle::new(config, sampler), probe)
    }

    #[test]
    fn test_cpu_multiplier_steps() {
        assert!((cpu_multiplier(10.0) - 1.0).abs() < f64::EPSILON);
        assert!((cpu_multiplier(30.1) - 1.5).abs() < f64::EPSILON);
        assert!((cpu_multiplier(50.1) - 2.0).abs() < f64::EPSILON);
        assert!((cpu_multiplier(70.1) - 4.0).abs() < f64::EPSILON);
        assert!((cpu_multiplier(85.1) - 10.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_scales_base_delay() {
        let (throttle, _probe) = throttle(0.0, ThrottleConfig::default());
        assert_eq!(throttle.delay_for(Priority::Normal), Duration::from_millis(50));
        assert_eq!(throttle.delay_for(Priority::Idle), Duration::from_millis(200));
        assert_eq!(throttle.delay_for(Priority::Critical), Duration::from_millis(5));
        assert_eq!(throttle.throttle_events(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cpu_pressure_counts_events() {
        let (throttle, probe) = throttle(90.0, ThrottleConfig::default());
        assert_eq!(throttle.delay_for(Priority::Normal), Duration::from_millis(500));
        probe.set_cpu(10.0);
        assert_eq!(throttle.delay_for(Priority::Normal), Duration::from_millis(50));
        assert_eq!(throttle.throttle_events(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_exhaustion_adds_token_wait() {
        let config = ThrottleConfig {
            base_delay_ms: 0,
            max_requests_per_second: 10.0,
            burst_limit: 2,
            ..ThrottleConfig::default()
        };
        let (throttle, _probe) = throttle(0.0, config);
        assert_eq!(throttle.delay_for(Priority::Normal), Duration::ZERO);
        assert_eq!(throttle.delay_for(Priority::Normal), Duration::ZERO);
        assert_eq!(throttle.delay_for(Priority::Normal), Duration::from_millis(100));

        let start = Instant::now();
        let applied = throttle.acquire(Priority::Normal).await;
        assert_eq!(applied, Duration::from_millis(200));
        assert!(Instant::now() - start >= applied);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_available_refills_without_consuming() {
        let config = ThrottleConfig {
            base_delay_ms: 0,
            max_requests_per_second: 10.0,
            burst_limit: 2,
            ..ThrottleConfig::default()
        };
        let (throttle, _probe) = throttle(0.0, config);
        assert!((throttle.tokens_available() - 2.0).abs() < 1e-9);

        for _ in 0..3 {
            throttle.delay_for(Priority::Normal);
        }
        assert!(throttle.tokens_available().abs() < 1e-9);

        tokio::time::advance(Duration::from_millis(250)).await;
        assert!((throttle.tokens_available() - 1.5).abs() < 1e-9);
        assert!((throttle.tokens_available() - 1.5).abs() < 1e-9);
    }
}
