//! Wall-clock helpers.
//!
//! Scheduling decisions use the monotonic `tokio::time::Instant`; these
//! timestamps only label records meant for humans or external systems.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, or 0 if the system clock is before it.
#[must_use]
pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}
