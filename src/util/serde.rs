//! Serializable identifiers and priority levels shared across the crate.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Priority level of an operation. Lower level means more urgent.
///
/// Levels are stable integer indexes (`Critical = 0` … `Idle = 4`) so lane
/// tables can be plain arrays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Must run as soon as resources allow (health checks, user-blocking work).
    Critical,
    /// User-facing work such as interactive search.
    High,
    /// Regular background work.
    #[default]
    Normal,
    /// Batch work with no one waiting on it.
    Low,
    /// Deferred work that only runs when nothing else is waiting.
    Idle,
}

impl Priority {
    /// All priorities, most urgent first.
    pub const ALL: [Self; 5] = [
        Self::Critical,
        Self::High,
        Self::Normal,
        Self::Low,
        Self::Idle,
    ];

    /// Number of priority levels.
    pub const COUNT: usize = Self::ALL.len();

    /// Numeric level, `0` for `Critical` through `4` for `Idle`.
    #[must_use]
    pub const fn level(self) -> usize {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Normal => 2,
            Self::Low => 3,
            Self::Idle => 4,
        }
    }

    /// Priority for a numeric level, if it is in range.
    #[must_use]
    pub const fn from_level(level: usize) -> Option<Self> {
        match level {
            0 => Some(Self::Critical),
            1 => Some(Self::High),
            2 => Some(Self::Normal),
            3 => Some(Self::Low),
            4 => Some(Self::Idle),
            _ => None,
        }
    }

    /// Level after `steps` promotions, saturating at `Critical`.
    #[must_use]
    pub const fn promoted_level(self, steps: usize) -> usize {
        self.level().saturating_sub(steps)
    }

    /// Lowercase label used in logs and stats keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
            Self::Idle => "idle",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique identifier of a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for OperationId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0.simple())
    }
}
