//! Time-unit conversions.
//!
//! The scheduler core only ever consumes seconds (as a `Duration`); these
//! helpers exist so callers can express intervals in whatever unit reads
//! best, e.g. `TimeUnit::Minute.to_duration(1.5)` for 90 seconds.

use std::time::Duration;

use serde::Deserialize;

/// A wall-clock unit convertible to canonical seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Seconds per one of this unit.
    pub const fn secs_per_unit(self) -> f64 {
        match self {
            TimeUnit::Millisecond => 0.001,
            TimeUnit::Second => 1.0,
            TimeUnit::Minute => 60.0,
            TimeUnit::Hour => 3_600.0,
            TimeUnit::Day => 86_400.0,
        }
    }

    /// `value` of this unit, in seconds.
    pub fn to_secs(self, value: f64) -> f64 {
        value * self.secs_per_unit()
    }

    /// `value` of this unit, as a `Duration` ready for the clock.
    pub fn to_duration(self, value: f64) -> Duration {
        Duration::from_secs_f64(self.to_secs(value))
    }
}
