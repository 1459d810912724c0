//! Defines the configuration structure for the scheduler.
//!
//! `SchedulerConfig` is designed to be deserialized from a configuration
//! file (e.g., a TOML file) using `serde`, with environment overrides
//! layered on top. Applications that do not care can simply use
//! `SchedulerConfig::default()`.

use std::time::Duration;

use serde::Deserialize;

/// The reference starting interval, in seconds.
pub const DEFAULT_TICK_SECS: f64 = 0.6;

/// Startup settings for a [`TickClock`](crate::clock::TickClock).
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// The starting tick interval, in seconds. Must be positive.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: f64,
}

impl SchedulerConfig {
    /// The starting interval as a `Duration`.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(self.tick_secs)
    }

    /// Loads configuration from `<path>.toml`, with `TICKWHEEL_*`
    /// environment variables taking precedence (e.g. `TICKWHEEL_TICK_SECS`).
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("TICKWHEEL"))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: DEFAULT_TICK_SECS,
        }
    }
}

// --- Default value functions for serde ---

fn default_tick_secs() -> f64 {
    DEFAULT_TICK_SECS
}
