//! Defines the public event types broadcast by the scheduler.
//!
//! This stream is purely observational: subscribing is optional and lagging
//! receivers never block the clock.

use std::time::Duration;

/// Announcements about the clock's lifecycle and the registry's contents.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// Fired when a timer is armed and ticking begins.
    ClockStarted { period: Duration },
    /// Fired when the active timer is torn down.
    ClockStopped,
    /// Fired when a new tick interval takes effect.
    IntervalChanged { period: Duration },
    /// Fired when an event is inserted (or replaces a prior entry).
    EventRegistered { key: String },
    /// Fired when an event leaves the registry, whether by `unregister`,
    /// one-shot completion, or a panicking callback.
    EventRemoved { key: String },
}
