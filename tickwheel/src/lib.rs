//! # Tickwheel
//!
//! A tick-driven event scheduler for Rust.
//!
//! Tickwheel provides a single cooperative heartbeat for real-time
//! applications (games, simulations, dashboards): one clock fires at a
//! configurable interval, and every registered event executes as part of
//! that firing according to its policy.
//!
//! ## Core Concepts
//!
//! - **TickClock**: owns the repeating timer and its start/stop lifecycle.
//!   Every firing performs exactly one dispatch step.
//! - **EventRegistry**: a key → event mapping. Events come in three
//!   flavors: *recurring* (every tick), *one-shot* (once, then gone), and
//!   *periodic* (every N ticks, optionally starting on the very next one).
//! - **Event-Driven**: lifecycle and registry changes are announced on a
//!   broadcast stream of [`SchedulerEvent`]s that the application can
//!   subscribe to.
//! - **Configuration-Driven**: the starting tick interval comes from a
//!   [`SchedulerConfig`], typically loaded from a TOML file.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use tickwheel::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // 1. Create a clock with the default 0.6 s heartbeat.
//!     let clock = TickClock::new(SchedulerConfig::default());
//!
//!     // 2. Register some events.
//!     clock.registry().register_recurring("pulse", || println!("tick"));
//!     clock.registry().register_periodic("beat", 5, false, || {
//!         println!("every fifth tick");
//!     });
//!
//!     // 3. Speed things up one tick from now.
//!     clock.start();
//!     clock.change_interval(Duration::from_millis(100), true);
//!
//!     // 4. Run until Ctrl+C.
//!     clock.run().await
//! }
//! ```
//!
//! [`SchedulerEvent`]: crate::events::SchedulerEvent
//! [`SchedulerConfig`]: crate::config::SchedulerConfig

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Declare all the modules in the crate.
pub mod clock;
pub mod components;
pub mod config;
pub mod events;
pub mod registry;
pub mod units;

/// A prelude module for easy importing of the most common Tickwheel types.
pub mod prelude {
    pub use crate::clock::TickClock;
    pub use crate::components::event::Action;
    pub use crate::config::SchedulerConfig;
    pub use crate::events::SchedulerEvent;
    pub use crate::registry::EventRegistry;
    pub use crate::units::TimeUnit;
}
