//! The clock driver: a repeating timer whose every firing performs exactly
//! one dispatch step.
//!
//! `TickClock` replaces the usual global scheduler singleton with an
//! explicit context object: it owns the tick interval, the timer task
//! handle, and the registry, and is cheap to clone wherever a handle is
//! needed (including inside callbacks).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::SchedulerConfig;
use crate::events::SchedulerEvent;
use crate::registry::{EventRegistry, INTERVAL_CHANGE_KEY};

struct ClockState {
    tick_interval: Duration,
    timer: Option<TimerHandle>,
}

/// Owned exclusively while the clock is running; dropping in `stop()`
/// releases the timer task via its shutdown channel.
struct TimerHandle {
    shutdown: broadcast::Sender<()>,
}

/// The process heartbeat.
///
/// All methods are callable from any task, including from callbacks
/// executing mid-dispatch; none of them block on the dispatch step.
/// `start()` and the restart paths spawn onto the ambient tokio runtime,
/// so they must be called from within one.
#[derive(Clone)]
pub struct TickClock {
    registry: EventRegistry,
    state: Arc<Mutex<ClockState>>,
    event_tx: broadcast::Sender<SchedulerEvent>,
}

impl TickClock {
    /// Creates a stopped clock with the configured starting interval.
    pub fn new(config: SchedulerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            registry: EventRegistry::with_sender(event_tx.clone()),
            state: Arc::new(Mutex::new(ClockState {
                tick_interval: config.tick_interval(),
                timer: None,
            })),
            event_tx,
        }
    }

    /// The registry this clock drives.
    pub fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    /// Subscribes to the scheduler's announcement stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.event_tx.subscribe()
    }

    /// True iff an armed timer exists.
    pub fn is_running(&self) -> bool {
        self.locked().timer.is_some()
    }

    /// The current interval. While a deferred `change_interval` is pending,
    /// this still reports the interval actually driving the timer.
    pub fn tick_interval(&self) -> Duration {
        self.locked().tick_interval
    }

    /// Arms the repeating timer at the current interval. The first firing
    /// lands one full period from now.
    ///
    /// Calling `start()` while already running tears down the prior timer
    /// first, so two timers never tick concurrently.
    pub fn start(&self) {
        let mut state = self.locked();
        if let Some(timer) = state.timer.take() {
            debug!("start() while running; replacing the active timer");
            timer.shutdown.send(()).ok();
        }
        let period = state.tick_interval;
        state.timer = Some(self.arm(period));
        drop(state);
        info!(?period, "clock started");
        self.event_tx
            .send(SchedulerEvent::ClockStarted { period })
            .ok();
    }

    /// Cancels the active timer and discards any interval change still
    /// waiting for its dispatch step, so a later `start()` ticks at the
    /// last interval that actually took effect. A no-op when not running.
    pub fn stop(&self) {
        let stopped = {
            let mut state = self.locked();
            match state.timer.take() {
                Some(timer) => {
                    timer.shutdown.send(()).ok();
                    true
                }
                None => false,
            }
        };
        if stopped {
            self.registry.unregister(INTERVAL_CHANGE_KEY);
            info!("clock stopped");
            self.event_tx.send(SchedulerEvent::ClockStopped).ok();
        }
    }

    /// Changes the tick interval.
    ///
    /// - Not running: records `period` for the next `start()`.
    /// - Running, `apply_after_next_tick` (the default posture): a one-shot
    ///   under a reserved internal key performs the swap as part of the
    ///   *next* dispatch step, so the current timer period runs to
    ///   completion instead of being truncated.
    /// - Running, immediate: tears the timer down and re-arms right away,
    ///   interrupting the current period.
    pub fn change_interval(&self, period: Duration, apply_after_next_tick: bool) {
        {
            let mut state = self.locked();
            if state.timer.is_none() {
                debug!(?period, "interval recorded for the next start");
                state.tick_interval = period;
                return;
            }
            if !apply_after_next_tick {
                if let Some(timer) = state.timer.take() {
                    timer.shutdown.send(()).ok();
                }
                state.tick_interval = period;
                state.timer = Some(self.arm(period));
                drop(state);
                info!(?period, "interval changed immediately");
                self.event_tx
                    .send(SchedulerEvent::IntervalChanged { period })
                    .ok();
                return;
            }
        }

        debug!(?period, "interval change deferred to the next dispatch step");
        let clock = self.clone();
        self.registry
            .register_once(INTERVAL_CHANGE_KEY, move || clock.apply_interval(period));
    }

    /// Starts the clock and parks until Ctrl+C, then stops it.
    pub async fn run(&self) -> anyhow::Result<()> {
        self.start();
        info!("clock running; press Ctrl+C to stop");
        tokio::signal::ctrl_c().await?;
        info!("shutdown signal received");
        self.stop();
        Ok(())
    }

    // --- Internals ---

    /// The deferred swap, executed from inside a dispatch step. The old
    /// timer task finishes the current step before it observes shutdown.
    fn apply_interval(&self, period: Duration) {
        let mut state = self.locked();
        state.tick_interval = period;
        if let Some(timer) = state.timer.take() {
            timer.shutdown.send(()).ok();
            state.timer = Some(self.arm(period));
        }
        drop(state);
        info!(?period, "interval changed");
        self.event_tx
            .send(SchedulerEvent::IntervalChanged { period })
            .ok();
    }

    fn arm(&self, period: Duration) -> TimerHandle {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        tokio::spawn(tick_loop(period, self.registry.clone(), shutdown_rx));
        TimerHandle {
            shutdown: shutdown_tx,
        }
    }

    fn locked(&self) -> MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TickClock {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

/// The timer task: one dispatch step per firing, until shutdown.
async fn tick_loop(
    period: Duration,
    registry: EventRegistry,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    // A long-running callback delays the next firing rather than causing a
    // burst of catch-up ticks.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => registry.dispatch_step(),
        }
    }
}
