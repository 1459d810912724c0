//! The key → event mapping and the dispatch step that drives it.
//!
//! The registry is the mutation-tolerant half of the scheduler: callbacks
//! running inside a dispatch step are allowed to register and unregister
//! events, including themselves. The dispatch loop therefore never holds
//! the registry lock while a callback runs; each event is lifted out of the
//! map, executed, and restored afterwards unless something removed it in
//! the meantime.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::components::event::{Action, Outcome, ScheduledEvent};
use crate::events::SchedulerEvent;

/// Keys beginning with this prefix are reserved for the scheduler's own
/// bookkeeping. User registrations must not use them.
pub const RESERVED_KEY_PREFIX: &str = "__tickwheel/";

/// The reserved key under which a deferred interval change schedules its
/// one-shot swap.
pub(crate) const INTERVAL_CHANGE_KEY: &str = "__tickwheel/interval-change";

struct RegistryInner {
    events: HashMap<String, ScheduledEvent>,
    /// Key of the event currently lifted out of the map for execution.
    executing: Option<String>,
    /// Set when a callback unregisters the key in `executing`, so the
    /// in-flight event is dropped instead of restored.
    executing_unregistered: bool,
}

/// A mapping from unique string keys to scheduled events.
///
/// Cloning is cheap and every clone operates on the same mapping, so a
/// handle can be captured inside a callback to mutate the registry
/// mid-dispatch.
#[derive(Clone)]
pub struct EventRegistry {
    inner: Arc<Mutex<RegistryInner>>,
    event_tx: broadcast::Sender<SchedulerEvent>,
}

impl EventRegistry {
    /// Creates a standalone registry with its own announcement channel.
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self::with_sender(event_tx)
    }

    /// Creates a registry that announces on an existing channel. Used by
    /// `TickClock` so clock and registry share one event stream.
    pub(crate) fn with_sender(event_tx: broadcast::Sender<SchedulerEvent>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner {
                events: HashMap::new(),
                executing: None,
                executing_unregistered: false,
            })),
            event_tx,
        }
    }

    /// Subscribes to registry and clock announcements.
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.event_tx.subscribe()
    }

    // --- Registration ---

    /// Registers an event that fires on every dispatch step.
    ///
    /// Registering a key that already exists replaces the prior event
    /// (last write wins).
    pub fn register_recurring(&self, key: impl Into<String>, action: impl FnMut() + Send + 'static) {
        self.insert(key.into(), ScheduledEvent::recurring(Box::new(action)));
    }

    /// Registers an event that fires on the next dispatch step, then
    /// removes itself.
    pub fn register_once(&self, key: impl Into<String>, action: impl FnMut() + Send + 'static) {
        self.insert(key.into(), ScheduledEvent::one_shot(Box::new(action)));
    }

    /// Registers an event that fires once every `interval` dispatch steps.
    ///
    /// With `fire_immediately`, the internal counter is pre-advanced so the
    /// very next step fires, then every `interval` steps after that.
    ///
    /// `interval` must be at least 1. An interval of 0 is a caller error
    /// and is clamped to 1 with a warning.
    pub fn register_periodic(
        &self,
        key: impl Into<String>,
        interval: u32,
        fire_immediately: bool,
        action: impl FnMut() + Send + 'static,
    ) {
        let key = key.into();
        let interval = if interval == 0 {
            warn!(key = %key, "periodic interval of 0 clamped to 1");
            1
        } else {
            interval
        };
        self.insert(
            key,
            ScheduledEvent::periodic(interval, fire_immediately, Box::new(action)),
        );
    }

    /// Removes the event under `key` and returns its action, or `None` if
    /// no such key is registered.
    ///
    /// Safe to call from inside a callback mid-dispatch. A callback that
    /// unregisters *its own* key succeeds — the entry will not fire again —
    /// but receives `None`, since the action cannot be handed back while it
    /// is executing.
    pub fn unregister(&self, key: &str) -> Option<Action> {
        let mut inner = self.locked();
        let removed = inner.events.remove(key);
        // Whether or not the map held an entry (a callback may have
        // re-registered its own key before unregistering it), the in-flight
        // event under this key must not be restored when its callback
        // returns.
        let in_flight = inner.executing.as_deref() == Some(key);
        if in_flight {
            inner.executing_unregistered = true;
        }
        if let Some(event) = removed {
            drop(inner);
            self.announce_removed(key);
            return Some(event.into_action());
        }
        if in_flight {
            drop(inner);
            self.announce_removed(key);
        }
        None
    }

    /// Returns true if `key` is currently registered.
    pub fn contains(&self, key: &str) -> bool {
        self.locked().events.contains_key(key)
    }

    /// Number of registered events.
    pub fn len(&self) -> usize {
        self.locked().events.len()
    }

    /// True when no events are registered.
    pub fn is_empty(&self) -> bool {
        self.locked().events.is_empty()
    }

    // --- Dispatch ---

    /// Executes one dispatch step: every event present when the step begins
    /// runs once, to completion, one at a time.
    ///
    /// Callbacks may mutate the registry freely. Keys added during the step
    /// first fire on the *next* step; keys removed by an earlier callback
    /// are skipped; a one-shot's self-removal is immediate and final.
    ///
    /// Each callback runs under `catch_unwind`: a panicking event is
    /// removed and its siblings in the same step still execute.
    pub fn dispatch_step(&self) {
        // Snapshot the key set so structural mutation cannot corrupt the
        // iteration.
        let keys: Vec<String> = self.locked().events.keys().cloned().collect();
        trace!(events = keys.len(), "dispatch step");

        for key in keys {
            let mut event = {
                let mut inner = self.locked();
                match inner.events.remove(&key) {
                    Some(event) => {
                        inner.executing = Some(key.clone());
                        inner.executing_unregistered = false;
                        event
                    }
                    // Unregistered by an earlier callback in this step.
                    None => continue,
                }
            };

            // The lock is released here: the callback may re-enter any
            // registry or clock operation without deadlocking.
            let result = catch_unwind(AssertUnwindSafe(|| event.execute()));

            let mut inner = self.locked();
            inner.executing = None;
            let removed_by_callback = std::mem::take(&mut inner.executing_unregistered);
            match result {
                Ok(Outcome::Retain) => {
                    if !removed_by_callback {
                        // `or_insert` keeps a replacement the callback may
                        // have registered under its own key.
                        inner.events.entry(key).or_insert(event);
                    }
                }
                Ok(Outcome::Remove) => {
                    trace!(key = %key, "one-shot fired");
                    // The callback may have registered a replacement under
                    // its own key; that replacement stays, and no removal
                    // is announced for a key that is still present.
                    if !removed_by_callback && !inner.events.contains_key(&key) {
                        drop(inner);
                        self.announce_removed(&key);
                    }
                }
                Err(_) => {
                    warn!(key = %key, "event callback panicked; event removed");
                    if !removed_by_callback && !inner.events.contains_key(&key) {
                        drop(inner);
                        self.announce_removed(&key);
                    }
                }
            }
        }
    }

    // --- Internals ---

    fn insert(&self, key: String, event: ScheduledEvent) {
        {
            let mut inner = self.locked();
            inner.events.insert(key.clone(), event);
        }
        self.event_tx
            .send(SchedulerEvent::EventRegistered { key })
            .ok();
    }

    fn announce_removed(&self, key: &str) {
        self.event_tx
            .send(SchedulerEvent::EventRemoved {
                key: key.to_owned(),
            })
            .ok();
    }

    /// A poisoned lock only means a callback panicked while we were *not*
    /// holding the guard; the map itself is still coherent.
    fn locked(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicU32>, impl FnMut() + Send + 'static) {
        let n = Arc::new(AtomicU32::new(0));
        let n2 = n.clone();
        (n, move || {
            n2.fetch_add(1, Ordering::Relaxed);
        })
    }

    #[test]
    fn recurring_fires_every_step() {
        let registry = EventRegistry::new();
        let (n, bump) = counter();
        registry.register_recurring("pulse", bump);
        for _ in 0..4 {
            registry.dispatch_step();
        }
        assert_eq!(n.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn one_shot_fires_once_and_self_removes() {
        let registry = EventRegistry::new();
        let flag = Arc::new(AtomicBool::new(false));
        let f = flag.clone();
        registry.register_once("intro", move || {
            assert!(!f.swap(true, Ordering::Relaxed), "fired twice");
        });

        registry.dispatch_step();
        assert!(flag.load(Ordering::Relaxed));
        assert!(!registry.contains("intro"));

        for _ in 0..4 {
            registry.dispatch_step();
        }
        assert!(flag.load(Ordering::Relaxed));
    }

    #[test]
    fn periodic_fires_every_n_steps() {
        let registry = EventRegistry::new();
        let (n, bump) = counter();
        registry.register_periodic("beat", 3, false, bump);

        registry.dispatch_step();
        registry.dispatch_step();
        assert_eq!(n.load(Ordering::Relaxed), 0, "must not fire before step 3");

        // Steps 3..=9: fires at 3, 6, 9.
        for _ in 2..9 {
            registry.dispatch_step();
        }
        assert_eq!(n.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn periodic_fire_immediately_shifts_the_cycle() {
        let registry = EventRegistry::new();
        let (n, bump) = counter();
        registry.register_periodic("beat", 3, true, bump);

        registry.dispatch_step();
        assert_eq!(n.load(Ordering::Relaxed), 1, "must fire on step 1");

        // Steps 2..=7: fires at 4 and 7.
        for _ in 1..7 {
            registry.dispatch_step();
        }
        assert_eq!(n.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn periodic_zero_interval_is_clamped_to_one() {
        let registry = EventRegistry::new();
        let (n, bump) = counter();
        registry.register_periodic("broken", 0, false, bump);
        registry.dispatch_step();
        registry.dispatch_step();
        assert_eq!(n.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn unregister_returns_the_action() {
        let registry = EventRegistry::new();
        let (n, bump) = counter();
        registry.register_recurring("pulse", bump);

        let mut action = registry.unregister("pulse").expect("was registered");
        assert!(!registry.contains("pulse"));
        registry.dispatch_step();
        assert_eq!(n.load(Ordering::Relaxed), 0);

        // The caller now owns the action and may run it directly.
        action();
        assert_eq!(n.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn unregister_unknown_key_is_absent_and_harmless() {
        let registry = EventRegistry::new();
        let (n, bump) = counter();
        registry.register_recurring("pulse", bump);

        assert!(registry.unregister("ghost").is_none());
        assert_eq!(registry.len(), 1);
        registry.dispatch_step();
        assert_eq!(n.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn reregistering_a_key_replaces_the_event() {
        let registry = EventRegistry::new();
        let (old, bump_old) = counter();
        let (new, bump_new) = counter();
        registry.register_recurring("slot", bump_old);
        registry.register_recurring("slot", bump_new);
        assert_eq!(registry.len(), 1);

        registry.dispatch_step();
        assert_eq!(old.load(Ordering::Relaxed), 0);
        assert_eq!(new.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn callback_may_unregister_itself() {
        let registry = EventRegistry::new();
        let (n, _) = counter();
        let n2 = n.clone();
        let handle = registry.clone();
        registry.register_recurring("self-limiting", move || {
            if n2.fetch_add(1, Ordering::Relaxed) + 1 == 2 {
                assert!(handle.unregister("self-limiting").is_none());
            }
        });

        for _ in 0..5 {
            registry.dispatch_step();
        }
        assert_eq!(n.load(Ordering::Relaxed), 2);
        assert!(!registry.contains("self-limiting"));
    }

    #[test]
    fn callback_may_unregister_a_sibling() {
        let registry = EventRegistry::new();
        let (victim, bump_victim) = counter();
        registry.register_recurring("victim", bump_victim);

        let handle = registry.clone();
        registry.register_recurring("assassin", move || {
            handle.unregister("victim");
        });

        registry.dispatch_step();
        let after_first = victim.load(Ordering::Relaxed);
        // Dispatch order within the first step is unspecified; from the
        // second step on, "victim" must be gone for good.
        registry.dispatch_step();
        registry.dispatch_step();
        assert_eq!(victim.load(Ordering::Relaxed), after_first);
        assert!(!registry.contains("victim"));
    }

    #[test]
    fn events_added_mid_step_first_fire_next_step() {
        let registry = EventRegistry::new();
        let (late, bump_late) = counter();
        let handle = registry.clone();
        let mut bump_late = Some(bump_late);
        registry.register_once("spawner", move || {
            handle.register_recurring("late", bump_late.take().expect("spawner runs once"));
        });

        registry.dispatch_step();
        assert_eq!(late.load(Ordering::Relaxed), 0, "must wait for the next step");
        registry.dispatch_step();
        assert_eq!(late.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn callback_may_replace_itself() {
        let registry = EventRegistry::new();
        let (new, bump_new) = counter();
        let handle = registry.clone();
        let mut bump_new = Some(bump_new);
        registry.register_once("slot", move || {
            handle.register_recurring("slot", bump_new.take().expect("replaced once"));
        });

        registry.dispatch_step();
        assert!(registry.contains("slot"), "replacement must survive the one-shot removal");
        registry.dispatch_step();
        assert_eq!(new.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn replacing_then_unregistering_own_key_leaves_it_gone() {
        let registry = EventRegistry::new();
        let handle = registry.clone();
        registry.register_once("slot", move || {
            handle.register_recurring("slot", || {});
            // The replacement comes back out; the in-flight original must
            // not be restored in its place.
            assert!(handle.unregister("slot").is_some());
        });

        registry.dispatch_step();
        assert!(!registry.contains("slot"));
        registry.dispatch_step();
        assert!(!registry.contains("slot"));
    }

    #[test]
    fn panicking_callback_is_removed_and_siblings_still_run() {
        let registry = EventRegistry::new();
        let (n, bump) = counter();
        registry.register_recurring("steady", bump);
        registry.register_recurring("boom", || panic!("callback failure"));

        registry.dispatch_step();
        registry.dispatch_step();
        assert_eq!(n.load(Ordering::Relaxed), 2);
        assert!(!registry.contains("boom"));
        assert!(registry.contains("steady"));
    }

    #[test]
    fn announces_registrations_and_removals() {
        let registry = EventRegistry::new();
        let mut rx = registry.subscribe();
        registry.register_once("intro", || {});
        registry.dispatch_step();

        match rx.try_recv().expect("registered announcement") {
            SchedulerEvent::EventRegistered { key } => assert_eq!(key, "intro"),
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.try_recv().expect("removed announcement") {
            SchedulerEvent::EventRemoved { key } => assert_eq!(key, "intro"),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
