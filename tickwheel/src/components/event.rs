//! Defines the event descriptor stored in the registry.

/// A function closure that represents an event's work.
///
/// The scheduler has no visibility into what the closure captures or
/// mutates; it only guarantees when the closure runs.
pub type Action = Box<dyn FnMut() + Send + 'static>;

/// When an event's action runs, relative to dispatch steps.
pub(crate) enum FirePolicy {
    /// Run on every dispatch step.
    EveryTick,
    /// Run on the next dispatch step, then remove the event.
    Once,
    /// Run once every `interval` dispatch steps. `count` is the number of
    /// steps seen since the last firing.
    EveryN { interval: u32, count: u32 },
}

/// What the registry should do with an event after `execute()`.
pub(crate) enum Outcome {
    Retain,
    Remove,
}

/// A registered event: an owned action plus its firing policy.
pub(crate) struct ScheduledEvent {
    policy: FirePolicy,
    action: Action,
}

impl ScheduledEvent {
    pub(crate) fn recurring(action: Action) -> Self {
        Self {
            policy: FirePolicy::EveryTick,
            action,
        }
    }

    pub(crate) fn one_shot(action: Action) -> Self {
        Self {
            policy: FirePolicy::Once,
            action,
        }
    }

    /// `interval` must be >= 1; the registry clamps before calling.
    pub(crate) fn periodic(interval: u32, fire_immediately: bool, action: Action) -> Self {
        let count = if fire_immediately { interval - 1 } else { 0 };
        Self {
            policy: FirePolicy::EveryN { interval, count },
            action,
        }
    }

    /// Runs one dispatch step's worth of this event's logic.
    pub(crate) fn execute(&mut self) -> Outcome {
        match &mut self.policy {
            FirePolicy::EveryTick => {
                (self.action)();
                Outcome::Retain
            }
            FirePolicy::Once => {
                (self.action)();
                Outcome::Remove
            }
            FirePolicy::EveryN { interval, count } => {
                *count += 1;
                if *count >= *interval {
                    (self.action)();
                    *count = 0;
                }
                Outcome::Retain
            }
        }
    }

    /// Unwraps the event, handing the action back to the caller.
    pub(crate) fn into_action(self) -> Action {
        self.action
    }
}
