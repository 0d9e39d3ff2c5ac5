//! Deadline-based timers driven by an external clock.
//!
//! Nothing here sleeps or spawns. Each timer is a slot holding at most one
//! pending deadline; the owner asks "what is due at `now`?" and the async
//! driver sleeps until [`next`](IdleEscalation::next_deadline) deadline. Arming a slot
//! that already holds a deadline replaces it, so a timer is never
//! double-armed, and cancelling is just clearing the slot.
//!
//! - [`Deadline`] — the single-slot primitive.
//! - [`Debounce`] — coalesces rapid triggers; throttles while a drag is active.
//! - [`IdleEscalation`] — warn after one idle period, act after a longer one,
//!   with a short grace delay before acting.

use std::time::Duration;
use tokio::time::Instant;

/// A single cancellable deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn arm(&mut self, at: Instant) {
        self.0 = Some(at);
    }

    pub fn disarm(&mut self) {
        self.0 = None;
    }

    pub fn is_armed(&self) -> bool {
        self.0.is_some()
    }

    pub fn at(&self) -> Option<Instant> {
        self.0
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.0.is_some_and(|at| at <= now)
    }

    /// Disarm and return `true` if the deadline has passed.
    pub fn take_if_due(&mut self, now: Instant) -> bool {
        let due = self.is_due(now);
        if due {
            self.0 = None;
        }
        due
    }
}

/// Earliest of several optional deadlines.
pub fn earliest(deadlines: impl IntoIterator<Item = Option<Instant>>) -> Option<Instant> {
    deadlines.into_iter().flatten().min()
}

/// Coalesces repeated triggers into one deferred action.
///
/// Outside a drag every trigger makes the action due immediately (replacing
/// anything pending). During a drag the first trigger schedules the action
/// `throttle` later and further triggers leave that deadline alone, so the
/// action runs at most once per interval.
#[derive(Debug, Clone)]
pub struct Debounce {
    slot: Deadline,
    throttle: Duration,
}

impl Debounce {
    pub fn new(throttle: Duration) -> Self {
        Self {
            slot: Deadline::default(),
            throttle,
        }
    }

    pub fn trigger(&mut self, now: Instant, dragging: bool) {
        if !dragging {
            self.slot.arm(now);
        } else if !self.slot.is_armed() {
            self.slot.arm(now + self.throttle);
        }
    }

    pub fn cancel(&mut self) {
        self.slot.disarm();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.slot.at()
    }

    pub fn take_if_due(&mut self, now: Instant) -> bool {
        self.slot.take_if_due(now)
    }
}

/// What an [`IdleEscalation`] wants done at a given moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// First idle period elapsed.
    Warn,
    /// Second idle period elapsed; the action follows after the grace delay.
    ActScheduled,
    /// Grace delay elapsed; act now.
    Act,
}

/// Durations for an [`IdleEscalation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationTimings {
    pub warn_after: Duration,
    pub act_after: Duration,
    pub grace: Duration,
}

impl Default for EscalationTimings {
    fn default() -> Self {
        Self {
            warn_after: Duration::from_secs(20),
            act_after: Duration::from_secs(40),
            grace: Duration::from_secs(1),
        }
    }
}

/// Two deadlines relative to the last activity, plus the grace delay.
///
/// [`restart`](Self::restart) re-arms both idle deadlines together and drops
/// any pending grace; [`cancel`](Self::cancel) clears all three.
#[derive(Debug, Clone)]
pub struct IdleEscalation {
    timings: EscalationTimings,
    warn: Deadline,
    act: Deadline,
    grace: Deadline,
}

impl IdleEscalation {
    pub fn new(timings: EscalationTimings) -> Self {
        Self {
            timings,
            warn: Deadline::default(),
            act: Deadline::default(),
            grace: Deadline::default(),
        }
    }

    pub fn restart(&mut self, now: Instant) {
        self.warn.arm(now + self.timings.warn_after);
        self.act.arm(now + self.timings.act_after);
        self.grace.disarm();
    }

    pub fn cancel(&mut self) {
        self.warn.disarm();
        self.act.disarm();
        self.grace.disarm();
    }

    pub fn is_armed(&self) -> bool {
        self.warn.is_armed() || self.act.is_armed() || self.grace.is_armed()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        earliest([self.warn.at(), self.act.at(), self.grace.at()])
    }

    /// Collect everything due at `now`, in firing order.
    pub fn poll(&mut self, now: Instant) -> Vec<Escalation> {
        let mut fired = Vec::new();
        if self.warn.take_if_due(now) {
            fired.push(Escalation::Warn);
        }
        if self.act.take_if_due(now) {
            fired.push(Escalation::ActScheduled);
            self.grace.arm(now + self.timings.grace);
        }
        if self.grace.take_if_due(now) {
            fired.push(Escalation::Act);
        }
        fired
    }
}
