//! Alert Clock
//!
//! Logical timers only: the engine arms and disarms them, and whoever drives
//! the engine (see [`EngineDriver`](crate::EngineDriver)) sleeps until
//! [`AlertClock::next_deadline`] and then calls
//! [`Engine::on_timer`](crate::Engine::on_timer).

use crate::types::Time;
use tracing::trace;

/// One-shot logical timer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timer {
    deadline: Option<Time>,
}

impl Timer {
    pub fn arm(&mut self, deadline: Time) {
        self.deadline = Some(deadline);
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    /// Arm for `deadline` or disarm when there is none
    pub fn set(&mut self, deadline: Option<Time>) {
        self.deadline = deadline;
    }

    pub fn deadline(&self) -> Option<Time> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn is_due(&self, now: Time) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= now)
    }

    pub fn remaining(&self, now: Time) -> Option<Time> {
        self.deadline.map(|deadline| deadline.saturating_sub(now))
    }
}

/// The wait timer and the grouping timer
#[derive(Debug, Default)]
pub struct AlertClock {
    /// Earliest waiter due time
    pub wait: Timer,
    /// Earliest grouped waiter or pending forwarded run
    pub grouping: Timer,
}

impl AlertClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rearm(&mut self, wait: Option<Time>, grouping: Option<Time>) {
        if self.wait.deadline() != wait || self.grouping.deadline() != grouping {
            trace!("Alert clock: wait={:?} grouping={:?}", wait, grouping);
        }
        self.wait.set(wait);
        self.grouping.set(grouping);
    }

    pub fn disarm(&mut self) {
        self.wait.disarm();
        self.grouping.disarm();
    }

    /// When the driver should wake up next
    pub fn next_deadline(&self) -> Option<Time> {
        match (self.wait.deadline(), self.grouping.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}
