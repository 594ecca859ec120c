//! Cancellable delayed assignment.
//!
//! Step changes are applied a short moment after they are decided so the
//! host can keep showing the previous hint. A value waits here until its
//! due instant; scheduling again replaces it and cancelling drops it, so a
//! stale change can never land after the session has moved on.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
struct Scheduled<T> {
    value: T,
    due: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Deferred<T> {
    pending: Option<Scheduled<T>>,
}

impl<T> Default for Deferred<T> {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl<T> Deferred<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `value` to become due at `now + delay`, replacing any
    /// pending value.
    pub fn schedule(&mut self, value: T, now: Instant, delay: Duration) {
        self.pending = Some(Scheduled {
            value,
            due: now + delay,
        });
    }

    /// Drop the pending value. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }

    /// Take the pending value if it is due at `now`.
    pub fn take_due(&mut self, now: Instant) -> Option<T> {
        if self.pending.as_ref().is_some_and(|s| s.due <= now) {
            self.pending.take().map(|s| s.value)
        } else {
            None
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn peek(&self) -> Option<&T> {
        self.pending.as_ref().map(|s| &s.value)
    }

    pub fn due_at(&self) -> Option<Instant> {
        self.pending.as_ref().map(|s| s.due)
    }
}
