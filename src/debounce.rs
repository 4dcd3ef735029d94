//! Trailing-edge rate limiting for bursty page events.
//!
//! A burst of [`Debouncer::call`]s produces one firing, `quiet` after the last
//! call. Time is supplied by the caller as a monotonic offset (for example the
//! animation-frame timestamp), so there is no hidden timer to leak: cancelling
//! clears the only pending state.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Debouncer {
    quiet: Duration,
    deadline: Option<Duration>,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            deadline: None,
        }
    }

    pub fn quiet(&self) -> Duration {
        self.quiet
    }

    /// Record an event at `now`, pushing the firing back.
    pub fn call(&mut self, now: Duration) {
        self.deadline = Some(now + self.quiet);
    }

    /// Returns true exactly once per burst, when the quiet period has elapsed.
    pub fn poll(&mut self, now: Duration) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}
