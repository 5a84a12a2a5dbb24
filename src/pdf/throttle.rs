//! Leading + trailing edge throttle for resize-triggered renders
//!
//! The first event in a quiet period fires immediately. Events arriving
//! within the window are folded into one trailing fire at the window's end,
//! so the final container size is always rendered.

use std::time::{Duration, Instant};

/// Default throttle window for resize renders
pub const DEFAULT_RESIZE_THROTTLE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct Throttle {
    window: Duration,
    last_fired: Option<Instant>,
    trailing: bool,
}

impl Throttle {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_fired: None,
            trailing: false,
        }
    }

    /// Register an event. Returns true if it should fire now.
    pub fn hit(&mut self, now: Instant) -> bool {
        match self.last_fired {
            Some(last) if now.saturating_duration_since(last) < self.window => {
                self.trailing = true;
                false
            }
            _ => {
                self.last_fired = Some(now);
                self.trailing = false;
                true
            }
        }
    }

    /// Returns true once when a deferred trailing event is due
    pub fn poll(&mut self, now: Instant) -> bool {
        if !self.trailing {
            return false;
        }
        match self.last_fired {
            Some(last) if now.saturating_duration_since(last) < self.window => false,
            _ => {
                self.last_fired = Some(now);
                self.trailing = false;
                true
            }
        }
    }

    /// Time until the trailing event is due, if one is pending
    #[must_use]
    pub fn pending_deadline(&self) -> Option<Instant> {
        if self.trailing {
            self.last_fired.map(|last| last + self.window)
        } else {
            None
        }
    }

    /// Forget any pending trailing event
    pub fn cancel(&mut self) {
        self.trailing = false;
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(DEFAULT_RESIZE_THROTTLE)
    }
}
