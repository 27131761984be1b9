//! Office clock, the single source of "now" and "today".
//!
//! RULE: Nothing in the desk reads the system time directly.
//! Every operation asks the engine's Clock, so tests and the traffic
//! simulator can pin time to a known instant.

use crate::types::{Day, Timestamp};
use chrono::Duration;
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    /// Current office-local time.
    fn now(&self) -> Timestamp;

    fn today(&self) -> Day {
        self.now().date()
    }
}

/// Wall clock in the host's local timezone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Local::now().naive_local()
    }
}

/// A settable clock. Time only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<Timestamp>,
}

impl FixedClock {
    pub fn new(now: Timestamp) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: Timestamp) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    /// Move the clock forward and return the new time.
    pub fn advance(&self, by: Duration) -> Timestamp {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
        *guard
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
