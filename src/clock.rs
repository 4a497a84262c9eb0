//! Time source for read deadlines.
//!
//! The engine never reads the wall clock directly, so tests can swap in
//! [`crate::sim::SimClock`] and run timeouts without waiting.

use std::thread;
use std::time::{Duration, Instant};

/// Monotonic time source used for read deadlines.
///
/// `now` is measured from an arbitrary origin fixed for the clock's lifetime.
/// `sleep` is the only point where a frame read suspends.
pub trait Clock: Send {
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by [`Instant`] and [`thread::sleep`]
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}
