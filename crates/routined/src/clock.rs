//! Time source for every polling loop in the daemon.

use chrono::{Local, NaiveDateTime};
use std::thread;
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    /// Local wall-clock time, used for schedules and date rollover.
    fn now(&self) -> NaiveDateTime;
    /// Monotonic time since the clock was created, used for deadlines.
    fn elapsed(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
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
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}
