//! Time sources and sleep functions used by the governor.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Source of the current instant.
pub trait Clock: Send + Sync {
    /// Returns the current instant in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// Suspends the calling thread.
pub trait Sleeper: Send + Sync {
    /// Blocks the caller for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Sleeps the current OS thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug)]
struct ManualState {
    now: DateTime<Utc>,
    sleeps: Vec<Duration>,
}

/// A hand-driven clock for tests.
///
/// `ManualClock` is both a [`Clock`] and a [`Sleeper`]: sleeping records the
/// requested duration and moves the clock forward by that amount instead of
/// blocking. Clones share the same underlying time, so one clone can be handed
/// to a governor while the test keeps another to advance or inspect it.
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl Default for ManualClock {
    /// Starts at 2024-01-01 12:00:00 UTC.
    fn default() -> Self {
        Self::new(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap())
    }
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                now: start,
                sleeps: Vec::new(),
            })),
        }
    }

    /// Moves the clock forward without recording a sleep.
    pub fn advance(&self, duration: Duration) {
        let mut state = self.lock();
        state.now = shift(state.now, duration);
    }

    /// Jumps the clock to `instant`.
    pub fn set(&self, instant: DateTime<Utc>) {
        self.lock().now = instant;
    }

    /// Every duration passed to [`Sleeper::sleep`], in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    /// Sum of all recorded sleeps.
    pub fn total_slept(&self) -> Duration {
        self.lock().sleeps.iter().sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.lock().now
    }
}

impl Sleeper for ManualClock {
    fn sleep(&self, duration: Duration) {
        let mut state = self.lock();
        state.sleeps.push(duration);
        state.now = shift(state.now, duration);
    }
}

fn shift(instant: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    match chrono::Duration::from_std(duration) {
        Ok(delta) => instant + delta,
        Err(_) => instant,
    }
}
