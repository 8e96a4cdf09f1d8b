//! Sliding-window and daily call budgets.

use crate::clock::{Clock, Sleeper, SystemClock, ThreadSleeper};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Length of the per-minute sliding window.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Errors returned by [`RateGovernor::admit`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateError {
    /// The daily ceiling has been reached. No further calls are possible
    /// until the next day boundary.
    #[error("daily quota of {limit} calls exhausted for {date}")]
    QuotaExhausted {
        /// The configured per-day ceiling.
        limit: u32,
        /// The calendar day whose budget is spent.
        date: NaiveDate,
    },
}

/// Errors raised when constructing a governor with unusable limits.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LimitsError {
    #[error("per-minute ceiling must be at least 1")]
    ZeroPerMinute,
    #[error("per-day ceiling must be at least 1")]
    ZeroPerDay,
}

/// Calendar convention that decides when the daily counter resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayBoundary {
    /// Reset at midnight UTC.
    Utc,
    /// Reset at midnight in the host's local time zone.
    #[default]
    Local,
}

impl DayBoundary {
    /// Calendar date of `instant` under this convention.
    pub fn date_of(self, instant: DateTime<Utc>) -> NaiveDate {
        match self {
            Self::Utc => instant.date_naive(),
            Self::Local => instant.with_timezone(&chrono::Local).date_naive(),
        }
    }
}

/// Call ceilings enforced by a [`RateGovernor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    /// Maximum calls within any trailing 60-second window.
    pub per_minute: u32,
    /// Maximum calls per calendar day.
    pub per_day: u32,
    /// When the daily counter resets.
    pub day_boundary: DayBoundary,
    /// Extra time added to every computed per-minute wait.
    pub wait_margin: Duration,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            per_minute: 6,
            per_day: 800,
            day_boundary: DayBoundary::Local,
            wait_margin: Duration::ZERO,
        }
    }
}

impl RateLimits {
    /// Checks that both ceilings allow at least one call.
    pub fn validate(&self) -> Result<(), LimitsError> {
        if self.per_minute == 0 {
            return Err(LimitsError::ZeroPerMinute);
        }
        if self.per_day == 0 {
            return Err(LimitsError::ZeroPerDay);
        }
        Ok(())
    }
}

/// Snapshot of the governor's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    /// Calls recorded within the trailing 60 seconds.
    pub calls_this_minute: u32,
    /// Per-minute ceiling.
    pub per_minute: u32,
    /// Calls recorded since the last day boundary.
    pub calls_today: u32,
    /// Per-day ceiling.
    pub per_day: u32,
    /// The calendar day `calls_today` belongs to.
    pub day: NaiveDate,
}

impl Usage {
    /// Calls still available today.
    pub fn remaining_today(&self) -> u32 {
        self.per_day.saturating_sub(self.calls_today)
    }
}

/// A granted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Total time spent sleeping before the call was granted.
    pub waited: Duration,
    /// Counters after recording the call.
    pub usage: Usage,
}

#[derive(Debug)]
struct RateWindow {
    calls: VecDeque<DateTime<Utc>>,
    today: u32,
    day: NaiveDate,
}

impl RateWindow {
    fn prune(&mut self, now: DateTime<Utc>) {
        while let Some(&oldest) = self.calls.front() {
            if age(now, oldest) >= WINDOW {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }

    /// How long until a slot frees up, or `None` if one is free now.
    fn wait_for_slot(&self, now: DateTime<Utc>, per_minute: u32) -> Option<Duration> {
        if self.calls.len() < per_minute as usize {
            return None;
        }
        let oldest = *self.calls.front()?;
        Some(WINDOW.saturating_sub(age(now, oldest)))
    }

    fn record(&mut self, now: DateTime<Utc>) {
        self.calls.push_back(now);
        self.today += 1;
    }
}

fn age(now: DateTime<Utc>, then: DateTime<Utc>) -> Duration {
    now.signed_duration_since(then)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// Enforces per-minute and per-day call ceilings.
///
/// Every call to [`admit`](Self::admit) either records a call and returns, or
/// reports that today's budget is spent. The governor is `Sync`; share it
/// behind an `Arc` when several callers use the same API credential, since
/// the budget belongs to the credential and not to any single caller.
pub struct RateGovernor {
    limits: RateLimits,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    window: Mutex<RateWindow>,
}

impl std::fmt::Debug for RateGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateGovernor")
            .field("limits", &self.limits)
            .field("usage", &self.usage())
            .finish()
    }
}

impl RateGovernor {
    /// Creates a governor backed by the wall clock and real sleeps.
    ///
    /// # Errors
    ///
    /// Returns [`LimitsError`] if either ceiling is zero.
    pub fn new(limits: RateLimits) -> Result<Self, LimitsError> {
        Self::with_time_source(limits, Arc::new(SystemClock), Arc::new(ThreadSleeper))
    }

    /// Creates a governor reading time from `clock` and waiting through
    /// `sleeper`.
    ///
    /// # Errors
    ///
    /// Returns [`LimitsError`] if either ceiling is zero.
    pub fn with_time_source(
        limits: RateLimits,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self, LimitsError> {
        limits.validate()?;
        let day = limits.day_boundary.date_of(clock.now());
        Ok(Self {
            limits,
            clock,
            sleeper,
            window: Mutex::new(RateWindow {
                calls: VecDeque::with_capacity(limits.per_minute.min(64) as usize),
                today: 0,
                day,
            }),
        })
    }

    /// The ceilings this governor enforces.
    pub fn limits(&self) -> &RateLimits {
        &self.limits
    }

    /// Blocks until a call may proceed, then records it.
    ///
    /// When the trailing 60-second window is full, sleeps until the oldest
    /// call in it expires (plus the configured margin) and re-evaluates. The
    /// window lock is not held while sleeping.
    ///
    /// # Errors
    ///
    /// Returns [`RateError::QuotaExhausted`] without sleeping once the daily
    /// ceiling is reached.
    pub fn admit(&self) -> Result<Admission, RateError> {
        let mut waited = Duration::ZERO;
        loop {
            let wait = {
                let mut window = self.lock();
                // Read under the lock so the window stays in call order.
                let now = self.clock.now();
                self.roll_day(&mut window, now);

                if window.today >= self.limits.per_day {
                    warn!(
                        limit = self.limits.per_day,
                        date = %window.day,
                        "daily quota exhausted"
                    );
                    return Err(RateError::QuotaExhausted {
                        limit: self.limits.per_day,
                        date: window.day,
                    });
                }

                window.prune(now);
                match window.wait_for_slot(now, self.limits.per_minute) {
                    None => {
                        window.record(now);
                        let usage = self.usage_of(&window, now);
                        return Ok(Admission { waited, usage });
                    }
                    Some(wait) => wait + self.limits.wait_margin,
                }
            };

            info!(
                per_minute = self.limits.per_minute,
                wait_secs = wait.as_secs_f64(),
                "rate limit reached, waiting"
            );
            self.sleeper.sleep(wait);
            waited += wait;
        }
    }

    /// Current counters, without recording a call.
    pub fn usage(&self) -> Usage {
        let now = self.clock.now();
        let window = self.lock();
        let mut usage = self.usage_of(&window, now);
        let today = self.limits.day_boundary.date_of(now);
        if today > window.day {
            usage.calls_today = 0;
            usage.day = today;
        }
        usage
    }

    fn roll_day(&self, window: &mut RateWindow, now: DateTime<Utc>) {
        let today = self.limits.day_boundary.date_of(now);
        if today > window.day {
            info!(
                previous = %window.day,
                date = %today,
                calls = window.today,
                "daily quota reset"
            );
            window.today = 0;
            window.day = today;
        }
    }

    fn usage_of(&self, window: &RateWindow, now: DateTime<Utc>) -> Usage {
        let recent = window
            .calls
            .iter()
            .filter(|&&call| age(now, call) < WINDOW)
            .count();
        Usage {
            calls_this_minute: recent as u32,
            per_minute: self.limits.per_minute,
            calls_today: window.today,
            per_day: self.limits.per_day,
            day: window.day,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RateWindow> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;
    use chrono::TimeZone;

    fn governor(limits: RateLimits) -> (RateGovernor, ManualClock) {
        let clock = ManualClock::default();
        let governor =
            RateGovernor::with_time_source(limits, Arc::new(clock.clone()), Arc::new(clock.clone()))
                .unwrap();
        (governor, clock)
    }

    fn utc_limits(per_minute: u32, per_day: u32) -> RateLimits {
        RateLimits {
            per_minute,
            per_day,
            day_boundary: DayBoundary::Utc,
            wait_margin: Duration::ZERO,
        }
    }

    #[test]
    fn test_admits_up_to_ceiling_without_waiting() {
        let (governor, clock) = governor(utc_limits(3, 100));

        for expected in 1..=3 {
            let admission = governor.admit().unwrap();
            assert_eq!(admission.waited, Duration::ZERO);
            assert_eq!(admission.usage.calls_this_minute, expected);
            assert_eq!(admission.usage.calls_today, expected);
        }
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_third_call_waits_for_oldest_to_expire() {
        let (governor, clock) = governor(utc_limits(2, 100));

        governor.admit().unwrap();
        clock.advance(Duration::from_secs(4));
        governor.admit().unwrap();
        clock.advance(Duration::from_secs(6));

        let third = governor.admit().unwrap();

        // 10 seconds have passed since the first call.
        assert_eq!(third.waited, Duration::from_secs(50));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(50)]);
        assert_eq!(third.usage.calls_this_minute, 2);
        assert_eq!(third.usage.calls_today, 3);
    }

    #[test]
    fn test_wait_margin_is_added() {
        let limits = RateLimits {
            wait_margin: Duration::from_secs(5),
            ..utc_limits(1, 100)
        };
        let (governor, clock) = governor(limits);

        governor.admit().unwrap();
        clock.advance(Duration::from_secs(20));
        let second = governor.admit().unwrap();

        assert_eq!(second.waited, Duration::from_secs(45));
    }

    #[test]
    fn test_calls_older_than_window_are_pruned() {
        let (governor, clock) = governor(utc_limits(1, 100));

        governor.admit().unwrap();
        clock.advance(WINDOW);
        let second = governor.admit().unwrap();

        assert_eq!(second.waited, Duration::ZERO);
        assert_eq!(second.usage.calls_this_minute, 1);
    }

    #[test]
    fn test_daily_quota_fails_fast() {
        let (governor, clock) = governor(utc_limits(10, 2));

        governor.admit().unwrap();
        governor.admit().unwrap();
        let err = governor.admit().unwrap_err();

        assert_eq!(
            err,
            RateError::QuotaExhausted {
                limit: 2,
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            }
        );
        assert!(clock.sleeps().is_empty());
        assert_eq!(governor.usage().calls_today, 2);
    }

    #[test]
    fn test_quota_error_display() {
        let err = RateError::QuotaExhausted {
            limit: 800,
            date: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
        };
        assert_eq!(
            err.to_string(),
            "daily quota of 800 calls exhausted for 2024-03-09"
        );
    }

    #[test]
    fn test_day_rollover_resets_daily_counter() {
        let (governor, clock) = governor(utc_limits(10, 2));

        governor.admit().unwrap();
        governor.admit().unwrap();
        assert!(governor.admit().is_err());

        clock.set(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 1).unwrap());
        let admission = governor.admit().unwrap();

        assert_eq!(admission.usage.calls_today, 1);
        assert_eq!(
            admission.usage.day,
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
    }

    #[test]
    fn test_rollover_keeps_minute_window() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 50).unwrap());
        let governor = RateGovernor::with_time_source(
            utc_limits(1, 100),
            Arc::new(clock.clone()),
            Arc::new(clock.clone()),
        )
        .unwrap();

        governor.admit().unwrap();
        clock.advance(Duration::from_secs(20));
        let second = governor.admit().unwrap();

        // The call at 23:59:50 still occupies the window after midnight.
        assert_eq!(second.waited, Duration::from_secs(40));
        assert_eq!(second.usage.calls_today, 1);
    }

    #[test]
    fn test_clock_going_backwards_does_not_reset() {
        let (governor, clock) = governor(utc_limits(10, 100));
        governor.admit().unwrap();

        clock.set(Utc.with_ymd_and_hms(2023, 12, 31, 23, 0, 0).unwrap());
        let admission = governor.admit().unwrap();

        assert_eq!(admission.usage.calls_today, 2);
    }

    #[test]
    fn test_usage_reports_without_recording() {
        let (governor, clock) = governor(utc_limits(5, 100));
        governor.admit().unwrap();
        governor.admit().unwrap();

        let usage = governor.usage();
        assert_eq!(usage.calls_this_minute, 2);
        assert_eq!(usage.calls_today, 2);
        assert_eq!(usage.remaining_today(), 98);

        clock.advance(Duration::from_secs(61));
        assert_eq!(governor.usage().calls_this_minute, 0);
        assert_eq!(governor.usage().calls_today, 2);
    }

    #[test]
    fn test_usage_reports_next_day_as_empty() {
        let (governor, clock) = governor(utc_limits(5, 100));
        governor.admit().unwrap();
        clock.set(Utc.with_ymd_and_hms(2024, 1, 2, 8, 0, 0).unwrap());

        let usage = governor.usage();
        assert_eq!(usage.calls_today, 0);
        assert_eq!(usage.day, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
    }

    #[test]
    fn test_zero_limits_rejected() {
        let clock = ManualClock::default();
        let result = RateGovernor::with_time_source(
            utc_limits(0, 10),
            Arc::new(clock.clone()),
            Arc::new(clock.clone()),
        );
        assert_eq!(result.unwrap_err(), LimitsError::ZeroPerMinute);

        assert_eq!(
            utc_limits(1, 0).validate().unwrap_err(),
            LimitsError::ZeroPerDay
        );
    }

    #[test]
    fn test_day_boundary_utc_date() {
        let instant = Utc.with_ymd_and_hms(2024, 5, 31, 23, 30, 0).unwrap();
        assert_eq!(
            DayBoundary::Utc.date_of(instant),
            NaiveDate::from_ymd_opt(2024, 5, 31).unwrap()
        );
        assert_eq!(
            DayBoundary::Local.date_of(instant),
            instant.with_timezone(&chrono::Local).date_naive()
        );
    }

    #[test]
    fn test_shared_governor_enforces_global_daily_budget() {
        let (governor, _clock) = governor(utc_limits(1000, 50));
        let governor = Arc::new(governor);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let governor = Arc::clone(&governor);
                std::thread::spawn(move || (0..20).filter(|_| governor.admit().is_ok()).count())
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
        assert_eq!(governor.usage().calls_today, 50);
    }

    #[test]
    fn test_huge_per_minute_ceiling_is_usable() {
        let limits = utc_limits(u32::MAX, 10);
        assert!(limits.validate().is_ok());
        let (governor, _clock) = governor(limits);

        let admission = governor.admit().unwrap();
        assert_eq!(admission.usage.calls_this_minute, 1);
        assert_eq!(admission.usage.per_minute, u32::MAX);
    }

    #[test]
    fn test_shared_governor_records_calls_in_time_order() {
        let (governor, clock) = governor(utc_limits(10_000, 10_000));
        let governor = Arc::new(governor);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let governor = Arc::clone(&governor);
                let clock = clock.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        clock.advance(Duration::from_millis(1));
                        governor.admit().unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let window = governor.lock();
        assert_eq!(window.calls.len(), 800);
        assert!(
            window.calls.iter().zip(window.calls.iter().skip(1)).all(|(a, b)| a <= b),
            "call timestamps out of order"
        );
    }
}
