//! Call budgets for rate-limited remote APIs.
//!
//! This crate provides a [`RateGovernor`] that enforces two ceilings on calls
//! made against an external service:
//!
//! - a per-minute ceiling, tracked as a sliding 60-second window of call
//!   timestamps. When the window is full, [`RateGovernor::admit`] sleeps for
//!   exactly as long as it takes the oldest call to leave the window.
//! - a per-day ceiling, tracked as a counter that resets when the calendar
//!   date changes (in UTC or local time, see [`DayBoundary`]). When the
//!   counter is spent, `admit` fails fast with [`RateError::QuotaExhausted`]
//!   instead of waiting for midnight.
//!
//! Time is read through the [`Clock`] trait and waiting goes through the
//! [`Sleeper`] trait, so tests can drive the governor with a [`ManualClock`]
//! and never block.
//!
//! # Example
//!
//! ```
//! use rate_governor::{ManualClock, RateGovernor, RateLimits};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let clock = ManualClock::default();
//! let limits = RateLimits { per_minute: 2, ..RateLimits::default() };
//! let governor =
//!     RateGovernor::with_time_source(limits, Arc::new(clock.clone()), Arc::new(clock.clone()))
//!         .unwrap();
//!
//! governor.admit().unwrap();
//! governor.admit().unwrap();
//! let third = governor.admit().unwrap();
//! assert_eq!(third.waited, Duration::from_secs(60));
//! ```

mod clock;
mod governor;

pub use clock::{Clock, ManualClock, Sleeper, SystemClock, ThreadSleeper};
pub use governor::{
    Admission, DayBoundary, LimitsError, RateError, RateGovernor, RateLimits, Usage, WINDOW,
};
