// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling.
//!
//! All persisted timestamps are RFC-3339 UTC strings ending in `Z`.

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A clock that provides the current time
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;
    fn now_utc(&self) -> DateTime<Utc>;

    /// Current wall-clock time as an RFC-3339 UTC string (`...Z`).
    fn timestamp(&self) -> String {
        format_utc(self.now_utc())
    }
}

/// Real system clock
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fake clock for testing with controllable time
#[derive(Clone)]
pub struct FakeClock {
    current: Arc<Mutex<Instant>>,
    wall: Arc<Mutex<DateTime<Utc>>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new(Instant::now())),
            wall: Arc::new(Mutex::new(Utc::now())),
        }
    }

    /// Fake clock pinned to a specific wall-clock time.
    pub fn at(wall: DateTime<Utc>) -> Self {
        Self {
            current: Arc::new(Mutex::new(Instant::now())),
            wall: Arc::new(Mutex::new(wall)),
        }
    }

    /// Advance both monotonic and wall time by the given duration
    pub fn advance(&self, duration: Duration) {
        *self.current.lock() += duration;
        let mut wall = self.wall.lock();
        *wall += chrono::Duration::from_std(duration).unwrap_or_default();
    }

    /// Set the wall-clock time
    pub fn set_utc(&self, wall: DateTime<Utc>) {
        *self.wall.lock() = wall;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.current.lock()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        *self.wall.lock()
    }
}

/// Format a UTC time as RFC-3339 with a trailing `Z` and whole seconds.
pub fn format_utc(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an RFC-3339 timestamp, accepting both `Z` and `+00:00` suffixes.
pub fn parse_utc(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Whole seconds elapsed between a stored timestamp and *now*.
///
/// Returns `None` when the timestamp does not parse. Negative values are
/// possible when the timestamp is in the future (e.g. `cooldown_until`).
pub fn elapsed_seconds(ts: &str, now: DateTime<Utc>) -> Option<i64> {
    parse_utc(ts).map(|dt| (now - dt).num_seconds())
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
