//! Time resolution and clocks
//!
//! Every fire time in Doppler is absolute epoch seconds, computed once when a
//! job is submitted or retried. [`resolve`] turns the ways a caller can say
//! "when" into that value.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// When a job should fire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum When {
    /// An absolute point in time
    At(DateTime<Utc>),
    /// A span of time from now
    After(Duration),
    /// Raw seconds from now
    Seconds(i64),
}

impl From<DateTime<Utc>> for When {
    fn from(at: DateTime<Utc>) -> Self {
        When::At(at)
    }
}

impl From<Duration> for When {
    fn from(after: Duration) -> Self {
        When::After(after)
    }
}

impl From<chrono::Duration> for When {
    fn from(after: chrono::Duration) -> Self {
        When::Seconds(round_millis(after.num_milliseconds()))
    }
}

impl From<i64> for When {
    fn from(seconds: i64) -> Self {
        When::Seconds(seconds)
    }
}

impl From<u64> for When {
    fn from(seconds: u64) -> Self {
        When::Seconds(i64::try_from(seconds).unwrap_or(i64::MAX))
    }
}

impl From<i32> for When {
    fn from(seconds: i32) -> Self {
        When::Seconds(seconds.into())
    }
}

/// Resolve `when` against the system clock.
pub fn resolve(when: impl Into<When>) -> i64 {
    resolve_at(when, Utc::now())
}

/// Resolve `when` to `floor(now) + offset` epoch seconds.
///
/// Durations and absolute times are rounded to whole seconds, not truncated.
pub fn resolve_at(when: impl Into<When>, now: DateTime<Utc>) -> i64 {
    let offset = match when.into() {
        When::At(at) => round_millis((at - now).num_milliseconds()),
        When::After(after) => after.as_secs_f64().round() as i64,
        When::Seconds(seconds) => seconds,
    };
    now.timestamp().saturating_add(offset)
}

fn round_millis(millis: i64) -> i64 {
    (millis as f64 / 1000.0).round() as i64
}

/// Source of the current time
///
/// Workers and the scheduling service read time through a clock so tests can
/// drive retries without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Current time as whole epoch seconds.
    fn now_secs(&self) -> i64 {
        self.now().timestamp()
    }
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug, Clone)]
pub struct ManualClock {
    secs: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_secs: i64) -> Self {
        Self {
            secs: Arc::new(AtomicI64::new(start_secs)),
        }
    }

    pub fn set(&self, secs: i64) {
        self.secs.store(secs, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.secs.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let secs = self.secs.load(Ordering::SeqCst);
        Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
    }

    fn now_secs(&self) -> i64 {
        self.secs.load(Ordering::SeqCst)
    }
}
