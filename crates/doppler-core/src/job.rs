//! Job record and its lifecycle
//!
//! A [`JobRecord`] describes one scheduled delivery. It is created `pending`
//! by the scheduling service and only ever moves forward:
//!
//! ```text
//! pending --(2xx)--------------------------------> done
//! pending --(failure, retries_left > 0)----------> pending (re-enqueued)
//! pending --(failure, retries_left == 0)---------> failed
//! pending --(cancellation)-----------------------> cancelled
//! ```

use crate::error::TransitionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Seconds between attempts when the submitter did not choose one.
pub const DEFAULT_RETRY_DELAY: u64 = 10;

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Done,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// `done`, `failed` and `cancelled` never change again.
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the worker should do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Re-enqueue the job to fire at `run_at`
    Retry { run_at: i64 },
    /// The attempt budget is spent; the job is now `failed`
    Exhausted,
}

/// One scheduled delivery, keyed by `request_id`
///
/// All timestamps are epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub request_id: String,
    pub callback_url: String,
    pub message: String,
    pub scheduled_at: i64,
    pub run_at: i64,
    #[serde(default)]
    pub last_retry: Option<i64>,
    pub retries_left: u32,
    #[serde(default)]
    pub retry_delay: Option<u64>,
    pub status: JobStatus,
}

impl JobRecord {
    /// Create a pending job accepted at `scheduled_at` that first fires at `run_at`.
    ///
    /// A `run_at` earlier than `scheduled_at` is clamped, so the job fires as
    /// soon as a worker picks it up.
    pub fn new(
        request_id: impl Into<String>,
        callback_url: impl Into<String>,
        message: impl Into<String>,
        scheduled_at: i64,
        run_at: i64,
        max_retries: u32,
        retry_delay: Option<u64>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            callback_url: callback_url.into(),
            message: message.into(),
            scheduled_at,
            run_at: run_at.max(scheduled_at),
            last_retry: None,
            retries_left: max_retries,
            retry_delay,
            status: JobStatus::Pending,
        }
    }

    /// Delay between attempts, falling back to [`DEFAULT_RETRY_DELAY`].
    pub fn effective_retry_delay(&self) -> u64 {
        self.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Record a successful delivery.
    pub fn mark_done(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Done)
    }

    /// Record an explicit cancellation.
    pub fn mark_cancelled(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Cancelled)
    }

    /// Record a failed attempt that happened at `now`.
    ///
    /// With budget left, `retries_left` drops by one, `last_retry` becomes
    /// `now` and the next attempt is due `retry_delay` seconds after it.
    /// Otherwise the job becomes `failed`.
    pub fn record_failure(&mut self, now: i64) -> Result<RetryOutcome, TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError {
                from: self.status,
                to: JobStatus::Pending,
            });
        }

        if self.retries_left == 0 {
            self.status = JobStatus::Failed;
            return Ok(RetryOutcome::Exhausted);
        }

        self.retries_left -= 1;
        self.last_retry = Some(now);
        self.run_at = self.next_attempt_at();
        Ok(RetryOutcome::Retry {
            run_at: self.run_at,
        })
    }

    /// `last_retry` (or `scheduled_at`) plus the retry delay.
    pub fn next_attempt_at(&self) -> i64 {
        let base = self.last_retry.unwrap_or(self.scheduled_at);
        base.saturating_add(self.effective_retry_delay() as i64)
    }

    /// Public view with `run_at` set to the next fire time.
    pub fn view(&self) -> JobView {
        JobView {
            request_id: self.request_id.clone(),
            status: self.status,
            run_at: Some(self.run_at),
            scheduled_at: Some(self.scheduled_at),
            last_retry: self.last_retry,
            retries_left: self.retries_left,
        }
    }

    fn transition(&mut self, to: JobStatus) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

/// Job state as exposed over HTTP
///
/// Decoding ignores unknown fields and rejects missing required ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobView {
    pub request_id: String,
    pub status: JobStatus,
    pub run_at: Option<i64>,
    pub scheduled_at: Option<i64>,
    pub last_retry: Option<i64>,
    pub retries_left: u32,
}

/// Response body of a cancellation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
    pub was_cancelled: bool,
}
