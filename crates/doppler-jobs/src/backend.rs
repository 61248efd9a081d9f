use crate::error::{JobError, Result};
use async_trait::async_trait;
use doppler_core::{DopplerConfig, JobRecord};
use std::sync::Arc;
use std::time::Duration;

pub mod memory;

#[cfg(feature = "redis")]
pub mod redis;

/// Queue tuning shared by every backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    /// How long a claim holds a job before [`DelayQueue::requeue_expired`]
    /// puts it back on the schedule. Must outlast one delivery attempt.
    pub claim_timeout: Duration,
    /// How long terminal records stay readable. Only the Redis queue
    /// expires records.
    pub retention: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            claim_timeout: Duration::from_secs(60),
            retention: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

impl From<&DopplerConfig> for QueueOptions {
    fn from(config: &DopplerConfig) -> Self {
        Self {
            claim_timeout: config.claim_timeout(),
            retention: config.retention(),
        }
    }
}

impl QueueOptions {
    pub(crate) fn claim_secs(&self) -> i64 {
        i64::try_from(self.claim_timeout.as_secs()).unwrap_or(i64::MAX)
    }
}

/// Storage for scheduled deliveries, keyed by `request_id`
///
/// The queue is the only thing that knows when a job fires. Records stay
/// readable through [`DelayQueue::get`] after they leave the schedule,
/// including once terminal.
///
/// A popped job is claimed, not gone: until `push`, `complete` or `fail`
/// acknowledges it, the claim expires after the claim timeout and
/// [`DelayQueue::requeue_expired`] schedules the job again. A job whose
/// worker died or lost the queue mid-attempt may therefore be delivered
/// twice, but never stays pending without a fire time.
#[async_trait]
pub trait DelayQueue: Send + Sync {
    /// Store a pending job and schedule it at `job.run_at`.
    ///
    /// Pushing an id that is already scheduled replaces the old entry, so
    /// re-enqueueing a retry never duplicates a fire.
    async fn push(&self, job: JobRecord) -> Result<()>;

    /// Claim the earliest job due at or before `now`.
    ///
    /// A claimed job leaves the schedule atomically; no other caller can
    /// claim the same fire. The claim lasts until `now + claim_timeout`.
    async fn pop(&self, now: i64) -> Result<Option<JobRecord>>;

    /// Persist a job that was delivered and release its claim
    async fn complete(&self, job: &JobRecord) -> Result<()>;

    /// Persist a job whose attempts are exhausted and release its claim
    async fn fail(&self, job: &JobRecord) -> Result<()>;

    /// Put every pending job whose claim expired at or before `now` back on
    /// the schedule at its stored `run_at`. Returns how many were requeued.
    async fn requeue_expired(&self, now: i64) -> Result<usize>;

    /// Drop a scheduled job and mark it `cancelled`.
    ///
    /// Returns `true` only when a scheduled entry was found and removed.
    /// Unknown, terminal and currently claimed jobs all return `false`.
    async fn cancel(&self, request_id: &str) -> Result<bool>;

    /// Look up the current record
    async fn get(&self, request_id: &str) -> Result<Option<JobRecord>>;
}

pub(crate) fn ensure_pending(job: &JobRecord) -> Result<()> {
    if job.is_terminal() {
        return Err(JobError::NotPending {
            request_id: job.request_id.clone(),
            status: job.status,
        });
    }
    Ok(())
}

/// Open the queue named by `url`.
///
/// `memory://` gives a process-local queue; `redis://` and `rediss://` need
/// the `redis` feature. `key` namespaces the Redis keys.
pub fn open_queue(url: &str, key: &str, options: QueueOptions) -> Result<Arc<dyn DelayQueue>> {
    if url.starts_with("memory://") {
        return Ok(Arc::new(memory::InMemoryQueue::with_options(options)));
    }

    if url.starts_with("redis://") || url.starts_with("rediss://") {
        return open_redis(url, key, options);
    }

    Err(JobError::ConfigError(format!(
        "Unsupported queue URL scheme: {}",
        url
    )))
}

#[cfg(feature = "redis")]
fn open_redis(url: &str, key: &str, options: QueueOptions) -> Result<Arc<dyn DelayQueue>> {
    Ok(Arc::new(
        self::redis::RedisQueue::new(url, key)?.with_options(options),
    ))
}

#[cfg(not(feature = "redis"))]
fn open_redis(_url: &str, _key: &str, _options: QueueOptions) -> Result<Arc<dyn DelayQueue>> {
    Err(JobError::ConfigError(
        "Redis queue requested but doppler-jobs was built without the `redis` feature".to_string(),
    ))
}
