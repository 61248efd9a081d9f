//! Delivery worker
//!
//! Claims due jobs from a [`DelayQueue`], POSTs each message to its callback
//! URL once, and records the outcome:
//!
//! - 2xx: the job is `done`.
//! - anything else (non-2xx, timeout, connection error) with budget left: the
//!   job goes back on the queue `retry_delay` seconds after this attempt.
//! - anything else with no budget left: the job is `failed`.
//!
//! Writing the outcome acknowledges the claim. If that write fails the claim
//! is left to expire, and the job is requeued from its last stored state.

use crate::backend::DelayQueue;
use crate::error::Result;
use doppler_core::{Clock, DopplerConfig, JobRecord, RetryOutcome, SystemClock};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Back-off after a queue error
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Worker tuning
#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    /// Upper bound for one delivery attempt
    pub delivery_timeout: Duration,
    /// Sleep between polls of an empty queue
    pub poll_interval: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            delivery_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl From<&DopplerConfig> for WorkerOptions {
    fn from(config: &DopplerConfig) -> Self {
        Self {
            delivery_timeout: config.delivery_timeout(),
            poll_interval: config.poll_interval(),
        }
    }
}

/// Result of processing one claimed job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    Delivered { request_id: String },
    Retrying { request_id: String, run_at: i64 },
    Failed { request_id: String },
}

/// Fires due callbacks; clone it to run several workers on one queue.
#[derive(Clone)]
pub struct DeliveryWorker {
    queue: Arc<dyn DelayQueue>,
    http: reqwest::Client,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
}

impl DeliveryWorker {
    pub fn new(queue: Arc<dyn DelayQueue>, options: WorkerOptions) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(options.delivery_timeout)
            .build()?;

        Ok(Self {
            queue,
            http,
            clock: Arc::new(SystemClock),
            poll_interval: options.poll_interval,
        })
    }

    /// Replace the clock used to decide what is due and to stamp retries
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Claim and attempt at most one due job.
    ///
    /// Returns `Ok(None)` when nothing is due.
    pub async fn process_one(&self) -> Result<Option<Attempt>> {
        let now = self.clock.now_secs();

        let requeued = self.queue.requeue_expired(now).await?;
        if requeued > 0 {
            warn!(requeued, "Requeued jobs whose claim expired");
        }

        let Some(mut job) = self.queue.pop(now).await? else {
            return Ok(None);
        };

        debug!(
            request_id = %job.request_id,
            callback_url = %job.callback_url,
            retries_left = job.retries_left,
            "Delivering callback"
        );

        match self.deliver(&job).await {
            Ok(status) => {
                job.mark_done()?;
                self.queue.complete(&job).await?;
                info!(request_id = %job.request_id, status, "Callback delivered");
                Ok(Some(Attempt::Delivered {
                    request_id: job.request_id,
                }))
            }
            Err(err) => self.record_failure(job, &err).await.map(Some),
        }
    }

    async fn deliver(&self, job: &JobRecord) -> std::result::Result<u16, reqwest::Error> {
        let response = self
            .http
            .post(&job.callback_url)
            .body(job.message.clone())
            .send()
            .await?
            .error_for_status()?;
        Ok(response.status().as_u16())
    }

    async fn record_failure(&self, mut job: JobRecord, err: &reqwest::Error) -> Result<Attempt> {
        // Stamped after the attempt so a slow endpoint pushes the retry back
        let now = self.clock.now_secs();

        match job.record_failure(now)? {
            RetryOutcome::Retry { run_at } => {
                warn!(
                    request_id = %job.request_id,
                    error = %err,
                    retries_left = job.retries_left,
                    run_at,
                    "Callback failed, retrying"
                );
                let request_id = job.request_id.clone();
                self.queue.push(job).await?;
                Ok(Attempt::Retrying { request_id, run_at })
            }
            RetryOutcome::Exhausted => {
                error!(
                    request_id = %job.request_id,
                    error = %err,
                    "Callback failed, no retries left"
                );
                self.queue.fail(&job).await?;
                Ok(Attempt::Failed {
                    request_id: job.request_id,
                })
            }
        }
    }

    /// Process jobs until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let pause = match self.process_one().await {
                Ok(Some(_)) => Duration::ZERO,
                Ok(None) => self.poll_interval,
                Err(e) => {
                    error!("Worker error: {}", e);
                    ERROR_BACKOFF
                }
            };

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Delivery worker stopping");
                    return;
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
}
