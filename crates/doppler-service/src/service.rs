use crate::validation::Submission;
use doppler_core::{Cancellation, Clock, JobRecord, JobStatus, JobView, SystemClock};
use doppler_jobs::{DelayQueue, JobError};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Accepts, looks up and cancels jobs on a [`DelayQueue`]
#[derive(Clone)]
pub struct SchedulingService {
    queue: Arc<dyn DelayQueue>,
    clock: Arc<dyn Clock>,
}

impl SchedulingService {
    pub fn new(queue: Arc<dyn DelayQueue>) -> Self {
        Self {
            queue,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Enqueue a new pending job.
    ///
    /// The returned view echoes the requested `run_at` (absent if none was
    /// given); a past `run_at` still fires as soon as possible.
    pub async fn create(&self, submission: Submission) -> Result<JobView, JobError> {
        let request_id = Uuid::new_v4().to_string();
        let scheduled_at = self.clock.now_secs();

        let record = JobRecord::new(
            request_id.clone(),
            submission.callback_url,
            submission.message,
            scheduled_at,
            submission.run_at.unwrap_or(scheduled_at),
            submission.max_retries,
            submission.retry_delay,
        );
        let fires_at = record.run_at;
        self.queue.push(record).await?;

        info!(
            request_id = %request_id,
            run_at = fires_at,
            max_retries = submission.max_retries,
            "Job scheduled"
        );

        Ok(JobView {
            request_id,
            status: JobStatus::Pending,
            run_at: submission.run_at,
            scheduled_at: Some(scheduled_at),
            last_retry: None,
            retries_left: submission.max_retries,
        })
    }

    /// Current view of a job, `None` if the id is unknown
    pub async fn get(&self, request_id: &str) -> Result<Option<JobView>, JobError> {
        let record = self.queue.get(request_id).await?;
        Ok(record.map(|record| record.view()))
    }

    /// Cancel a job that has not fired yet
    pub async fn cancel(&self, request_id: &str) -> Result<Cancellation, JobError> {
        let was_cancelled = self.queue.cancel(request_id).await?;
        if was_cancelled {
            info!(request_id = %request_id, "Job cancelled");
        } else {
            debug!(request_id = %request_id, "Nothing to cancel");
        }
        Ok(Cancellation { was_cancelled })
    }
}
