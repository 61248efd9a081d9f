use crate::client::{DopplerClient, SubmitRequest};
use crate::error::ListenerError;
use crate::job::JobHandle;
use doppler_core::{
    resolve_at, Arguments, Clock, ParameterSet, Signer, SystemClock, When, DEFAULT_RETRY_DELAY,
};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Retry settings sent along with every job a trigger schedules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Seconds between attempts
    pub retry_delay: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// `retry_delay` must be at least one second.
    pub fn new(max_retries: u32, retry_delay: u64) -> Result<Self, ListenerError> {
        let policy = Self {
            max_retries,
            retry_delay,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub(crate) fn validate(&self) -> Result<(), ListenerError> {
        if self.retry_delay == 0 {
            return Err(ListenerError::InvalidPolicy("retry_delay must be at least 1 second"));
        }
        Ok(())
    }
}

/// Schedules signed calls to one callback route
#[derive(Clone)]
pub struct Trigger {
    callback_url: String,
    params: Arc<ParameterSet>,
    signer: Arc<Signer>,
    client: DopplerClient,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl Trigger {
    pub(crate) fn new(
        callback_url: String,
        params: Arc<ParameterSet>,
        signer: Arc<Signer>,
        client: DopplerClient,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            callback_url,
            params,
            signer,
            client,
            policy,
            clock: Arc::new(SystemClock),
        }
    }

    /// Clock used to turn relative delays into epoch seconds
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// External URL the service will POST to
    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Schedule one call of the route with `arguments`.
    ///
    /// `arguments` must name exactly the route's parameters; nothing is sent
    /// to the service otherwise.
    pub async fn schedule(
        &self,
        when: impl Into<When>,
        arguments: Arguments,
    ) -> Result<JobHandle, ListenerError> {
        self.params.check_exact(&arguments)?;
        let run_at = resolve_at(when, self.clock.now());

        let request = SubmitRequest {
            message: self.signer.sign(&arguments),
            callback_url: self.callback_url.clone(),
            max_retries: self.policy.max_retries,
            retry_delay: Some(self.policy.retry_delay),
            run_at: Some(run_at),
        };
        let view = self.client.submit(&request).await?;

        info!(
            request_id = %view.request_id,
            callback_url = %self.callback_url,
            run_at,
            "Callback scheduled"
        );
        Ok(JobHandle::new(view, self.client.clone()))
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("callback_url", &self.callback_url)
            .field("params", &self.params)
            .field("policy", &self.policy)
            .finish()
    }
}
