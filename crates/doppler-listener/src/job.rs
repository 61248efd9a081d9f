use crate::client::DopplerClient;
use crate::error::ClientError;
use doppler_core::{Cancellation, JobStatus, JobView};

/// A scheduled job, as last seen by this process
#[derive(Debug, Clone)]
pub struct JobHandle {
    view: JobView,
    client: DopplerClient,
}

impl JobHandle {
    pub(crate) fn new(view: JobView, client: DopplerClient) -> Self {
        Self { view, client }
    }

    /// Wrap a view fetched some other way
    pub fn from_view(view: JobView, client: DopplerClient) -> Self {
        Self::new(view, client)
    }

    pub fn request_id(&self) -> &str {
        &self.view.request_id
    }

    pub fn status(&self) -> JobStatus {
        self.view.status
    }

    pub fn view(&self) -> &JobView {
        &self.view
    }

    /// Re-fetch the job from the service.
    ///
    /// Returns `None`, leaving the cached view untouched, when the service no
    /// longer knows the job.
    pub async fn refresh(&mut self) -> Result<Option<&JobView>, ClientError> {
        match self.client.get_job(&self.view.request_id).await? {
            Some(view) => {
                self.view = view;
                Ok(Some(&self.view))
            }
            None => Ok(None),
        }
    }

    /// Ask the service to cancel the job. Only a job that has not fired yet
    /// can be cancelled.
    pub async fn cancel(&self) -> Result<Cancellation, ClientError> {
        self.client.cancel_job(&self.view.request_id).await
    }
}
