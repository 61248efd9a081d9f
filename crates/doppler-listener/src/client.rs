//! HTTP client for the scheduling service

use crate::error::ClientError;
use doppler_core::{Cancellation, ConfigError, DopplerConfig, JobView};
use reqwest::{Response, StatusCode};
use serde::Serialize;
use tracing::debug;

/// Body of `POST /` on the scheduling service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitRequest {
    pub message: String,
    pub callback_url: String,
    pub max_retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_at: Option<i64>,
}

/// Talks to a running scheduling service
#[derive(Debug, Clone)]
pub struct DopplerClient {
    base_url: String,
    http: reqwest::Client,
}

impl DopplerClient {
    /// Trailing slashes on `base_url` are ignored.
    pub fn new(base_url: impl AsRef<str>) -> Self {
        Self::with_http(base_url, reqwest::Client::new())
    }

    pub fn with_http(base_url: impl AsRef<str>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.as_ref().trim_end_matches('/').to_string(),
            http,
        }
    }

    /// Client for `DOPPLER_SERVICE_URL`
    pub fn from_config(config: &DopplerConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.require_service_url()?))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn job_url(&self, request_id: &str) -> String {
        format!("{}/{}", self.base_url, request_id)
    }

    /// Schedule a job; returns the service's view of it
    pub async fn submit(&self, request: &SubmitRequest) -> Result<JobView, ClientError> {
        let response = self
            .http
            .post(format!("{}/", self.base_url))
            .json(request)
            .send()
            .await?;
        let view: JobView = check(response).await?.json().await?;

        debug!(request_id = %view.request_id, callback_url = %request.callback_url, "Job submitted");
        Ok(view)
    }

    /// Current state of a job, `None` if the service does not know it
    pub async fn get_job(&self, request_id: &str) -> Result<Option<JobView>, ClientError> {
        let response = self.http.get(self.job_url(request_id)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(check(response).await?.json().await?))
    }

    pub async fn cancel_job(&self, request_id: &str) -> Result<Cancellation, ClientError> {
        let response = self.http.delete(self.job_url(request_id)).send().await?;
        Ok(check(response).await?.json().await?)
    }
}

async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        body,
    })
}
