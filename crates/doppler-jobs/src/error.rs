use doppler_core::{JobStatus, TransitionError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    BackendError(String),

    #[error("Job {request_id} is {status} and cannot be scheduled")]
    NotPending {
        request_id: String,
        status: JobStatus,
    },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("HTTP client error: {0}")]
    ClientError(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for JobError {
    fn from(err: redis::RedisError) -> Self {
        JobError::BackendError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, JobError>;
