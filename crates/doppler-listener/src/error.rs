use doppler_core::{ArgumentMismatchError, ConfigError};
use thiserror::Error;

/// Talking to the scheduling service failed
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Request to doppler failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Doppler responded with {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error(transparent)]
    Arguments(#[from] ArgumentMismatchError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("No callback registered for route '{0}'")]
    UnknownRoute(String),

    #[error("Invalid retry policy: {0}")]
    InvalidPolicy(&'static str),
}
