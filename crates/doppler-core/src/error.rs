//! Error types shared by every Doppler crate

use crate::job::JobStatus;
use thiserror::Error;

/// A token could not be turned back into an argument mapping.
///
/// Signed and passthrough modes fail with the same error type, so a caller
/// cannot tell "no secret configured" apart from "tampered token".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UnsignError {
    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Signature does not match")]
    BadSignature,

    #[error("Token payload is not a JSON object: {0}")]
    Decode(String),
}

/// Declared and supplied parameter sets differ.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Argument mismatch (missing: {missing:?}, unexpected: {unexpected:?})")]
pub struct ArgumentMismatchError {
    /// Declared parameters that were not supplied
    pub missing: Vec<String>,
    /// Supplied keys that were not declared
    pub unexpected: Vec<String>,
}

/// Configuration could not be loaded or a required value is absent.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Env(#[from] envy::Error),

    #[error("Missing required configuration value: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// A job was asked to leave a terminal state.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Job is {from} and cannot become {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}
