//! Configuration loaded from `DOPPLER_*` environment variables
//!
//! ```ignore
//! use doppler_core::config::{load_dotenv, DopplerConfig};
//!
//! load_dotenv();
//! let config = DopplerConfig::from_env()?;
//! let signer = config.signer();
//! ```
//!
//! | Variable | Default |
//! |----------|---------|
//! | `DOPPLER_SECRET_KEY` | unset (passthrough signing) |
//! | `DOPPLER_QUEUE_URL` | `redis://localhost:6379` |
//! | `DOPPLER_QUEUE_KEY` | `doppler` |
//! | `DOPPLER_BIND` | `127.0.0.1:8080` |
//! | `DOPPLER_SERVICE_URL` | unset |
//! | `DOPPLER_CALLBACK_BASE_URL` | unset |
//! | `DOPPLER_CALLBACK_PREFIX` | `/_callbacks` |
//! | `DOPPLER_DELIVERY_TIMEOUT_SECS` | `10` |
//! | `DOPPLER_POLL_INTERVAL_MS` | `100` |
//! | `DOPPLER_CLAIM_TIMEOUT_SECS` | `60` |
//! | `DOPPLER_RETENTION_SECS` | `604800` (7 days) |
//! | `DOPPLER_WORKERS` | `1` |

use crate::error::ConfigError;
use crate::signer::Signer;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

pub const ENV_PREFIX: &str = "DOPPLER_";
pub const DEFAULT_CALLBACK_PREFIX: &str = "/_callbacks";

/// Process-wide settings, read once at startup
#[derive(Clone, Deserialize)]
pub struct DopplerConfig {
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default = "default_queue_url")]
    pub queue_url: String,
    #[serde(default = "default_queue_key")]
    pub queue_key: String,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub service_url: Option<String>,
    #[serde(default)]
    pub callback_base_url: Option<String>,
    #[serde(default = "default_callback_prefix")]
    pub callback_prefix: String,
    #[serde(default = "default_delivery_timeout_secs")]
    pub delivery_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// A claimed job not acknowledged within this window is requeued
    #[serde(default = "default_claim_timeout_secs")]
    pub claim_timeout_secs: u64,
    /// How long terminal records stay readable
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

fn default_queue_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_queue_key() -> String {
    "doppler".to_string()
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_callback_prefix() -> String {
    DEFAULT_CALLBACK_PREFIX.to_string()
}

fn default_delivery_timeout_secs() -> u64 {
    10
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_workers() -> usize {
    1
}

fn default_claim_timeout_secs() -> u64 {
    60
}

fn default_retention_secs() -> u64 {
    7 * 24 * 60 * 60
}

impl Default for DopplerConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            queue_url: default_queue_url(),
            queue_key: default_queue_key(),
            bind: default_bind(),
            service_url: None,
            callback_base_url: None,
            callback_prefix: default_callback_prefix(),
            delivery_timeout_secs: default_delivery_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            workers: default_workers(),
            claim_timeout_secs: default_claim_timeout_secs(),
            retention_secs: default_retention_secs(),
        }
    }
}

impl DopplerConfig {
    /// Load from `DOPPLER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Load from an explicit set of variables (prefixed names).
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Self = envy::prefixed(ENV_PREFIX).from_iter(vars)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.delivery_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "DOPPLER_DELIVERY_TIMEOUT_SECS",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.claim_timeout_secs <= self.delivery_timeout_secs {
            return Err(ConfigError::Invalid {
                name: "DOPPLER_CLAIM_TIMEOUT_SECS",
                reason: format!(
                    "must exceed the delivery timeout of {}s",
                    self.delivery_timeout_secs
                ),
            });
        }
        if self.retention_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "DOPPLER_RETENTION_SECS",
                reason: "must be greater than zero".to_string(),
            });
        }
        if !self.callback_prefix.starts_with('/') {
            return Err(ConfigError::Invalid {
                name: "DOPPLER_CALLBACK_PREFIX",
                reason: format!("'{}' must start with '/'", self.callback_prefix),
            });
        }
        Ok(())
    }

    /// Signer selected by the presence of a secret key.
    pub fn signer(&self) -> Signer {
        Signer::from_secret(self.secret_key.as_deref())
    }

    /// Base URL of the scheduling service, without trailing slashes.
    pub fn require_service_url(&self) -> Result<&str, ConfigError> {
        non_empty(self.service_url.as_deref(), "DOPPLER_SERVICE_URL")
    }

    /// Externally reachable base URL of the callback listener.
    pub fn require_callback_base_url(&self) -> Result<&str, ConfigError> {
        non_empty(self.callback_base_url.as_deref(), "DOPPLER_CALLBACK_BASE_URL")
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn claim_timeout(&self) -> Duration {
        Duration::from_secs(self.claim_timeout_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

fn non_empty<'a>(value: Option<&'a str>, name: &'static str) -> Result<&'a str, ConfigError> {
    match value.map(|v| v.trim_end_matches('/')) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(name)),
    }
}

impl fmt::Debug for DopplerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DopplerConfig")
            .field("secret_key", &self.secret_key.as_ref().map(|_| "***"))
            .field("queue_url", &self.queue_url)
            .field("queue_key", &self.queue_key)
            .field("bind", &self.bind)
            .field("service_url", &self.service_url)
            .field("callback_base_url", &self.callback_base_url)
            .field("callback_prefix", &self.callback_prefix)
            .field("delivery_timeout_secs", &self.delivery_timeout_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("workers", &self.workers)
            .field("claim_timeout_secs", &self.claim_timeout_secs)
            .field("retention_secs", &self.retention_secs)
            .finish()
    }
}

/// Load variables from a `.env` file in the current directory, if present.
///
/// Existing environment variables take precedence.
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}
