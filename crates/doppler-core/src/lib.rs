//! # Doppler Core
//!
//! Domain types shared by the Doppler scheduling service, delivery workers and
//! callback listeners: the [`JobRecord`] state machine, message [`Signer`],
//! time resolution and configuration.

pub mod arguments;
pub mod config;
pub mod error;
pub mod job;
pub mod signer;
pub mod time;

pub use arguments::{Arguments, ParameterSet};
pub use config::DopplerConfig;
pub use error::{ArgumentMismatchError, ConfigError, TransitionError, UnsignError};
pub use job::{Cancellation, JobRecord, JobStatus, JobView, RetryOutcome, DEFAULT_RETRY_DELAY};
pub use signer::{KeyedSigner, Signer};
pub use time::{resolve, resolve_at, Clock, ManualClock, SystemClock, When};
