//! # doppler-listener
//!
//! The application side of Doppler: a [`DopplerClient`] for the scheduling
//! service, a [`CallbackRegistry`] that mounts signed callback endpoints, and
//! [`Trigger`]s that schedule calls to them.

mod client;
mod error;
mod job;
mod registry;
mod trigger;

pub use client::{DopplerClient, SubmitRequest};
pub use error::{ClientError, ListenerError};
pub use job::JobHandle;
pub use registry::CallbackRegistry;
pub use trigger::{RetryPolicy, Trigger};

pub use doppler_core::{Arguments, ParameterSet, Signer, When};
