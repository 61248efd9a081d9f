//! # doppler-service
//!
//! The scheduling service: validates submissions, enqueues them on a delay
//! queue, and answers status and cancellation requests. The `doppler` binary
//! runs this router next to the delivery workers.

pub mod routes;
pub mod service;
pub mod validation;

pub use routes::router;
pub use service::SchedulingService;
pub use validation::{Submission, ValidationError};
