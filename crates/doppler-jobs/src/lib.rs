//! Delay queues and the delivery worker for Doppler
//!
//! A [`DelayQueue`] holds job records and decides what is due; a
//! [`DeliveryWorker`] claims due jobs and fires their callbacks.

pub mod backend;
pub mod error;
pub mod worker;

pub use backend::memory::InMemoryQueue;
#[cfg(feature = "redis")]
pub use backend::redis::RedisQueue;
pub use backend::{open_queue, DelayQueue, QueueOptions};
pub use error::{JobError, Result};
pub use worker::{Attempt, DeliveryWorker, WorkerOptions};
