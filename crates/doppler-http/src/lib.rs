//! # doppler-http
//!
//! Minimal HTTP layer shared by the Doppler service and the listener side:
//! a matchit router, buffered requests, JSON error envelopes and a hyper
//! server loop with graceful shutdown.

mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;
#[cfg(any(test, feature = "test-utils"))]
mod test_client;

pub use error::{ApiError, Result};
pub use handler::{BoxedHandler, Handler};
pub use request::Request;
pub use response::{IntoResponse, Json, Response};
pub use router::{delete, get, post, MethodRouter, Router};
pub use server::{BoxError, Server, DEFAULT_BODY_LIMIT};
#[cfg(any(test, feature = "test-utils"))]
pub use test_client::{TestClient, TestRequest, TestResponse};

pub use http::{Method, StatusCode};
