//! Testing utilities for Doppler
//!
//! [`MockServer`] stands in for either side of a delivery: the endpoint a
//! callback is posted to, or the scheduling service a client talks to.
//!
//! ```rust,ignore
//! let server = MockServer::start().await;
//! server
//!     .expect(RequestMatcher::post("/hook"))
//!     .respond_with_sequence(vec![
//!         MockResponse::with_status(StatusCode::SERVICE_UNAVAILABLE),
//!         MockResponse::new(),
//!     ]);
//! ```

pub mod expectation;
pub mod matcher;
pub mod server;

pub use expectation::{Expectation, MockResponse, Times};
pub use matcher::RequestMatcher;
pub use server::{ExpectationBuilder, MockServer, RecordedRequest};
