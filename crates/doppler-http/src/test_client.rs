//! TestClient for integration testing without network binding
//!
//! Requests go through the same routing and handler pipeline as the real
//! server; only the socket is skipped.
//!
//! ```rust,ignore
//! use doppler_http::{Router, TestClient, TestRequest, get};
//!
//! #[tokio::test]
//! async fn test_hello() {
//!     let client = TestClient::new(Router::new().route("/", get(hello)));
//!     let response = client.get("/").await;
//!     response.assert_status(StatusCode::OK);
//! }
//! ```

use crate::error::ApiError;
use crate::response::{IntoResponse, Response};
use crate::router::Router;
use crate::server::{dispatch, DEFAULT_BODY_LIMIT};
use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use http_body_util::BodyExt;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Test client for integration testing without network binding
#[derive(Clone)]
pub struct TestClient {
    router: Arc<Router>,
    body_limit: usize,
}

impl TestClient {
    pub fn new(router: Router) -> Self {
        Self {
            router: Arc::new(router),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// Create a test client with a custom body limit
    pub fn with_body_limit(router: Router, limit: usize) -> Self {
        Self {
            router: Arc::new(router),
            body_limit: limit,
        }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(TestRequest::get(path)).await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request(TestRequest::delete(path)).await
    }

    pub async fn post_json<T: Serialize>(&self, path: &str, body: &T) -> TestResponse {
        self.request(TestRequest::post(path).json(body)).await
    }

    /// Send a request built with [`TestRequest`]
    pub async fn request(&self, req: TestRequest) -> TestResponse {
        let start = Instant::now();
        let body = req.body.unwrap_or_default();

        if body.len() > self.body_limit {
            let response = ApiError::payload_too_large(format!(
                "Request body exceeds limit of {} bytes",
                self.body_limit
            ))
            .into_response();
            return TestResponse::from_response(response).await;
        }

        let mut builder = http::Request::builder().method(req.method).uri(req.path.as_str());
        for (key, value) in req.headers.iter() {
            builder = builder.header(key, value);
        }
        let parts = match builder.body(()) {
            Ok(http_req) => http_req.into_parts().0,
            Err(err) => {
                let response = ApiError::bad_request(format!("Invalid test request: {}", err))
                    .into_response();
                return TestResponse::from_response(response).await;
            }
        };

        let response = dispatch(&self.router, parts, body, start).await;
        TestResponse::from_response(response).await
    }
}

/// Test request builder
#[derive(Debug, Clone)]
pub struct TestRequest {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl TestRequest {
    fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: &str) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn delete(path: &str) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Add a header; invalid names or values are ignored
    pub fn header(mut self, key: &str, value: &str) -> Self {
        if let (Ok(name), Ok(val)) = (
            key.parse::<http::header::HeaderName>(),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, val);
        }
        self
    }

    /// Set the request body as JSON
    ///
    /// This automatically sets the Content-Type header to `application/json`.
    pub fn json<T: Serialize>(mut self, body: &T) -> Self {
        if let Ok(bytes) = serde_json::to_vec(body) {
            self.body = Some(Bytes::from(bytes));
            self.headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
        }
        self
    }

    /// Set the request body as raw bytes
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn content_type(self, content_type: &str) -> Self {
        self.header("content-type", content_type)
    }
}

/// Test response with assertion helpers
#[derive(Debug)]
pub struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl TestResponse {
    async fn from_response(response: Response) -> Self {
        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map(|b| b.to_bytes())
            .unwrap_or_default();

        Self {
            status: parts.status,
            headers: parts.headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body as a string; invalid UTF-8 is replaced
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Assert that the response has the expected status code
    ///
    /// # Panics
    ///
    /// Panics if the status code doesn't match.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {}, got {}. Body: {}",
            expected,
            self.status,
            self.text()
        );
        self
    }

    /// Assert the `error.type` field of an error envelope
    pub fn assert_error_type(&self, expected: &str) -> &Self {
        let body: serde_json::Value = self
            .json()
            .unwrap_or_else(|_| panic!("Expected JSON error body, got: {}", self.text()));
        assert_eq!(
            body["error"]["type"], expected,
            "Unexpected error type. Body: {}",
            self.text()
        );
        self
    }
}
