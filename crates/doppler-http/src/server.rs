//! HTTP server implementation

use crate::error::ApiError;
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::router::{RouteMatch, Router};
use bytes::Bytes;
use http::{header, request::Parts, StatusCode};
use http_body_util::{BodyExt, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Default maximum request body size (1MB)
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// HTTP/1 server around a [`Router`]
pub struct Server {
    router: Arc<Router>,
    body_limit: usize,
}

impl Server {
    pub fn new(router: Router) -> Self {
        Self {
            router: Arc::new(router),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// Maximum accepted request body in bytes; larger bodies get a 413
    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// Bind `addr` and serve until the process exits
    pub async fn run(self, addr: &str) -> Result<(), BoxError> {
        self.run_with_shutdown(addr, std::future::pending()).await
    }

    /// Bind `addr` and serve until `signal` resolves
    pub async fn run_with_shutdown<F>(self, addr: &str, signal: F) -> Result<(), BoxError>
    where
        F: Future<Output = ()> + Send,
    {
        let addr: SocketAddr = addr.parse()?;
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, signal).await
    }

    /// Accept connections on `listener` until `signal` resolves.
    ///
    /// Connections already accepted run to completion on their own tasks.
    pub async fn serve<F>(self, listener: TcpListener, signal: F) -> Result<(), BoxError>
    where
        F: Future<Output = ()> + Send,
    {
        let local_addr = listener.local_addr()?;
        info!("doppler listening on http://{}", local_addr);

        tokio::pin!(signal);

        loop {
            let (stream, _remote_addr) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = &mut signal => {
                    info!("Shutdown signal received, no longer accepting connections");
                    return Ok(());
                }
            };

            let io = TokioIo::new(stream);
            let router = self.router.clone();
            let body_limit = self.body_limit;

            tokio::spawn(async move {
                let service = service_fn(move |req: hyper::Request<Incoming>| {
                    let router = router.clone();
                    async move {
                        let response = handle_request(router, req, body_limit).await;
                        Ok::<_, Infallible>(response)
                    }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Connection error: {}", err);
                }
            });
        }
    }
}

/// Handle a single HTTP request off the wire
async fn handle_request(
    router: Arc<Router>,
    req: hyper::Request<Incoming>,
    body_limit: usize,
) -> Response {
    let start = Instant::now();
    let (parts, body) = req.into_parts();

    let body = match Limited::new(body, body_limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            let response = if err.is::<http_body_util::LengthLimitError>() {
                ApiError::payload_too_large(format!(
                    "Request body exceeds limit of {} bytes",
                    body_limit
                ))
                .into_response()
            } else {
                ApiError::bad_request("Failed to read request body")
                    .with_internal(err.to_string())
                    .into_response()
            };
            log_request(&parts.method, parts.uri.path(), response.status(), start);
            return response;
        }
    };

    dispatch(&router, parts, body, start).await
}

/// Route a buffered request and run its handler
pub(crate) async fn dispatch(router: &Router, parts: Parts, body: Bytes, start: Instant) -> Response {
    let method = parts.method.clone();
    let path = parts.uri.path().to_string();

    let (handler, params) = match router.match_route(&path, &method) {
        RouteMatch::Found { handler, params } => (handler, params),
        RouteMatch::NotFound => {
            let response = ApiError::not_found(format!("No route found for {} {}", method, path))
                .into_response();
            log_request(&method, &path, response.status(), start);
            return response;
        }
        RouteMatch::MethodNotAllowed { allowed } => {
            let allowed_str: Vec<&str> = allowed.iter().map(|m| m.as_str()).collect();
            let mut response = ApiError::new(
                StatusCode::METHOD_NOT_ALLOWED,
                "method_not_allowed",
                format!("Method {} not allowed for {}", method, path),
            )
            .into_response();

            if let Ok(value) = allowed_str.join(", ").parse() {
                response.headers_mut().insert(header::ALLOW, value);
            }
            log_request(&method, &path, response.status(), start);
            return response;
        }
    };

    let response = handler(Request::new(parts, body, params)).await;

    log_request(&method, &path, response.status(), start);
    response
}

/// Log request completion
fn log_request(method: &http::Method, path: &str, status: StatusCode, start: Instant) {
    let elapsed = start.elapsed();

    if status.is_success() {
        info!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %elapsed.as_millis(),
            "Request completed"
        );
    } else {
        error!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %elapsed.as_millis(),
            "Request failed"
        );
    }
}
