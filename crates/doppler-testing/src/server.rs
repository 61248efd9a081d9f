use super::expectation::{Expectation, MockResponse, Times};
use super::matcher::RequestMatcher;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

type GenericError = Box<dyn std::error::Error + Send + Sync>;

/// A mock HTTP endpoint on a random local port.
///
/// Every request is recorded, matched or not. Requests that match no
/// expectation get a 404.
pub struct MockServer {
    addr: SocketAddr,
    state: Arc<Mutex<ServerState>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

#[derive(Default)]
struct ServerState {
    expectations: Vec<Expectation>,
    received: Vec<RecordedRequest>,
    unmatched: Vec<RecordedRequest>,
}

/// A request as the mock server saw it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: http::Method,
    pub path: String,
    pub headers: http::HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn lock(state: &Mutex<ServerState>) -> MutexGuard<'_, ServerState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockServer {
    /// Start a new mock server on a random port
    ///
    /// # Panics
    ///
    /// Panics if no local port can be bound.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("mock server failed to bind a local port");
        let addr = listener
            .local_addr()
            .expect("bound listener has a local address");

        let state = Arc::new(Mutex::new(ServerState::default()));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let accept_state = state.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    res = listener.accept() => {
                        let (stream, _) = match res {
                            Ok(conn) => conn,
                            Err(e) => {
                                tracing::warn!("Mock server accept error: {}", e);
                                continue;
                            }
                        };
                        let io = TokioIo::new(stream);
                        let state = accept_state.clone();
                        tokio::spawn(async move {
                            let service = service_fn(move |req| handle_request(req, state.clone()));
                            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                                tracing::debug!("Mock server connection error: {}", err);
                            }
                        });
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Base URL without a trailing slash, e.g. `http://127.0.0.1:38211`
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Absolute URL for `path`
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Register an expectation; it is installed when the builder drops.
    ///
    /// Later expectations take priority over earlier ones.
    pub fn expect(&self, matcher: RequestMatcher) -> ExpectationBuilder {
        ExpectationBuilder {
            server: self.state.clone(),
            expectation: Some(Expectation::new(matcher)),
        }
    }

    /// Every request received so far, in arrival order
    pub fn received_requests(&self) -> Vec<RecordedRequest> {
        lock(&self.state).received.clone()
    }

    /// Requests that matched no expectation
    pub fn unmatched_requests(&self) -> Vec<RecordedRequest> {
        lock(&self.state).unmatched.clone()
    }

    /// Poll until at least `n` requests arrived or `timeout` elapses.
    pub async fn wait_for_requests(&self, n: usize, timeout: Duration) -> Vec<RecordedRequest> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let received = self.received_requests();
            if received.len() >= n || tokio::time::Instant::now() >= deadline {
                return received;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Assert that every expectation's call count is satisfied
    ///
    /// # Panics
    ///
    /// Panics on the first expectation that was not met.
    pub fn verify(&self) {
        let state = lock(&self.state);
        for exp in &state.expectations {
            if let Err(msg) = exp.check() {
                panic!("{}", msg);
            }
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Configures an expectation; installed on drop
pub struct ExpectationBuilder {
    server: Arc<Mutex<ServerState>>,
    expectation: Option<Expectation>,
}

impl ExpectationBuilder {
    fn update(mut self, f: impl FnOnce(&mut Expectation)) -> Self {
        if let Some(exp) = self.expectation.as_mut() {
            f(exp);
        }
        self
    }

    pub fn respond_with(self, response: MockResponse) -> Self {
        self.update(|exp| exp.responses = vec![response])
    }

    /// Hand out `responses` in order, repeating the last one
    pub fn respond_with_sequence(self, responses: Vec<MockResponse>) -> Self {
        self.update(|exp| {
            if !responses.is_empty() {
                exp.responses = responses;
            }
        })
    }

    pub fn times(self, n: usize) -> Self {
        self.update(|exp| exp.times = Times::Exactly(n))
    }

    pub fn once(self) -> Self {
        self.update(|exp| exp.times = Times::Once)
    }

    pub fn at_least_once(self) -> Self {
        self.update(|exp| exp.times = Times::AtLeast(1))
    }

    pub fn never(self) -> Self {
        self.update(|exp| exp.times = Times::Exactly(0))
    }
}

impl Drop for ExpectationBuilder {
    fn drop(&mut self) {
        if let Some(exp) = self.expectation.take() {
            lock(&self.server).expectations.push(exp);
        }
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<Mutex<ServerState>>,
) -> Result<Response<Full<Bytes>>, GenericError> {
    let (parts, body) = req.into_parts();
    let body = body.collect().await?.to_bytes();

    let recorded = RecordedRequest {
        method: parts.method,
        path: parts.uri.path().to_string(),
        headers: parts.headers,
        body,
    };

    let mut guard = lock(&state);
    let state = &mut *guard;
    state.received.push(recorded.clone());

    let matching = state.expectations.iter_mut().rev().find(|exp| {
        exp.matcher.matches(
            &recorded.method,
            &recorded.path,
            &recorded.headers,
            &recorded.body,
        )
    });

    let Some(exp) = matching else {
        state.unmatched.push(recorded);
        return Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from_static(b"No expectation matched")))?);
    };

    let mock = exp.next_response();
    let mut response = Response::builder().status(mock.status);
    for (k, v) in &mock.headers {
        response = response.header(k, v);
    }
    Ok(response.body(Full::new(mock.body))?)
}
