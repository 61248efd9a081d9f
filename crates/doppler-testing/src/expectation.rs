use super::matcher::RequestMatcher;
use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};

/// A matcher paired with the responses to hand back
#[derive(Debug, Clone)]
pub struct Expectation {
    pub(crate) matcher: RequestMatcher,
    pub(crate) responses: Vec<MockResponse>,
    pub(crate) times: Times,
    pub(crate) call_count: usize,
}

impl Expectation {
    pub fn new(matcher: RequestMatcher) -> Self {
        Self {
            matcher,
            responses: vec![MockResponse::default()],
            times: Times::Any,
            call_count: 0,
        }
    }

    /// Response for the next call; once the sequence runs out the last
    /// response repeats.
    pub(crate) fn next_response(&mut self) -> MockResponse {
        let idx = self.call_count.min(self.responses.len().saturating_sub(1));
        self.call_count += 1;
        self.responses.get(idx).cloned().unwrap_or_default()
    }

    pub(crate) fn check(&self) -> Result<(), String> {
        let n = self.call_count;
        let ok = match self.times {
            Times::Once => n == 1,
            Times::Exactly(expected) => n == expected,
            Times::AtLeast(min) => n >= min,
            Times::AtMost(max) => n <= max,
            Times::Any => true,
        };
        if ok {
            Ok(())
        } else {
            Err(format!(
                "Expectation {:?} expected {:?} calls, got {}",
                self.matcher, self.times, n
            ))
        }
    }
}

/// How many times an expectation should be matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Times {
    Once,
    Exactly(usize),
    AtLeast(usize),
    AtMost(usize),
    Any,
}

/// A mocked response
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

impl MockResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty response with the given status
    pub fn with_status(status: StatusCode) -> Self {
        Self::new().status(status)
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Invalid header names or values are ignored
    pub fn header(mut self, key: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self.body = Bytes::from(body.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_repeats_last_response() {
        let mut exp = Expectation::new(RequestMatcher::new());
        exp.responses = vec![
            MockResponse::with_status(StatusCode::INTERNAL_SERVER_ERROR),
            MockResponse::with_status(StatusCode::OK),
        ];

        let statuses: Vec<StatusCode> = (0..4).map(|_| exp.next_response().status).collect();
        assert_eq!(
            statuses,
            vec![
                StatusCode::INTERNAL_SERVER_ERROR,
                StatusCode::OK,
                StatusCode::OK,
                StatusCode::OK
            ]
        );
        assert_eq!(exp.call_count, 4);
    }

    #[test]
    fn times_are_checked() {
        let mut exp = Expectation::new(RequestMatcher::new());
        exp.times = Times::Exactly(2);
        exp.next_response();
        assert!(exp.check().is_err());
        exp.next_response();
        assert!(exp.check().is_ok());
    }
}
