use http::{HeaderMap, Method};
use serde_json::Value;

/// Matcher for HTTP requests
///
/// Every criterion that is set must hold; an empty matcher matches anything.
#[derive(Debug, Clone, Default)]
pub struct RequestMatcher {
    pub(crate) method: Option<Method>,
    pub(crate) path: Option<String>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body_json: Option<Value>,
    pub(crate) body_json_subset: Option<Value>,
    pub(crate) body_string: Option<String>,
}

impl RequestMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for `new().method(Method::POST).path(path)`
    pub fn post(path: impl Into<String>) -> Self {
        Self::new().method(Method::POST).path(path)
    }

    /// Shorthand for `new().method(Method::GET).path(path)`
    pub fn get(path: impl Into<String>) -> Self {
        Self::new().method(Method::GET).path(path)
    }

    /// Shorthand for `new().method(Method::DELETE).path(path)`
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new().method(Method::DELETE).path(path)
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Header names are case-insensitive, values are compared exactly
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Match an exact JSON body
    pub fn body_json(mut self, body: Value) -> Self {
        self.body_json = Some(body);
        self
    }

    /// Match a JSON object body containing at least these keys and values
    pub fn body_json_includes(mut self, subset: Value) -> Self {
        self.body_json_subset = Some(subset);
        self
    }

    pub fn body_string(mut self, body: impl Into<String>) -> Self {
        self.body_string = Some(body.into());
        self
    }

    /// Check if the matcher matches a request
    pub fn matches(&self, method: &Method, path: &str, headers: &HeaderMap, body: &[u8]) -> bool {
        if self.method.as_ref().is_some_and(|m| m != method) {
            return false;
        }

        if self.path.as_deref().is_some_and(|p| p != path) {
            return false;
        }

        let headers_ok = self.headers.iter().all(|(k, v)| {
            headers
                .get(k.as_str())
                .is_some_and(|actual| actual == v.as_str())
        });
        if !headers_ok {
            return false;
        }

        if self.body_json.is_some() || self.body_json_subset.is_some() {
            let Ok(actual) = serde_json::from_slice::<Value>(body) else {
                return false;
            };
            if self.body_json.as_ref().is_some_and(|expected| expected != &actual) {
                return false;
            }
            if self
                .body_json_subset
                .as_ref()
                .is_some_and(|subset| !contains(&actual, subset))
            {
                return false;
            }
        }

        if let Some(expected) = &self.body_string {
            if std::str::from_utf8(body).map_or(true, |actual| actual != expected) {
                return false;
            }
        }

        true
    }
}

/// Objects are compared key by key (recursively), everything else exactly.
fn contains(actual: &Value, subset: &Value) -> bool {
    match (actual, subset) {
        (Value::Object(actual), Value::Object(subset)) => subset.iter().all(|(key, expected)| {
            actual
                .get(key)
                .is_some_and(|value| contains(value, expected))
        }),
        _ => actual == subset,
    }
}
