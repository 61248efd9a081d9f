//! Router implementation using radix tree (matchit)
//!
//! Routes support dynamic path parameters using `{param}` syntax:
//!
//! ```rust,ignore
//! use doppler_http::{Router, get, post};
//!
//! let router = Router::new()
//!     .route("/", post(create_job))
//!     .route("/{request_id}", get(get_job).delete(delete_job));
//! ```
//!
//! Routers can be mounted under a prefix with [`Router::nest`]. Registering
//! two patterns that matchit cannot tell apart, or the same method twice on
//! one path, panics at startup.

use crate::handler::{into_boxed_handler, BoxedHandler, Handler};
use http::Method;
use matchit::Router as MatchitRouter;
use std::collections::HashMap;

/// HTTP method router for a single path
#[derive(Clone, Default)]
pub struct MethodRouter {
    handlers: HashMap<Method, BoxedHandler>,
}

impl MethodRouter {
    /// Create a new empty method router
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler for a specific method
    pub fn on<H: Handler>(mut self, method: Method, handler: H) -> Self {
        self.insert(method, into_boxed_handler(handler));
        self
    }

    pub fn get<H: Handler>(self, handler: H) -> Self {
        self.on(Method::GET, handler)
    }

    pub fn post<H: Handler>(self, handler: H) -> Self {
        self.on(Method::POST, handler)
    }

    pub fn delete<H: Handler>(self, handler: H) -> Self {
        self.on(Method::DELETE, handler)
    }

    fn insert(&mut self, method: Method, handler: BoxedHandler) {
        if self.handlers.contains_key(&method) {
            panic!(
                "Duplicate handler for method {} on the same path",
                method.as_str()
            );
        }
        self.handlers.insert(method, handler);
    }

    fn merge(&mut self, other: MethodRouter) {
        for (method, handler) in other.handlers {
            self.insert(method, handler);
        }
    }

    /// Get allowed methods for 405 response
    pub(crate) fn allowed_methods(&self) -> Vec<Method> {
        let mut methods: Vec<Method> = self.handlers.keys().cloned().collect();
        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        methods
    }
}

/// Create a GET route handler
pub fn get<H: Handler>(handler: H) -> MethodRouter {
    MethodRouter::new().get(handler)
}

/// Create a POST route handler
pub fn post<H: Handler>(handler: H) -> MethodRouter {
    MethodRouter::new().post(handler)
}

/// Create a DELETE route handler
pub fn delete<H: Handler>(handler: H) -> MethodRouter {
    MethodRouter::new().delete(handler)
}

struct RouteEntry {
    path: String,
    method_router: MethodRouter,
}

/// Main router
#[derive(Default)]
pub struct Router {
    inner: MatchitRouter<usize>,
    entries: Vec<RouteEntry>,
    /// matchit path -> index into `entries`
    index: HashMap<String, usize>,
}

/// Outcome of matching a request against the router
pub(crate) enum RouteMatch {
    Found {
        handler: BoxedHandler,
        params: HashMap<String, String>,
    },
    NotFound,
    MethodNotAllowed {
        allowed: Vec<Method>,
    },
}

impl Router {
    /// Create a new router
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route; methods registered for an existing path are merged.
    pub fn route(mut self, path: &str, method_router: MethodRouter) -> Self {
        let matchit_path = convert_path_params(path);

        if let Some(&idx) = self.index.get(&matchit_path) {
            self.entries[idx].method_router.merge(method_router);
            return self;
        }

        let idx = self.entries.len();
        if let Err(e) = self.inner.insert(matchit_path.clone(), idx) {
            panic!("Route conflict while registering '{}': {}", path, e);
        }
        self.index.insert(matchit_path, idx);
        self.entries.push(RouteEntry {
            path: path.to_string(),
            method_router,
        });
        self
    }

    /// Mount every route of `router` under `prefix`.
    pub fn nest(mut self, prefix: &str, router: Router) -> Self {
        let prefix = normalize_prefix(prefix);
        for entry in router.entries {
            let path = if entry.path == "/" {
                prefix.clone()
            } else {
                format!("{}{}", prefix, entry.path)
            };
            self = self.route(&path, entry.method_router);
        }
        self
    }

    /// Registered path patterns, in registration order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.path.as_str())
    }

    /// Match a request and return the handler + params
    pub(crate) fn match_route(&self, path: &str, method: &Method) -> RouteMatch {
        let matched = match self.inner.at(path) {
            Ok(matched) => matched,
            Err(_) => return RouteMatch::NotFound,
        };

        let method_router = &self.entries[*matched.value].method_router;
        match method_router.handlers.get(method) {
            Some(handler) => RouteMatch::Found {
                handler: handler.clone(),
                params: matched
                    .params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
            None => RouteMatch::MethodNotAllowed {
                allowed: method_router.allowed_methods(),
            },
        }
    }
}

/// Convert `{param}` segments to matchit's `:param` syntax.
pub(crate) fn convert_path_params(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.starts_with('{') && segment.ends_with('}') && segment.len() > 2 {
                format!(":{}", &segment[1..segment.len() - 1])
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Leading slash, no trailing slash; `""` and `"/"` both become `""`.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}
