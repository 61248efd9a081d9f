//! Callback endpoints and the triggers that schedule them
//!
//! A route is wired up with two calls: [`CallbackRegistry::listen`] mounts
//! the inbound handler, [`CallbackRegistry::trigger`] builds the outbound
//! [`Trigger`] bound to the route's external URL and to the parameters the
//! handler declared.
//!
//! ```rust,ignore
//! let registry = CallbackRegistry::from_config(&config)
//!     .listen("/reminder", ParameterSet::new(["user_id"]), |args: Arguments| async move {
//!         send_reminder(&args["user_id"]).await;
//!         "ok"
//!     });
//! let remind = registry.trigger("/reminder", client, RetryPolicy::default())?;
//! let app = registry.into_router();
//! ```

use crate::client::DopplerClient;
use crate::error::ListenerError;
use crate::trigger::{RetryPolicy, Trigger};
use doppler_core::config::DEFAULT_CALLBACK_PREFIX;
use doppler_core::{Arguments, ConfigError, DopplerConfig, ParameterSet, Signer};
use doppler_http::{post, ApiError, IntoResponse, Request, Router};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Signed callback endpoints under a common prefix
pub struct CallbackRegistry {
    signer: Arc<Signer>,
    prefix: String,
    callback_base_url: Option<String>,
    router: Router,
    /// normalized route -> parameters its handler declared
    params: HashMap<String, Arc<ParameterSet>>,
}

impl CallbackRegistry {
    pub fn new(signer: Signer) -> Self {
        Self {
            signer: Arc::new(signer),
            prefix: DEFAULT_CALLBACK_PREFIX.to_string(),
            callback_base_url: None,
            router: Router::new(),
            params: HashMap::new(),
        }
    }

    /// Signer, prefix and callback base URL taken from `config`
    pub fn from_config(config: &DopplerConfig) -> Self {
        let registry = Self::new(config.signer()).with_prefix(&config.callback_prefix);
        match config.require_callback_base_url() {
            Ok(base) => registry.with_callback_base_url(base),
            Err(_) => registry,
        }
    }

    /// Mount point of every callback route
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = normalize(prefix);
        self
    }

    /// Externally reachable URL of the app serving this registry
    pub fn with_callback_base_url(mut self, base_url: &str) -> Self {
        self.callback_base_url = Some(base_url.trim_end_matches('/').to_string());
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Register the inbound handler for `route`.
    ///
    /// The endpoint answers 415 to an empty body and 400 to a token that
    /// does not unsign or lacks one of `params`; otherwise the handler's
    /// output is the response.
    pub fn listen<H, Fut, R>(mut self, route: &str, params: ParameterSet, handler: H) -> Self
    where
        H: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponse,
    {
        let signer = self.signer.clone();
        let params = Arc::new(params);
        let handler = Arc::new(handler);

        let path = normalize(route);
        self.params.insert(path.clone(), params.clone());

        let endpoint = move |req: Request| {
            let decoded = decode(&signer, &params, &req);
            let handler = handler.clone();
            async move {
                match decoded {
                    Ok(arguments) => handler(arguments).await.into_response(),
                    Err(err) => err.into_response(),
                }
            }
        };

        debug!(route = %path, prefix = %self.prefix, "Callback registered");
        self.router = self.router.route(&path, post(endpoint));
        self
    }

    /// Build the trigger that schedules calls to `route`.
    ///
    /// The trigger checks arguments against the parameters `route` was
    /// registered with, so `route` must already be registered through
    /// [`listen`](Self::listen). Fails as well when no callback base URL is
    /// configured or `policy` is invalid.
    pub fn trigger(
        &self,
        route: &str,
        client: DopplerClient,
        policy: RetryPolicy,
    ) -> Result<Trigger, ListenerError> {
        let path = normalize(route);
        let params = self
            .params
            .get(&path)
            .cloned()
            .ok_or_else(|| ListenerError::UnknownRoute(path.clone()))?;
        policy.validate()?;
        let base = self
            .callback_base_url
            .as_deref()
            .ok_or(ConfigError::Missing("DOPPLER_CALLBACK_BASE_URL"))?;
        let callback_url = format!("{}{}{}", base, self.prefix, path);

        Ok(Trigger::new(
            callback_url,
            params,
            self.signer.clone(),
            client,
            policy,
        ))
    }

    /// Every registered route, mounted under the prefix
    pub fn into_router(self) -> Router {
        if self.prefix.is_empty() {
            return self.router;
        }
        Router::new().nest(&self.prefix, self.router)
    }
}

fn decode(signer: &Signer, params: &ParameterSet, req: &Request) -> Result<Arguments, ApiError> {
    let body = req.body();
    if body.is_empty() {
        return Err(ApiError::unsupported_media_type("Not supported"));
    }

    let token = std::str::from_utf8(body)
        .map_err(|_| ApiError::bad_request("Callback body is not valid UTF-8"))?;
    let arguments = signer.unsign(token).map_err(|err| {
        warn!(path = %req.path(), error = %err, "Rejected callback");
        ApiError::bad_request(err.to_string())
    })?;
    params
        .check_covered(&arguments)
        .map_err(|err| ApiError::bad_request(err.to_string()))?;

    Ok(arguments)
}

/// `foo`, `/foo/` and `/foo` all become `/foo`; `/` becomes empty
fn normalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}
