//! Route handlers
//!
//! A handler is any async function or closure taking a [`Request`] and
//! returning something that implements [`IntoResponse`]. Shared state is
//! captured by the closure.

use crate::request::Request;
use crate::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// Type-erased handler stored in the router
pub type BoxedHandler = Arc<dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync>;

/// Trait representing an async handler function
pub trait Handler: Send + Sync + 'static {
    /// Call the handler with the request
    fn call(&self, req: Request) -> BoxFuture<'static, Response>;
}

impl<F, Fut, Res> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Res> + Send + 'static,
    Res: IntoResponse,
{
    fn call(&self, req: Request) -> BoxFuture<'static, Response> {
        let fut = self(req);
        Box::pin(async move { fut.await.into_response() })
    }
}

pub(crate) fn into_boxed_handler<H: Handler>(handler: H) -> BoxedHandler {
    let handler = Arc::new(handler);
    Arc::new(move |req| handler.call(req))
}
