//! Onion-model middleware chain around the request handler.
//!
//! A middleware takes a handler and returns a new handler wrapping it:
//!
//! ```text
//! chain([A, B, C])(handler)  →  A(B(C(handler)))
//!
//! Request:   A.before → B.before → C.before → handler
//! Response:  handler → C.after → B.after → A.after
//! ```
//!
//! The chain is composed once when the server starts listening, never per
//! request. A middleware may short-circuit by returning without invoking
//! `next` (rate limiting does).

mod logging;
mod rate_limit;
mod retry;
mod timeout;

pub use logging::logging;
pub use rate_limit::rate_limit;
pub use retry::retry;
pub use timeout::timeout;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::time::Instant;

use crate::message::RpcMessage;

/// Per-request context threaded through the middleware chain.
///
/// Carries the deadline set by the timeout middleware so cooperative
/// handlers can observe it; the dispatcher itself never cancels them.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// When the caller stops waiting, if a timeout middleware is installed.
    pub deadline: Option<Instant>,
}

impl Context {
    /// Context with no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Context that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }
}

/// Boxed future returned by handlers.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// The request handler signature shared by the business handler and every
/// middleware-wrapped handler.
pub type Handler = Arc<dyn Fn(Context, RpcMessage) -> BoxFuture<RpcMessage> + Send + Sync>;

/// Decorator over [`Handler`].
pub type Middleware = Arc<dyn Fn(Handler) -> Handler + Send + Sync>;

/// Wrap an async closure as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(Context, RpcMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RpcMessage> + Send + 'static,
{
    Arc::new(move |ctx, req| Box::pin(f(ctx, req)))
}

/// Compose middlewares into one.
///
/// Builds right to left so the first middleware in the list is the outermost
/// layer: first to see the request, last to see the response.
pub fn chain(middlewares: &[Middleware]) -> Middleware {
    let middlewares = middlewares.to_vec();
    Arc::new(move |handler: Handler| {
        let mut next = handler;
        for mw in middlewares.iter().rev() {
            next = mw(next);
        }
        next
    })
}
