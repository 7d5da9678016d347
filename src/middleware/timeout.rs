//! Call-deadline middleware.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::{Context, Handler, Middleware};
use crate::message::RpcMessage;

/// Error string placed in the envelope when the deadline expires.
pub const TIMEOUT_ERROR: &str = "request timed out";

/// Bounds how long the caller waits for the downstream handler.
///
/// The handler runs in its own task and is not cancelled when the deadline
/// fires; it runs to completion and its result is discarded. The context
/// passed downstream carries the deadline so cooperative handlers can bail
/// out early on their own.
pub fn timeout(duration: Duration) -> Middleware {
    Arc::new(move |next: Handler| {
        Arc::new(move |_ctx, req| {
            let next = next.clone();
            Box::pin(async move {
                let deadline = Instant::now() + duration;
                let downstream = tokio::spawn(next(Context::with_deadline(deadline), req));

                match tokio::time::timeout(duration, downstream).await {
                    Ok(Ok(resp)) => resp,
                    Ok(Err(join_err)) => {
                        tracing::error!("handler task failed: {join_err}");
                        RpcMessage::error_reply(join_err.to_string())
                    }
                    Err(_) => RpcMessage::error_reply(TIMEOUT_ERROR),
                }
            })
        })
    })
}
