//! Retry middleware with exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use super::{Handler, Middleware};

/// Re-invokes the downstream handler for transient failures.
///
/// Retryable means the response error contains `"timeout"` or
/// `"connection refused"`; anything else returns immediately. Waits
/// `base_delay * 2^attempt` between tries.
pub fn retry(max_retries: u32, base_delay: Duration) -> Middleware {
    Arc::new(move |next: Handler| {
        Arc::new(move |ctx, req| {
            let next = next.clone();
            Box::pin(async move {
                let mut resp = next(ctx.clone(), req.clone()).await;
                for attempt in 0..max_retries {
                    if !resp.is_error() || !is_retryable(&resp.error) {
                        return resp;
                    }
                    tracing::warn!(
                        "retry attempt {} for {} after error: {}",
                        attempt + 1,
                        req.service_method,
                        resp.error
                    );
                    tokio::time::sleep(base_delay * 2u32.pow(attempt)).await;
                    resp = next(ctx.clone(), req.clone()).await;
                }
                resp
            })
        })
    })
}

fn is_retryable(error: &str) -> bool {
    error.contains("timeout") || error.contains("connection refused")
}
