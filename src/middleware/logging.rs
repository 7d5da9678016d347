//! Per-call logging middleware.

use std::sync::Arc;

use tokio::time::Instant;

use super::{Handler, Middleware};

/// Records the service method and elapsed time of every call. Never alters
/// the envelope.
pub fn logging() -> Middleware {
    Arc::new(|next: Handler| {
        Arc::new(move |ctx, req| {
            let next = next.clone();
            Box::pin(async move {
                let start = Instant::now();
                let service_method = req.service_method.clone();

                let resp = next(ctx, req).await;

                tracing::info!(
                    "rpc {} completed in {:?}",
                    service_method,
                    start.elapsed()
                );
                if resp.is_error() {
                    tracing::warn!("rpc {} failed: {}", service_method, resp.error);
                }
                resp
            })
        })
    })
}
