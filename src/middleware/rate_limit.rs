//! Token-bucket rate limiting middleware.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::{Handler, Middleware};
use crate::message::RpcMessage;

/// Error string placed in the envelope when the bucket is empty.
pub const RATE_LIMIT_ERROR: &str = "rate limit exceeded";

/// Token bucket: tokens refill at `rate` per second up to `burst`, each
/// request spends one. Bursts up to the bucket size pass immediately, which
/// suits RPC traffic better than a constant-drain leaky bucket.
struct TokenBucket {
    rate: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(rate: f64, burst: u32) -> Self {
        Self {
            rate,
            burst: f64::from(burst),
            state: Mutex::new(BucketState {
                tokens: f64::from(burst),
                last_refill: Instant::now(),
            }),
        }
    }

    fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().expect("bucket lock poisoned");
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.burst);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Rejects requests once the shared token bucket runs dry, without invoking
/// the downstream handler.
///
/// The bucket is built here, once per middleware construction. Building it
/// inside the handler closure would hand every request a fresh full bucket
/// and nothing would ever be limited.
pub fn rate_limit(rate: f64, burst: u32) -> Middleware {
    let bucket = Arc::new(TokenBucket::new(rate, burst));
    Arc::new(move |next: Handler| {
        let bucket = bucket.clone();
        Arc::new(move |ctx, req| {
            if !bucket.try_acquire() {
                return Box::pin(async { RpcMessage::error_reply(RATE_LIMIT_ERROR) });
            }
            next(ctx, req)
        })
    })
}
