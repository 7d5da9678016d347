//! Client-side transport - one connection, many concurrent calls.

mod client;

pub use client::{ClientTransport, HEARTBEAT_INTERVAL};
