//! # mini-rpc
//!
//! A lightweight RPC framework built around three pieces of plumbing:
//!
//! - a bespoke binary framing (14-byte header + body) on top of TCP,
//! - a client transport that multiplexes concurrent calls over one
//!   connection by sequence id,
//! - a server dispatcher that reads each connection with a single task,
//!   handles every request in its own task, and serializes response writes
//!   per connection.
//!
//! Around that core: pluggable envelope codecs (JSON and a length-prefixed
//! binary layout), an onion-model middleware chain (logging, timeout, rate
//! limit, retry), TTL-lease service discovery, and three load-balancing
//! strategies.
//!
//! ## Example
//!
//! ```ignore
//! use mini_rpc::{Client, Server, Service};
//! use mini_rpc::balance::RoundRobin;
//! use mini_rpc::protocol::CodecKind;
//! use mini_rpc::registry::MemoryRegistry;
//! use std::sync::Arc;
//!
//! #[derive(serde::Serialize, serde::Deserialize)]
//! struct Args { a: i64, b: i64 }
//! #[derive(serde::Serialize, serde::Deserialize)]
//! struct Reply { result: i64 }
//!
//! #[tokio::main]
//! async fn main() -> mini_rpc::Result<()> {
//!     let registry = Arc::new(MemoryRegistry::new());
//!
//!     let mut server = Server::new();
//!     server.register(Service::new("Arith").method("Add", |args: Args, _ctx| async move {
//!         Ok(Reply { result: args.a + args.b })
//!     }));
//!     let server = Arc::new(server);
//!     {
//!         let server = server.clone();
//!         let registry = registry.clone();
//!         tokio::spawn(async move {
//!             server.serve("127.0.0.1:9090", "127.0.0.1:9090", Some(registry)).await
//!         });
//!     }
//!
//!     let client = Client::new(registry, Arc::new(RoundRobin::new()), CodecKind::Json);
//!     let reply: Reply = client.call("Arith.Add", &Args { a: 1, b: 2 }).await?;
//!     assert_eq!(reply.result, 3);
//!     Ok(())
//! }
//! ```

pub mod balance;
pub mod codec;
pub mod error;
pub mod message;
pub mod middleware;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod transport;

mod client;

pub use client::{Client, DEFAULT_POOL_SIZE};
pub use error::{Result, RpcError};
pub use message::RpcMessage;
pub use server::{Server, Service};
