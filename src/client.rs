//! Client facade: discovery, balancing, and the shared transport pool.
//!
//! Call flow:
//!
//! ```text
//! call("Arith.Add", &args)
//!   → registry.discover("Arith")     instance list
//!   → balancer.pick(...)             one address
//!   → transport_for(addr)            shared transport, round-robin
//!   → transport.send(...)            response slot
//!   → slot.await                     envelope, routed by seq
//!   → serde_json decode              typed reply
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::balance::Balancer;
use crate::error::{Result, RpcError};
use crate::message::split_service_method;
use crate::protocol::CodecKind;
use crate::registry::Registry;
use crate::transport::ClientTransport;

/// Transports kept per server address.
///
/// Every transport multiplexes, so even a pool of one handles concurrent
/// calls; a larger pool only spreads send-lock contention under very high
/// concurrency.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// RPC client. Cheap to share behind an `Arc`; all methods take `&self`.
pub struct Client {
    registry: Arc<dyn Registry>,
    balancer: Arc<dyn Balancer>,
    codec: CodecKind,
    pool_size: usize,
    /// Per-address transport pool. The lock protects the map only; the
    /// transports inside are shared, not borrowed.
    transports: Mutex<HashMap<String, Vec<Arc<ClientTransport>>>>,
    /// Round-robin slot allocator for transport selection.
    counter: AtomicU64,
}

impl Client {
    /// Client with the given discovery, balancing, and codec choices and the
    /// default pool size.
    pub fn new(registry: Arc<dyn Registry>, balancer: Arc<dyn Balancer>, codec: CodecKind) -> Self {
        Self::with_pool_size(registry, balancer, codec, DEFAULT_POOL_SIZE)
    }

    /// Client with an explicit per-address pool size (min 1).
    pub fn with_pool_size(
        registry: Arc<dyn Registry>,
        balancer: Arc<dyn Balancer>,
        codec: CodecKind,
        pool_size: usize,
    ) -> Self {
        Self {
            registry,
            balancer,
            codec,
            pool_size: pool_size.max(1),
            transports: Mutex::new(HashMap::new()),
            counter: AtomicU64::new(0),
        }
    }

    /// Perform one RPC call and decode the reply.
    ///
    /// A non-empty error in the response envelope surfaces as
    /// [`RpcError::Call`], which prefixes the text with `"server error: "`.
    pub async fn call<A, R>(&self, service_method: &str, args: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let (service, _method) = split_service_method(service_method)?;

        let instances = self.registry.discover(service).await?;
        let instance = self.balancer.pick(&instances)?;
        let transport = self.transport_for(&instance.addr).await?;

        let (_seq, slot) = transport.send(service_method, args).await?;
        let resp = slot.await.map_err(|_| RpcError::ConnectionClosed)?;

        if resp.is_error() {
            return Err(RpcError::Call(resp.error));
        }
        Ok(serde_json::from_slice(&resp.payload)?)
    }

    /// Shared transport for `addr`, chosen round-robin.
    ///
    /// The counter is read before the map lock so selection itself is
    /// lock-free; the lock covers only map lookup and, on the first call for
    /// an address, eagerly dialing the whole pool.
    async fn transport_for(&self, addr: &str) -> Result<Arc<ClientTransport>> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);

        let mut transports = self.transports.lock().await;
        let pool = match transports.get(addr) {
            Some(pool) => pool.clone(),
            None => {
                let mut pool = Vec::with_capacity(self.pool_size);
                for _ in 0..self.pool_size {
                    let stream = TcpStream::connect(addr).await?;
                    pool.push(ClientTransport::new(stream, self.codec));
                }
                transports.insert(addr.to_string(), pool.clone());
                pool
            }
        };
        drop(transports);

        Ok(pool[(n % pool.len() as u64) as usize].clone())
    }
}
