//! Service registry - registration and discovery.
//!
//! Servers register their advertise address under each service name with a
//! TTL lease; clients discover the live instance list before every call. The
//! lease model means a crashed server disappears on its own once its
//! keepalive stops renewing.
//!
//! Key layout: `/mini-rpc/<service>/<addr>`, value = JSON-encoded
//! [`ServiceInstance`].

mod memory;

pub use memory::MemoryRegistry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;

/// Prefix under which all registrations are stored.
pub const KEY_PREFIX: &str = "/mini-rpc";

/// Default registration TTL in seconds.
pub const DEFAULT_TTL_SECS: u64 = 10;

/// A single running instance of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Network address, e.g. `"127.0.0.1:8080"`.
    pub addr: String,
    /// Weight for load balancing (higher = more traffic).
    #[serde(default)]
    pub weight: u32,
    /// Service version, for canary routing.
    #[serde(default)]
    pub version: String,
}

impl ServiceInstance {
    /// Instance at `addr` with weight 1 and no version.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            weight: 1,
            version: String::new(),
        }
    }
}

/// Service registration and discovery.
///
/// The call path uses only `register`/`deregister`/`discover`; `watch` is
/// exposed for consumers that want push-style updates.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Add an instance under `service` with a TTL lease. The entry is
    /// removed automatically if the lease stops being renewed.
    async fn register(
        &self,
        service: &str,
        instance: ServiceInstance,
        ttl_secs: u64,
    ) -> Result<()>;

    /// Remove an instance. Called during graceful shutdown before the
    /// listener closes.
    async fn deregister(&self, service: &str, addr: &str) -> Result<()>;

    /// All currently live instances of `service`.
    async fn discover(&self, service: &str) -> Result<Vec<ServiceInstance>>;

    /// Stream of updated instance lists, emitted on every change under the
    /// service's prefix.
    fn watch(&self, service: &str) -> mpsc::Receiver<Vec<ServiceInstance>>;
}
