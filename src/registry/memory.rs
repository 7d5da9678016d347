//! In-process registry with TTL-lease semantics.
//!
//! Mirrors the contract of a lease-based store like etcd: every
//! registration is bound to a lease, a background keepalive task renews the
//! lease at a fraction of the TTL and emits acks on a channel that a
//! dedicated consumer drains, and a sweeper purges entries whose lease
//! expired (the crash case, where the keepalive stopped).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::{Registry, ServiceInstance, KEY_PREFIX};
use crate::error::Result;

/// How often the sweeper looks for expired leases.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Buffer for keepalive ack and watch channels.
const CHANNEL_BUFFER: usize = 16;

/// One registered key.
struct Entry {
    /// JSON-encoded [`ServiceInstance`].
    value: String,
    /// Lease this entry is bound to. A keepalive task only renews an entry
    /// whose lease still matches the one it was spawned with.
    lease: u64,
    /// Entry is live until this deadline; renewed by the keepalive.
    expires_at: Instant,
}

struct Shared {
    /// `/mini-rpc/<service>/<addr>` → entry.
    entries: DashMap<String, Entry>,
    /// Watchers per service name.
    watchers: Mutex<Vec<(String, mpsc::Sender<Vec<ServiceInstance>>)>>,
    /// Lease id allocator.
    next_lease: AtomicU64,
}

/// In-memory [`Registry`] implementation.
///
/// Cheap to clone; clones share the same key space.
#[derive(Clone)]
pub struct MemoryRegistry {
    inner: Arc<Shared>,
}

impl MemoryRegistry {
    /// Create an empty registry and start its sweeper task.
    pub fn new() -> Self {
        let inner = Arc::new(Shared {
            entries: DashMap::new(),
            watchers: Mutex::new(Vec::new()),
            next_lease: AtomicU64::new(1),
        });
        tokio::spawn(sweeper(Arc::downgrade(&inner)));
        Self { inner }
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn register(
        &self,
        service: &str,
        instance: ServiceInstance,
        ttl_secs: u64,
    ) -> Result<()> {
        let ttl = Duration::from_secs(ttl_secs);
        // The lease id stays a local of this call. Storing it on the
        // registry would race when several servers share one instance.
        let lease = self.inner.next_lease.fetch_add(1, Ordering::Relaxed);
        let key = format!("{KEY_PREFIX}/{service}/{}", instance.addr);
        let value = serde_json::to_string(&instance)?;

        self.inner.entries.insert(
            key.clone(),
            Entry {
                value,
                lease,
                expires_at: Instant::now() + ttl,
            },
        );

        // Keepalive task renews the lease; its acks go onto a channel that a
        // dedicated consumer drains so the sender never fills up.
        let (ack_tx, mut ack_rx) = mpsc::channel(CHANNEL_BUFFER);
        tokio::spawn(keepalive(
            Arc::downgrade(&self.inner),
            key,
            lease,
            ttl,
            ack_tx,
        ));
        tokio::spawn(async move { while ack_rx.recv().await.is_some() {} });

        self.inner.notify(service);
        Ok(())
    }

    async fn deregister(&self, service: &str, addr: &str) -> Result<()> {
        let key = format!("{KEY_PREFIX}/{service}/{addr}");
        // Removing the entry also stops its keepalive: the task exits when
        // the key is gone or rebound to a newer lease.
        self.inner.entries.remove(&key);
        self.inner.notify(service);
        Ok(())
    }

    async fn discover(&self, service: &str) -> Result<Vec<ServiceInstance>> {
        Ok(self.inner.live_instances(service))
    }

    fn watch(&self, service: &str) -> mpsc::Receiver<Vec<ServiceInstance>> {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER);
        self.inner
            .watchers
            .lock()
            .expect("watcher lock poisoned")
            .push((service.to_string(), tx));
        rx
    }
}

impl Shared {
    fn live_instances(&self, service: &str) -> Vec<ServiceInstance> {
        let prefix = format!("{KEY_PREFIX}/{service}/");
        let now = Instant::now();
        let mut instances = Vec::new();
        for entry in self.entries.iter() {
            if !entry.key().starts_with(&prefix) || entry.expires_at <= now {
                continue;
            }
            // Skip malformed values instead of failing the whole listing.
            match serde_json::from_str(&entry.value) {
                Ok(instance) => instances.push(instance),
                Err(err) => tracing::warn!("malformed registry value at {}: {err}", entry.key()),
            }
        }
        // Range scans over a sorted key space come back in key order; keep
        // that property so callers see a stable listing.
        instances.sort_by(|a: &ServiceInstance, b: &ServiceInstance| a.addr.cmp(&b.addr));
        instances
    }

    fn notify(&self, service: &str) {
        let instances = self.live_instances(service);
        let mut watchers = self.watchers.lock().expect("watcher lock poisoned");
        watchers.retain(|(name, tx)| {
            if name != service {
                return !tx.is_closed();
            }
            // Lossy on a full buffer: watchers get the latest list on the
            // next change, the registry never blocks on a slow consumer.
            !matches!(
                tx.try_send(instances.clone()),
                Err(mpsc::error::TrySendError::Closed(_))
            )
        });
    }
}

/// Renew `key`'s lease at a third of the TTL until the registry is dropped,
/// the key is removed, or the key is rebound to a newer lease.
async fn keepalive(
    shared: Weak<Shared>,
    key: String,
    lease: u64,
    ttl: Duration,
    ack_tx: mpsc::Sender<Instant>,
) {
    let period = ttl / 3;
    loop {
        tokio::time::sleep(period).await;
        let Some(shared) = shared.upgrade() else {
            return;
        };
        let renewed = match shared.entries.get_mut(&key) {
            Some(mut entry) if entry.lease == lease => {
                entry.expires_at = Instant::now() + ttl;
                true
            }
            _ => false,
        };
        if !renewed {
            return;
        }
        if ack_tx.send(Instant::now()).await.is_err() {
            return;
        }
    }
}

/// Purge expired leases and tell watchers about the services they touched.
async fn sweeper(shared: Weak<Shared>) {
    let mut tick = tokio::time::interval(SWEEP_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tick.tick().await;
        let Some(shared) = shared.upgrade() else {
            return;
        };
        let now = Instant::now();
        let expired: Vec<String> = shared
            .entries
            .iter()
            .filter(|e| e.expires_at <= now)
            .map(|e| e.key().clone())
            .collect();
        for key in expired {
            shared.entries.remove(&key);
            if let Some(service) = service_of(&key) {
                tracing::debug!("registry lease expired: {key}");
                shared.notify(service);
            }
        }
    }
}

/// Extract `<service>` from `/mini-rpc/<service>/<addr>`.
fn service_of(key: &str) -> Option<&str> {
    key.strip_prefix(KEY_PREFIX)?
        .strip_prefix('/')?
        .split('/')
        .next()
}
