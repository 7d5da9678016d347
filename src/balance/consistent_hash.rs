//! Consistent-hash ring.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::error::{Result, RpcError};
use crate::registry::ServiceInstance;

/// Virtual nodes per real instance. Without them a handful of instances can
/// cluster on one arc of the ring and absorb most keys.
const DEFAULT_REPLICAS: usize = 100;

/// Maps keys to instances via a hash ring, so the same key lands on the same
/// instance until the ring itself changes.
///
/// Keyed selection is a different contract from list-based balancing, which
/// is why this type does not implement [`Balancer`](super::Balancer).
pub struct ConsistentHash {
    replicas: usize,
    /// Sorted virtual-node positions.
    ring: Vec<u64>,
    /// Position → owning instance.
    nodes: HashMap<u64, ServiceInstance>,
}

impl ConsistentHash {
    /// Empty ring with the default virtual-node count.
    pub fn new() -> Self {
        Self::with_replicas(DEFAULT_REPLICAS)
    }

    /// Empty ring with a custom virtual-node count.
    pub fn with_replicas(replicas: usize) -> Self {
        Self {
            replicas: replicas.max(1),
            ring: Vec::new(),
            nodes: HashMap::new(),
        }
    }

    /// Place an instance on the ring under `replicas` virtual nodes.
    pub fn add(&mut self, instance: ServiceInstance) {
        for i in 0..self.replicas {
            let position = hash_of(&format!("{}#{i}", instance.addr));
            self.ring.push(position);
            self.nodes.insert(position, instance.clone());
        }
        self.ring.sort_unstable();
    }

    /// The instance responsible for `key`: the first virtual node at or
    /// clockwise after the key's hash, wrapping past the top of the ring.
    pub fn pick(&self, key: &str) -> Result<ServiceInstance> {
        if self.ring.is_empty() {
            return Err(RpcError::NoInstances);
        }
        let hash = hash_of(key);
        let idx = match self.ring.binary_search(&hash) {
            Ok(i) => i,
            Err(i) if i == self.ring.len() => 0,
            Err(i) => i,
        };
        Ok(self.nodes[&self.ring[idx]].clone())
    }

    /// Strategy name, for logging.
    pub fn name(&self) -> &'static str {
        "ConsistentHash"
    }
}

impl Default for ConsistentHash {
    fn default() -> Self {
        Self::new()
    }
}

fn hash_of(key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}
