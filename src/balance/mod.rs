//! Load balancing strategies over discovered service instances.
//!
//! - [`RoundRobin`] - stateless services, equal-capacity instances.
//! - [`WeightedRandom`] - heterogeneous instances (different CPU/memory).
//! - [`ConsistentHash`] - stateful services that want cache affinity; keyed,
//!   so it does not implement the [`Balancer`] trait.

mod consistent_hash;
mod round_robin;
mod weighted_random;

pub use consistent_hash::ConsistentHash;
pub use round_robin::RoundRobin;
pub use weighted_random::WeightedRandom;

use crate::error::Result;
use crate::registry::ServiceInstance;

/// Strategy for picking one instance out of the discovered list.
///
/// `pick` runs on every call and may be invoked from many tasks at once, so
/// implementations must be safe behind `&self`.
pub trait Balancer: Send + Sync {
    /// Select one instance from the available list.
    fn pick(&self, instances: &[ServiceInstance]) -> Result<ServiceInstance>;

    /// Strategy name, for logging.
    fn name(&self) -> &'static str;
}
