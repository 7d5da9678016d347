//! Round-robin balancer.

use std::sync::atomic::{AtomicU64, Ordering};

use super::Balancer;
use crate::error::{Result, RpcError};
use crate::registry::ServiceInstance;

/// Distributes requests evenly across all instances in order.
///
/// Lock-free: each `pick` takes its slot from an atomic counter.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicU64,
}

impl RoundRobin {
    /// Create a balancer starting at the first instance.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Balancer for RoundRobin {
    fn pick(&self, instances: &[ServiceInstance]) -> Result<ServiceInstance> {
        if instances.is_empty() {
            return Err(RpcError::NoInstances);
        }
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        Ok(instances[(n % instances.len() as u64) as usize].clone())
    }

    fn name(&self) -> &'static str {
        "RoundRobin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instances(n: usize) -> Vec<ServiceInstance> {
        (0..n)
            .map(|i| ServiceInstance::new(format!("127.0.0.1:{}", 9000 + i)))
            .collect()
    }

    #[test]
    fn cycles_through_instances() {
        let balancer = RoundRobin::new();
        let list = instances(3);

        let picks: Vec<String> = (0..6)
            .map(|_| balancer.pick(&list).unwrap().addr)
            .collect();

        assert_eq!(picks[0], picks[3]);
        assert_eq!(picks[1], picks[4]);
        assert_eq!(picks[2], picks[5]);
        assert_ne!(picks[0], picks[1]);
        assert_ne!(picks[1], picks[2]);
    }

    #[test]
    fn even_distribution() {
        let balancer = RoundRobin::new();
        let list = instances(2);

        let mut counts = [0u32; 2];
        for _ in 0..10 {
            let picked = balancer.pick(&list).unwrap();
            let idx = list.iter().position(|i| i.addr == picked.addr).unwrap();
            counts[idx] += 1;
        }
        assert_eq!(counts, [5, 5]);
    }

    #[test]
    fn empty_list_is_an_error() {
        let balancer = RoundRobin::new();
        assert!(matches!(
            balancer.pick(&[]),
            Err(RpcError::NoInstances)
        ));
    }

    #[test]
    fn name_is_stable() {
        assert_eq!(RoundRobin::new().name(), "RoundRobin");
    }
}
