//! Weight-proportional random balancer.

use rand::Rng;

use super::Balancer;
use crate::error::{Result, RpcError};
use crate::registry::ServiceInstance;

/// Picks instances with probability proportional to their weight.
///
/// An instance with weight 10 gets roughly twice the traffic of one with
/// weight 5. When every instance has weight 0 the selection degrades to
/// uniform, so a list of default-valued instances still balances instead of
/// erroring out.
#[derive(Debug, Default)]
pub struct WeightedRandom;

impl WeightedRandom {
    /// Create the balancer.
    pub fn new() -> Self {
        Self
    }
}

impl Balancer for WeightedRandom {
    fn pick(&self, instances: &[ServiceInstance]) -> Result<ServiceInstance> {
        if instances.is_empty() {
            return Err(RpcError::NoInstances);
        }

        let total: u64 = instances.iter().map(|i| u64::from(i.weight)).sum();
        let mut rng = rand::thread_rng();

        if total == 0 {
            return Ok(instances[rng.gen_range(0..instances.len())].clone());
        }

        // Walk the list subtracting weights until the roll lands inside one
        // instance's slice of the total.
        let mut roll = rng.gen_range(0..total);
        for instance in instances {
            let weight = u64::from(instance.weight);
            if roll < weight {
                return Ok(instance.clone());
            }
            roll -= weight;
        }
        unreachable!("roll is bounded by the weight total")
    }

    fn name(&self) -> &'static str {
        "WeightedRandom"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weighted(weights: &[u32]) -> Vec<ServiceInstance> {
        weights
            .iter()
            .enumerate()
            .map(|(i, &w)| {
                let mut instance = ServiceInstance::new(format!("127.0.0.1:{}", 9000 + i));
                instance.weight = w;
                instance
            })
            .collect()
    }

    #[test]
    fn never_picks_zero_weight_when_positive_exists() {
        let balancer = WeightedRandom::new();
        let list = weighted(&[0, 5, 0]);

        for _ in 0..100 {
            let picked = balancer.pick(&list).unwrap();
            assert_eq!(picked.addr, "127.0.0.1:9001");
        }
    }

    #[test]
    fn heavier_instance_wins_more_often() {
        let balancer = WeightedRandom::new();
        let list = weighted(&[1, 9]);

        let mut heavy = 0;
        for _ in 0..1000 {
            if balancer.pick(&list).unwrap().addr == "127.0.0.1:9001" {
                heavy += 1;
            }
        }
        // ~900 expected; leave a generous band for randomness.
        assert!(heavy > 700, "heavy picked only {heavy}/1000 times");
    }

    #[test]
    fn all_zero_weights_degrade_to_uniform() {
        let balancer = WeightedRandom::new();
        let list = weighted(&[0, 0]);

        let mut seen = [false; 2];
        for _ in 0..200 {
            let picked = balancer.pick(&list).unwrap();
            let idx = list.iter().position(|i| i.addr == picked.addr).unwrap();
            seen[idx] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn empty_list_is_an_error() {
        assert!(matches!(
            WeightedRandom::new().pick(&[]),
            Err(RpcError::NoInstances)
        ));
    }
}
