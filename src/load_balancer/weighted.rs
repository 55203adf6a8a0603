//! Weighted round-robin load balancing strategy.
//!
//! Each selection takes the next value of a monotonically increasing
//! counter, reduces it modulo the total candidate weight, and walks the
//! cumulative weights to find the owning node. With weights {10, 90} every
//! window of 100 consecutive selections yields exactly 10 and 90 picks.

use std::sync::Arc;

use crate::load_balancer::{node::Node, round_robin::RoundRobin, Selector};

#[derive(Debug, Default)]
pub struct WeightedRoundRobin {
    rr: RoundRobin,
}

impl WeightedRoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Selector for WeightedRoundRobin {
    fn next_node(&self, candidates: &[Arc<Node>], client_addr: Option<&str>) -> Option<Arc<Node>> {
        let total_weight: u64 = candidates.iter().map(|n| n.weight as u64).sum();
        if total_weight == 0 {
            return self.rr.next_node(candidates, client_addr);
        }

        let position = self.rr.tick() as u64 % total_weight;
        let mut cumulative = 0u64;
        for node in candidates {
            cumulative += node.weight as u64;
            if cumulative > position {
                return Some(node.clone());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::node::NodeSpec;

    fn weighted(id: &str, weight: u32) -> Arc<Node> {
        Arc::new(Node::from_spec(
            NodeSpec::new(id, "127.0.0.1", 9000).with_weight(weight),
            0,
        ))
    }

    #[test]
    fn test_weight_ratio() {
        let lb = WeightedRoundRobin::new();
        let nodes = vec![weighted("light", 10), weighted("heavy", 90)];

        let mut heavy = 0;
        for _ in 0..1000 {
            if lb.next_node(&nodes, None).unwrap().id == "heavy" {
                heavy += 1;
            }
        }
        assert_eq!(heavy, 900);
    }

    #[test]
    fn test_zero_weights_fall_back_to_round_robin() {
        let lb = WeightedRoundRobin::new();
        let nodes = vec![weighted("a", 0), weighted("b", 0)];
        let picks: Vec<_> = (0..4)
            .map(|_| lb.next_node(&nodes, None).unwrap().id.clone())
            .collect();
        assert_eq!(picks, vec!["a", "b", "a", "b"]);
    }

    #[test]
    fn test_zero_weight_node_never_selected() {
        let lb = WeightedRoundRobin::new();
        let nodes = vec![weighted("a", 0), weighted("b", 3)];
        for _ in 0..10 {
            assert_eq!(lb.next_node(&nodes, None).unwrap().id, "b");
        }
    }
}
