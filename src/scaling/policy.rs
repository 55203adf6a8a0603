//! Scale-down victim selection.

use rand::seq::SliceRandom;
use std::fmt::Debug;
use std::sync::Arc;

use crate::load_balancer::Node;

/// Picks which active nodes to remove on scale-down.
pub trait RemovalPolicy: Send + Sync + Debug {
    /// Return exactly `min(count, nodes.len())` node IDs.
    fn select(&self, nodes: &[Arc<Node>], count: usize) -> Vec<String>;
}

/// Newest registration first.
#[derive(Debug, Default, Clone, Copy)]
pub struct Lifo;

impl RemovalPolicy for Lifo {
    fn select(&self, nodes: &[Arc<Node>], count: usize) -> Vec<String> {
        let mut ordered: Vec<_> = nodes.iter().collect();
        ordered.sort_by(|a, b| b.seq.cmp(&a.seq));
        ordered.into_iter().take(count).map(|n| n.id.clone()).collect()
    }
}

/// Fewest in-flight requests first; ties go to the newest node.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeastLoaded;

impl RemovalPolicy for LeastLoaded {
    fn select(&self, nodes: &[Arc<Node>], count: usize) -> Vec<String> {
        let mut ordered: Vec<_> = nodes.iter().collect();
        ordered.sort_by(|a, b| {
            a.current_load()
                .cmp(&b.current_load())
                .then_with(|| b.seq.cmp(&a.seq))
        });
        ordered.into_iter().take(count).map(|n| n.id.clone()).collect()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomRemoval;

impl RemovalPolicy for RandomRemoval {
    fn select(&self, nodes: &[Arc<Node>], count: usize) -> Vec<String> {
        let mut rng = rand::thread_rng();
        nodes
            .choose_multiple(&mut rng, count)
            .map(|n| n.id.clone())
            .collect()
    }
}

/// Resolve a configured policy name.
pub fn removal_policy_from_name(name: &str) -> Option<Arc<dyn RemovalPolicy>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "lifo" => Some(Arc::new(Lifo)),
        "least-loaded" => Some(Arc::new(LeastLoaded)),
        "random" => Some(Arc::new(RandomRemoval)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::NodeSpec;
    use std::collections::HashSet;

    fn nodes() -> Vec<Arc<Node>> {
        ["b", "a", "c"]
            .iter()
            .enumerate()
            .map(|(seq, id)| Arc::new(Node::from_spec(NodeSpec::new(*id, "10.0.0.1", 80), seq as u64)))
            .collect()
    }

    #[test]
    fn test_lifo_newest_first() {
        assert_eq!(Lifo.select(&nodes(), 2), vec!["c", "a"]);
        assert_eq!(Lifo.select(&nodes(), 10).len(), 3);
    }

    #[test]
    fn test_least_loaded() {
        let nodes = nodes();
        nodes[1].inc_load();
        nodes[2].inc_load();
        nodes[2].inc_load();
        assert_eq!(LeastLoaded.select(&nodes, 2), vec!["b", "a"]);
    }

    #[test]
    fn test_random_distinct() {
        let picked = RandomRemoval.select(&nodes(), 2);
        assert_eq!(picked.len(), 2);
        assert_eq!(picked.iter().collect::<HashSet<_>>().len(), 2);
    }

    #[test]
    fn test_names() {
        assert!(removal_policy_from_name("LIFO").is_some());
        assert!(removal_policy_from_name("least-loaded").is_some());
        assert!(removal_policy_from_name("oldest").is_none());
    }
}
