//! Least Connections load balancing strategy.

use std::sync::Arc;

use crate::load_balancer::{node::Node, Selector};

/// Least connections selector.
/// Selects the node with the fewest in-flight requests.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl Selector for LeastConnections {
    fn next_node(&self, candidates: &[Arc<Node>], _client_addr: Option<&str>) -> Option<Arc<Node>> {
        // In case of tie, the first one is selected (stability)
        candidates
            .iter()
            .min_by_key(|n| n.current_load())
            .cloned()
    }
}
