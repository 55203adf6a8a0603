//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::load_balancer::{node::Node, Selector};

/// Round-robin selector.
/// Stores an internal counter to rotate through candidates.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the shared counter and return its previous value.
    pub(crate) fn tick(&self) -> usize {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }
}

impl Selector for RoundRobin {
    fn next_node(&self, candidates: &[Arc<Node>], _client_addr: Option<&str>) -> Option<Arc<Node>> {
        if candidates.is_empty() {
            return None;
        }
        let index = self.tick() % candidates.len();
        Some(candidates[index].clone())
    }
}
