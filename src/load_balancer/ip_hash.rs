//! Client-address hashing for session affinity.

use std::sync::Arc;

use crate::load_balancer::{node::Node, round_robin::RoundRobin, Selector};

/// Maps a client address onto a stable candidate index.
/// Requests without a client address are spread round-robin.
#[derive(Debug, Default)]
pub struct IpHash {
    rr: RoundRobin,
}

impl IpHash {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Polynomial rolling hash (base 31) over the address bytes.
pub fn hash_client(addr: &str) -> u64 {
    addr.bytes()
        .fold(0u64, |hash, b| hash.wrapping_mul(31).wrapping_add(b as u64))
}

impl Selector for IpHash {
    fn next_node(&self, candidates: &[Arc<Node>], client_addr: Option<&str>) -> Option<Arc<Node>> {
        match client_addr {
            Some(addr) if !addr.is_empty() && !candidates.is_empty() => {
                let index = (hash_client(addr) % candidates.len() as u64) as usize;
                Some(candidates[index].clone())
            }
            _ => self.rr.next_node(candidates, client_addr),
        }
    }
}
