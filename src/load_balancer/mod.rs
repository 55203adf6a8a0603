//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Request with (client address, capability)
//!     → pool.rs (read-lock node table, keep active + capable nodes)
//!     → Apply load balancing algorithm:
//!         - round_robin.rs (rotate through candidates)
//!         - least_conn.rs (pick node with fewest in-flight requests)
//!         - weighted.rs (cumulative weights over a shared counter)
//!         - ip_hash.rs (client address affinity)
//!     → node.rs (increment current load)
//!     → caller releases the node with elapsed time and outcome
//!     → stats.rs (fold outcome into aggregate counters)
//! ```
//!
//! # Design Decisions
//! - Selectors are stateless apart from their rotation counter; nodes track load
//! - Candidates are ordered by node ID so rotation is deterministic
//! - Inactive nodes never reach a selector
//! - Load counters are atomics so select/release never takes the write lock
//! - An empty candidate set is a retryable error, not a failure of the plane

pub mod discovery;
pub mod ip_hash;
pub mod least_conn;
pub mod node;
pub mod pool;
pub mod round_robin;
pub mod stats;
pub mod types;
pub mod weighted;

use std::fmt::Debug;
use std::sync::Arc;

pub use discovery::{DiscoveryError, InMemoryDiscovery, ServiceDiscovery};
pub use node::{Node, NodeLease, NodeSpec};
pub use pool::{ClusterStatus, LoadBalancer, NodeInfo};
pub use types::{Algorithm, LoadBalancerError, LoadBalancerResult};

/// A node selection strategy.
pub trait Selector: Send + Sync + Debug {
    /// Pick one of `candidates`, all of which are active and capable.
    fn next_node(&self, candidates: &[Arc<Node>], client_addr: Option<&str>) -> Option<Arc<Node>>;
}
