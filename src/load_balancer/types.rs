//! Algorithm names and error definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::load_balancer::{
    ip_hash::IpHash, least_conn::LeastConnections, round_robin::RoundRobin,
    weighted::WeightedRoundRobin, Selector,
};

/// Node selection algorithm.
///
/// Parsing never fails: unknown names resolve to round-robin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Algorithm {
    #[default]
    RoundRobin,
    LeastConnections,
    WeightedRoundRobin,
    IpHash,
}

impl Algorithm {
    /// Resolve a configuration name, falling back to round-robin.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "round-robin" => Algorithm::RoundRobin,
            "least-connections" => Algorithm::LeastConnections,
            "weighted-round-robin" => Algorithm::WeightedRoundRobin,
            "ip-hash" => Algorithm::IpHash,
            other => {
                tracing::warn!(algorithm = %other, "Unknown load balancing algorithm, using round-robin");
                Algorithm::RoundRobin
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::RoundRobin => "round-robin",
            Algorithm::LeastConnections => "least-connections",
            Algorithm::WeightedRoundRobin => "weighted-round-robin",
            Algorithm::IpHash => "ip-hash",
        }
    }

    /// Build a fresh selector for this algorithm.
    pub fn selector(&self) -> Box<dyn Selector> {
        match self {
            Algorithm::RoundRobin => Box::new(RoundRobin::new()),
            Algorithm::LeastConnections => Box::new(LeastConnections::new()),
            Algorithm::WeightedRoundRobin => Box::new(WeightedRoundRobin::new()),
            Algorithm::IpHash => Box::new(IpHash::new()),
        }
    }
}

impl From<String> for Algorithm {
    fn from(name: String) -> Self {
        Algorithm::from_name(&name)
    }
}

impl From<Algorithm> for String {
    fn from(algorithm: Algorithm) -> Self {
        algorithm.as_str().to_string()
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by the load balancer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoadBalancerError {
    /// No active node advertises the requested capability. Retryable.
    #[error("no active nodes available for capability: {}", .capability.as_deref().unwrap_or("any"))]
    NoNodesAvailable { capability: Option<String> },

    /// Node data rejected at registration.
    #[error("invalid node: {0}")]
    InvalidNode(String),

    /// The node ID is not registered.
    #[error("node {0} not found")]
    NodeNotFound(String),

    /// The node ID is already registered. Replace via remove then add.
    #[error("node {0} already registered")]
    DuplicateNode(String),
}

impl LoadBalancerError {
    /// Whether the caller should retry later (503-equivalent).
    pub fn is_retryable(&self) -> bool {
        matches!(self, LoadBalancerError::NoNodesAvailable { .. })
    }
}

/// Result type for load balancer operations.
pub type LoadBalancerResult<T> = Result<T, LoadBalancerError>;
