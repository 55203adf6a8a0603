//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the control
//! plane. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::load_balancer::{Algorithm, NodeSpec};

/// Root configuration for the fleet control plane.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FleetConfig {
    /// Cluster bounds, balancing algorithm and static nodes.
    pub cluster: ClusterConfig,

    /// Node health check settings.
    pub health_check: HealthCheckConfig,

    /// Auto-scaler settings.
    pub autoscaler: AutoscalerConfig,

    /// Circuit breakers by name; `default` applies to unnamed ones.
    pub breakers: BreakersConfig,

    /// Service health monitor settings.
    pub monitor: MonitorConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Service discovery settings.
    pub discovery: DiscoveryConfig,
}

/// Cluster configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Lower bound the auto-scaler keeps the active node count at.
    pub min_nodes: usize,

    /// Upper bound the auto-scaler never exceeds.
    pub max_nodes: usize,

    /// Node selection algorithm.
    pub algorithm: Algorithm,

    /// Nodes registered at startup.
    pub nodes: Vec<NodeSpec>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            min_nodes: 1,
            max_nodes: 10,
            algorithm: Algorithm::default(),
            nodes: Vec::new(),
        }
    }
}

/// How nodes are probed.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// Healthy while current load is at or below the ceiling.
    #[default]
    Load,
    /// HTTP GET against each node.
    Http,
}

/// Node health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Probe used against each node.
    pub probe: ProbeKind,

    /// Path to probe for HTTP health checks.
    pub path: String,

    /// HTTP probe timeout in milliseconds.
    pub timeout_ms: u64,

    /// Load probe ceiling (in-flight requests).
    pub load_ceiling: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            probe: ProbeKind::Load,
            path: "/health".to_string(),
            timeout_ms: 2000,
            load_ceiling: 100,
        }
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Auto-scaler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AutoscalerConfig {
    /// Run the scaling loop.
    pub enabled: bool,

    /// Desired per-node load as a fraction of capacity, in (0, 1].
    pub target_load_ratio: f64,

    /// Minimum time between scaling actions, in seconds.
    pub cooldown_secs: u64,

    /// Evaluation interval in seconds.
    pub evaluation_interval_secs: u64,

    /// Per-node load considered 100% utilisation.
    pub node_capacity: f64,

    /// Which nodes go first on scale-down: "lifo", "least-loaded" or "random".
    pub removal_policy: String,
}

impl Default for AutoscalerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_load_ratio: 0.7,
            cooldown_secs: 180,
            evaluation_interval_secs: 30,
            node_capacity: 100.0,
            removal_policy: "lifo".to_string(),
        }
    }
}

impl AutoscalerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_secs(self.evaluation_interval_secs)
    }

    pub fn scale_up_threshold(&self) -> f64 {
        self.target_load_ratio * 1.3
    }

    pub fn scale_down_threshold(&self) -> f64 {
        self.target_load_ratio * 0.5
    }
}

/// Per-breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// Time the circuit stays open before a trial call, in milliseconds.
    pub reset_timeout_ms: u64,

    /// Consecutive half-open successes that close the circuit.
    pub half_open_success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 30_000,
            half_open_success_threshold: 5,
        }
    }
}

impl BreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

/// `[breakers.default]` plus any number of `[breakers.<name>]` tables.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BreakersConfig {
    pub default: BreakerConfig,

    #[serde(flatten)]
    pub named: BTreeMap<String, BreakerConfig>,
}

impl BreakersConfig {
    /// Configuration for `name`, falling back to the default.
    pub fn for_name(&self, name: &str) -> &BreakerConfig {
        self.named.get(name).unwrap_or(&self.default)
    }
}

/// Service health monitor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Evaluation interval in seconds.
    pub interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Metrics collector sampling interval in seconds.
    pub collection_interval_secs: u64,

    /// Points retained per metric when a metric does not say.
    pub default_max_points: usize,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
            collection_interval_secs: 15,
            default_max_points: 100,
        }
    }
}

impl ObservabilityConfig {
    pub fn collection_interval(&self) -> Duration {
        Duration::from_secs(self.collection_interval_secs)
    }
}

/// Service discovery configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Attach an in-process discovery provider seeded with the static nodes.
    pub enabled: bool,
}
