//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check value ranges (intervals > 0, ratio in (0, 1], min <= max)
//! - Check static nodes are well-formed and uniquely named
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: FleetConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{BreakerConfig, FleetConfig};
use crate::scaling::policy::removal_policy_from_name;

/// One semantic problem, located by its dotted config path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &FleetConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let cluster = &config.cluster;
    if cluster.max_nodes == 0 {
        errors.push(ValidationError::new("cluster.max_nodes", "must be at least 1"));
    }
    if cluster.min_nodes > cluster.max_nodes {
        errors.push(ValidationError::new(
            "cluster.min_nodes",
            format!(
                "{} exceeds max_nodes {}",
                cluster.min_nodes, cluster.max_nodes
            ),
        ));
    }

    let mut seen = HashSet::new();
    for (i, node) in cluster.nodes.iter().enumerate() {
        if let Err(reason) = node.validate() {
            errors.push(ValidationError::new(format!("cluster.nodes[{i}]"), reason));
        } else if !seen.insert(node.id.as_str()) {
            errors.push(ValidationError::new(
                format!("cluster.nodes[{i}]"),
                format!("duplicate node ID {}", node.id),
            ));
        }
    }

    let health = &config.health_check;
    if health.interval_secs == 0 {
        errors.push(ValidationError::new("health_check.interval_secs", "must be positive"));
    }
    if health.timeout_ms == 0 {
        errors.push(ValidationError::new("health_check.timeout_ms", "must be positive"));
    }
    if !health.path.starts_with('/') {
        errors.push(ValidationError::new("health_check.path", "must start with '/'"));
    }

    let scaler = &config.autoscaler;
    if !(scaler.target_load_ratio > 0.0 && scaler.target_load_ratio <= 1.0) {
        errors.push(ValidationError::new(
            "autoscaler.target_load_ratio",
            format!("{} is outside (0, 1]", scaler.target_load_ratio),
        ));
    }
    if scaler.evaluation_interval_secs == 0 {
        errors.push(ValidationError::new(
            "autoscaler.evaluation_interval_secs",
            "must be positive",
        ));
    }
    if !(scaler.node_capacity > 0.0) {
        errors.push(ValidationError::new("autoscaler.node_capacity", "must be positive"));
    }
    if removal_policy_from_name(&scaler.removal_policy).is_none() {
        errors.push(ValidationError::new(
            "autoscaler.removal_policy",
            format!(
                "unknown policy {:?} (expected lifo, least-loaded or random)",
                scaler.removal_policy
            ),
        ));
    }

    validate_breaker("breakers.default", &config.breakers.default, &mut errors);
    for (name, breaker) in &config.breakers.named {
        validate_breaker(&format!("breakers.{name}"), breaker, &mut errors);
    }

    if config.monitor.interval_secs == 0 {
        errors.push(ValidationError::new("monitor.interval_secs", "must be positive"));
    }

    let obs = &config.observability;
    if obs.collection_interval_secs == 0 {
        errors.push(ValidationError::new(
            "observability.collection_interval_secs",
            "must be positive",
        ));
    }
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("{:?} is not a socket address", obs.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_breaker(prefix: &str, breaker: &BreakerConfig, errors: &mut Vec<ValidationError>) {
    if breaker.failure_threshold == 0 {
        errors.push(ValidationError::new(
            format!("{prefix}.failure_threshold"),
            "must be at least 1",
        ));
    }
    if breaker.half_open_success_threshold == 0 {
        errors.push(ValidationError::new(
            format!("{prefix}.half_open_success_threshold"),
            "must be at least 1",
        ));
    }
}
