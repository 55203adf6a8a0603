//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define fleet metrics (node liveness, breaker state, scaling events)
//! - Expose a Prometheus-compatible scrape endpoint
//! - Publish collector samples as gauges
//!
//! # Metrics
//! - `fleet_node_active` (gauge): 1=active, 0=inactive or removed, by node
//! - `fleet_selection_failures_total` (counter): empty candidate sets, by capability
//! - `fleet_breaker_state` (gauge): 0=closed, 1=half-open, 2=open, by breaker
//! - `fleet_scale_events_total` (counter): nodes requested, by direction
//! - `fleet_service_healthy` (gauge): aggregate service health
//! - `fleet_sample` (gauge): latest collector sample, by metric
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so library users and tests pay nothing
//! - Labels are node IDs and breaker names, both bounded by configuration

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::resilience::circuit_breaker::BreakerState;

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_node_active(node_id: &str, active: bool) {
    metrics::gauge!("fleet_node_active", "node" => node_id.to_string())
        .set(if active { 1.0 } else { 0.0 });
}

pub fn record_selection_failure(capability: &str) {
    metrics::counter!("fleet_selection_failures_total", "capability" => capability.to_string())
        .increment(1);
}

pub fn record_breaker_state(name: &str, state: BreakerState) {
    let value = match state {
        BreakerState::Closed => 0.0,
        BreakerState::HalfOpen => 1.0,
        BreakerState::Open => 2.0,
    };
    metrics::gauge!("fleet_breaker_state", "breaker" => name.to_string()).set(value);
}

/// `direction` is "up" or "down"; `count` is the number of nodes requested.
pub fn record_scale_event(direction: &'static str, count: usize) {
    metrics::counter!("fleet_scale_events_total", "direction" => direction)
        .increment(count as u64);
}

pub fn record_service_health(healthy: bool) {
    metrics::gauge!("fleet_service_healthy").set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_sample(metric: &str, value: f64) {
    metrics::gauge!("fleet_sample", "metric" => metric.to_string()).set(value);
}
