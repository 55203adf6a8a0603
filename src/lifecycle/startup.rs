//! Startup orchestration.
//!
//! # Responsibilities
//! - Build every component from a validated configuration
//! - Start background tasks (health checks, monitor, metrics, scaling)
//! - Stop them again in reverse dependency order
//!
//! # Design Decisions
//! - Fail fast: an invalid static node aborts construction
//! - Subsystems initialize in order, not concurrently
//! - The auto-scaler starts last, once node health is being tracked

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::validation::validate_config;
use crate::config::{ConfigError, FleetConfig, HealthCheckConfig, ProbeKind};
use crate::health::{
    HealthReport, HttpProbe, LoadProbe, NodeHealthChecker, NodeProbe, ServiceHealthMonitor,
};
use crate::lifecycle::Shutdown;
use crate::load_balancer::{
    ClusterStatus, InMemoryDiscovery, LoadBalancer, LoadBalancerError, NodeInfo,
};
use crate::observability::{register_fleet_metrics, MetricSummary, MetricsCollector};
use crate::resilience::{BreakerRegistry, BreakerSnapshot};
use crate::scaling::{AutoScaler, ScaleCallbacks};

/// Errors that prevent the control plane from being assembled.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("node registry: {0}")]
    Registry(#[from] LoadBalancerError),
}

/// Everything an operator view needs, in one serializable value.
#[derive(Debug, Clone, Serialize)]
pub struct PlaneStatus {
    pub cluster: ClusterStatus,
    pub nodes: Vec<NodeInfo>,
    pub health: HealthReport,
    pub breakers: BTreeMap<String, BreakerSnapshot>,
    pub metrics: BTreeMap<String, MetricSummary>,
}

/// The assembled control plane.
pub struct ControlPlane {
    config: FleetConfig,
    balancer: Arc<LoadBalancer>,
    discovery: Option<Arc<InMemoryDiscovery>>,
    health_checker: NodeHealthChecker,
    autoscaler: Option<AutoScaler>,
    breakers: Arc<BreakerRegistry>,
    monitor: ServiceHealthMonitor,
    collector: MetricsCollector,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl ControlPlane {
    /// Build the plane. `callbacks` receives the registry so provisioning
    /// hooks can act on it.
    ///
    /// The configuration is validated first, so configs built in code get
    /// the same checks as those read by [`load_config`](crate::config::load_config).
    pub fn from_config<F>(config: FleetConfig, callbacks: F) -> Result<Self, StartupError>
    where
        F: FnOnce(Arc<LoadBalancer>) -> ScaleCallbacks,
    {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let algorithm = config.cluster.algorithm;

        let discovery = config
            .discovery
            .enabled
            .then(|| Arc::new(InMemoryDiscovery::with_nodes(config.cluster.nodes.clone())));
        let balancer = Arc::new(match &discovery {
            Some(d) => LoadBalancer::with_discovery(algorithm, d.clone()),
            None => LoadBalancer::new(algorithm),
        });

        for spec in &config.cluster.nodes {
            balancer.add_node(spec.clone())?;
        }
        tracing::info!(
            algorithm = %algorithm,
            nodes = config.cluster.nodes.len(),
            discovery = discovery.is_some(),
            "Node registry initialized"
        );

        let health_checker = NodeHealthChecker::new(
            balancer.clone(),
            config.health_check.interval(),
            node_probe(&config.health_check),
        );

        let autoscaler = config.autoscaler.enabled.then(|| {
            AutoScaler::new(
                balancer.clone(),
                config.cluster.min_nodes,
                config.cluster.max_nodes,
                &config.autoscaler,
                callbacks(balancer.clone()),
            )
        });

        let breakers = Arc::new(BreakerRegistry::new(config.breakers.clone()));

        let monitor = ServiceHealthMonitor::new(config.monitor.interval());
        let lb = balancer.clone();
        let min_nodes = config.cluster.min_nodes;
        monitor.add_check(
            "node_pool",
            "Active nodes available for selection",
            Arc::new(move || {
                let status = lb.cluster_status();
                let healthy = status.active_nodes > 0 || min_nodes == 0;
                (
                    healthy,
                    format!("{} of {} nodes active", status.active_nodes, status.total_nodes),
                )
            }),
            true,
        );
        let registry = breakers.clone();
        monitor.add_check(
            "circuit_breakers",
            "Dependencies behind closed circuits",
            Arc::new(move || {
                let open = registry.open_count();
                (open == 0, format!("{open} of {} circuits open", registry.len()))
            }),
            false,
        );

        let collector = MetricsCollector::new(config.observability.collection_interval());
        register_fleet_metrics(
            &collector,
            balancer.clone(),
            breakers.clone(),
            config.observability.default_max_points,
        );

        Ok(Self {
            config,
            balancer,
            discovery,
            health_checker,
            autoscaler,
            breakers,
            monitor,
            collector,
            watcher: Mutex::new(None),
        })
    }

    /// Start every background loop. Must be called within a Tokio runtime.
    pub fn start(&self, shutdown: &Shutdown) {
        self.health_checker.start(shutdown.subscribe());

        if self.discovery.is_some() {
            let balancer = self.balancer.clone();
            let rx = shutdown.subscribe();
            let handle = tokio::spawn(async move { balancer.follow_discovery(rx).await });
            if let Some(old) = self.watcher.lock().expect("watcher lock poisoned").replace(handle) {
                old.abort();
            }
        }

        self.monitor.start(shutdown.subscribe());
        self.collector.start(shutdown.subscribe());

        if let Some(scaler) = &self.autoscaler {
            scaler.start(shutdown.subscribe());
        }
        tracing::info!("Control plane started");
    }

    /// Stop every background loop and wait for each to exit.
    pub async fn stop(&self) {
        if let Some(scaler) = &self.autoscaler {
            scaler.stop().await;
        }
        self.health_checker.stop().await;
        self.monitor.stop().await;
        self.collector.stop().await;

        let watcher = self.watcher.lock().expect("watcher lock poisoned").take();
        if let Some(handle) = watcher {
            handle.abort();
            let _ = handle.await;
        }
        tracing::info!("Control plane stopped");
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    pub fn balancer(&self) -> &Arc<LoadBalancer> {
        &self.balancer
    }

    pub fn discovery(&self) -> Option<&Arc<InMemoryDiscovery>> {
        self.discovery.as_ref()
    }

    pub fn health_checker(&self) -> &NodeHealthChecker {
        &self.health_checker
    }

    pub fn autoscaler(&self) -> Option<&AutoScaler> {
        self.autoscaler.as_ref()
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    pub fn monitor(&self) -> &ServiceHealthMonitor {
        &self.monitor
    }

    pub fn collector(&self) -> &MetricsCollector {
        &self.collector
    }

    pub fn status(&self) -> PlaneStatus {
        PlaneStatus {
            cluster: self.balancer.cluster_status(),
            nodes: self.balancer.node_list(),
            health: self.monitor.health_status(),
            breakers: self.breakers.snapshots(),
            metrics: self.collector.all_metrics(),
        }
    }
}

fn node_probe(config: &HealthCheckConfig) -> Arc<dyn NodeProbe> {
    match config.probe {
        ProbeKind::Load => Arc::new(LoadProbe::new(config.load_ceiling)),
        ProbeKind::Http => Arc::new(HttpProbe::new(config.path.clone(), config.timeout())),
    }
}

/// Callbacks for deployments without a provisioning backend: scale-up is
/// logged for the operator, scale-down deregisters the chosen nodes.
pub fn registry_callbacks(balancer: Arc<LoadBalancer>) -> ScaleCallbacks {
    ScaleCallbacks {
        scale_up: Arc::new(|count| {
            tracing::warn!(count, "Scale-up requested, no provisioner attached");
            Ok(())
        }),
        scale_down: Arc::new(move |node_ids| {
            for id in node_ids {
                balancer.remove_node(&id)?;
            }
            Ok(())
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::NodeSpec;
    use std::time::Duration;

    fn config() -> FleetConfig {
        let mut config = FleetConfig::default();
        config.cluster.nodes = vec![
            NodeSpec::new("a", "10.0.0.1", 8080),
            NodeSpec::new("b", "10.0.0.2", 8080),
        ];
        config.autoscaler.enabled = false;
        config
    }

    #[tokio::test]
    async fn test_builds_and_runs() {
        let shutdown = Shutdown::new();
        let plane = ControlPlane::from_config(config(), registry_callbacks).unwrap();
        assert_eq!(plane.balancer().nodes().len(), 2);
        assert!(plane.autoscaler().is_none());

        plane.start(&shutdown);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(plane.health_checker().is_running());

        let status = plane.status();
        assert_eq!(status.cluster.active_nodes, 2);
        assert!(status.health.healthy);
        assert_eq!(status.health.checks["node_pool"].message, "2 of 2 nodes active");
        assert_eq!(status.metrics["active_nodes"].latest.unwrap().value, 2.0);

        plane.stop().await;
        assert!(!plane.health_checker().is_running());
        assert!(!plane.monitor().is_running());
    }

    #[test]
    fn test_invalid_static_node_fails_fast() {
        let mut config = config();
        config.cluster.nodes.push(NodeSpec::new("c", "10.0.0.3", 0));
        assert!(ControlPlane::from_config(config, registry_callbacks).is_err());
    }

    #[test]
    fn test_zero_intervals_rejected_before_build() {
        let mut config = config();
        config.health_check.interval_secs = 0;
        config.monitor.interval_secs = 0;

        match ControlPlane::from_config(config, registry_callbacks) {
            Err(StartupError::Config(ConfigError::Validation(errors))) => {
                let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
                assert!(fields.contains(&"health_check.interval_secs"));
                assert!(fields.contains(&"monitor.interval_secs"));
            }
            Err(other) => panic!("expected validation failure, got {other}"),
            Ok(_) => panic!("expected validation failure"),
        }
    }

    #[test]
    fn test_registry_callbacks_remove_nodes() {
        let lb = Arc::new(LoadBalancer::new(Default::default()));
        lb.add_node(NodeSpec::new("a", "10.0.0.1", 80)).unwrap();
        let callbacks = registry_callbacks(lb.clone());

        (callbacks.scale_down)(vec!["a".to_string()]).unwrap();
        assert!(lb.nodes().is_empty());
        assert!((callbacks.scale_down)(vec!["a".to_string()]).is_err());
    }
}
