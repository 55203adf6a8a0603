//! Active node health checking.
//!
//! # Responsibilities
//! - Periodically probe every registered node concurrently
//! - Flip nodes in and out of rotation based on probe results
//! - Reconcile the registry with service discovery when it is configured

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::health::probe::NodeProbe;
use crate::lifecycle::PeriodicTask;
use crate::load_balancer::LoadBalancer;

/// Consecutive discovery rounds a node may be missing before it is pruned.
pub const MAX_DISCOVERY_MISSES: u32 = 2;

pub struct NodeHealthChecker {
    inner: Arc<CheckerInner>,
    task: PeriodicTask,
}

struct CheckerInner {
    balancer: Arc<LoadBalancer>,
    interval: Duration,
    probe: Arc<dyn NodeProbe>,
}

impl NodeHealthChecker {
    pub fn new(balancer: Arc<LoadBalancer>, interval: Duration, probe: Arc<dyn NodeProbe>) -> Self {
        Self {
            inner: Arc::new(CheckerInner {
                balancer,
                interval,
                probe,
            }),
            task: PeriodicTask::new("node-health-checker"),
        }
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Start the periodic loop. A second call while running is a no-op.
    pub fn start(&self, shutdown: broadcast::Receiver<()>) {
        let inner = self.inner.clone();
        if self.task.start(self.inner.interval, shutdown, move || {
            let inner = inner.clone();
            async move { inner.check_all().await }
        }) {
            tracing::info!(
                interval_secs = self.inner.interval.as_secs(),
                discovery = self.inner.balancer.discovery().is_some(),
                "Node health checker started"
            );
        }
    }

    /// Stop the loop and wait for it to exit.
    pub async fn stop(&self) {
        self.task.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    /// Run one probe and reconciliation round immediately.
    pub async fn check_now(&self) {
        self.inner.check_all().await;
    }
}

impl CheckerInner {
    async fn check_all(&self) {
        let nodes: Vec<_> = self.balancer.nodes().into_values().collect();

        let outcomes = join_all(nodes.iter().map(|node| self.probe.probe(node))).await;
        let results: Vec<_> = nodes.into_iter().zip(outcomes).collect();

        let unhealthy = results.iter().filter(|(_, healthy)| !healthy).count();
        tracing::debug!(checked = results.len(), unhealthy, "Health check round complete");
        self.balancer.apply_probe_results(results);

        self.sync_discovery().await;
    }

    async fn sync_discovery(&self) {
        let Some(discovery) = self.balancer.discovery() else {
            return;
        };

        match time::timeout(self.interval, discovery.discover_nodes()).await {
            Ok(Ok(specs)) => {
                let report = self.balancer.reconcile(specs, MAX_DISCOVERY_MISSES);
                if !report.added.is_empty() || !report.pruned.is_empty() {
                    tracing::info!(
                        added = report.added.len(),
                        pruned = report.pruned.len(),
                        "Registry reconciled with service discovery"
                    );
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Service discovery failed, retrying next round");
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.interval.as_secs(),
                    "Service discovery timed out, retrying next round"
                );
            }
        }
    }
}
