//! Auto-scaler: load-driven node count control.
//!
//! Reads the current load of every active node from the registry, compares
//! the per-node average against the configured target, and asks the
//! provisioning backend for more or fewer nodes. The actual provisioning is
//! performed by two callbacks.
//!
//! # Scaling Algorithm
//!
//! ```text
//! ratio  = (total_load / active) / node_capacity
//! target = floor(total_load / (node_capacity * target_load_ratio))
//!
//! active == 0 and min > 0:
//!     scale_up(min)                                  // bootstrap
//!
//! ratio > target_load_ratio * 1.3 and active < max:
//!     scale_up(clamp(target, active + 1, max) - active)
//!
//! ratio < target_load_ratio * 0.5 and active > min:
//!     scale_down(active - max(target, min) nodes picked by RemovalPolicy)
//! ```
//!
//! A cooldown after every successful action prevents oscillation.

use serde::Serialize;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use crate::config::AutoscalerConfig;
use crate::lifecycle::PeriodicTask;
use crate::load_balancer::LoadBalancer;
use crate::observability::metrics;
use crate::scaling::policy::{removal_policy_from_name, Lifo, RemovalPolicy};

/// Outcome of a provisioning callback.
pub type ScaleResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Called with the number of nodes to add.
pub type ScaleUpFn = Arc<dyn Fn(usize) -> ScaleResult + Send + Sync>;

/// Called with the IDs of the nodes to remove.
pub type ScaleDownFn = Arc<dyn Fn(Vec<String>) -> ScaleResult + Send + Sync>;

/// Provisioning hooks supplied by the embedding backend.
#[derive(Clone)]
pub struct ScaleCallbacks {
    pub scale_up: ScaleUpFn,
    pub scale_down: ScaleDownFn,
}

/// A scaling decision for the cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum ScaleDecision {
    /// No change needed.
    Hold { reason: &'static str },
    /// Add `count` nodes.
    ScaleUp { count: usize, from: usize, to: usize },
    /// Remove the listed nodes.
    ScaleDown {
        node_ids: Vec<String>,
        from: usize,
        to: usize,
    },
}

struct ScalerInner {
    balancer: Arc<LoadBalancer>,
    min_nodes: usize,
    max_nodes: usize,
    target_load_ratio: f64,
    scale_up_threshold: f64,
    scale_down_threshold: f64,
    node_capacity: f64,
    cooldown: Duration,
    policy: RwLock<Arc<dyn RemovalPolicy>>,
    callbacks: ScaleCallbacks,
    last_scaled: Mutex<Option<Instant>>,
}

pub struct AutoScaler {
    inner: Arc<ScalerInner>,
    interval: Duration,
    task: PeriodicTask,
}

impl AutoScaler {
    pub fn new(
        balancer: Arc<LoadBalancer>,
        min_nodes: usize,
        max_nodes: usize,
        config: &AutoscalerConfig,
        callbacks: ScaleCallbacks,
    ) -> Self {
        let policy = removal_policy_from_name(&config.removal_policy).unwrap_or_else(|| {
            tracing::warn!(policy = %config.removal_policy, "Unknown removal policy, using lifo");
            Arc::new(Lifo)
        });

        Self {
            inner: Arc::new(ScalerInner {
                balancer,
                min_nodes,
                max_nodes,
                target_load_ratio: config.target_load_ratio,
                scale_up_threshold: config.scale_up_threshold(),
                scale_down_threshold: config.scale_down_threshold(),
                node_capacity: config.node_capacity,
                cooldown: config.cooldown(),
                policy: RwLock::new(policy),
                callbacks,
                last_scaled: Mutex::new(None),
            }),
            interval: config.evaluation_interval(),
            task: PeriodicTask::new("autoscaler"),
        }
    }

    pub fn set_removal_policy(&self, policy: Arc<dyn RemovalPolicy>) {
        *self.inner.policy.write().expect("removal policy lock poisoned") = policy;
    }

    /// Start the evaluation loop. A second call while running is a no-op.
    pub fn start(&self, shutdown: broadcast::Receiver<()>) {
        let inner = self.inner.clone();
        if self.task.start(self.interval, shutdown, move || {
            let inner = inner.clone();
            async move {
                inner.check_and_scale();
            }
        }) {
            tracing::info!(
                interval_secs = self.interval.as_secs(),
                min_nodes = self.inner.min_nodes,
                max_nodes = self.inner.max_nodes,
                target_load_ratio = self.inner.target_load_ratio,
                "Autoscaler started"
            );
        }
    }

    pub async fn stop(&self) {
        self.task.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    /// Decide without acting.
    pub fn evaluate(&self) -> ScaleDecision {
        self.inner.evaluate()
    }

    /// Decide and invoke the matching provisioning callback.
    pub fn check_and_scale(&self) -> ScaleDecision {
        self.inner.check_and_scale()
    }

    pub fn last_scaled(&self) -> Option<Instant> {
        *self.inner.last_scaled.lock().expect("autoscaler lock poisoned")
    }
}

impl ScalerInner {
    fn target_for(&self, total_load: f64) -> usize {
        (total_load / (self.node_capacity * self.target_load_ratio)).floor() as usize
    }

    fn evaluate(&self) -> ScaleDecision {
        if let Some(at) = *self.last_scaled.lock().expect("autoscaler lock poisoned") {
            if at.elapsed() < self.cooldown {
                return ScaleDecision::Hold { reason: "cooldown" };
            }
        }

        let active = self.balancer.active_nodes();
        let count = active.len();

        if count == 0 {
            if self.min_nodes > 0 {
                return ScaleDecision::ScaleUp {
                    count: self.min_nodes,
                    from: 0,
                    to: self.min_nodes,
                };
            }
            return ScaleDecision::Hold { reason: "no active nodes" };
        }

        let total_load: f64 = active.iter().map(|n| f64::from(n.current_load())).sum();
        let ratio = total_load / count as f64 / self.node_capacity;

        tracing::debug!(active = count, total_load, ratio, "Autoscaler evaluated load");

        if ratio > self.scale_up_threshold {
            if count >= self.max_nodes {
                return ScaleDecision::Hold { reason: "at max nodes" };
            }
            let target = self.target_for(total_load).max(count + 1).min(self.max_nodes);
            return ScaleDecision::ScaleUp {
                count: target - count,
                from: count,
                to: target,
            };
        }

        if ratio < self.scale_down_threshold {
            if count <= self.min_nodes {
                return ScaleDecision::Hold { reason: "at min nodes" };
            }
            let target = self.target_for(total_load).max(self.min_nodes);
            if target < count {
                let policy = self.policy.read().expect("removal policy lock poisoned").clone();
                return ScaleDecision::ScaleDown {
                    node_ids: policy.select(&active, count - target),
                    from: count,
                    to: target,
                };
            }
        }

        ScaleDecision::Hold { reason: "within target" }
    }

    fn check_and_scale(&self) -> ScaleDecision {
        let decision = self.evaluate();

        let result = match &decision {
            ScaleDecision::Hold { .. } => return decision,
            ScaleDecision::ScaleUp { count, from, to } => {
                tracing::info!(count, from, to, "Scaling up");
                (self.callbacks.scale_up)(*count).map(|()| ("up", *count))
            }
            ScaleDecision::ScaleDown { node_ids, from, to } => {
                tracing::info!(nodes = ?node_ids, from, to, "Scaling down");
                (self.callbacks.scale_down)(node_ids.clone()).map(|()| ("down", node_ids.len()))
            }
        };

        match result {
            Ok((direction, count)) => {
                *self.last_scaled.lock().expect("autoscaler lock poisoned") = Some(Instant::now());
                metrics::record_scale_event(direction, count);
            }
            Err(e) => {
                tracing::warn!(decision = ?decision, error = %e, "Scaling action failed, retrying next evaluation");
            }
        }
        decision
    }
}
