//! Service health monitor.
//!
//! # Responsibilities
//! - Hold named health checks registered by the backend's services
//! - Evaluate every check on an interval (and once at start)
//! - Derive the aggregate status from critical checks only
//! - Notify listeners when the aggregate flips
//!
//! # Design Decisions
//! - A check starts healthy with "not checked yet" until its first run
//! - Probes run outside the check table lock, on the blocking pool when
//!   driven by the background task
//! - The aggregate is derived under the check table write lock
//! - Listeners run detached and never see the lock

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};
use tokio::sync::broadcast;

use crate::lifecycle::{notify_detached, PeriodicTask};
use crate::observability::metrics;

/// Zero-argument probe returning `(healthy, message)`.
pub type HealthProbe = Arc<dyn Fn() -> (bool, String) + Send + Sync>;

/// Called with the new aggregate status whenever it changes.
pub type HealthListener = Arc<dyn Fn(bool) + Send + Sync>;

const NOT_CHECKED: &str = "not checked yet";

struct HealthCheck {
    description: String,
    probe: HealthProbe,
    critical: bool,
    healthy: bool,
    message: String,
    last_checked: Option<SystemTime>,
}

/// Last observed status of one check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckStatus {
    pub healthy: bool,
    pub message: String,
    pub description: String,
    pub critical: bool,
    pub last_checked: Option<SystemTime>,
}

/// Aggregate plus per-check detail.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub checks: BTreeMap<String, CheckStatus>,
}

struct MonitorInner {
    checks: RwLock<BTreeMap<String, HealthCheck>>,
    listeners: RwLock<Vec<HealthListener>>,
    healthy: RwLock<bool>,
}

pub struct ServiceHealthMonitor {
    inner: Arc<MonitorInner>,
    interval: Duration,
    task: PeriodicTask,
}

impl ServiceHealthMonitor {
    pub fn new(interval: Duration) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                checks: RwLock::new(BTreeMap::new()),
                listeners: RwLock::new(Vec::new()),
                healthy: RwLock::new(true),
            }),
            interval,
            task: PeriodicTask::new("service-health-monitor"),
        }
    }

    /// Register or replace a check.
    ///
    /// The aggregate is recomputed right away, so replacing a failing
    /// critical check takes effect without waiting for the next run.
    pub fn add_check(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        probe: HealthProbe,
        critical: bool,
    ) {
        let name = name.into();
        tracing::debug!(check = %name, critical, "Health check registered");
        let mut checks = self.inner.checks.write().expect("health checks lock poisoned");
        checks.insert(
            name,
            HealthCheck {
                description: description.into(),
                probe,
                critical,
                healthy: true,
                message: NOT_CHECKED.to_string(),
                last_checked: None,
            },
        );
        self.inner.publish(&checks);
    }

    /// Remove a check. Returns `false` if it did not exist.
    pub fn remove_check(&self, name: &str) -> bool {
        let mut checks = self.inner.checks.write().expect("health checks lock poisoned");
        let removed = checks.remove(name).is_some();
        if removed {
            self.inner.publish(&checks);
        }
        removed
    }

    pub fn add_listener(&self, listener: HealthListener) {
        self.inner
            .listeners
            .write()
            .expect("health listeners lock poisoned")
            .push(listener);
    }

    pub fn start(&self, shutdown: broadcast::Receiver<()>) {
        let inner = self.inner.clone();
        if self.task.start(self.interval, shutdown, move || {
            let inner = inner.clone();
            async move {
                // probes may block on I/O
                if let Err(e) = tokio::task::spawn_blocking(move || inner.evaluate()).await {
                    tracing::error!(error = %e, "Health check evaluation panicked");
                }
            }
        }) {
            tracing::info!(interval_secs = self.interval.as_secs(), "Service health monitor started");
        }
    }

    pub async fn stop(&self) {
        self.task.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    /// Run every check once now.
    pub fn evaluate_now(&self) {
        self.inner.evaluate();
    }

    pub fn is_healthy(&self) -> bool {
        *self.inner.healthy.read().expect("health status lock poisoned")
    }

    pub fn health_status(&self) -> HealthReport {
        let checks = self.inner.checks.read().expect("health checks lock poisoned");
        HealthReport {
            healthy: self.is_healthy(),
            checks: checks
                .iter()
                .map(|(name, check)| {
                    (
                        name.clone(),
                        CheckStatus {
                            healthy: check.healthy,
                            message: check.message.clone(),
                            description: check.description.clone(),
                            critical: check.critical,
                            last_checked: check.last_checked,
                        },
                    )
                })
                .collect(),
        }
    }
}

impl MonitorInner {
    fn evaluate(&self) {
        let probes: Vec<(String, HealthProbe)> = self
            .checks
            .read()
            .expect("health checks lock poisoned")
            .iter()
            .map(|(name, check)| (name.clone(), check.probe.clone()))
            .collect();

        let results: Vec<_> = probes
            .into_iter()
            .map(|(name, probe)| {
                let (healthy, message) = probe();
                (name, healthy, message, SystemTime::now())
            })
            .collect();

        let mut checks = self.checks.write().expect("health checks lock poisoned");
        for (name, healthy, message, at) in results {
            // removed while probing
            let Some(check) = checks.get_mut(&name) else {
                continue;
            };
            if check.healthy != healthy {
                if healthy {
                    tracing::info!(check = %name, %message, "Health check recovered");
                } else {
                    tracing::warn!(check = %name, %message, critical = check.critical, "Health check failing");
                }
            }
            check.healthy = healthy;
            check.message = message;
            check.last_checked = Some(at);
        }
        self.publish(&checks);
    }

    /// Derive the aggregate from `checks` and notify listeners on change.
    ///
    /// Callers hold the check table write lock, which serializes every
    /// update of the aggregate with the table it was computed from.
    fn publish(&self, checks: &BTreeMap<String, HealthCheck>) {
        let healthy = checks
            .values()
            .filter(|check| check.critical)
            .all(|check| check.healthy);

        let changed = {
            let mut current = self.healthy.write().expect("health status lock poisoned");
            let changed = *current != healthy;
            *current = healthy;
            changed
        };
        metrics::record_service_health(healthy);

        if !changed {
            return;
        }
        if healthy {
            tracing::info!("Service health restored");
        } else {
            tracing::warn!("Service unhealthy, critical check failing");
        }

        let listeners = self
            .listeners
            .read()
            .expect("health listeners lock poisoned")
            .clone();
        for listener in listeners {
            notify_detached(move || listener(healthy));
        }
    }
}
