//! Metrics collector: bounded in-process time series.
//!
//! Each metric owns a sampling function and a ring buffer of
//! `(timestamp, value)` points. On every tick every sampler runs once and
//! the value is appended, evicting the oldest point at capacity. Samples are
//! also published as `fleet_sample` gauges for the Prometheus exporter.

use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::lifecycle::PeriodicTask;
use crate::load_balancer::LoadBalancer;
use crate::observability::metrics;
use crate::resilience::BreakerRegistry;

/// Points kept when a metric is registered with `max_points == 0`.
pub const DEFAULT_MAX_POINTS: usize = 100;

/// Sampling function for one metric.
pub type Sampler = Arc<dyn Fn() -> f64 + Send + Sync>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CollectorError {
    #[error("metric not found: {0}")]
    MetricNotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricPoint {
    pub timestamp: SystemTime,
    pub value: f64,
}

/// Latest-value view of one metric.
#[derive(Debug, Clone, Serialize)]
pub struct MetricSummary {
    pub description: String,
    pub unit: String,
    pub latest: Option<MetricPoint>,
    pub points: usize,
}

struct Metric {
    description: String,
    unit: String,
    sampler: Sampler,
    max_points: usize,
    points: Mutex<VecDeque<MetricPoint>>,
}

impl Metric {
    fn push(&self, point: MetricPoint) {
        let mut points = self.points.lock().expect("metric points lock poisoned");
        if points.len() == self.max_points {
            points.pop_front();
        }
        points.push_back(point);
    }
}

pub struct MetricsCollector {
    metrics: Arc<RwLock<BTreeMap<String, Arc<Metric>>>>,
    interval: Duration,
    task: PeriodicTask,
}

impl MetricsCollector {
    pub fn new(interval: Duration) -> Self {
        Self {
            metrics: Arc::new(RwLock::new(BTreeMap::new())),
            interval,
            task: PeriodicTask::new("metrics-collector"),
        }
    }

    /// Register or replace a metric. Replacing discards its history.
    pub fn add_metric(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        unit: impl Into<String>,
        sampler: Sampler,
        max_points: usize,
    ) {
        let name = name.into();
        let max_points = if max_points == 0 { DEFAULT_MAX_POINTS } else { max_points };
        tracing::debug!(metric = %name, max_points, "Metric registered");

        self.metrics.write().expect("metrics lock poisoned").insert(
            name,
            Arc::new(Metric {
                description: description.into(),
                unit: unit.into(),
                sampler,
                max_points,
                points: Mutex::new(VecDeque::with_capacity(max_points)),
            }),
        );
    }

    /// Returns `false` if the metric did not exist.
    pub fn remove_metric(&self, name: &str) -> bool {
        self.metrics
            .write()
            .expect("metrics lock poisoned")
            .remove(name)
            .is_some()
    }

    pub fn start(&self, shutdown: broadcast::Receiver<()>) {
        let metrics = self.metrics.clone();
        if self.task.start(self.interval, shutdown, move || {
            let metrics = metrics.clone();
            async move {
                // samplers are user code and may block
                if let Err(e) = tokio::task::spawn_blocking(move || collect(&metrics)).await {
                    tracing::error!(error = %e, "Metric sampling panicked");
                }
            }
        }) {
            tracing::info!(interval_secs = self.interval.as_secs(), "Metrics collector started");
        }
    }

    pub async fn stop(&self) {
        self.task.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    /// Sample every metric once now.
    pub fn collect_now(&self) {
        collect(&self.metrics);
    }

    /// Copy of the retained points, oldest first.
    pub fn metric_data(&self, name: &str) -> Result<Vec<MetricPoint>, CollectorError> {
        let metric = self
            .metrics
            .read()
            .expect("metrics lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| CollectorError::MetricNotFound(name.to_string()))?;
        let points = metric.points.lock().expect("metric points lock poisoned");
        Ok(points.iter().copied().collect())
    }

    pub fn all_metrics(&self) -> BTreeMap<String, MetricSummary> {
        self.metrics
            .read()
            .expect("metrics lock poisoned")
            .iter()
            .map(|(name, metric)| {
                let points = metric.points.lock().expect("metric points lock poisoned");
                (
                    name.clone(),
                    MetricSummary {
                        description: metric.description.clone(),
                        unit: metric.unit.clone(),
                        latest: points.back().copied(),
                        points: points.len(),
                    },
                )
            })
            .collect()
    }
}

fn collect(metrics: &RwLock<BTreeMap<String, Arc<Metric>>>) {
    let snapshot: Vec<(String, Arc<Metric>)> = metrics
        .read()
        .expect("metrics lock poisoned")
        .iter()
        .map(|(name, metric)| (name.clone(), metric.clone()))
        .collect();

    for (name, metric) in snapshot {
        let value = (metric.sampler)();
        metric.push(MetricPoint {
            timestamp: SystemTime::now(),
            value,
        });
        metrics::record_sample(&name, value);
    }
}

/// Register the standard fleet gauges.
pub fn register_fleet_metrics(
    collector: &MetricsCollector,
    balancer: Arc<LoadBalancer>,
    breakers: Arc<BreakerRegistry>,
    max_points: usize,
) {
    let lb = balancer.clone();
    collector.add_metric(
        "active_nodes",
        "Nodes currently in rotation",
        "nodes",
        Arc::new(move || lb.active_nodes().len() as f64),
        max_points,
    );

    let lb = balancer.clone();
    collector.add_metric(
        "in_flight_requests",
        "Requests selected but not yet released",
        "requests",
        Arc::new(move || lb.cluster_status().in_flight_requests as f64),
        max_points,
    );

    let lb = balancer.clone();
    collector.add_metric(
        "avg_response_time",
        "Rolling mean response time",
        "microseconds",
        Arc::new(move || lb.stats().avg_response_time_us as f64),
        max_points,
    );

    let lb = balancer;
    collector.add_metric(
        "requests_per_second",
        "Completed requests per second",
        "requests/s",
        Arc::new(move || lb.stats().requests_per_second),
        max_points,
    );

    collector.add_metric(
        "open_breakers",
        "Circuit breakers in the open state",
        "breakers",
        Arc::new(move || breakers.open_count() as f64),
        max_points,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BreakersConfig;
    use crate::load_balancer::{Algorithm, NodeSpec};
    use std::sync::atomic::{AtomicU64, Ordering};

    fn counting_sampler() -> Sampler {
        let n = Arc::new(AtomicU64::new(0));
        Arc::new(move || n.fetch_add(1, Ordering::SeqCst) as f64)
    }

    #[tokio::test]
    async fn test_slow_sampler_does_not_stall_runtime() {
        let shutdown = crate::lifecycle::Shutdown::new();
        let collector = MetricsCollector::new(Duration::from_secs(60));
        collector.add_metric(
            "queue_depth",
            "depth read from a slow backend",
            "items",
            Arc::new(|| {
                std::thread::sleep(Duration::from_millis(300));
                7.0
            }),
            0,
        );

        collector.start(shutdown.subscribe());
        let started = std::time::Instant::now();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(started.elapsed() < Duration::from_millis(250));

        collector.stop().await;
        assert_eq!(collector.metric_data("queue_depth").unwrap()[0].value, 7.0);
    }

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let collector = MetricsCollector::new(Duration::from_secs(60));
        collector.add_metric("ticks", "tick counter", "count", counting_sampler(), 3);

        for _ in 0..5 {
            collector.collect_now();
        }

        let values: Vec<f64> = collector.metric_data("ticks").unwrap().iter().map(|p| p.value).collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_zero_max_points_uses_default() {
        let collector = MetricsCollector::new(Duration::from_secs(60));
        collector.add_metric("ticks", "tick counter", "count", counting_sampler(), 0);
        for _ in 0..(DEFAULT_MAX_POINTS + 5) {
            collector.collect_now();
        }
        assert_eq!(collector.metric_data("ticks").unwrap().len(), DEFAULT_MAX_POINTS);
    }

    #[test]
    fn test_metric_data_is_a_copy() {
        let collector = MetricsCollector::new(Duration::from_secs(60));
        collector.add_metric("ticks", "tick counter", "count", counting_sampler(), 10);
        collector.collect_now();

        let mut copy = collector.metric_data("ticks").unwrap();
        copy.clear();
        assert_eq!(collector.metric_data("ticks").unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_and_removed_metric() {
        let collector = MetricsCollector::new(Duration::from_secs(60));
        assert_eq!(
            collector.metric_data("nope"),
            Err(CollectorError::MetricNotFound("nope".into()))
        );

        collector.add_metric("ticks", "tick counter", "count", counting_sampler(), 10);
        assert!(collector.remove_metric("ticks"));
        assert!(!collector.remove_metric("ticks"));
        assert!(collector.metric_data("ticks").is_err());
    }

    #[test]
    fn test_fleet_metrics() {
        let lb = Arc::new(LoadBalancer::new(Algorithm::RoundRobin));
        lb.add_node(NodeSpec::new("a", "10.0.0.1", 80)).unwrap();
        lb.add_node(NodeSpec::new("b", "10.0.0.2", 80)).unwrap();
        let _lease = lb.acquire(None, None).unwrap();
        let breakers = Arc::new(BreakerRegistry::new(BreakersConfig::default()));

        let collector = MetricsCollector::new(Duration::from_secs(60));
        register_fleet_metrics(&collector, lb, breakers, 10);
        collector.collect_now();

        let all = collector.all_metrics();
        assert_eq!(all.len(), 5);
        assert_eq!(all["active_nodes"].latest.unwrap().value, 2.0);
        assert_eq!(all["in_flight_requests"].latest.unwrap().value, 1.0);
        assert_eq!(all["open_breakers"].latest.unwrap().value, 0.0);
        assert_eq!(all["active_nodes"].unit, "nodes");
    }

    #[tokio::test]
    async fn test_start_samples_immediately() {
        let shutdown = crate::lifecycle::Shutdown::new();
        let collector = MetricsCollector::new(Duration::from_secs(60));
        collector.add_metric("ticks", "tick counter", "count", counting_sampler(), 10);

        collector.start(shutdown.subscribe());
        tokio::time::sleep(Duration::from_millis(20)).await;
        collector.stop().await;
        assert_eq!(collector.metric_data("ticks").unwrap().len(), 1);
    }
}
