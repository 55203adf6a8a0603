//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters and gauges through the metrics facade)
//!
//! collector.rs samples registered functions on an interval:
//!     → bounded in-process time series (operator snapshots)
//!     → metrics.rs (latest sample as a gauge)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Metrics are cheap (atomic increments)
//! - Time series are bounded per metric, oldest point evicted first

pub mod collector;
pub mod logging;
pub mod metrics;

pub use collector::{register_fleet_metrics, CollectorError, MetricPoint, MetricSummary, MetricsCollector, Sampler};
