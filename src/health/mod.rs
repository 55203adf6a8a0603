//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Node health checks (active.rs):
//!     Periodic timer
//!     → Probe every node concurrently (probe.rs)
//!     → Write active flag / last-seen back into the registry
//!     → Reconcile with service discovery, prune long-missing nodes
//!
//! Service health (monitor.rs):
//!     Periodic timer
//!     → Run named checks registered by services
//!     → Aggregate over critical checks
//!     → Notify listeners on change
//! ```
//!
//! # Design Decisions
//! - Node health is binary per tick; thresholds live in the probe
//! - Service health is per-check, aggregated only over critical checks
//! - Neither loop stops on a failed probe or discovery error

pub mod active;
pub mod monitor;
pub mod probe;

pub use active::NodeHealthChecker;
pub use monitor::{CheckStatus, HealthListener, HealthProbe, HealthReport, ServiceHealthMonitor};
pub use probe::{HttpProbe, LoadProbe, NodeProbe};
