//! Auto-scaling subsystem.
//!
//! # Data Flow
//! ```text
//! Periodic timer
//!     → autoscaler.rs (read active nodes and their load from the registry)
//!     → ScaleDecision (hold, scale up by N, scale down these IDs)
//!     → policy.rs (choose scale-down victims)
//!     → provisioning callbacks supplied by the embedding backend
//! ```
//!
//! # Design Decisions
//! - The decision is computed separately from acting on it
//! - Only a successful provisioning call starts the cooldown
//! - The scaler never asks for a count outside [min_nodes, max_nodes]

pub mod autoscaler;
pub mod policy;

pub use autoscaler::{AutoScaler, ScaleCallbacks, ScaleDecision, ScaleDownFn, ScaleResult, ScaleUpFn};
pub use policy::{removal_policy_from_name, LeastLoaded, Lifo, RandomRemoval, RemovalPolicy};
