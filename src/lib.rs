//! Fleet resilience control plane.
//!
//! Node registry with pluggable load balancing, node health checking with
//! service discovery reconciliation, a load-driven auto-scaler, circuit
//! breakers, a service health monitor and a metrics collector.

// Core subsystems
pub mod config;
pub mod load_balancer;

// Fleet management
pub mod health;
pub mod scaling;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::FleetConfig;
pub use lifecycle::{ControlPlane, Shutdown};
pub use load_balancer::{Algorithm, LoadBalancer, LoadBalancerError, Node, NodeSpec};
pub use resilience::{BreakerError, BreakerState, CircuitBreaker};
