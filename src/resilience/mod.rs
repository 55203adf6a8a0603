//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a dependency (database, external interop API):
//!     → registry.rs (look up or create the named breaker)
//!     → circuit_breaker.rs (admit, run, record outcome)
//!     → On rejection: BreakerError::Open, operation never runs
//! ```
//!
//! # Design Decisions
//! - Circuit breaker prevents cascading failures
//! - Breakers are independent; one tripping never affects another
//! - Timeouts belong to the caller; the breaker only counts outcomes

pub mod circuit_breaker;
pub mod registry;

pub use circuit_breaker::{
    BreakerError, BreakerSnapshot, BreakerState, CircuitBreaker, TransitionCallback,
};
pub use registry::BreakerRegistry;
