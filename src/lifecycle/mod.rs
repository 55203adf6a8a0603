//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Build registry, breakers, monitors → Start loops
//!
//! Background loops (task.rs):
//!     One PeriodicTask per timer-driven component
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Broadcast → Every loop exits → stop() returns
//! ```
//!
//! # Design Decisions
//! - Ordered startup: registry first, then health checks, then scaling
//! - Ordered shutdown: scaling first, so no node is requested mid-teardown
//! - Every loop also listens on the shared shutdown broadcast

pub mod shutdown;
pub mod startup;
pub mod task;

pub use shutdown::Shutdown;
pub use startup::{registry_callbacks, ControlPlane, PlaneStatus, StartupError};
pub use task::{notify_detached, PeriodicTask};
