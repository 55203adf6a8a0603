//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → FleetConfig (validated, immutable)
//!     → lifecycle::startup builds every component from it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AutoscalerConfig, BreakerConfig, BreakersConfig, ClusterConfig, DiscoveryConfig,
    FleetConfig, HealthCheckConfig, MonitorConfig, ObservabilityConfig, ProbeKind,
};
pub use validation::ValidationError;
