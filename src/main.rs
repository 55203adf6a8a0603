//! fleetd: fleet resilience control plane daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!   Request router (embedding backend)
//!        │ next_node / release_node
//!        ▼
//!  ┌───────────────┐   probes    ┌──────────────────┐   discover   ┌───────────┐
//!  │ load_balancer │◀────────────│ health checker   │─────────────▶│ discovery │
//!  │ node registry │             └──────────────────┘              └───────────┘
//!  └──────┬────────┘
//!         │ load                 ┌──────────────────┐   scale_up / scale_down
//!         └─────────────────────▶│   autoscaler     │──────────────────────────▶ provisioner
//!                                └──────────────────┘
//!
//!  resilience: named circuit breakers around database / interop calls
//!  health monitor: named service checks, aggregate over critical ones
//!  observability: tracing logs, metrics collector, Prometheus exporter
//! ```

use clap::Parser;
use std::path::PathBuf;

use fleet_plane::config::{load_config, FleetConfig};
use fleet_plane::lifecycle::{registry_callbacks, ControlPlane, Shutdown};
use fleet_plane::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "fleetd")]
#[command(about = "Fleet resilience control plane", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => FleetConfig::default(),
    };

    if cli.check {
        println!("configuration ok");
        return Ok(());
    }

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "fleetd starting");

    tracing::info!(
        min_nodes = config.cluster.min_nodes,
        max_nodes = config.cluster.max_nodes,
        algorithm = %config.cluster.algorithm,
        static_nodes = config.cluster.nodes.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let plane = ControlPlane::from_config(config, registry_callbacks)?;
    let shutdown = Shutdown::new();
    plane.start(&shutdown);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Interrupt received, shutting down");
    shutdown.trigger();
    plane.stop().await;

    println!("{}", serde_json::to_string_pretty(&plane.status())?);
    tracing::info!("Shutdown complete");
    Ok(())
}
