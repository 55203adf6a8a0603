//! Health checking, discovery and scaling wired together.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{balancer, start_mock_backend};
use fleet_plane::config::{AutoscalerConfig, FleetConfig};
use fleet_plane::health::{HttpProbe, NodeHealthChecker, ServiceHealthMonitor};
use fleet_plane::lifecycle::{registry_callbacks, ControlPlane, Shutdown};
use fleet_plane::scaling::{AutoScaler, ScaleCallbacks, ScaleDecision};
use fleet_plane::{Algorithm, NodeSpec};

#[tokio::test]
async fn test_http_probe_flips_nodes() {
    let up = start_mock_backend(200).await;
    let down = start_mock_backend(503).await;

    let lb = balancer(
        Algorithm::RoundRobin,
        [
            NodeSpec::new("up", up.ip().to_string(), up.port()),
            NodeSpec::new("down", down.ip().to_string(), down.port()),
        ],
    );
    let checker = NodeHealthChecker::new(
        lb.clone(),
        Duration::from_secs(30),
        Arc::new(HttpProbe::new("/health", Duration::from_secs(1))),
    );

    checker.check_now().await;

    assert!(lb.node("up").unwrap().is_active());
    assert!(!lb.node("down").unwrap().is_active());
    for _ in 0..4 {
        assert_eq!(lb.next_node(None, None).unwrap().id, "up");
    }
}

#[tokio::test]
async fn test_discovery_end_to_end() {
    let mut config = FleetConfig::default();
    config.discovery.enabled = true;
    config.autoscaler.enabled = false;
    config.health_check.interval_secs = 1;
    config.cluster.nodes = vec![NodeSpec::new("seed", "10.0.0.1", 8080)];

    let shutdown = Shutdown::new();
    let plane = ControlPlane::from_config(config, registry_callbacks).unwrap();
    plane.start(&shutdown);

    let discovery = plane.discovery().unwrap().clone();
    // let the watcher subscribe before publishing
    tokio::time::sleep(Duration::from_millis(20)).await;
    discovery.publish([
        NodeSpec::new("seed", "10.0.0.1", 8080),
        NodeSpec::new("late", "10.0.0.2", 8080),
    ]);

    // the watch stream announces the new node without waiting for a tick
    let mut adopted = false;
    for _ in 0..50 {
        if plane.balancer().node("late").is_some() {
            adopted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(adopted);

    shutdown.trigger();
    plane.stop().await;
    assert!(!plane.health_checker().is_running());
}

#[test]
fn test_autoscaler_stays_within_bounds() {
    let requested = Arc::new(Mutex::new(Vec::new()));
    let log = requested.clone();
    let callbacks = ScaleCallbacks {
        scale_up: Arc::new(move |n| {
            log.lock().unwrap().push(n);
            Ok(())
        }),
        scale_down: Arc::new(|_| Ok(())),
    };

    let lb = balancer(
        Algorithm::RoundRobin,
        ["a", "b"].map(|id| NodeSpec::new(id, "10.0.0.1", 8080)),
    );
    // saturate both nodes
    let leases: Vec<_> = (0..200).map(|_| lb.acquire(None, None).unwrap()).collect();

    let config = AutoscalerConfig {
        target_load_ratio: 0.5,
        cooldown_secs: 3600,
        ..Default::default()
    };
    let scaler = AutoScaler::new(lb.clone(), 1, 4, &config, callbacks);

    assert_eq!(
        scaler.check_and_scale(),
        ScaleDecision::ScaleUp { count: 2, from: 2, to: 4 }
    );
    assert_eq!(scaler.check_and_scale(), ScaleDecision::Hold { reason: "cooldown" });
    assert_eq!(*requested.lock().unwrap(), vec![2]);
    drop(leases);
}

#[tokio::test]
async fn test_monitor_critical_and_optional_checks() {
    let monitor = ServiceHealthMonitor::new(Duration::from_secs(30));
    monitor.add_check("database", "primary store", Arc::new(|| (true, "ok".into())), true);
    monitor.add_check("cache", "read cache", Arc::new(|| (false, "evicting".into())), false);

    monitor.evaluate_now();
    assert!(monitor.is_healthy());

    monitor.add_check("interop", "external interop API", Arc::new(|| (false, "502".into())), true);
    monitor.evaluate_now();
    let report = monitor.health_status();
    assert!(!report.healthy);
    assert_eq!(report.checks["interop"].message, "502");

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["healthy"], false);
    assert_eq!(json["checks"]["cache"]["critical"], false);
}
