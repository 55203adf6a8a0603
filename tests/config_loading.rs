//! Loading configuration files from disk.

use std::fs;
use std::path::PathBuf;

use fleet_plane::config::{load_config, ConfigError, ProbeKind};
use fleet_plane::Algorithm;

struct TempConfig(PathBuf);

impl TempConfig {
    fn write(name: &str, content: &str) -> Self {
        let path = std::env::temp_dir().join(format!("fleet-plane-{}-{name}.toml", std::process::id()));
        fs::write(&path, content).unwrap();
        Self(path)
    }
}

impl Drop for TempConfig {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.0);
    }
}

#[test]
fn test_load_full_config() {
    let file = TempConfig::write(
        "full",
        r#"
        [cluster]
        min_nodes = 2
        max_nodes = 8
        algorithm = "least-connections"

        [[cluster.nodes]]
        id = "identity-1"
        address = "10.0.1.10"
        port = 7000
        capabilities = ["identity"]
        tags = { region = "eu-west" }

        [[cluster.nodes]]
        id = "document-1"
        address = "10.0.1.11"
        port = 7000
        weight = 4

        [health_check]
        interval_secs = 10
        probe = "http"
        path = "/ready"

        [autoscaler]
        target_load_ratio = 0.6
        removal_policy = "least-loaded"

        [breakers.ehr]
        failure_threshold = 3
        reset_timeout_ms = 1000

        [observability]
        json_logs = true
        metrics_enabled = false
        "#,
    );

    let config = load_config(&file.0).unwrap();
    assert_eq!(config.cluster.algorithm, Algorithm::LeastConnections);
    assert_eq!(config.cluster.nodes.len(), 2);
    assert_eq!(config.cluster.nodes[0].tags["region"], "eu-west");
    assert_eq!(config.cluster.nodes[1].weight, 4);
    assert_eq!(config.health_check.probe, ProbeKind::Http);
    assert_eq!(config.health_check.path, "/ready");
    assert_eq!(config.breakers.for_name("ehr").failure_threshold, 3);
    assert_eq!(config.breakers.for_name("database").failure_threshold, 5);
    assert!(config.observability.json_logs);
}

#[test]
fn test_unknown_algorithm_falls_back() {
    let file = TempConfig::write("algo", "[cluster]\nalgorithm = \"fastest\"\n");
    let config = load_config(&file.0).unwrap();
    assert_eq!(config.cluster.algorithm, Algorithm::RoundRobin);
}

#[test]
fn test_invalid_config_rejected() {
    let file = TempConfig::write(
        "invalid",
        r#"
        [health_check]
        interval_secs = 0

        [[cluster.nodes]]
        id = "n1"
        address = "10.0.0.1"
        port = 0
        "#,
    );

    match load_config(&file.0) {
        Err(ConfigError::Validation(errors)) => {
            let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
            assert_eq!(fields, vec!["cluster.nodes[0]", "health_check.interval_secs"]);
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
}
