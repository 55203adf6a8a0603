//! Selection properties that hold across algorithms.

mod common;

use std::collections::HashMap;
use std::time::Duration;

use common::{balancer, spec, ALL_ALGORITHMS};
use fleet_plane::{Algorithm, LoadBalancerError, NodeSpec};

#[test]
fn test_unadvertised_capability_is_unavailable_under_every_algorithm() {
    for algorithm in ALL_ALGORITHMS {
        let lb = balancer(
            algorithm,
            [spec("a", &["identity"]), spec("b", &["document"])],
        );

        let err = lb.next_node(Some("10.1.1.1"), Some("imaging")).unwrap_err();
        assert_eq!(
            err,
            LoadBalancerError::NoNodesAvailable {
                capability: Some("imaging".to_string())
            },
            "{algorithm}"
        );
        assert!(err.is_retryable());

        let node = lb.next_node(Some("10.1.1.1"), Some("document")).unwrap();
        assert_eq!(node.id, "b", "{algorithm}");
    }
}

#[test]
fn test_no_active_nodes_is_unavailable() {
    for algorithm in ALL_ALGORITHMS {
        let lb = balancer(algorithm, [spec("a", &[])]);
        lb.set_node_active("a", false).unwrap();
        assert!(matches!(
            lb.next_node(None, None),
            Err(LoadBalancerError::NoNodesAvailable { capability: None })
        ));
    }
}

#[test]
fn test_round_robin_cyclic_fairness() {
    let lb = balancer(
        Algorithm::RoundRobin,
        ["c", "a", "d", "b"].map(|id| spec(id, &[])),
    );

    for _ in 0..5 {
        let mut window: Vec<String> = (0..4).map(|_| lb.next_node(None, None).unwrap().id.clone()).collect();
        window.sort();
        assert_eq!(window, vec!["a", "b", "c", "d"]);
    }
}

#[test]
fn test_weighted_ratio() {
    let lb = balancer(
        Algorithm::WeightedRoundRobin,
        [
            NodeSpec::new("light", "127.0.0.1", 8080).with_weight(10),
            NodeSpec::new("heavy", "127.0.0.1", 8081).with_weight(90),
        ],
    );

    let mut counts: HashMap<String, usize> = HashMap::new();
    for _ in 0..10_000 {
        let node = lb.next_node(None, None).unwrap();
        *counts.entry(node.id.clone()).or_default() += 1;
        lb.release_node(&node.id, Duration::from_millis(1), true);
    }

    assert_eq!(counts["light"], 1_000);
    assert_eq!(counts["heavy"], 9_000);
}

#[test]
fn test_ip_hash_affinity() {
    let lb = balancer(Algorithm::IpHash, ["a", "b", "c"].map(|id| spec(id, &[])));
    let first = lb.next_node(Some("192.168.1.20"), None).unwrap().id.clone();
    for _ in 0..10 {
        assert_eq!(lb.next_node(Some("192.168.1.20"), None).unwrap().id, first);
    }
}

#[test]
fn test_release_is_inverse_of_selection() {
    for algorithm in ALL_ALGORITHMS {
        let lb = balancer(algorithm, ["a", "b", "c"].map(|id| spec(id, &[])));
        let before: Vec<u32> = lb.nodes().values().map(|n| n.current_load()).collect();

        let selected: Vec<_> = (0..25)
            .map(|i| lb.next_node(Some(&format!("10.0.0.{i}")), None).unwrap())
            .collect();
        for node in &selected {
            lb.release_node(&node.id, Duration::from_millis(5), true);
        }

        let after: Vec<u32> = lb.nodes().values().map(|n| n.current_load()).collect();
        assert_eq!(before, after, "{algorithm}");
        assert_eq!(lb.stats().total_requests, 25);
    }
}

#[test]
fn test_lease_release_and_drop() {
    let lb = balancer(Algorithm::RoundRobin, [spec("a", &[])]);

    let lease = lb.acquire(None, None).unwrap();
    assert_eq!(lease.current_load(), 1);
    lease.release(Duration::from_millis(3), false);

    let node = lb.node("a").unwrap();
    assert_eq!(node.current_load(), 0);
    assert_eq!(lb.stats().failed_requests, 1);

    {
        let _lease = lb.acquire(None, None).unwrap();
        assert_eq!(node.current_load(), 1);
    }
    assert_eq!(node.current_load(), 0);
    assert_eq!(lb.stats().total_requests, 1);
}

#[test]
fn test_least_connections_prefers_released_node() {
    let lb = balancer(
        Algorithm::LeastConnections,
        [
            NodeSpec::new("a", "127.0.0.1", 8080).with_weight(100),
            NodeSpec::new("b", "127.0.0.1", 8081).with_weight(100),
        ],
    );

    // hold one request on b so the nodes are not tied
    let first = lb.next_node(None, None).unwrap();
    assert_eq!(first.id, "a");
    let held = lb.next_node(None, None).unwrap();
    assert_eq!(held.id, "b");
    lb.release_node("a", Duration::from_millis(2), true);

    for _ in 0..5 {
        let node = lb.next_node(None, None).unwrap();
        if node.id == "a" {
            lb.release_node("a", Duration::from_millis(2), true);
        }
    }

    assert_eq!(lb.node("a").unwrap().current_load(), 0);
    assert_eq!(lb.node("b").unwrap().current_load(), 1);
    assert_eq!(lb.next_node(None, None).unwrap().id, "a");
}

#[test]
fn test_cluster_administration() {
    let lb = balancer(Algorithm::RoundRobin, [spec("a", &["identity"]), spec("b", &[])]);

    lb.set_node_active("b", false).unwrap();
    let status = lb.cluster_status();
    assert_eq!(status.total_nodes, 2);
    assert_eq!(status.active_nodes, 1);

    lb.set_node_tags("a", HashMap::from([("region".to_string(), "eu-west".to_string())]))
        .unwrap();
    let list = lb.node_list();
    assert_eq!(list[0].tags["region"], "eu-west");
    assert!(!list[1].is_active);

    assert_eq!(
        lb.set_node_active("zz", true),
        Err(LoadBalancerError::NodeNotFound("zz".to_string()))
    );
    assert!(matches!(lb.remove_node("zz"), Err(LoadBalancerError::NodeNotFound(_))));

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["algorithm"], "round-robin");
    assert_eq!(json["total_requests"], 0);
}
