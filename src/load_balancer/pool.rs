//! Node registry and load balancer.
//!
//! # Responsibilities
//! - Own the node table (the single copy of every node)
//! - Apply the configured algorithm to active, capable candidates
//! - Track load through select/release pairs
//! - Mirror registrations into the discovery provider, if any
//! - Reconcile the table against discovery results

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::broadcast;

use crate::load_balancer::{
    discovery::ServiceDiscovery,
    node::{Node, NodeLease, NodeSpec},
    stats::{LoadStats, LoadStatsSnapshot},
    types::{Algorithm, LoadBalancerError, LoadBalancerResult},
    Selector,
};
use crate::observability::metrics;

/// Cluster-wide summary for operator views.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterStatus {
    pub total_nodes: usize,
    pub active_nodes: usize,
    pub algorithm: Algorithm,
    pub in_flight_requests: u64,
    #[serde(flatten)]
    pub stats: LoadStatsSnapshot,
}

/// Serializable view of one node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeInfo {
    pub id: String,
    pub address: String,
    pub port: u16,
    pub weight: u32,
    pub is_active: bool,
    pub last_seen_ms_ago: u64,
    pub current_load: u32,
    pub avg_response_time_us: u64,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub capabilities: BTreeSet<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
}

impl From<&Node> for NodeInfo {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id.clone(),
            address: node.address.clone(),
            port: node.port,
            weight: node.weight,
            is_active: node.is_active(),
            last_seen_ms_ago: node.since_last_seen().as_millis() as u64,
            current_load: node.current_load(),
            avg_response_time_us: node.avg_response_time_us(),
            capabilities: node.capabilities().clone(),
            tags: node.tags(),
        }
    }
}

/// Outcome of one discovery reconciliation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: Vec<String>,
    pub pruned: Vec<String>,
}

/// Routes work across the registered nodes.
pub struct LoadBalancer {
    nodes: RwLock<BTreeMap<String, Arc<Node>>>,
    algorithm: Algorithm,
    selector: Box<dyn Selector>,
    stats: Arc<LoadStats>,
    discovery: Option<Arc<dyn ServiceDiscovery>>,
    next_seq: AtomicU64,
}

impl LoadBalancer {
    /// Create a load balancer without a discovery provider.
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            nodes: RwLock::new(BTreeMap::new()),
            algorithm,
            selector: algorithm.selector(),
            stats: Arc::new(LoadStats::new()),
            discovery: None,
            next_seq: AtomicU64::new(0),
        }
    }

    /// Create a load balancer backed by a discovery provider.
    pub fn with_discovery(algorithm: Algorithm, discovery: Arc<dyn ServiceDiscovery>) -> Self {
        Self {
            discovery: Some(discovery),
            ..Self::new(algorithm)
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn discovery(&self) -> Option<&Arc<dyn ServiceDiscovery>> {
        self.discovery.as_ref()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Arc<Node>>> {
        self.nodes.read().expect("node table lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Arc<Node>>> {
        self.nodes.write().expect("node table lock poisoned")
    }

    fn build_node(&self, spec: NodeSpec) -> Arc<Node> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        Arc::new(Node::from_spec(spec, seq))
    }

    // --- Registry ---

    /// Register a node. It starts active.
    ///
    /// An ID that is already registered is rejected with
    /// [`LoadBalancerError::DuplicateNode`]; in-flight selections stay
    /// bound to the registered entry until it is removed.
    pub fn add_node(&self, spec: NodeSpec) -> LoadBalancerResult<Arc<Node>> {
        spec.validate().map_err(LoadBalancerError::InvalidNode)?;

        let node = {
            let mut table = self.write();
            if table.contains_key(&spec.id) {
                return Err(LoadBalancerError::DuplicateNode(spec.id));
            }
            let node = self.build_node(spec.clone());
            table.insert(node.id.clone(), node.clone());
            node
        };

        tracing::info!(
            node = %node.id,
            endpoint = %node.endpoint(),
            weight = node.weight,
            capabilities = ?node.capabilities(),
            "Node added"
        );
        metrics::record_node_active(&node.id, true);

        if let Some(discovery) = &self.discovery {
            if let Err(e) = discovery.register_node(&spec) {
                tracing::warn!(node = %spec.id, error = %e, "Failed to register node with service discovery");
            }
        }

        Ok(node)
    }

    /// Remove a node.
    pub fn remove_node(&self, node_id: &str) -> LoadBalancerResult<Arc<Node>> {
        let removed = self
            .write()
            .remove(node_id)
            .ok_or_else(|| LoadBalancerError::NodeNotFound(node_id.to_string()))?;

        if let Some(discovery) = &self.discovery {
            if let Err(e) = discovery.deregister_node(node_id) {
                tracing::warn!(node = %node_id, error = %e, "Failed to deregister node from service discovery");
            }
        }

        tracing::info!(node = %node_id, in_flight = removed.current_load(), "Node removed");
        metrics::record_node_active(node_id, false);
        Ok(removed)
    }

    /// Snapshot of the node table.
    pub fn nodes(&self) -> BTreeMap<String, Arc<Node>> {
        self.read().clone()
    }

    pub fn node(&self, node_id: &str) -> Option<Arc<Node>> {
        self.read().get(node_id).cloned()
    }

    /// Active nodes, ordered by ID.
    pub fn active_nodes(&self) -> Vec<Arc<Node>> {
        self.read().values().filter(|n| n.is_active()).cloned().collect()
    }

    // --- Selection ---

    /// Pick a node for a request and count it as in flight.
    ///
    /// Every successful call must be paired with exactly one
    /// [`release_node`](Self::release_node).
    pub fn next_node(
        &self,
        client_addr: Option<&str>,
        capability: Option<&str>,
    ) -> LoadBalancerResult<Arc<Node>> {
        let table = self.read();
        let candidates: Vec<Arc<Node>> = table
            .values()
            .filter(|n| n.is_active() && n.supports(capability))
            .cloned()
            .collect();

        let unavailable = || {
            metrics::record_selection_failure(capability.unwrap_or("any"));
            LoadBalancerError::NoNodesAvailable {
                capability: capability.filter(|c| !c.is_empty()).map(str::to_string),
            }
        };

        if candidates.is_empty() {
            tracing::debug!(capability = ?capability, node_count = table.len(), "No active nodes match request");
            return Err(unavailable());
        }

        let node = self
            .selector
            .next_node(&candidates, client_addr)
            .ok_or_else(unavailable)?;
        node.inc_load();
        Ok(node)
    }

    /// Like [`next_node`](Self::next_node), but the returned lease enforces
    /// a single release.
    pub fn acquire(
        &self,
        client_addr: Option<&str>,
        capability: Option<&str>,
    ) -> LoadBalancerResult<NodeLease> {
        let node = self.next_node(client_addr, capability)?;
        Ok(NodeLease::new(node, self.stats.clone()))
    }

    /// Return a node selected by [`next_node`](Self::next_node).
    pub fn release_node(&self, node_id: &str, elapsed: Duration, success: bool) {
        let Some(node) = self.node(node_id) else {
            tracing::debug!(node = %node_id, "Release for unknown node ignored");
            return;
        };

        if !node.dec_load() {
            tracing::warn!(node = %node_id, "Release without matching selection ignored");
            return;
        }
        node.record_response_time(elapsed);
        self.stats.record(elapsed, success);
    }

    pub fn stats(&self) -> LoadStatsSnapshot {
        self.stats.snapshot()
    }

    // --- Administration ---

    pub fn cluster_status(&self) -> ClusterStatus {
        let table = self.read();
        ClusterStatus {
            total_nodes: table.len(),
            active_nodes: table.values().filter(|n| n.is_active()).count(),
            algorithm: self.algorithm,
            in_flight_requests: table.values().map(|n| n.current_load() as u64).sum(),
            stats: self.stats.snapshot(),
        }
    }

    pub fn node_list(&self) -> Vec<NodeInfo> {
        self.read().values().map(|n| NodeInfo::from(n.as_ref())).collect()
    }

    /// Force a node in or out of rotation.
    pub fn set_node_active(&self, node_id: &str, active: bool) -> LoadBalancerResult<()> {
        let table = self.write();
        let node = table
            .get(node_id)
            .ok_or_else(|| LoadBalancerError::NodeNotFound(node_id.to_string()))?;
        if node.set_active(active) != active {
            tracing::info!(node = %node_id, active, "Node activation changed");
            metrics::record_node_active(node_id, active);
        }
        Ok(())
    }

    /// Replace a node's tags.
    pub fn set_node_tags(
        &self,
        node_id: &str,
        tags: HashMap<String, String>,
    ) -> LoadBalancerResult<()> {
        let table = self.write();
        let node = table
            .get(node_id)
            .ok_or_else(|| LoadBalancerError::NodeNotFound(node_id.to_string()))?;
        node.set_tags(tags);
        Ok(())
    }

    // --- Health checker hooks ---

    /// Write probe outcomes back. Nodes removed meanwhile are skipped.
    pub(crate) fn apply_probe_results(&self, results: Vec<(Arc<Node>, bool)>) {
        let table = self.write();
        for (node, healthy) in results {
            let Some(current) = table.get(&node.id) else {
                continue;
            };
            if !Arc::ptr_eq(current, &node) {
                continue;
            }
            let was_active = node.record_probe(healthy);
            if was_active != healthy {
                if healthy {
                    tracing::info!(node = %node.id, "Node recovered, back in rotation");
                } else {
                    tracing::warn!(node = %node.id, load = node.current_load(), "Node failed health check, removed from rotation");
                }
                metrics::record_node_active(&node.id, healthy);
            }
        }
    }

    /// Adopt nodes present in `discovered` and prune nodes that have been
    /// missing from more than `max_misses` consecutive rounds.
    pub(crate) fn reconcile(&self, discovered: Vec<NodeSpec>, max_misses: u32) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut table = self.write();

        let mut seen = BTreeSet::new();
        for spec in discovered {
            seen.insert(spec.id.clone());
            if let Some(node) = table.get(&spec.id) {
                node.seen_in_discovery();
                continue;
            }
            if let Err(reason) = spec.validate() {
                tracing::warn!(node = %spec.id, %reason, "Ignoring invalid discovered node");
                continue;
            }
            let node = self.build_node(spec);
            report.added.push(node.id.clone());
            table.insert(node.id.clone(), node);
        }

        table.retain(|id, node| {
            if seen.contains(id) {
                return true;
            }
            if node.missed_in_discovery() > max_misses {
                report.pruned.push(id.clone());
                return false;
            }
            true
        });
        drop(table);

        for id in &report.added {
            tracing::info!(node = %id, "Node adopted from service discovery");
            metrics::record_node_active(id, true);
        }
        for id in &report.pruned {
            tracing::info!(node = %id, "Node pruned, absent from service discovery");
            metrics::record_node_active(id, false);
        }
        report
    }

    /// Add nodes announced by the discovery watch stream until shutdown.
    pub async fn follow_discovery(self: &Arc<Self>, shutdown: broadcast::Receiver<()>) {
        let Some(discovery) = self.discovery.clone() else {
            return;
        };
        let lb = Arc::clone(self);
        discovery
            .watch_for_changes(
                shutdown,
                Arc::new(move |specs: Vec<NodeSpec>| {
                    let mut table = lb.write();
                    for spec in specs {
                        if table.contains_key(&spec.id) || spec.validate().is_err() {
                            continue;
                        }
                        let node = lb.build_node(spec);
                        tracing::info!(node = %node.id, "Node announced by service discovery");
                        table.insert(node.id.clone(), node);
                    }
                }),
            )
            .await;
    }
}
