//! Node abstraction.
//!
//! # Responsibilities
//! - Represent a single backend processing node
//! - Track in-flight requests (current load) without taking the registry lock
//! - Keep a bounded history of recent response times
//! - Carry the active flag and last-seen timestamp written by the health checker

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use crate::load_balancer::stats::LoadStats;

/// Number of response times retained per node.
pub const RESPONSE_HISTORY_LEN: usize = 100;

/// Plain description of a node, as supplied by callers, configuration
/// files and discovery providers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NodeSpec {
    /// Unique node identifier.
    pub id: String,

    /// Host name or IP address.
    pub address: String,

    /// Service port.
    pub port: u16,

    /// Relative weight for weighted round-robin (default: 1).
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Capabilities this node can serve (e.g. "identity", "document").
    #[serde(default)]
    pub capabilities: BTreeSet<String>,

    /// Free-form tags such as region or environment.
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

fn default_weight() -> u32 {
    1
}

impl NodeSpec {
    /// Create a spec with weight 1 and no capabilities.
    pub fn new(id: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            port,
            weight: default_weight(),
            capabilities: BTreeSet::new(),
            tags: HashMap::new(),
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Check the fields the registry relies on.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("node ID cannot be empty".to_string());
        }
        if self.address.trim().is_empty() {
            return Err(format!("node {} has an empty address", self.id));
        }
        if self.port == 0 {
            return Err(format!("node {} has an invalid port number", self.id));
        }
        Ok(())
    }
}

/// A live registry entry.
#[derive(Debug)]
pub struct Node {
    /// Unique node identifier.
    pub id: String,
    /// Host name or IP address.
    pub address: String,
    /// Service port.
    pub port: u16,
    /// Relative selection weight.
    pub weight: u32,
    /// Registration order; higher is newer.
    pub seq: u64,

    capabilities: BTreeSet<String>,
    tags: RwLock<HashMap<String, String>>,

    active: AtomicBool,
    last_seen: Mutex<Instant>,
    current_load: AtomicU32,
    response_times: Mutex<VecDeque<Duration>>,
    /// Consecutive discovery rounds this node was missing from.
    discovery_misses: AtomicU32,
    /// Consecutive probe failures, kept for operator snapshots.
    probe_failures: AtomicU64,
}

impl Node {
    /// Build a registry entry from a spec. New nodes start active.
    pub fn from_spec(spec: NodeSpec, seq: u64) -> Self {
        Self {
            id: spec.id,
            address: spec.address,
            port: spec.port,
            weight: spec.weight,
            seq,
            capabilities: spec.capabilities,
            tags: RwLock::new(spec.tags),
            active: AtomicBool::new(true),
            last_seen: Mutex::new(Instant::now()),
            current_load: AtomicU32::new(0),
            response_times: Mutex::new(VecDeque::with_capacity(RESPONSE_HISTORY_LEN)),
            discovery_misses: AtomicU32::new(0),
            probe_failures: AtomicU64::new(0),
        }
    }

    /// `address:port`, suitable for connecting.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// Whether this node advertises the capability. `None` matches any node.
    pub fn supports(&self, capability: Option<&str>) -> bool {
        match capability {
            None | Some("") => true,
            Some(cap) => self.capabilities.contains(cap),
        }
    }

    pub fn capabilities(&self) -> &BTreeSet<String> {
        &self.capabilities
    }

    pub fn tags(&self) -> HashMap<String, String> {
        self.tags.read().expect("node tags lock poisoned").clone()
    }

    pub(crate) fn set_tags(&self, tags: HashMap<String, String>) {
        *self.tags.write().expect("node tags lock poisoned") = tags;
    }

    // --- Health state ---

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Flip the active flag. Callers hold the registry write lock.
    pub(crate) fn set_active(&self, active: bool) -> bool {
        self.active.swap(active, Ordering::AcqRel)
    }

    /// Record a probe outcome. Returns the previous active flag.
    pub(crate) fn record_probe(&self, healthy: bool) -> bool {
        if healthy {
            self.probe_failures.store(0, Ordering::Relaxed);
            self.touch();
        } else {
            self.probe_failures.fetch_add(1, Ordering::Relaxed);
        }
        self.set_active(healthy)
    }

    pub fn probe_failures(&self) -> u64 {
        self.probe_failures.load(Ordering::Relaxed)
    }

    pub(crate) fn touch(&self) {
        *self.last_seen.lock().expect("node last_seen lock poisoned") = Instant::now();
    }

    /// Time since the node was last seen alive.
    pub fn since_last_seen(&self) -> Duration {
        self.last_seen
            .lock()
            .expect("node last_seen lock poisoned")
            .elapsed()
    }

    pub(crate) fn seen_in_discovery(&self) {
        self.discovery_misses.store(0, Ordering::Relaxed);
    }

    /// Count one discovery round without this node. Returns the new count.
    pub(crate) fn missed_in_discovery(&self) -> u32 {
        self.discovery_misses.fetch_add(1, Ordering::Relaxed) + 1
    }

    // --- Load tracking ---

    /// Current number of in-flight requests.
    pub fn current_load(&self) -> u32 {
        self.current_load.load(Ordering::Relaxed)
    }

    pub(crate) fn inc_load(&self) {
        self.current_load.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement the in-flight count. Returns `false` if it was already zero.
    pub(crate) fn dec_load(&self) -> bool {
        self.current_load
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |load| load.checked_sub(1))
            .is_ok()
    }

    pub(crate) fn record_response_time(&self, elapsed: Duration) {
        let mut history = self
            .response_times
            .lock()
            .expect("node response_times lock poisoned");
        if history.len() == RESPONSE_HISTORY_LEN {
            history.pop_front();
        }
        history.push_back(elapsed);
    }

    /// Recent response times, oldest first.
    pub fn response_times(&self) -> Vec<Duration> {
        self.response_times
            .lock()
            .expect("node response_times lock poisoned")
            .iter()
            .copied()
            .collect()
    }

    /// Mean of the retained response times, in microseconds.
    pub fn avg_response_time_us(&self) -> u64 {
        let history = self
            .response_times
            .lock()
            .expect("node response_times lock poisoned");
        if history.is_empty() {
            return 0;
        }
        let total: u128 = history.iter().map(|d| d.as_micros()).sum();
        (total / history.len() as u128) as u64
    }
}

/// A selected node whose load slot is returned exactly once.
///
/// `release` records the outcome; dropping an unreleased lease only gives
/// the load slot back.
#[derive(Debug)]
pub struct NodeLease {
    node: Arc<Node>,
    stats: Arc<LoadStats>,
    released: bool,
}

impl NodeLease {
    pub(crate) fn new(node: Arc<Node>, stats: Arc<LoadStats>) -> Self {
        Self {
            node,
            stats,
            released: false,
        }
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Return the node and fold the request outcome into the statistics.
    pub fn release(mut self, elapsed: Duration, success: bool) {
        self.released = true;
        if !self.node.dec_load() {
            tracing::warn!(node = %self.node.id, "lease released with zero load");
        }
        self.node.record_response_time(elapsed);
        self.stats.record(elapsed, success);
    }
}

impl Deref for NodeLease {
    type Target = Node;
    fn deref(&self) -> &Self::Target {
        &self.node
    }
}

impl Drop for NodeLease {
    fn drop(&mut self) {
        if !self.released {
            self.node.dec_load();
        }
    }
}
