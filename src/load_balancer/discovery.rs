//! Service discovery integration.
//!
//! # Responsibilities
//! - Define the provider interface the registry can be backed by
//! - Provide an in-process provider for static deployments and tests
//!
//! # Design Decisions
//! - Registration calls are synchronous and best-effort; the registry logs
//!   failures instead of rejecting the node
//! - Discovery and watching are async and must honour the shutdown signal

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::{broadcast, watch};

use crate::load_balancer::node::NodeSpec;

/// Callback invoked with the full node list whenever it changes.
pub type DiscoveryCallback = Arc<dyn Fn(Vec<NodeSpec>) + Send + Sync>;

/// Errors reported by discovery providers.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The discovery backend could not be reached.
    #[error("discovery backend unavailable: {0}")]
    Unavailable(String),

    /// The backend refused a registration or deregistration.
    #[error("discovery rejected node {id}: {reason}")]
    Rejected { id: String, reason: String },
}

/// External source of truth for which nodes exist.
pub trait ServiceDiscovery: Send + Sync {
    /// Announce a node.
    fn register_node(&self, node: &NodeSpec) -> Result<(), DiscoveryError>;

    /// Withdraw a node.
    fn deregister_node(&self, node_id: &str) -> Result<(), DiscoveryError>;

    /// Fetch the authoritative node list.
    fn discover_nodes(&self) -> BoxFuture<'_, Result<Vec<NodeSpec>, DiscoveryError>>;

    /// Deliver node list changes to `callback` until `shutdown` fires.
    fn watch_for_changes(
        &self,
        shutdown: broadcast::Receiver<()>,
        callback: DiscoveryCallback,
    ) -> BoxFuture<'_, ()>;
}

/// Process-local discovery provider.
#[derive(Debug)]
pub struct InMemoryDiscovery {
    nodes: RwLock<BTreeMap<String, NodeSpec>>,
    changes: watch::Sender<Vec<NodeSpec>>,
}

impl InMemoryDiscovery {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(Vec::new());
        Self {
            nodes: RwLock::new(BTreeMap::new()),
            changes,
        }
    }

    /// Create a provider that already knows `nodes`.
    pub fn with_nodes(nodes: impl IntoIterator<Item = NodeSpec>) -> Self {
        let discovery = Self::new();
        discovery.publish(nodes);
        discovery
    }

    /// Replace the whole node list.
    pub fn publish(&self, nodes: impl IntoIterator<Item = NodeSpec>) {
        let mut table = self.nodes.write().expect("discovery lock poisoned");
        *table = nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
        self.changes.send_replace(table.values().cloned().collect());
    }

    /// Current node list.
    pub fn list(&self) -> Vec<NodeSpec> {
        self.nodes
            .read()
            .expect("discovery lock poisoned")
            .values()
            .cloned()
            .collect()
    }
}

impl Default for InMemoryDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceDiscovery for InMemoryDiscovery {
    fn register_node(&self, node: &NodeSpec) -> Result<(), DiscoveryError> {
        let mut table = self.nodes.write().expect("discovery lock poisoned");
        table.insert(node.id.clone(), node.clone());
        self.changes.send_replace(table.values().cloned().collect());
        Ok(())
    }

    fn deregister_node(&self, node_id: &str) -> Result<(), DiscoveryError> {
        let mut table = self.nodes.write().expect("discovery lock poisoned");
        if table.remove(node_id).is_none() {
            return Err(DiscoveryError::Rejected {
                id: node_id.to_string(),
                reason: "not registered".to_string(),
            });
        }
        self.changes.send_replace(table.values().cloned().collect());
        Ok(())
    }

    fn discover_nodes(&self) -> BoxFuture<'_, Result<Vec<NodeSpec>, DiscoveryError>> {
        let nodes = self.list();
        async move { Ok(nodes) }.boxed()
    }

    fn watch_for_changes(
        &self,
        mut shutdown: broadcast::Receiver<()>,
        callback: DiscoveryCallback,
    ) -> BoxFuture<'_, ()> {
        let mut rx = self.changes.subscribe();
        async move {
            loop {
                tokio::select! {
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let nodes = rx.borrow_and_update().clone();
                        callback(nodes);
                    }
                    _ = shutdown.recv() => break,
                }
            }
            tracing::debug!("Discovery watch stopped");
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Shutdown;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_register_and_discover() {
        let discovery = InMemoryDiscovery::new();
        discovery
            .register_node(&NodeSpec::new("n1", "10.0.0.1", 7000))
            .unwrap();
        discovery
            .register_node(&NodeSpec::new("n2", "10.0.0.2", 7000))
            .unwrap();
        discovery.deregister_node("n1").unwrap();
        assert!(discovery.deregister_node("n1").is_err());

        let found = discovery.discover_nodes().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "n2");
    }

    #[tokio::test]
    async fn test_watch_delivers_changes() {
        let discovery = Arc::new(InMemoryDiscovery::new());
        let shutdown = Shutdown::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let watcher = {
            let discovery = discovery.clone();
            let receiver = shutdown.subscribe();
            tokio::spawn(async move {
                discovery
                    .watch_for_changes(
                        receiver,
                        Arc::new(move |nodes| {
                            let _ = tx.send(nodes.len());
                        }),
                    )
                    .await;
            })
        };

        // let the watcher subscribe before publishing
        tokio::time::sleep(Duration::from_millis(20)).await;
        discovery.publish(vec![
            NodeSpec::new("a", "10.0.0.1", 7000),
            NodeSpec::new("b", "10.0.0.2", 7000),
        ]);

        let seen = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(seen, Some(2));

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), watcher)
            .await
            .unwrap()
            .unwrap();
    }
}
