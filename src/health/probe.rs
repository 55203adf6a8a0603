//! Node probes.
//!
//! A probe answers one question per node per tick: should this node stay
//! in rotation?

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use axum::body::Body;
use axum::http::Request;
use std::time::Duration;
use tokio::time;

use crate::load_balancer::Node;

/// Default in-flight ceiling for [`LoadProbe`].
pub const DEFAULT_LOAD_CEILING: u32 = 100;

/// Decides whether a node is healthy.
pub trait NodeProbe: Send + Sync {
    fn probe<'a>(&'a self, node: &'a Node) -> BoxFuture<'a, bool>;
}

/// Healthy while the node's in-flight count stays at or below a ceiling.
#[derive(Debug, Clone, Copy)]
pub struct LoadProbe {
    max_load: u32,
}

impl LoadProbe {
    pub fn new(max_load: u32) -> Self {
        Self { max_load }
    }
}

impl Default for LoadProbe {
    fn default() -> Self {
        Self::new(DEFAULT_LOAD_CEILING)
    }
}

impl NodeProbe for LoadProbe {
    fn probe<'a>(&'a self, node: &'a Node) -> BoxFuture<'a, bool> {
        let load = node.current_load();
        let healthy = load <= self.max_load;
        if !healthy {
            tracing::debug!(node = %node.id, load, ceiling = self.max_load, "Node over load ceiling");
        }
        futures_util::future::ready(healthy).boxed()
    }
}

/// GET `http://address:port/path`; healthy on any 2xx within the timeout.
pub struct HttpProbe {
    client: Client<HttpConnector, Body>,
    path: String,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(path: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Self {
            client,
            path: path.into(),
            timeout,
        }
    }

    async fn check(&self, node: &Node) -> bool {
        let uri_string = format!("http://{}{}", node.endpoint(), self.path);

        let request = match Request::builder()
            .method("GET")
            .uri(uri_string.as_str())
            .header("user-agent", "fleetd-health-check")
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => {
                tracing::error!(node = %node.id, uri = %uri_string, error = %e, "Failed to build health check request");
                return false;
            }
        };

        match time::timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) => {
                let success = response.status().is_success();
                if !success {
                    tracing::warn!(node = %node.id, status = %response.status(), "Health check failed: non-success status");
                }
                success
            }
            Ok(Err(e)) => {
                tracing::warn!(node = %node.id, error = %e, "Health check failed: connection error");
                false
            }
            Err(_) => {
                tracing::warn!(node = %node.id, timeout_ms = self.timeout.as_millis() as u64, "Health check failed: timeout");
                false
            }
        }
    }
}

impl NodeProbe for HttpProbe {
    fn probe<'a>(&'a self, node: &'a Node) -> BoxFuture<'a, bool> {
        self.check(node).boxed()
    }
}
