//! Registry of connected devices

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use tether_core::{Actor, DeviceId};

use crate::node::Node;

/// Read access to registered nodes, as used by operator commands
#[async_trait]
pub trait NodeManager: Send + Sync {
    /// Number of registered nodes
    async fn count(&self) -> usize;

    /// All registered nodes, ordered by ID
    async fn list(&self) -> Vec<Arc<Node>>;

    /// Look up a node; the ID is normalized first
    async fn get(&self, id: &str) -> Option<Arc<Node>>;
}

/// Device ID to node map, owned by an actor
pub struct Registry {
    nodes: Actor<HashMap<DeviceId, Arc<Node>>>,
}

impl Registry {
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self {
        Self {
            nodes: Actor::new("registry", HashMap::new()),
        }
    }

    /// Register a node without waiting for the update to apply.
    ///
    /// A node already registered under the same ID is replaced and killed.
    pub async fn register(&self, node: Arc<Node>) {
        let id = node.id().clone();
        let posted = self
            .nodes
            .post(move |nodes| {
                Box::pin(async move {
                    let address = node.address();
                    if let Some(previous) = nodes.insert(node.id().clone(), node) {
                        tracing::info!(
                            "Device {} reconnected from {}, replacing node from {}",
                            previous.id(),
                            address,
                            previous.address()
                        );
                        previous.kill();
                    }
                })
            })
            .await;

        match posted {
            Ok(()) => tracing::info!("Device {} registered", id),
            Err(e) => tracing::error!("Failed to register device {}: {}", id, e),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeManager for Registry {
    async fn count(&self) -> usize {
        self.nodes
            .run(|nodes| Box::pin(async move { nodes.len() }))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Registry unavailable: {}", e);
                0
            })
    }

    async fn list(&self) -> Vec<Arc<Node>> {
        let listed = self
            .nodes
            .run(|nodes| Box::pin(async move { nodes.values().cloned().collect::<Vec<_>>() }))
            .await;

        match listed {
            Ok(mut nodes) => {
                nodes.sort_by(|a, b| a.id().cmp(b.id()));
                nodes
            }
            Err(e) => {
                tracing::warn!("Registry unavailable: {}", e);
                Vec::new()
            }
        }
    }

    async fn get(&self, id: &str) -> Option<Arc<Node>> {
        let id = DeviceId::new(id);
        self.nodes
            .run(move |nodes| Box::pin(async move { nodes.get(&id).cloned() }))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Registry unavailable: {}", e);
                None
            })
    }
}
