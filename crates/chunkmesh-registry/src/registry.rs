//! Lock-guarded node directory

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{RegistryError, Result};
use crate::node::{validate_address, Node, NodeStatus};

/// Aggregate view over every registered node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
    pub total_nodes: usize,
    pub active_nodes: usize,
    pub inactive_nodes: usize,
    pub failed_nodes: usize,
    pub total_storage: i64,
    pub used_storage: i64,
    pub available_storage: i64,
}

#[derive(Debug, Default)]
struct RegistryState {
    /// Nodes by id
    nodes: HashMap<String, Node>,

    /// Reverse index: address -> node id
    addresses: HashMap<String, String>,
}

/// Durable directory of all known nodes
///
/// Shared behind an `Arc`; every method takes the internal lock for the
/// duration of a map update only.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    state: RwLock<RegistryState>,
}

impl NodeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new node or update an existing one
    ///
    /// An empty `id` is replaced by a fresh UUID. Re-registering an id
    /// overwrites its address, status and capacity but keeps its usage.
    pub async fn register(&self, id: &str, address: &str, storage_max: i64) -> Result<Node> {
        validate_address(address)?;

        if storage_max < 0 {
            return Err(RegistryError::InvalidInput(format!(
                "storage max cannot be negative: {}",
                storage_max
            )));
        }

        let id = if id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            id.to_string()
        };

        let mut state = self.state.write().await;

        if let Some(owner) = state.addresses.get(address) {
            if *owner != id {
                return Err(RegistryError::Conflict {
                    address: address.to_string(),
                    owner: owner.clone(),
                });
            }
        }

        let previous_address = state.nodes.get(&id).map(|n| n.address.clone());

        let node = match state.nodes.get_mut(&id) {
            Some(node) => {
                node.address = address.to_string();
                node.status = NodeStatus::Active;
                node.storage_max = storage_max;
                node.storage_used = node.storage_used.min(storage_max);
                node.touch();
                node.clone()
            }
            None => {
                let node = Node::new(id.clone(), address.to_string(), storage_max);
                state.nodes.insert(id.clone(), node.clone());
                node
            }
        };

        if let Some(old) = previous_address {
            if old != address {
                state.addresses.remove(&old);
            }
        }
        state.addresses.insert(address.to_string(), id.clone());

        debug!("Registered node {} at {} (max {} bytes)", id, address, storage_max);
        Ok(node)
    }

    /// Get a node by id
    pub async fn get(&self, id: &str) -> Result<Node> {
        self.state
            .read()
            .await
            .nodes
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Look up which node owns an address
    pub async fn find_by_address(&self, address: &str) -> Option<String> {
        self.state.read().await.addresses.get(address).cloned()
    }

    /// Snapshot of every node, in no particular order
    pub async fn list(&self) -> Vec<Node> {
        self.state.read().await.nodes.values().cloned().collect()
    }

    /// Number of registered nodes
    pub async fn len(&self) -> usize {
        self.state.read().await.nodes.len()
    }

    /// Check if the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Refresh a node's last-seen time
    pub async fn heartbeat(&self, id: &str) -> Result<()> {
        self.with_node(id, |node| {
            node.touch();
            Ok(())
        })
        .await
    }

    /// Set a node's status from its string form (`active`, `inactive`, `failed`)
    pub async fn set_status(&self, id: &str, status: &str) -> Result<()> {
        let status: NodeStatus = status.parse()?;
        self.with_node(id, |node| {
            node.status = status;
            node.touch();
            Ok(())
        })
        .await
    }

    /// Record how many bytes a node currently uses
    pub async fn set_storage_used(&self, id: &str, used: i64) -> Result<()> {
        self.with_node(id, |node| {
            if used < 0 {
                return Err(RegistryError::InvalidInput(
                    "storage used cannot be negative".to_string(),
                ));
            }

            if used > node.storage_max {
                return Err(RegistryError::InvalidInput(format!(
                    "storage used {} exceeds maximum storage {}",
                    used, node.storage_max
                )));
            }

            node.storage_used = used;
            node.touch();
            Ok(())
        })
        .await
    }

    /// Remove a node and its address mapping
    pub async fn remove(&self, id: &str) -> Result<Node> {
        let mut state = self.state.write().await;

        let node = state
            .nodes
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        state.addresses.remove(&node.address);

        debug!("Removed node {}", id);
        Ok(node)
    }

    /// Totals over the current node set
    pub async fn summary(&self) -> ClusterSummary {
        let state = self.state.read().await;

        let mut summary = ClusterSummary {
            total_nodes: state.nodes.len(),
            ..Default::default()
        };

        for node in state.nodes.values() {
            // Totals saturate at i64::MAX
            summary.total_storage = summary.total_storage.saturating_add(node.storage_max);
            summary.used_storage = summary.used_storage.saturating_add(node.storage_used);

            match node.status {
                NodeStatus::Active => summary.active_nodes += 1,
                NodeStatus::Inactive => summary.inactive_nodes += 1,
                NodeStatus::Failed => summary.failed_nodes += 1,
            }
        }

        summary.available_storage = summary
            .total_storage
            .saturating_sub(summary.used_storage);
        summary
    }

    /// Ids of nodes not heard from within `max_age`
    ///
    /// Reporting only; nothing is evicted.
    pub async fn stale_nodes(&self, max_age: Duration) -> Vec<String> {
        self.state
            .read()
            .await
            .nodes
            .values()
            .filter(|node| node.is_stale(max_age))
            .map(|node| node.id.clone())
            .collect()
    }

    async fn with_node<F>(&self, id: &str, update: F) -> Result<()>
    where
        F: FnOnce(&mut Node) -> Result<()>,
    {
        let mut state = self.state.write().await;
        let node = state
            .nodes
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        update(node)
    }
}
