//! Replica placement
//!
//! Placement is advisory: it does not reserve space or trigger any transfer,
//! and the answer may be stale by the time the caller acts on it.

use tracing::debug;

use crate::node::{Node, NodeStatus};
use crate::registry::NodeRegistry;

/// Rank candidate nodes for `replicas` copies of `required_size` bytes
///
/// Keeps active nodes with at least `required_size` free bytes, orders them
/// by descending free space and returns the ids of the first
/// `min(replicas, eligible)`. Ties keep their input order.
pub fn rank(nodes: &[Node], required_size: i64, replicas: usize) -> Vec<String> {
    let mut eligible: Vec<&Node> = nodes
        .iter()
        .filter(|node| node.status == NodeStatus::Active && node.free_space() >= required_size)
        .collect();

    eligible.sort_by(|a, b| b.free_space().cmp(&a.free_space()));

    eligible
        .into_iter()
        .take(replicas)
        .map(|node| node.id.clone())
        .collect()
}

/// Select placement candidates from the registry's current contents
pub async fn select(registry: &NodeRegistry, required_size: i64, replicas: usize) -> Vec<String> {
    let snapshot = registry.list().await;
    let selected = rank(&snapshot, required_size, replicas);

    debug!(
        "Placement for {} bytes x{}: {} of {} nodes selected",
        required_size,
        replicas,
        selected.len(),
        snapshot.len()
    );

    selected
}
