use std::collections::BTreeSet;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::warn;
use crate::core::types::{ColumnId, ShardId};

/// Shard owning a column.
pub fn shard_of(column: ColumnId, shard_count: u64) -> ShardId {
    column % shard_count.max(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClusterState {
    Normal,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub id: String,
    pub state: ClusterState,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unavailable_shards: Vec<ShardId>,
}

/// Membership service boundary: who can serve which shard right now.
pub trait ClusterView: Send + Sync {
    fn is_available(&self, index: &str, shard: ShardId) -> bool;

    fn nodes(&self) -> Vec<NodeStatus>;

    fn state(&self) -> ClusterState {
        if self.nodes().iter().any(|node| node.state == ClusterState::Degraded) {
            ClusterState::Degraded
        } else {
            ClusterState::Normal
        }
    }
}

/// Single-node view that owns every shard. Shards can be marked
/// unavailable to exercise degraded reads.
pub struct LocalCluster {
    node_id: String,
    unavailable: RwLock<BTreeSet<ShardId>>,
}

impl LocalCluster {
    pub fn new(node_id: impl Into<String>) -> Self {
        LocalCluster { node_id: node_id.into(), unavailable: RwLock::new(BTreeSet::new()) }
    }

    pub fn mark_unavailable(&self, shard: ShardId) {
        if self.unavailable.write().insert(shard) {
            warn!(shard, "shard marked unavailable");
        }
    }

    pub fn mark_available(&self, shard: ShardId) {
        self.unavailable.write().remove(&shard);
    }
}

impl Default for LocalCluster {
    fn default() -> Self {
        LocalCluster::new("local")
    }
}

impl ClusterView for LocalCluster {
    fn is_available(&self, _index: &str, shard: ShardId) -> bool {
        !self.unavailable.read().contains(&shard)
    }

    fn nodes(&self) -> Vec<NodeStatus> {
        let unavailable: Vec<ShardId> = self.unavailable.read().iter().copied().collect();
        let state = if unavailable.is_empty() { ClusterState::Normal } else { ClusterState::Degraded };
        vec![NodeStatus { id: self.node_id.clone(), state, unavailable_shards: unavailable }]
    }
}
