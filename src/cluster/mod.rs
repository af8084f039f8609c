pub mod shard;
pub mod merge;
pub mod coordinator;

pub use coordinator::{Coordinator, ExecContext, Partial};
pub use shard::{shard_of, ClusterState, ClusterView, LocalCluster};
