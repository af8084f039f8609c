use std::sync::Arc;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, warn};
use crate::cluster::shard::ClusterView;
use crate::core::deadline::Deadline;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::ShardId;

/// Per-request execution state shared by every statement of the request.
#[derive(Debug, Clone, Copy)]
pub struct ExecContext {
    pub deadline: Deadline,
    pub strict: bool,
}

impl ExecContext {
    pub fn new(deadline: Deadline, strict: bool) -> Self {
        ExecContext { deadline, strict }
    }

    pub fn unbounded() -> Self {
        ExecContext { deadline: Deadline::unbounded(), strict: false }
    }
}

/// A merged value plus the shards that could not contribute to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Partial<T> {
    pub value: T,
    pub missing_shards: Vec<ShardId>,
}

impl<T> Partial<T> {
    pub fn complete(value: T) -> Self {
        Partial { value, missing_shards: Vec::new() }
    }

    pub fn is_degraded(&self) -> bool {
        !self.missing_shards.is_empty()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Partial<U> {
        Partial { value: f(self.value), missing_shards: self.missing_shards }
    }
}

/// Routes shard work onto the worker pool and consults the cluster view
/// for availability.
pub struct Coordinator {
    pool: ThreadPool,
    cluster: Arc<dyn ClusterView>,
}

impl Coordinator {
    pub fn new(worker_threads: usize, cluster: Arc<dyn ClusterView>) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(worker_threads.max(1))
            .thread_name(|i| format!("bitdex-shard-{}", i))
            .build()
            .map_err(|e| Error::internal(format!("worker pool: {}", e)))?;
        Ok(Coordinator { pool, cluster })
    }

    pub fn cluster(&self) -> &Arc<dyn ClusterView> {
        &self.cluster
    }

    /// Runs `map` for every available shard in parallel and joins before
    /// returning. Unavailable shards are reported as missing, or fail the
    /// call outright when the context is strict.
    pub fn fan_out<T, F>(
        &self,
        index: &str,
        shards: &[ShardId],
        ctx: &ExecContext,
        map: F,
    ) -> Result<Partial<Vec<T>>>
    where
        T: Send,
        F: Fn(ShardId) -> Result<T> + Sync,
    {
        ctx.deadline.check()?;
        let (available, missing): (Vec<ShardId>, Vec<ShardId>) = shards
            .iter()
            .partition(|&&shard| self.cluster.is_available(index, shard));

        if !missing.is_empty() {
            if ctx.strict {
                return Err(Error::new(
                    ErrorKind::Degraded,
                    format!("shards {:?} of index '{}' are unavailable", missing, index),
                ));
            }
            warn!(index, ?missing, "reading with unavailable shards");
        }

        let deadline = ctx.deadline;
        let values: Result<Vec<T>> = self.pool.install(|| {
            available
                .par_iter()
                .map(|&shard| {
                    deadline.check()?;
                    map(shard)
                })
                .collect()
        });
        let values = values?;
        debug!(index, shards = available.len(), "fan-out joined");
        Ok(Partial { value: values, missing_shards: missing })
    }

    /// A write goes to exactly one shard, which must be reachable.
    pub fn route_write(&self, index: &str, shard: ShardId, ctx: &ExecContext) -> Result<()> {
        ctx.deadline.check()?;
        if !self.cluster.is_available(index, shard) {
            return Err(Error::new(
                ErrorKind::Degraded,
                format!("shard {} of index '{}' is unavailable for writes", shard, index),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::cluster::shard::LocalCluster;

    fn coordinator(cluster: Arc<LocalCluster>) -> Coordinator {
        Coordinator::new(2, cluster).unwrap()
    }

    #[test]
    fn fan_out_visits_every_shard() {
        let coordinator = coordinator(Arc::new(LocalCluster::default()));
        let shards: Vec<ShardId> = (0..8).collect();
        let result = coordinator
            .fan_out("i", &shards, &ExecContext::unbounded(), |shard| Ok(shard * 10))
            .unwrap();
        let mut values = result.value;
        values.sort_unstable();
        assert_eq!(values, (0..8).map(|s| s * 10).collect::<Vec<_>>());
        assert!(result.missing_shards.is_empty());
    }

    #[test]
    fn missing_shards_degrade_or_fail() {
        let cluster = Arc::new(LocalCluster::default());
        cluster.mark_unavailable(1);
        let coordinator = coordinator(cluster);
        let shards = [0, 1, 2];

        let partial = coordinator
            .fan_out("i", &shards, &ExecContext::unbounded(), |shard| Ok(shard))
            .unwrap();
        assert_eq!(partial.missing_shards, vec![1]);
        assert!(partial.is_degraded());

        let strict = ExecContext { strict: true, ..ExecContext::unbounded() };
        let err = coordinator.fan_out("i", &shards, &strict, |shard| Ok(shard)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Degraded);
        assert_eq!(coordinator.route_write("i", 1, &ExecContext::unbounded()).unwrap_err().kind, ErrorKind::Degraded);
    }

    #[test]
    fn expired_deadline_aborts() {
        let coordinator = coordinator(Arc::new(LocalCluster::default()));
        let ctx = ExecContext::new(Deadline::new(Some(Duration::ZERO)), false);
        let err = coordinator.fan_out("i", &[0], &ctx, |shard| Ok(shard)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
    }

    #[test]
    fn shard_errors_propagate() {
        let coordinator = coordinator(Arc::new(LocalCluster::default()));
        let err = coordinator
            .fan_out("i", &[0, 1], &ExecContext::unbounded(), |shard| {
                if shard == 1 { Err(Error::range("boom")) } else { Ok(shard) }
            })
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Range);
    }
}
