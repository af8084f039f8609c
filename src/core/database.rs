use std::path::Path;
use std::sync::Arc;
use serde::Serialize;
use tracing::{info, instrument};
use crate::cluster::coordinator::{Coordinator, ExecContext};
use crate::cluster::shard::{ClusterState, ClusterView, LocalCluster, NodeStatus};
use crate::core::config::Config;
use crate::core::deadline::Deadline;
use crate::core::error::Result;
use crate::core::types::QueryOptions;
use crate::index::holder::Holder;
use crate::index::index::{IndexInfo, IndexOptionsRequest};
use crate::query::executor::Executor;
use crate::query::results::QueryResponse;
use crate::schema::field::FieldOptionsRequest;
use crate::sql::executor::SqlEngine;
use crate::sql::types::ResultSet;
use crate::storage::backup::{read_backup, write_backup};

/// `GET /status` body.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterStatus {
    pub state: ClusterState,
    pub nodes: Vec<NodeStatus>,
}

/// Entry point that wires the holder, the shard coordinator and both query
/// front ends together.
pub struct Database {
    config: Config,
    holder: Arc<Holder>,
    cluster: Arc<dyn ClusterView>,
    executor: Arc<Executor>,
    sql: SqlEngine,
}

impl Database {
    /// Opens a single-node database that owns every shard.
    pub fn open(config: Config) -> Result<Self> {
        Self::with_cluster(config, Arc::new(LocalCluster::default()))
    }

    pub fn with_cluster(config: Config, cluster: Arc<dyn ClusterView>) -> Result<Self> {
        let holder = Arc::new(Holder::new(config.default_shard_count));
        let coordinator = Arc::new(Coordinator::new(config.worker_threads, cluster.clone())?);
        let executor = Arc::new(Executor::new(coordinator, &config));
        let sql = SqlEngine::new(holder.clone(), executor.clone());
        info!(
            shards = config.default_shard_count,
            workers = config.worker_threads,
            "database opened"
        );
        Ok(Database { config, holder, cluster, executor, sql })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn holder(&self) -> &Arc<Holder> {
        &self.holder
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn create_index(&self, name: &str, options: IndexOptionsRequest) -> Result<IndexInfo> {
        Ok(self.holder.create_index(name, options)?.info())
    }

    pub fn delete_index(&self, name: &str) -> Result<()> {
        self.holder.delete_index(name)
    }

    pub fn index_info(&self, name: &str) -> Result<IndexInfo> {
        Ok(self.holder.index(name)?.info())
    }

    pub fn list_indexes(&self) -> Vec<IndexInfo> {
        self.holder.indexes().iter().map(|index| index.info()).collect()
    }

    pub fn create_field(&self, index: &str, name: &str, options: FieldOptionsRequest) -> Result<()> {
        self.holder.index(index)?.create_field(name, options)?;
        Ok(())
    }

    pub fn delete_field(&self, index: &str, name: &str) -> Result<()> {
        self.holder.index(index)?.delete_field(name)
    }

    /// Runs a PQL request against one index.
    #[instrument(skip(self, pql, options))]
    pub fn query(&self, index: &str, pql: &str, options: &QueryOptions) -> Result<QueryResponse> {
        let index = self.holder.index(index)?;
        self.executor.execute(&index, pql, &self.context(options))
    }

    /// Runs one SQL statement.
    pub fn sql(&self, sql: &str, options: &QueryOptions) -> Result<ResultSet> {
        self.sql.execute(sql, &self.context(options))
    }

    pub fn status(&self) -> ClusterStatus {
        ClusterStatus { state: self.cluster.state(), nodes: self.cluster.nodes() }
    }

    /// Writes a snapshot of the index to `path`.
    pub fn backup_index(&self, name: &str, path: &Path) -> Result<()> {
        let backup = self.holder.index(name)?.backup()?;
        write_backup(path, &backup, self.config.backup_compression)
    }

    /// Recreates an index from a backup file; the name must be free.
    pub fn restore_index(&self, path: &Path) -> Result<IndexInfo> {
        let backup = read_backup(path)?;
        Ok(self.holder.restore(&backup)?.info())
    }

    fn context(&self, options: &QueryOptions) -> ExecContext {
        let timeout = options.timeout.or_else(|| self.config.query_timeout());
        let strict = options.strict.unwrap_or(self.config.strict_reads);
        ExecContext::new(Deadline::new(timeout), strict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::query::results::{QueryResult, StatementOutcome};
    use crate::schema::field::FieldType;

    fn database() -> Database {
        Database::open(Config::default().with_shard_count(4).with_worker_threads(2)).unwrap()
    }

    #[test]
    fn index_and_field_lifecycle() {
        let db = database();
        db.create_index("user", IndexOptionsRequest::default()).unwrap();
        db.create_field("user", "stats", FieldOptionsRequest::of_type(FieldType::Int).with_bounds(0, 100_000))
            .unwrap();

        let info = db.index_info("user").unwrap();
        assert_eq!(info.fields.len(), 1);
        assert_eq!(info.fields[0].options.field_type, FieldType::Int);
        assert_eq!(db.list_indexes().len(), 1);

        db.delete_index("user").unwrap();
        assert_eq!(db.index_info("user").unwrap_err().kind, ErrorKind::NotFound);
        db.create_index("user", IndexOptionsRequest::default()).unwrap();
        assert!(db.index_info("user").unwrap().fields.is_empty());
    }

    #[test]
    fn query_uses_config_defaults() {
        let db = database();
        db.create_index("i", IndexOptionsRequest::default()).unwrap();
        db.create_field("i", "f", FieldOptionsRequest::default()).unwrap();
        let response = db.query("i", "Set(1, f=2) Set(1, f=2)", &QueryOptions::default()).unwrap();
        assert_eq!(
            response.results,
            vec![StatementOutcome::Ok(QueryResult::Bool(true)), StatementOutcome::Ok(QueryResult::Bool(false))]
        );
        assert_eq!(db.query("missing", "All()", &QueryOptions::default()).unwrap_err().kind, ErrorKind::NotFound);
    }

    #[test]
    fn sql_shares_the_schema() {
        let db = database();
        db.sql("CREATE TABLE t (_id ID, n INT)", &QueryOptions::default()).unwrap();
        db.query("t", "Set(5, n=9)", &QueryOptions::default()).unwrap();
        let result = db.sql("SELECT SUM(n) FROM t", &QueryOptions::default()).unwrap();
        assert_eq!(result.data, vec![vec![crate::sql::SqlValue::Int(9)]]);
        assert_eq!(db.status().state, ClusterState::Normal);
    }
}
