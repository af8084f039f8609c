use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::core::error::Result;
use crate::storage::backup::CompressionType;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Index defaults
    pub default_shard_count: u64,              // Used when an index is created without shardCount

    // Worker pool
    pub worker_threads: usize,                 // rayon pool size for shard fan-out

    // Query execution
    pub query_timeout_ms: u64,                 // Per-request deadline, 0 disables it
    pub strict_reads: bool,                    // Fail reads instead of degrading
    pub parse_cache_size: usize,               // Parsed PQL statements kept in the LRU
    pub max_call_depth: usize,                 // Checked after parsing, parsers stop at 64 levels
    pub max_call_args: usize,
    pub topn_default: usize,                   // TopN without n=

    // Backup
    pub backup_compression: CompressionType,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            default_shard_count: 16,
            worker_threads: num_cpus::get(),
            query_timeout_ms: 30_000,
            strict_reads: false,
            parse_cache_size: 1024,
            max_call_depth: 32,
            max_call_args: 1024,
            topn_default: 10,
            backup_compression: CompressionType::Lz4,
        }
    }
}

impl Config {
    /// Load a config from JSON; missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        if self.query_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.query_timeout_ms))
        }
    }

    pub fn with_shard_count(mut self, shard_count: u64) -> Self {
        self.default_shard_count = shard_count;
        self
    }

    pub fn with_worker_threads(mut self, workers: usize) -> Self {
        self.worker_threads = workers;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_strict_reads(mut self, strict: bool) -> Self {
        self.strict_reads = strict;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = Config::from_json(r#"{"default_shard_count": 4, "strict_reads": true}"#).unwrap();
        assert_eq!(config.default_shard_count, 4);
        assert!(config.strict_reads);
        assert_eq!(config.parse_cache_size, 1024);
        assert_eq!(config.query_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn zero_timeout_disables_deadline() {
        let config = Config::default().with_query_timeout(Duration::ZERO);
        assert_eq!(config.query_timeout(), None);
    }
}
