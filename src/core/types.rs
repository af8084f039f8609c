use std::time::Duration;
use serde::{Deserialize, Serialize};

/// Record identifier; the first argument of `Set`.
pub type ColumnId = u64;
/// Field-value identifier; the `1` in `stats=1`.
pub type RowId = u64;
pub type ShardId = u64;

pub const STANDARD_VIEW: &str = "standard";

/// Aggregate over an int field: the value plus how many columns fed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValCount {
    pub value: i64,
    pub count: u64,
}

impl ValCount {
    pub fn new(value: i64, count: u64) -> Self {
        ValCount { value, count }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Per-request execution knobs.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub timeout: Option<Duration>,
    pub strict: Option<bool>,
}

impl QueryOptions {
    pub fn strict() -> Self {
        QueryOptions { timeout: None, strict: Some(true) }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
