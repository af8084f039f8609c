use std::collections::BTreeSet;
use serde::Serialize;
use crate::core::error::{Error, ErrorBody};
use crate::core::types::{ColumnId, RowId, ShardId, ValCount};

/// Columns of a row result, with their keys on keyed indexes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowResult {
    pub columns: Vec<ColumnId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairResult {
    pub id: RowId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub count: u64,
}

/// Result of one statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    Row(RowResult),
    Bool(bool),
    Count(u64),
    Pairs(Vec<PairResult>),
    ValCount(ValCount),
}

impl QueryResult {
    pub fn columns(&self) -> Option<&[ColumnId]> {
        match self {
            QueryResult::Row(row) => Some(&row.columns),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatementOutcome {
    Ok(QueryResult),
    Err { error: ErrorBody },
}

impl StatementOutcome {
    pub fn failed(err: &Error) -> Self {
        StatementOutcome::Err { error: err.to_body() }
    }

    pub fn result(&self) -> Option<&QueryResult> {
        match self {
            StatementOutcome::Ok(result) => Some(result),
            StatementOutcome::Err { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorBody> {
        match self {
            StatementOutcome::Ok(_) => None,
            StatementOutcome::Err { error } => Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DegradedInfo {
    pub missing_shards: Vec<ShardId>,
}

/// `{"results": [...], "degraded"?: {"missingShards": [...]}}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub results: Vec<StatementOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<DegradedInfo>,
}

impl QueryResponse {
    pub fn new(results: Vec<StatementOutcome>, missing: BTreeSet<ShardId>) -> Self {
        let degraded = (!missing.is_empty())
            .then(|| DegradedInfo { missing_shards: missing.into_iter().collect() });
        QueryResponse { results, degraded }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_shapes() {
        let response = QueryResponse::new(
            vec![
                StatementOutcome::Ok(QueryResult::Bool(true)),
                StatementOutcome::Ok(QueryResult::Row(RowResult { columns: vec![10], keys: None })),
                StatementOutcome::Ok(QueryResult::Count(3)),
                StatementOutcome::Ok(QueryResult::Pairs(vec![PairResult { id: 1, key: None, count: 4 }])),
                StatementOutcome::Ok(QueryResult::ValCount(ValCount::new(-5, 2))),
                StatementOutcome::failed(&Error::range("too big")),
            ],
            BTreeSet::from([3, 1]),
        );
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "results": [
                    true,
                    {"columns": [10]},
                    3,
                    [{"id": 1, "count": 4}],
                    {"value": -5, "count": 2},
                    {"error": {"kind": "RangeError", "message": "too big"}}
                ],
                "degraded": {"missingShards": [1, 3]}
            })
        );
    }
}
