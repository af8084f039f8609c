use std::collections::BTreeSet;
use std::fmt;
use serde::Serialize;
use crate::core::types::ShardId;
use crate::query::results::DegradedInfo;
use crate::schema::field::{FieldOptions, FieldType};

/// Column and expression types reported in a result schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SqlType {
    Void,
    Int,
    Decimal,
    String,
    Bool,
    Id,
    #[serde(rename = "IDSET")]
    IdSet,
    #[serde(rename = "STRINGSET")]
    StringSet,
    #[serde(rename = "IDSETQ")]
    IdSetQuantum,
    #[serde(rename = "STRINGSETQ")]
    StringSetQuantum,
    Timestamp,
}

impl SqlType {
    pub fn name(&self) -> &'static str {
        match self {
            SqlType::Void => "VOID",
            SqlType::Int => "INT",
            SqlType::Decimal => "DECIMAL",
            SqlType::String => "STRING",
            SqlType::Bool => "BOOL",
            SqlType::Id => "ID",
            SqlType::IdSet => "IDSET",
            SqlType::StringSet => "STRINGSET",
            SqlType::IdSetQuantum => "IDSETQ",
            SqlType::StringSetQuantum => "STRINGSETQ",
            SqlType::Timestamp => "TIMESTAMP",
        }
    }

    /// Looks up a type name as written in `CREATE TABLE`.
    pub fn from_name(name: &str) -> Option<SqlType> {
        let ty = match name.to_ascii_uppercase().as_str() {
            "INT" | "INTEGER" => SqlType::Int,
            "DECIMAL" => SqlType::Decimal,
            "STRING" | "VARCHAR" | "TEXT" => SqlType::String,
            "BOOL" | "BOOLEAN" => SqlType::Bool,
            "ID" => SqlType::Id,
            "IDSET" => SqlType::IdSet,
            "STRINGSET" => SqlType::StringSet,
            "IDSETQ" => SqlType::IdSetQuantum,
            "STRINGSETQ" => SqlType::StringSetQuantum,
            "TIMESTAMP" => SqlType::Timestamp,
            _ => return None,
        };
        Some(ty)
    }

    /// SQL type of an existing field.
    pub fn of_field(options: &FieldOptions) -> SqlType {
        match (options.field_type, options.keys) {
            (FieldType::Int, _) => SqlType::Int,
            (FieldType::Bool, _) => SqlType::Bool,
            (FieldType::Mutex, false) => SqlType::Id,
            (FieldType::Mutex, true) => SqlType::String,
            (FieldType::Set, false) => SqlType::IdSet,
            (FieldType::Set, true) => SqlType::StringSet,
            (FieldType::Time, false) => SqlType::IdSetQuantum,
            (FieldType::Time, true) => SqlType::StringSetQuantum,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, SqlType::Int | SqlType::Decimal | SqlType::Id)
    }

    pub fn is_set(&self) -> bool {
        matches!(
            self,
            SqlType::IdSet | SqlType::StringSet | SqlType::IdSetQuantum | SqlType::StringSetQuantum
        )
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One cell of a result row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(f64),
    String(String),
    IdSet(Vec<u64>),
    StringSet(Vec<String>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "NULL",
            SqlValue::Bool(_) => "BOOL",
            SqlValue::Int(_) => "INT",
            SqlValue::Decimal(_) => "DECIMAL",
            SqlValue::String(_) => "STRING",
            SqlValue::IdSet(_) => "IDSET",
            SqlValue::StringSet(_) => "STRINGSET",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub sql_type: SqlType,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        ColumnInfo { name: name.into(), sql_type }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSchema {
    pub fields: Vec<ColumnInfo>,
}

/// `{"schema": {"fields": [{"name", "type"}]}, "data": [[...]], "degraded"?: {"missingShards": [...]}}`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    pub schema: ResultSchema,
    pub data: Vec<Vec<SqlValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<DegradedInfo>,
}

impl ResultSet {
    pub fn new(fields: Vec<ColumnInfo>) -> Self {
        ResultSet { schema: ResultSchema { fields }, data: Vec::new(), degraded: None }
    }

    /// Records shards that could not be read; the rows are partial.
    pub fn mark_missing(&mut self, shards: impl IntoIterator<Item = ShardId>) {
        let mut missing: BTreeSet<ShardId> = self
            .degraded
            .take()
            .map(|info| info.missing_shards.into_iter().collect())
            .unwrap_or_default();
        missing.extend(shards);
        if !missing.is_empty() {
            self.degraded = Some(DegradedInfo { missing_shards: missing.into_iter().collect() });
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    /// Result of a statement that returns no rows.
    pub fn empty() -> Self {
        ResultSet::default()
    }

    pub fn push(&mut self, row: Vec<SqlValue>) {
        self.data.push(row);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn result_set_wire_shape() {
        let mut set = ResultSet::new(vec![ColumnInfo::new("", SqlType::Int), ColumnInfo::new("tags", SqlType::IdSet)]);
        set.push(vec![SqlValue::Int(1), SqlValue::IdSet(vec![3, 4])]);
        set.push(vec![SqlValue::Null, SqlValue::IdSet(vec![])]);
        assert_eq!(
            serde_json::to_value(&set).unwrap(),
            json!({
                "schema": {"fields": [{"name": "", "type": "INT"}, {"name": "tags", "type": "IDSET"}]},
                "data": [[1, [3, 4]], [null, []]]
            })
        );

        set.mark_missing([3, 1]);
        set.mark_missing([1]);
        assert_eq!(serde_json::to_value(&set).unwrap()["degraded"], json!({"missingShards": [1, 3]}));
        set.mark_missing([]);
        assert!(set.is_degraded());
        assert!(!ResultSet::empty().is_degraded());
    }

    #[test]
    fn field_types_map_to_sql_types() {
        let options = FieldOptions {
            field_type: FieldType::Mutex,
            min: None,
            max: None,
            keys: true,
            time_quantum: None,
            cache_size: None,
        };
        assert_eq!(SqlType::of_field(&options), SqlType::String);
        assert_eq!(SqlType::from_name("idsetq"), Some(SqlType::IdSetQuantum));
        assert_eq!(SqlType::from_name("blob"), None);
    }
}
