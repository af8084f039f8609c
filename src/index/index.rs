use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use crate::bitmap::row::Row;
use crate::cluster::shard::shard_of;
use crate::core::error::{Error, Result};
use crate::core::types::{ColumnId, ShardId};
use crate::index::field::Field;
use crate::schema::field::{FieldOptions, FieldOptionsRequest};
use crate::schema::naming::validate_name;
use crate::schema::registry::Registry;
use crate::storage::backup::IndexBackup;
use crate::storage::translate::TranslateStore;
use crate::storage::view::{FragmentTemplate, View};

const EXISTENCE_ROW: u64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexOptions {
    pub keys: bool,
    pub shard_count: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IndexOptionsRequest {
    pub keys: Option<bool>,
    pub shard_count: Option<u64>,
}

impl IndexOptionsRequest {
    pub fn keyed() -> Self {
        IndexOptionsRequest { keys: Some(true), shard_count: None }
    }

    pub fn with_shard_count(mut self, shard_count: u64) -> Self {
        self.shard_count = Some(shard_count);
        self
    }

    pub fn validate(self, default_shard_count: u64) -> Result<IndexOptions> {
        let shard_count = self.shard_count.unwrap_or(default_shard_count);
        if shard_count == 0 {
            return Err(Error::schema("shardCount must be at least 1"));
        }
        Ok(IndexOptions { keys: self.keys.unwrap_or(false), shard_count })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldInfo {
    pub name: String,
    pub options: FieldOptions,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexInfo {
    pub name: String,
    pub options: IndexOptions,
    pub fields: Vec<FieldInfo>,
    pub shard_count: u64,
}

/// A named collection of fields over one column space.
pub struct Index {
    name: String,
    options: IndexOptions,
    created_at: DateTime<Utc>,
    deleted: AtomicBool,
    fields: Registry<Field>,
    next_ordinal: AtomicU64,
    column_keys: Option<TranslateStore>,
    existence: View,
}

impl Index {
    pub fn new(name: &str, options: IndexOptions) -> Result<Self> {
        validate_name(name)?;
        Ok(Index {
            name: name.to_string(),
            options,
            created_at: Utc::now(),
            deleted: AtomicBool::new(false),
            fields: Registry::new("field"),
            next_ordinal: AtomicU64::new(0),
            column_keys: options.keys.then(TranslateStore::new),
            existence: View::new("exists", FragmentTemplate::Rows { exclusive: false }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> IndexOptions {
        self.options
    }

    pub fn shard_count(&self) -> u64 {
        self.options.shard_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn column_keys(&self) -> Option<&TranslateStore> {
        self.column_keys.as_ref()
    }

    pub fn is_active(&self) -> bool {
        !self.deleted.load(Ordering::Acquire)
    }

    /// Fails once the index has been deleted; handles held by in-flight
    /// requests observe the deletion here.
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::not_found(format!("index '{}' was deleted", self.name)))
        }
    }

    pub(crate) fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::Release);
        self.fields.drain();
    }

    pub fn create_field(&self, name: &str, request: FieldOptionsRequest) -> Result<Arc<Field>> {
        self.ensure_active()?;
        validate_name(name)?;
        let field = self.fields.insert_with(name, || {
            let options = request.validate()?;
            let ordinal = self.next_ordinal.fetch_add(1, Ordering::Relaxed);
            Ok(Field::new(name, ordinal, options))
        })?;
        info!(index = %self.name, field = name, kind = %field.field_type(), "field created");
        Ok(field)
    }

    pub fn delete_field(&self, name: &str) -> Result<()> {
        self.ensure_active()?;
        self.fields.remove(name)?;
        info!(index = %self.name, field = name, "field deleted");
        Ok(())
    }

    pub fn field(&self, name: &str) -> Result<Arc<Field>> {
        self.fields.require(name).map_err(|err| {
            Error::new(err.kind, format!("{} in index '{}'", err.context, self.name))
        })
    }

    /// Fields in creation order.
    pub fn fields(&self) -> Vec<Arc<Field>> {
        let mut fields: Vec<Arc<Field>> = self.fields.snapshot().values().cloned().collect();
        fields.sort_by_key(|field| field.ordinal());
        fields
    }

    pub fn shard_for(&self, column: ColumnId) -> ShardId {
        shard_of(column, self.options.shard_count)
    }

    pub fn all_shards(&self) -> Vec<ShardId> {
        (0..self.options.shard_count).collect()
    }

    /// Column id for a record reference, allocating keys on write.
    pub fn column_for_key(&self, key: &str, allocate: bool) -> Result<Option<ColumnId>> {
        let Some(keys) = &self.column_keys else {
            return Err(Error::schema(format!("index '{}' does not use string keys", self.name)));
        };
        Ok(if allocate { Some(keys.translate_key(key)) } else { keys.find_id(key) })
    }

    /// Records that a column exists so `All`/`Not` can see it.
    pub fn note_column(&self, column: ColumnId) -> Result<()> {
        let shard = self.shard_for(column);
        self.existence.fragment_or_create(shard).write().set_bit(EXISTENCE_ROW, column)?;
        Ok(())
    }

    pub fn existing_columns(&self, shard: ShardId) -> Result<Row> {
        match self.existence.fragment(shard) {
            Some(fragment) => fragment.read().row(EXISTENCE_ROW),
            None => Ok(Row::new()),
        }
    }

    pub fn info(&self) -> IndexInfo {
        IndexInfo {
            name: self.name.clone(),
            options: self.options,
            fields: self
                .fields()
                .iter()
                .map(|field| FieldInfo { name: field.name().to_string(), options: field.options().clone() })
                .collect(),
            shard_count: self.options.shard_count,
        }
    }

    pub fn backup(&self) -> Result<IndexBackup> {
        self.ensure_active()?;
        let mut fields = Vec::new();
        for field in self.fields() {
            fields.push(field.backup()?);
        }
        Ok(IndexBackup {
            name: self.name.clone(),
            keys: self.options.keys,
            shard_count: self.options.shard_count,
            created_at: self.created_at,
            column_keys: self.column_keys.as_ref().map(TranslateStore::entries).unwrap_or_default(),
            existence: self.existence.snapshot()?,
            fields,
        })
    }

    pub fn restore(backup: &IndexBackup) -> Result<Index> {
        let options = IndexOptions { keys: backup.keys, shard_count: backup.shard_count };
        let mut index = Index::new(&backup.name, options)?;
        index.created_at = backup.created_at;
        if let Some(keys) = &index.column_keys {
            keys.restore(&backup.column_keys)?;
        }
        index.existence.restore(&backup.existence)?;
        for field_backup in &backup.fields {
            let ordinal = index.next_ordinal.fetch_add(1, Ordering::Relaxed);
            let field = Field::restore(field_backup, ordinal)?;
            index.fields.insert_with(&field_backup.name, || Ok(field))?;
        }
        Ok(index)
    }
}


impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index").field("name", &self.name).finish_non_exhaustive()
    }
}
