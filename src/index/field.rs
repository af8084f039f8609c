use std::collections::BTreeMap;
use std::sync::Arc;
use chrono::NaiveDateTime;
use parking_lot::RwLock;
use crate::bitmap::bsi::RangeOp;
use crate::bitmap::row::Row;
use crate::core::error::{Error, Result};
use crate::core::types::{ColumnId, RowId, ShardId, STANDARD_VIEW};
use crate::schema::field::{FieldOptions, FieldType};
use crate::storage::backup::{FieldBackup, ViewBackup};
use crate::storage::translate::TranslateStore;
use crate::storage::view::{FragmentTemplate, View};

/// One field of an index: its validated options and its views.
pub struct Field {
    name: String,
    ordinal: u64,
    options: FieldOptions,
    views: RwLock<BTreeMap<String, Arc<View>>>,
    row_keys: Option<TranslateStore>,
}

impl Field {
    pub fn new(name: &str, ordinal: u64, options: FieldOptions) -> Self {
        let row_keys = options.keys.then(TranslateStore::new);
        let field = Field {
            name: name.to_string(),
            ordinal,
            options,
            views: RwLock::new(BTreeMap::new()),
            row_keys,
        };
        field.view_or_create(STANDARD_VIEW);
        field
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creation order within the index.
    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    pub fn options(&self) -> &FieldOptions {
        &self.options
    }

    pub fn field_type(&self) -> FieldType {
        self.options.field_type
    }

    pub fn row_keys(&self) -> Option<&TranslateStore> {
        self.row_keys.as_ref()
    }

    fn template(&self) -> FragmentTemplate {
        match self.options.bounds() {
            Some((min, max)) => FragmentTemplate::Bsi { min, max },
            None => FragmentTemplate::Rows { exclusive: self.options.field_type.is_exclusive() },
        }
    }

    pub fn view(&self, name: &str) -> Option<Arc<View>> {
        self.views.read().get(name).cloned()
    }

    pub fn view_or_create(&self, name: &str) -> Arc<View> {
        if let Some(view) = self.view(name) {
            return view;
        }
        self.views
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(View::new(name, self.template())))
            .clone()
    }

    pub fn view_names(&self) -> Vec<String> {
        self.views.read().keys().cloned().collect()
    }

    fn views(&self) -> Vec<Arc<View>> {
        self.views.read().values().cloned().collect()
    }

    fn standard(&self) -> Arc<View> {
        self.view_or_create(STANDARD_VIEW)
    }

    fn require_rows(&self) -> Result<()> {
        if self.field_type() == FieldType::Int {
            return Err(Error::schema(format!("field '{}' is an int field", self.name)));
        }
        Ok(())
    }

    fn require_int(&self) -> Result<()> {
        if self.field_type() != FieldType::Int {
            return Err(Error::schema(format!(
                "field '{}' is a {} field, not int",
                self.name,
                self.field_type()
            )));
        }
        Ok(())
    }

    /// Sets a bit in the standard view and, for time fields given a
    /// timestamp, in every quantum view of that timestamp. Returns whether
    /// the standard view changed.
    pub fn set_bit(
        &self,
        shard: ShardId,
        row: RowId,
        column: ColumnId,
        timestamp: Option<NaiveDateTime>,
    ) -> Result<bool> {
        self.require_rows()?;
        if timestamp.is_some() && self.options.time_quantum.is_none() {
            return Err(Error::schema(format!("field '{}' does not accept timestamps", self.name)));
        }
        let changed = self.standard().fragment_or_create(shard).write().set_bit(row, column)?;
        if let (Some(quantum), Some(ts)) = (&self.options.time_quantum, timestamp) {
            for name in quantum.views_for(STANDARD_VIEW, ts) {
                self.view_or_create(&name).fragment_or_create(shard).write().set_bit(row, column)?;
            }
        }
        Ok(changed)
    }

    /// Clears the bit from every view.
    pub fn clear_bit(&self, shard: ShardId, row: RowId, column: ColumnId) -> Result<bool> {
        self.require_rows()?;
        let mut changed = false;
        for view in self.views() {
            if let Some(fragment) = view.fragment(shard) {
                let cleared = fragment.write().clear_bit(row, column)?;
                if view.name() == STANDARD_VIEW {
                    changed = cleared;
                }
            }
        }
        Ok(changed)
    }

    pub fn clear_row(&self, shard: ShardId, row: RowId) -> Result<bool> {
        self.require_rows()?;
        let mut changed = false;
        for view in self.views() {
            if let Some(fragment) = view.fragment(shard) {
                changed |= fragment.write().clear_row(row)?;
            }
        }
        Ok(changed)
    }

    pub fn row(&self, shard: ShardId, row: RowId) -> Result<Row> {
        self.require_rows()?;
        match self.standard().fragment(shard) {
            Some(fragment) => fragment.read().row(row),
            None => Ok(Row::new()),
        }
    }

    /// Union of the quantum views covering `[from, to)`.
    pub fn row_between(
        &self,
        shard: ShardId,
        row: RowId,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Row> {
        let Some(quantum) = &self.options.time_quantum else {
            return Err(Error::schema(format!("field '{}' is not a time field", self.name)));
        };
        let mut result = Row::new();
        for name in quantum.views_for_range(STANDARD_VIEW, from, to) {
            if let Some(fragment) = self.view(&name).and_then(|view| view.fragment(shard)) {
                result.union_in_place(&fragment.read().row(row)?);
            }
        }
        Ok(result)
    }

    pub fn rows_for_column(&self, shard: ShardId, column: ColumnId) -> Result<Vec<RowId>> {
        self.require_rows()?;
        match self.standard().fragment(shard) {
            Some(fragment) => fragment.read().rows_for_column(column),
            None => Ok(Vec::new()),
        }
    }

    pub fn row_counts(&self, shard: ShardId, filter: Option<&Row>) -> Result<Vec<(RowId, u64)>> {
        self.require_rows()?;
        match self.standard().fragment(shard) {
            Some(fragment) => fragment.read().row_counts(filter),
            None => Ok(Vec::new()),
        }
    }

    /// Writes an int value; out-of-bounds values fail and leave the prior
    /// value in place.
    pub fn set_value(&self, shard: ShardId, column: ColumnId, value: i64) -> Result<bool> {
        self.require_int()?;
        self.options.check_value(value)?;
        self.standard().fragment_or_create(shard).write().set_value(column, value)
    }

    pub fn clear_value(&self, shard: ShardId, column: ColumnId) -> Result<bool> {
        self.require_int()?;
        match self.standard().fragment(shard) {
            Some(fragment) => fragment.write().clear_value(column),
            None => Ok(false),
        }
    }

    pub fn value(&self, shard: ShardId, column: ColumnId) -> Result<Option<i64>> {
        self.require_int()?;
        match self.standard().fragment(shard) {
            Some(fragment) => fragment.read().value(column),
            None => Ok(None),
        }
    }

    pub fn range(&self, shard: ShardId, op: RangeOp, predicate: i64) -> Result<Row> {
        self.require_int()?;
        match self.standard().fragment(shard) {
            Some(fragment) => fragment.read().range(op, predicate),
            None => Ok(Row::new()),
        }
    }

    pub fn between(&self, shard: ShardId, low: i64, high: i64) -> Result<Row> {
        self.require_int()?;
        match self.standard().fragment(shard) {
            Some(fragment) => fragment.read().between(low, high),
            None => Ok(Row::new()),
        }
    }

    /// Columns holding a value (int) or at least one bit (row-oriented).
    pub fn not_null(&self, shard: ShardId) -> Result<Row> {
        match self.standard().fragment(shard) {
            Some(fragment) => Ok(fragment.read().columns()),
            None => Ok(Row::new()),
        }
    }

    pub fn sum(&self, shard: ShardId, filter: Option<&Row>) -> Result<(i128, u64)> {
        self.require_int()?;
        match self.standard().fragment(shard) {
            Some(fragment) => fragment.read().sum(filter),
            None => Ok((0, 0)),
        }
    }

    pub fn min(&self, shard: ShardId, filter: Option<&Row>) -> Result<Option<(i64, u64)>> {
        self.require_int()?;
        match self.standard().fragment(shard) {
            Some(fragment) => fragment.read().min(filter),
            None => Ok(None),
        }
    }

    pub fn max(&self, shard: ShardId, filter: Option<&Row>) -> Result<Option<(i64, u64)>> {
        self.require_int()?;
        match self.standard().fragment(shard) {
            Some(fragment) => fragment.read().max(filter),
            None => Ok(None),
        }
    }

    pub fn backup(&self) -> Result<FieldBackup> {
        let mut views = Vec::new();
        for view in self.views() {
            views.push(ViewBackup { name: view.name().to_string(), fragments: view.snapshot()? });
        }
        Ok(FieldBackup {
            name: self.name.clone(),
            options: serde_json::to_string(&self.options)?,
            row_keys: self.row_keys.as_ref().map(TranslateStore::entries).unwrap_or_default(),
            views,
        })
    }

    pub fn restore(backup: &FieldBackup, ordinal: u64) -> Result<Field> {
        let options: FieldOptions = serde_json::from_str(&backup.options)?;
        let field = Field::new(&backup.name, ordinal, options);
        if let Some(keys) = &field.row_keys {
            keys.restore(&backup.row_keys)?;
        }
        for view in &backup.views {
            field.view_or_create(&view.name).restore(&view.fragments)?;
        }
        Ok(field)
    }
}


impl std::fmt::Debug for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("ordinal", &self.ordinal)
            .finish_non_exhaustive()
    }
}
