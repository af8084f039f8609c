use std::collections::BTreeMap;
use roaring::RoaringTreemap;
use serde::{Deserialize, Serialize};
use crate::bitmap::bsi::{BsiGroup, RangeOp};
use crate::bitmap::row::{decode_bitmap, encode_bitmap, Row};
use crate::core::error::{Error, Result};
use crate::core::types::{ColumnId, RowId, ShardId};

#[derive(Debug, Clone)]
pub enum FragmentData {
    Rows(BTreeMap<RowId, Row>),
    Bsi(BsiGroup),
}

/// The bitmaps of one (field, view, shard). The unit of locking.
#[derive(Debug, Clone)]
pub struct Fragment {
    shard: ShardId,
    exclusive: bool,
    data: FragmentData,
}

impl Fragment {
    /// Row-oriented fragment; `exclusive` keeps at most one row per column.
    pub fn rows(shard: ShardId, exclusive: bool) -> Self {
        Fragment { shard, exclusive, data: FragmentData::Rows(BTreeMap::new()) }
    }

    pub fn bsi(shard: ShardId, min: i64, max: i64) -> Self {
        Fragment { shard, exclusive: false, data: FragmentData::Bsi(BsiGroup::new(min, max)) }
    }

    pub fn shard(&self) -> ShardId {
        self.shard
    }

    pub fn is_empty(&self) -> bool {
        match &self.data {
            FragmentData::Rows(rows) => rows.values().all(Row::is_empty),
            FragmentData::Bsi(group) => group.exists().is_empty(),
        }
    }

    fn rows_mut(&mut self) -> Result<&mut BTreeMap<RowId, Row>> {
        match &mut self.data {
            FragmentData::Rows(rows) => Ok(rows),
            FragmentData::Bsi(_) => Err(Error::schema("row operation on an int field")),
        }
    }

    fn rows_ref(&self) -> Result<&BTreeMap<RowId, Row>> {
        match &self.data {
            FragmentData::Rows(rows) => Ok(rows),
            FragmentData::Bsi(_) => Err(Error::schema("row operation on an int field")),
        }
    }

    fn group(&self) -> Result<&BsiGroup> {
        match &self.data {
            FragmentData::Bsi(group) => Ok(group),
            FragmentData::Rows(_) => Err(Error::schema("value operation on a non-int field")),
        }
    }

    fn group_mut(&mut self) -> Result<&mut BsiGroup> {
        match &mut self.data {
            FragmentData::Bsi(group) => Ok(group),
            FragmentData::Rows(_) => Err(Error::schema("value operation on a non-int field")),
        }
    }

    /// Returns true iff the bit was previously unset.
    pub fn set_bit(&mut self, row: RowId, column: ColumnId) -> Result<bool> {
        let exclusive = self.exclusive;
        let rows = self.rows_mut()?;
        if exclusive {
            let mut emptied = Vec::new();
            for (&id, bits) in rows.iter_mut() {
                if id != row && bits.remove(column) && bits.is_empty() {
                    emptied.push(id);
                }
            }
            for id in emptied {
                rows.remove(&id);
            }
        }
        Ok(rows.entry(row).or_default().insert(column))
    }

    /// Returns true iff the bit was previously set.
    pub fn clear_bit(&mut self, row: RowId, column: ColumnId) -> Result<bool> {
        let rows = self.rows_mut()?;
        let Some(bits) = rows.get_mut(&row) else {
            return Ok(false);
        };
        let changed = bits.remove(column);
        if bits.is_empty() {
            rows.remove(&row);
        }
        Ok(changed)
    }

    /// Drops every bit of a row; true if any were set.
    pub fn clear_row(&mut self, row: RowId) -> Result<bool> {
        Ok(self.rows_mut()?.remove(&row).is_some_and(|bits| !bits.is_empty()))
    }

    /// Copy of a row's bitmap; empty when the row was never set.
    pub fn row(&self, row: RowId) -> Result<Row> {
        Ok(self.rows_ref()?.get(&row).cloned().unwrap_or_default())
    }

    pub fn row_ids(&self) -> Result<Vec<RowId>> {
        Ok(self.rows_ref()?.keys().copied().collect())
    }

    pub fn rows_for_column(&self, column: ColumnId) -> Result<Vec<RowId>> {
        Ok(self
            .rows_ref()?
            .iter()
            .filter(|(_, bits)| bits.contains(column))
            .map(|(&id, _)| id)
            .collect())
    }

    /// Non-zero `(row, count)` pairs ordered by row id, optionally
    /// restricted to the columns of `filter`.
    pub fn row_counts(&self, filter: Option<&Row>) -> Result<Vec<(RowId, u64)>> {
        let rows = self.rows_ref()?;
        Ok(rows
            .iter()
            .map(|(&id, bits)| {
                let count = match filter {
                    Some(filter) => bits.intersection_count(filter),
                    None => bits.count(),
                };
                (id, count)
            })
            .filter(|&(_, count)| count > 0)
            .collect())
    }

    /// Every column with at least one bit or value in this fragment.
    pub fn columns(&self) -> Row {
        match &self.data {
            FragmentData::Rows(rows) => {
                let mut all = Row::new();
                for bits in rows.values() {
                    all.union_in_place(bits);
                }
                all
            }
            FragmentData::Bsi(group) => Row::from(group.not_null()),
        }
    }

    pub fn set_value(&mut self, column: ColumnId, value: i64) -> Result<bool> {
        Ok(self.group_mut()?.set_value(column, value))
    }

    pub fn clear_value(&mut self, column: ColumnId) -> Result<bool> {
        Ok(self.group_mut()?.clear_value(column))
    }

    pub fn value(&self, column: ColumnId) -> Result<Option<i64>> {
        Ok(self.group()?.value(column))
    }

    pub fn range(&self, op: RangeOp, predicate: i64) -> Result<Row> {
        Ok(Row::from(self.group()?.range(op, predicate)))
    }

    pub fn between(&self, low: i64, high: i64) -> Result<Row> {
        Ok(Row::from(self.group()?.between(low, high)))
    }

    pub fn sum(&self, filter: Option<&Row>) -> Result<(i128, u64)> {
        Ok(self.group()?.sum(filter.map(Row::bitmap)))
    }

    pub fn min(&self, filter: Option<&Row>) -> Result<Option<(i64, u64)>> {
        Ok(self.group()?.min(filter.map(Row::bitmap)))
    }

    pub fn max(&self, filter: Option<&Row>) -> Result<Option<(i64, u64)>> {
        Ok(self.group()?.max(filter.map(Row::bitmap)))
    }

    pub fn snapshot(&self) -> Result<FragmentSnapshot> {
        let data = match &self.data {
            FragmentData::Rows(rows) => {
                let mut encoded = Vec::with_capacity(rows.len());
                for (&id, bits) in rows {
                    encoded.push((id, bits.to_bytes()?));
                }
                SnapshotData::Rows(encoded)
            }
            FragmentData::Bsi(group) => SnapshotData::Bsi {
                base: group.base(),
                exists: encode_bitmap(group.exists())?,
                sign: encode_bitmap(group.sign())?,
                planes: group.planes().iter().map(encode_bitmap).collect::<Result<_>>()?,
            },
        };
        Ok(FragmentSnapshot { shard: self.shard, data })
    }

    pub fn restore(snapshot: &FragmentSnapshot, exclusive: bool) -> Result<Fragment> {
        let data = match &snapshot.data {
            SnapshotData::Rows(encoded) => {
                let mut rows = BTreeMap::new();
                for (id, bytes) in encoded {
                    rows.insert(*id, Row::from_bytes(bytes)?);
                }
                FragmentData::Rows(rows)
            }
            SnapshotData::Bsi { base, exists, sign, planes } => {
                let planes = planes
                    .iter()
                    .map(|bytes| decode_bitmap(bytes))
                    .collect::<Result<Vec<RoaringTreemap>>>()?;
                FragmentData::Bsi(BsiGroup::from_parts(
                    *base,
                    decode_bitmap(exists)?,
                    decode_bitmap(sign)?,
                    planes,
                ))
            }
        };
        Ok(Fragment { shard: snapshot.shard, exclusive, data })
    }
}

/// Serializable image of a fragment, bitmaps in roaring's portable format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentSnapshot {
    pub shard: ShardId,
    pub data: SnapshotData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SnapshotData {
    Rows(Vec<(RowId, Vec<u8>)>),
    Bsi {
        base: i64,
        exists: Vec<u8>,
        sign: Vec<u8>,
        planes: Vec<Vec<u8>>,
    },
}
