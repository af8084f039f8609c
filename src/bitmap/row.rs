use std::io::Cursor;
use roaring::RoaringTreemap;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::ColumnId;

/// Compressed set of columns carrying one field value.
///
/// Backed by a roaring treemap so memory stays proportional to the number
/// of containers touched rather than to the column range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    bits: RoaringTreemap,
}

impl Row {
    pub fn new() -> Self {
        Row { bits: RoaringTreemap::new() }
    }

    pub fn from_columns<I: IntoIterator<Item = ColumnId>>(columns: I) -> Self {
        Row { bits: columns.into_iter().collect() }
    }

    /// Returns true if the column was not present before.
    pub fn insert(&mut self, column: ColumnId) -> bool {
        self.bits.insert(column)
    }

    /// Returns true if the column was present before.
    pub fn remove(&mut self, column: ColumnId) -> bool {
        self.bits.remove(column)
    }

    pub fn contains(&self, column: ColumnId) -> bool {
        self.bits.contains(column)
    }

    pub fn count(&self) -> u64 {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Ascending column iterator. Calling it again restarts from the first column.
    pub fn columns(&self) -> impl Iterator<Item = ColumnId> + '_ {
        self.bits.iter()
    }

    pub fn to_vec(&self) -> Vec<ColumnId> {
        self.bits.iter().collect()
    }

    pub fn union(&self, other: &Row) -> Row {
        Row { bits: &self.bits | &other.bits }
    }

    pub fn intersect(&self, other: &Row) -> Row {
        Row { bits: &self.bits & &other.bits }
    }

    pub fn difference(&self, other: &Row) -> Row {
        Row { bits: &self.bits - &other.bits }
    }

    pub fn xor(&self, other: &Row) -> Row {
        Row { bits: &self.bits ^ &other.bits }
    }

    pub fn union_in_place(&mut self, other: &Row) {
        self.bits |= &other.bits;
    }

    pub fn intersect_in_place(&mut self, other: &Row) {
        self.bits &= &other.bits;
    }

    pub fn intersection_count(&self, other: &Row) -> u64 {
        (&self.bits & &other.bits).len()
    }

    pub fn min(&self) -> Option<ColumnId> {
        self.bits.min()
    }

    pub fn max(&self) -> Option<ColumnId> {
        self.bits.max()
    }

    pub fn bitmap(&self) -> &RoaringTreemap {
        &self.bits
    }

    pub fn into_bitmap(self) -> RoaringTreemap {
        self.bits
    }

    /// Portable roaring encoding, used by backups.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode_bitmap(&self.bits)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Row> {
        Ok(Row { bits: decode_bitmap(bytes)? })
    }
}

impl From<RoaringTreemap> for Row {
    fn from(bits: RoaringTreemap) -> Self {
        Row { bits }
    }
}

impl FromIterator<ColumnId> for Row {
    fn from_iter<T: IntoIterator<Item = ColumnId>>(iter: T) -> Self {
        Row::from_columns(iter)
    }
}

pub(crate) fn encode_bitmap(bits: &RoaringTreemap) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(bits.serialized_size());
    bits.serialize_into(&mut out)?;
    Ok(out)
}

pub(crate) fn decode_bitmap(bytes: &[u8]) -> Result<RoaringTreemap> {
    RoaringTreemap::deserialize_from(Cursor::new(bytes))
        .map_err(|e| Error::new(ErrorKind::Io, format!("corrupt bitmap: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_reports_first_set_only() {
        let mut row = Row::new();
        assert!(row.insert(10));
        assert!(!row.insert(10));
        assert!(row.remove(10));
        assert!(!row.remove(10));
        assert!(row.is_empty());
    }

    #[test]
    fn set_operations() {
        let a = Row::from_columns([1, 2, 3, 1 << 40]);
        let b = Row::from_columns([3, 4, 1 << 40]);
        assert_eq!(a.union(&b).to_vec(), vec![1, 2, 3, 4, 1 << 40]);
        assert_eq!(a.intersect(&b).to_vec(), vec![3, 1 << 40]);
        assert_eq!(a.difference(&b).to_vec(), vec![1, 2]);
        assert_eq!(a.xor(&b).to_vec(), vec![1, 2, 4]);
        assert_eq!(a.intersection_count(&b), 2);
    }

    #[test]
    fn columns_iterator_restarts() {
        let row = Row::from_columns([5, 1, 3]);
        let first: Vec<_> = row.columns().collect();
        let second: Vec<_> = row.columns().collect();
        assert_eq!(first, vec![1, 3, 5]);
        assert_eq!(first, second);
    }

    #[test]
    fn bytes_preserve_contents() {
        let row = Row::from_columns([0, 65_536, u32::MAX as u64 + 7]);
        let decoded = Row::from_bytes(&row.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, row);
        assert!(Row::from_bytes(&[1, 2, 3]).is_err());
    }
}
