//! Associative, commutative reducers joining per-shard partial results.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use crate::bitmap::row::Row;
use crate::core::types::{RowId, ValCount};

pub fn union_rows(parts: Vec<Row>) -> Row {
    let mut merged = Row::new();
    for part in &parts {
        merged.union_in_place(part);
    }
    merged
}

pub fn sum_counts(parts: &[u64]) -> u64 {
    parts.iter().sum()
}

/// K-way merge of per-shard `(row, count)` lists, each sorted by row id.
/// Counts of the same row are summed; output stays sorted by row id.
pub fn merge_pairs(parts: Vec<Vec<(RowId, u64)>>) -> Vec<(RowId, u64)> {
    let mut cursors: Vec<std::vec::IntoIter<(RowId, u64)>> =
        parts.into_iter().map(Vec::into_iter).collect();
    let mut heap = BinaryHeap::new();
    for (source, cursor) in cursors.iter_mut().enumerate() {
        if let Some((row, count)) = cursor.next() {
            heap.push(Reverse((row, source, count)));
        }
    }

    let mut merged: Vec<(RowId, u64)> = Vec::new();
    while let Some(Reverse((row, source, count))) = heap.pop() {
        match merged.last_mut() {
            Some(last) if last.0 == row => last.1 += count,
            _ => merged.push((row, count)),
        }
        if let Some((next_row, next_count)) = cursors[source].next() {
            heap.push(Reverse((next_row, source, next_count)));
        }
    }
    merged
}

/// Global rank selection: highest counts first, ties broken by row id.
pub fn top_n(mut pairs: Vec<(RowId, u64)>, n: usize) -> Vec<(RowId, u64)> {
    pairs.sort_by(|a, b| match b.1.cmp(&a.1) {
        Ordering::Equal => a.0.cmp(&b.0),
        other => other,
    });
    pairs.truncate(n);
    pairs
}

pub fn sum_val_counts(parts: &[(i128, u64)]) -> (i128, u64) {
    parts
        .iter()
        .fold((0, 0), |(total, count), &(value, n)| (total + value, count + n))
}

/// Smallest value across shards; counts of equal minima add up.
pub fn min_val_count(parts: &[Option<(i64, u64)>]) -> Option<ValCount> {
    extreme(parts, Ordering::Less)
}

pub fn max_val_count(parts: &[Option<(i64, u64)>]) -> Option<ValCount> {
    extreme(parts, Ordering::Greater)
}

fn extreme(parts: &[Option<(i64, u64)>], better: Ordering) -> Option<ValCount> {
    let mut best: Option<ValCount> = None;
    for &(value, count) in parts.iter().flatten() {
        best = match best {
            None => Some(ValCount::new(value, count)),
            Some(current) => match value.cmp(&current.value) {
                Ordering::Equal => Some(ValCount::new(value, current.count + count)),
                ord if ord == better => Some(ValCount::new(value, count)),
                _ => Some(current),
            },
        };
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_merge_in_row_order() {
        let merged = merge_pairs(vec![
            vec![(1, 2), (5, 1)],
            vec![(1, 3), (2, 7)],
            vec![],
            vec![(5, 4)],
        ]);
        assert_eq!(merged, vec![(1, 5), (2, 7), (5, 5)]);
    }

    #[test]
    fn top_n_breaks_ties_by_row() {
        let ranked = top_n(vec![(9, 3), (2, 5), (4, 3), (1, 1)], 3);
        assert_eq!(ranked, vec![(2, 5), (4, 3), (9, 3)]);
    }

    #[test]
    fn extremes_merge_counts() {
        let parts = [Some((3, 1)), None, Some((-2, 2)), Some((-2, 1))];
        assert_eq!(min_val_count(&parts), Some(ValCount::new(-2, 3)));
        assert_eq!(max_val_count(&parts), Some(ValCount::new(3, 1)));
        assert_eq!(min_val_count(&[None, None]), None);
        assert_eq!(sum_val_counts(&[(5, 1), (-2, 2)]), (3, 3));
    }

    #[test]
    fn union_of_parts() {
        let merged = union_rows(vec![Row::from_columns([1, 4]), Row::from_columns([2, 4])]);
        assert_eq!(merged.to_vec(), vec![1, 2, 4]);
        assert_eq!(sum_counts(&[1, 2, 3]), 6);
    }
}
