use roaring::RoaringTreemap;
use crate::core::types::ColumnId;

/// Comparison applied to a bit-sliced integer group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

/// Bit-sliced integer storage for one shard of an int field.
///
/// Each value is stored as `value - base` in sign/magnitude form: `exists`
/// holds every column with a value, `sign` the columns whose stored value
/// is negative, and `planes[i]` the columns whose magnitude has bit `i` set.
/// Range predicates are answered by walking the planes from the most
/// significant bit down, never by looking at individual values.
#[derive(Debug, Clone, PartialEq)]
pub struct BsiGroup {
    base: i64,
    bit_depth: u8,
    exists: RoaringTreemap,
    sign: RoaringTreemap,
    planes: Vec<RoaringTreemap>,
}

/// Offset applied before encoding so that one-sided bounds need fewer planes.
pub fn base_for(min: i64, max: i64) -> i64 {
    if min > 0 {
        min
    } else if max < 0 {
        max
    } else {
        0
    }
}

/// Planes needed to hold the magnitude of any value in `[min, max]`.
pub fn bit_depth_for(min: i64, max: i64) -> u8 {
    let base = base_for(min, max) as i128;
    let span = (min as i128 - base)
        .unsigned_abs()
        .max((max as i128 - base).unsigned_abs());
    ((128 - span.leading_zeros()) as u8).max(1)
}

impl BsiGroup {
    pub fn new(min: i64, max: i64) -> Self {
        let bit_depth = bit_depth_for(min, max);
        BsiGroup {
            base: base_for(min, max),
            bit_depth,
            exists: RoaringTreemap::new(),
            sign: RoaringTreemap::new(),
            planes: vec![RoaringTreemap::new(); bit_depth as usize],
        }
    }

    pub fn from_parts(
        base: i64,
        exists: RoaringTreemap,
        sign: RoaringTreemap,
        planes: Vec<RoaringTreemap>,
    ) -> Self {
        BsiGroup { base, bit_depth: planes.len() as u8, exists, sign, planes }
    }

    pub fn base(&self) -> i64 {
        self.base
    }

    pub fn bit_depth(&self) -> u8 {
        self.bit_depth
    }

    pub fn exists(&self) -> &RoaringTreemap {
        &self.exists
    }

    pub fn sign(&self) -> &RoaringTreemap {
        &self.sign
    }

    pub fn planes(&self) -> &[RoaringTreemap] {
        &self.planes
    }

    /// Writes a value; returns false when the column already held it.
    /// The caller is responsible for keeping `value` inside the field bounds.
    pub fn set_value(&mut self, column: ColumnId, value: i64) -> bool {
        if self.value(column) == Some(value) {
            return false;
        }
        let stored = value as i128 - self.base as i128;
        let magnitude = stored.unsigned_abs();
        debug_assert!(magnitude >> self.bit_depth == 0, "value outside bit depth");

        self.exists.insert(column);
        if stored < 0 {
            self.sign.insert(column);
        } else {
            self.sign.remove(column);
        }
        for (i, plane) in self.planes.iter_mut().enumerate() {
            if (magnitude >> i) & 1 == 1 {
                plane.insert(column);
            } else {
                plane.remove(column);
            }
        }
        true
    }

    pub fn clear_value(&mut self, column: ColumnId) -> bool {
        if !self.exists.remove(column) {
            return false;
        }
        self.sign.remove(column);
        for plane in &mut self.planes {
            plane.remove(column);
        }
        true
    }

    pub fn value(&self, column: ColumnId) -> Option<i64> {
        if !self.exists.contains(column) {
            return None;
        }
        let mut magnitude: u128 = 0;
        for (i, plane) in self.planes.iter().enumerate() {
            if plane.contains(column) {
                magnitude |= 1 << i;
            }
        }
        let stored = if self.sign.contains(column) {
            -(magnitude as i128)
        } else {
            magnitude as i128
        };
        Some((self.base as i128 + stored) as i64)
    }

    pub fn not_null(&self) -> RoaringTreemap {
        self.exists.clone()
    }

    /// Columns whose value satisfies `value <op> predicate`. Predicates
    /// outside the field bounds saturate instead of failing.
    pub fn range(&self, op: RangeOp, predicate: i64) -> RoaringTreemap {
        let stored = predicate as i128 - self.base as i128;
        let magnitude = stored.unsigned_abs();
        let positives = &self.exists - &self.sign;
        let negatives = &self.exists & &self.sign;

        match op {
            RangeOp::Eq if stored >= 0 => self.eq_magnitude(positives, magnitude),
            RangeOp::Eq => self.eq_magnitude(negatives, magnitude),
            RangeOp::Neq => &self.exists - &self.range(RangeOp::Eq, predicate),
            RangeOp::Lt | RangeOp::Lte => {
                let allow_eq = op == RangeOp::Lte;
                if stored >= 0 {
                    negatives | self.lt_magnitude(positives, magnitude, allow_eq)
                } else {
                    self.gt_magnitude(negatives, magnitude, allow_eq)
                }
            }
            RangeOp::Gt | RangeOp::Gte => {
                let allow_eq = op == RangeOp::Gte;
                if stored >= 0 {
                    self.gt_magnitude(positives, magnitude, allow_eq)
                } else {
                    positives | self.lt_magnitude(negatives, magnitude, allow_eq)
                }
            }
        }
    }

    /// Inclusive on both ends.
    pub fn between(&self, low: i64, high: i64) -> RoaringTreemap {
        if low > high {
            return RoaringTreemap::new();
        }
        &self.range(RangeOp::Gte, low) & &self.range(RangeOp::Lte, high)
    }

    /// Sum of the values of `filter ∩ exists`, with the number of columns summed.
    pub fn sum(&self, filter: Option<&RoaringTreemap>) -> (i128, u64) {
        let set = self.filtered(filter);
        let count = set.len();
        let positives = &set - &self.sign;
        let negatives = &set & &self.sign;

        let mut total: i128 = 0;
        for (i, plane) in self.planes.iter().enumerate() {
            let up = (&positives & plane).len() as i128;
            let down = (&negatives & plane).len() as i128;
            total += (up - down) << i;
        }
        total += self.base as i128 * count as i128;
        (total, count)
    }

    /// Smallest value in `filter ∩ exists` and how many columns hold it.
    pub fn min(&self, filter: Option<&RoaringTreemap>) -> Option<(i64, u64)> {
        let set = self.filtered(filter);
        if set.is_empty() {
            return None;
        }
        let negatives = &set & &self.sign;
        if !negatives.is_empty() {
            let (magnitude, count) = self.max_magnitude(negatives);
            return Some((self.decode(magnitude, true), count));
        }
        let (magnitude, count) = self.min_magnitude(&set - &self.sign);
        Some((self.decode(magnitude, false), count))
    }

    /// Largest value in `filter ∩ exists` and how many columns hold it.
    pub fn max(&self, filter: Option<&RoaringTreemap>) -> Option<(i64, u64)> {
        let set = self.filtered(filter);
        if set.is_empty() {
            return None;
        }
        let positives = &set - &self.sign;
        if !positives.is_empty() {
            let (magnitude, count) = self.max_magnitude(positives);
            return Some((self.decode(magnitude, false), count));
        }
        let (magnitude, count) = self.min_magnitude(&set & &self.sign);
        Some((self.decode(magnitude, true), count))
    }

    fn filtered(&self, filter: Option<&RoaringTreemap>) -> RoaringTreemap {
        match filter {
            Some(filter) => &self.exists & filter,
            None => self.exists.clone(),
        }
    }

    fn decode(&self, magnitude: u128, negative: bool) -> i64 {
        let stored = if negative { -(magnitude as i128) } else { magnitude as i128 };
        (self.base as i128 + stored) as i64
    }

    fn fits(&self, magnitude: u128) -> bool {
        magnitude >> self.bit_depth == 0
    }

    fn eq_magnitude(&self, mut candidates: RoaringTreemap, magnitude: u128) -> RoaringTreemap {
        if !self.fits(magnitude) {
            return RoaringTreemap::new();
        }
        for i in (0..self.planes.len()).rev() {
            if (magnitude >> i) & 1 == 1 {
                candidates &= &self.planes[i];
            } else {
                candidates -= &self.planes[i];
            }
        }
        candidates
    }

    fn lt_magnitude(&self, mut candidates: RoaringTreemap, magnitude: u128, allow_eq: bool) -> RoaringTreemap {
        if !self.fits(magnitude) {
            return candidates;
        }
        let mut keep = RoaringTreemap::new();
        for i in (0..self.planes.len()).rev() {
            if (magnitude >> i) & 1 == 1 {
                keep |= &candidates - &self.planes[i];
                candidates &= &self.planes[i];
            } else {
                candidates -= &self.planes[i];
            }
        }
        if allow_eq {
            keep |= candidates;
        }
        keep
    }

    fn gt_magnitude(&self, mut candidates: RoaringTreemap, magnitude: u128, allow_eq: bool) -> RoaringTreemap {
        if !self.fits(magnitude) {
            return RoaringTreemap::new();
        }
        let mut keep = RoaringTreemap::new();
        for i in (0..self.planes.len()).rev() {
            if (magnitude >> i) & 1 == 1 {
                candidates &= &self.planes[i];
            } else {
                keep |= &candidates & &self.planes[i];
                candidates -= &self.planes[i];
            }
        }
        if allow_eq {
            keep |= candidates;
        }
        keep
    }

    fn max_magnitude(&self, mut candidates: RoaringTreemap) -> (u128, u64) {
        let mut magnitude = 0u128;
        for i in (0..self.planes.len()).rev() {
            let with_bit = &candidates & &self.planes[i];
            if !with_bit.is_empty() {
                candidates = with_bit;
                magnitude |= 1 << i;
            }
        }
        (magnitude, candidates.len())
    }

    fn min_magnitude(&self, mut candidates: RoaringTreemap) -> (u128, u64) {
        let mut magnitude = 0u128;
        for i in (0..self.planes.len()).rev() {
            let without_bit = &candidates - &self.planes[i];
            if without_bit.is_empty() {
                magnitude |= 1 << i;
            } else {
                candidates = without_bit;
            }
        }
        (magnitude, candidates.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(values: &[(u64, i64)], min: i64, max: i64) -> BsiGroup {
        let mut bsi = BsiGroup::new(min, max);
        for &(column, value) in values {
            bsi.set_value(column, value);
        }
        bsi
    }

    fn sorted(bits: RoaringTreemap) -> Vec<u64> {
        bits.iter().collect()
    }

    #[test]
    fn depth_and_base_follow_bounds() {
        assert_eq!(base_for(0, 100_000), 0);
        assert_eq!(bit_depth_for(0, 100_000), 17);
        assert_eq!(base_for(1_000, 1_010), 1_000);
        assert_eq!(bit_depth_for(1_000, 1_010), 4);
        assert_eq!(base_for(-50, -10), -10);
        assert_eq!(bit_depth_for(i64::MIN, i64::MAX), 64);
    }

    #[test]
    fn values_round_trip_through_planes() {
        let bsi = group(&[(1, -7), (2, 0), (3, 42), (4, -100)], -100, 100);
        assert_eq!(bsi.value(1), Some(-7));
        assert_eq!(bsi.value(2), Some(0));
        assert_eq!(bsi.value(3), Some(42));
        assert_eq!(bsi.value(4), Some(-100));
        assert_eq!(bsi.value(5), None);
    }

    #[test]
    fn set_value_reports_change() {
        let mut bsi = BsiGroup::new(0, 10);
        assert!(bsi.set_value(1, 5));
        assert!(!bsi.set_value(1, 5));
        assert!(bsi.set_value(1, 6));
        assert!(bsi.clear_value(1));
        assert!(!bsi.clear_value(1));
        assert_eq!(bsi.value(1), None);
    }

    #[test]
    fn comparisons_across_sign() {
        let bsi = group(&[(1, -7), (2, 0), (3, 42), (4, -100), (5, 3)], -100, 100);
        assert_eq!(sorted(bsi.range(RangeOp::Eq, 42)), vec![3]);
        assert_eq!(sorted(bsi.range(RangeOp::Neq, 42)), vec![1, 2, 4, 5]);
        assert_eq!(sorted(bsi.range(RangeOp::Lt, 0)), vec![1, 4]);
        assert_eq!(sorted(bsi.range(RangeOp::Lte, 0)), vec![1, 2, 4]);
        assert_eq!(sorted(bsi.range(RangeOp::Gt, -7)), vec![2, 3, 5]);
        assert_eq!(sorted(bsi.range(RangeOp::Gte, -7)), vec![1, 2, 3, 5]);
        assert_eq!(sorted(bsi.range(RangeOp::Lt, -50)), vec![4]);
        assert_eq!(sorted(bsi.between(-7, 3)), vec![1, 2, 5]);
        assert!(bsi.between(5, 1).is_empty());
    }

    #[test]
    fn predicates_outside_bounds_saturate() {
        let bsi = group(&[(1, 0), (2, 100_000)], 0, 100_000);
        assert_eq!(sorted(bsi.range(RangeOp::Lt, 1 << 40)), vec![1, 2]);
        assert!(bsi.range(RangeOp::Gt, 1 << 40).is_empty());
        assert!(bsi.range(RangeOp::Eq, 1 << 40).is_empty());
        assert_eq!(sorted(bsi.range(RangeOp::Gt, -5)), vec![1, 2]);
    }

    #[test]
    fn offset_base_encoding() {
        let bsi = group(&[(1, 1_000), (2, 1_005), (3, 1_010)], 1_000, 1_010);
        assert_eq!(sorted(bsi.range(RangeOp::Gt, 1_000)), vec![2, 3]);
        assert_eq!(sorted(bsi.range(RangeOp::Lt, 999)), Vec::<u64>::new());
        assert_eq!(bsi.sum(None), (3_015, 3));
    }

    #[test]
    fn aggregates() {
        let bsi = group(&[(1, -7), (2, 0), (3, 42), (4, -7), (5, 42)], -100, 100);
        assert_eq!(bsi.sum(None), (70, 5));
        assert_eq!(bsi.min(None), Some((-7, 2)));
        assert_eq!(bsi.max(None), Some((42, 2)));

        let filter: RoaringTreemap = [2u64, 3].into_iter().collect();
        assert_eq!(bsi.sum(Some(&filter)), (42, 2));
        assert_eq!(bsi.min(Some(&filter)), Some((0, 1)));

        let empty = RoaringTreemap::new();
        assert_eq!(bsi.min(Some(&empty)), None);
    }

    #[test]
    fn all_negative_max() {
        let bsi = group(&[(1, -3), (2, -9)], -10, 10);
        assert_eq!(bsi.max(None), Some((-3, 1)));
        assert_eq!(bsi.min(None), Some((-9, 1)));
    }
}
