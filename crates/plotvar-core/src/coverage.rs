//! Bucket-level coverage tracking backed by a roaring bitmap.
//!
//! A [`Coverage`] records which time buckets a variable has data for,
//! with each present bucket stored as one bit in a [`RoaringBitmap`].
//! The bitmap compresses dense runs of buckets well, which matches the
//! usual shape of instrument data: long contiguous stretches with the
//! occasional gap.
//!
//! Bucket ids come from [`crate::time::bucket_id`]; this module never
//! interprets them beyond set membership. The per-variable bookkeeping
//! that decides *when* a recomputation is needed lives in [`tracker`].

pub mod tracker;

use std::ops::RangeInclusive;

use roaring::RoaringBitmap;

/// Identifier of a single time bucket counted forward from the epoch.
pub type Bucket = u32;

/// Set of buckets currently covered, one bit per present bucket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Coverage {
    bitmap: RoaringBitmap,
}

impl Coverage {
    /// Empty coverage with no buckets present.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wrap an existing bitmap.
    pub fn from_bitmap(bitmap: RoaringBitmap) -> Self {
        Self { bitmap }
    }

    /// Whether a single bucket is present.
    pub fn present(&self, bucket: Bucket) -> bool {
        self.bitmap.contains(bucket)
    }

    /// Mark every bucket in the inclusive span as present.
    ///
    /// Inserting a span that is already covered is a no-op, so repeated
    /// recordings of the same range stay idempotent.
    pub fn insert_span(&mut self, span: RangeInclusive<Bucket>) {
        if span.is_empty() {
            return;
        }
        self.bitmap.insert_range(span);
    }

    /// Whether every bucket in the inclusive span is present.
    pub fn contains_span(&self, span: RangeInclusive<Bucket>) -> bool {
        if span.is_empty() {
            return true;
        }
        let mut want = RoaringBitmap::new();
        want.insert_range(span);
        want.is_subset(&self.bitmap)
    }

    /// Union another coverage set into this one.
    pub fn union_with(&mut self, other: &Coverage) {
        self.bitmap |= &other.bitmap;
    }

    /// Number of buckets present.
    pub fn cardinality(&self) -> u64 {
        self.bitmap.len()
    }

    /// Whether no bucket is present.
    pub fn is_empty(&self) -> bool {
        self.bitmap.is_empty()
    }

    /// Present buckets as maximal inclusive runs, in ascending order.
    pub fn runs(&self) -> Vec<RangeInclusive<Bucket>> {
        runs_from_bitmap(&self.bitmap)
    }
}

impl FromIterator<Bucket> for Coverage {
    fn from_iter<I: IntoIterator<Item = Bucket>>(iter: I) -> Self {
        Self {
            bitmap: RoaringBitmap::from_iter(iter),
        }
    }
}

/// Collapse the sorted bucket ids of a bitmap into maximal inclusive runs.
fn runs_from_bitmap(bitmap: &RoaringBitmap) -> Vec<RangeInclusive<Bucket>> {
    let mut runs = Vec::new();
    let mut iter = bitmap.iter();

    let Some(first) = iter.next() else {
        return runs;
    };

    let mut run_start = first;
    let mut prev = first;

    for bucket in iter {
        if bucket != prev + 1 {
            runs.push(run_start..=prev);
            run_start = bucket;
        }
        prev = bucket;
    }
    runs.push(run_start..=prev);

    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_coverage_has_no_buckets() {
        let cov = Coverage::empty();
        assert!(cov.is_empty());
        assert_eq!(cov.cardinality(), 0);
        assert!(!cov.present(0));
        assert!(cov.runs().is_empty());
    }

    #[test]
    fn insert_span_marks_every_bucket() {
        let mut cov = Coverage::empty();
        cov.insert_span(3..=6);

        for bucket in 3..=6 {
            assert!(cov.present(bucket));
        }
        assert!(!cov.present(2));
        assert!(!cov.present(7));
        assert_eq!(cov.cardinality(), 4);
    }

    #[test]
    fn insert_span_is_idempotent() {
        let mut cov = Coverage::empty();
        cov.insert_span(10..=20);
        let before = cov.clone();
        cov.insert_span(10..=20);
        assert_eq!(cov, before);
    }

    #[test]
    fn contains_span_requires_every_bucket() {
        let mut cov = Coverage::empty();
        cov.insert_span(5..=10);

        assert!(cov.contains_span(5..=10));
        assert!(cov.contains_span(6..=9));
        assert!(!cov.contains_span(4..=10));
        assert!(!cov.contains_span(5..=11));
    }

    #[test]
    fn adjacent_spans_merge_into_one_run() {
        let mut cov = Coverage::empty();
        cov.insert_span(0..=4);
        cov.insert_span(5..=9);

        assert_eq!(cov.runs(), vec![0..=9]);
    }

    #[test]
    fn disjoint_spans_stay_separate_runs() {
        let mut cov = Coverage::empty();
        cov.insert_span(0..=2);
        cov.insert_span(10..=12);

        assert_eq!(cov.runs(), vec![0..=2, 10..=12]);
        assert!(!cov.contains_span(0..=12));
    }

    #[test]
    fn union_accumulates_both_sides() {
        let mut a: Coverage = (0..5).collect();
        let b: Coverage = (3..8).collect();

        a.union_with(&b);
        assert_eq!(a.cardinality(), 8);
        assert!(a.contains_span(0..=7));
    }

    #[test]
    fn single_bucket_run() {
        let cov: Coverage = std::iter::once(42).collect();
        assert_eq!(cov.runs(), vec![42..=42]);
    }
}
