//! Time ranges and epoch-anchored bucket math.
//!
//! Series buffers throughout this crate carry timestamps as `f64`
//! seconds since the Unix epoch (1970-01-01T00:00:00Z). This module
//! defines:
//!
//! - [`TimeRange`], a closed interval of such timestamps.
//! - [`TimeBucket`], the bucket width used to discretize time.
//! - Helpers mapping timestamps into `u32` bucket ids, counted forward
//!   from the epoch.
//!
//! Bucket ids are monotonic in time: later timestamps never map to a
//! smaller id than earlier ones. This mapping is the discretization used
//! by the coverage tracker; calendar partition math lives in the store
//! layer instead.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::coverage::Bucket;

const SECONDS_PER_MINUTE: i64 = 60;
const SECONDS_PER_HOUR: i64 = 60 * 60;
const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// A closed time interval `[start, end]` in seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive lower bound, seconds since the Unix epoch.
    pub start: f64,
    /// Inclusive upper bound, seconds since the Unix epoch.
    pub end: f64,
}

impl TimeRange {
    /// Build a range from inclusive bounds.
    ///
    /// Expects `start <= end`; an inverted range trips a debug assertion
    /// and is carried through unchanged in release builds.
    pub fn new(start: f64, end: f64) -> Self {
        debug_assert!(
            start <= end,
            "TimeRange expects start <= end; got [{start}, {end}]"
        );
        Self { start, end }
    }

    /// Range spanned by the first and last element of a monotonic
    /// timestamp array, or `None` for an empty array.
    pub fn from_times(times: &[f64]) -> Option<Self> {
        match (times.first(), times.last()) {
            (Some(&start), Some(&end)) => Some(Self::new(start, end)),
            _ => None,
        }
    }

    /// Length of the interval in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.end - self.start
    }

    /// Whether `t` lies inside the closed interval.
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t <= self.end
    }

    /// Whether the two closed intervals share at least one point.
    pub fn intersects(&self, other: &TimeRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Shrink both ends by `secs`, degrading to the midpoint when the
    /// interval is too short to absorb the buffer on both sides.
    pub fn shrunk(&self, secs: f64) -> TimeRange {
        if self.duration_secs() > 2.0 * secs {
            TimeRange {
                start: self.start + secs,
                end: self.end - secs,
            }
        } else {
            let mid = 0.5 * (self.start + self.end);
            TimeRange { start: mid, end: mid }
        }
    }
}

/// Discrete bucket width used when mapping timestamps to bucket ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeBucket {
    /// A bucket spanning a fixed number of seconds.
    Seconds(u32),
    /// A bucket spanning a fixed number of minutes.
    Minutes(u32),
    /// A bucket spanning a fixed number of hours.
    Hours(u32),
    /// A bucket spanning a fixed number of days.
    Days(u32),
}

/// Return the bucket length in whole seconds for a given [`TimeBucket`].
pub fn bucket_len_secs(spec: &TimeBucket) -> i64 {
    match *spec {
        TimeBucket::Seconds(n) => n as i64,
        TimeBucket::Minutes(n) => (n as i64) * SECONDS_PER_MINUTE,
        TimeBucket::Hours(n) => (n as i64) * SECONDS_PER_HOUR,
        TimeBucket::Days(n) => (n as i64) * SECONDS_PER_DAY,
    }
}

/// Map seconds since the Unix epoch into a discrete bucket id.
///
/// Semantics:
///
/// - Bucket 0 starts at the epoch; buckets are contiguous half-open
///   intervals `[k * len, (k + 1) * len)` where `len` is the bucket
///   length in seconds.
/// - The id is `floor(secs / len)`, computed with Euclidean division so
///   the mapping stays monotonic around the epoch.
/// - Pre-epoch timestamps clamp to bucket 0 and ids beyond `u32::MAX`
///   clamp to `u32::MAX`, each with a debug assertion; neither occurs
///   for the instrument date ranges this crate works with.
pub fn bucket_id(spec: &TimeBucket, epoch_secs: f64) -> Bucket {
    let len_secs = bucket_len_secs(spec);
    debug_assert!(len_secs > 0, "TimeBucket width must be positive");

    // f64 -> i64 casts saturate, so NaN and huge inputs cannot wrap.
    let secs = epoch_secs.floor() as i64;
    let bucket = secs.div_euclid(len_secs);

    debug_assert!(
        bucket >= 0,
        "bucket_id received pre-epoch timestamp {epoch_secs} -> bucket {bucket}"
    );
    debug_assert!(
        bucket <= u32::MAX as i64,
        "bucket id {bucket} exceeds u32::MAX"
    );
    bucket.clamp(0, u32::MAX as i64) as Bucket
}

/// Return the *inclusive* range of bucket ids intersecting the closed
/// time range.
pub fn bucket_span(spec: &TimeBucket, range: &TimeRange) -> RangeInclusive<Bucket> {
    debug_assert!(
        range.start <= range.end,
        "bucket_span expects start <= end; got [{}, {}]",
        range.start,
        range.end
    );

    let first = bucket_id(spec, range.start);
    let last = bucket_id(spec, range.end);
    first..=last
}

/// Start of a bucket in seconds since the Unix epoch.
pub fn bucket_start_secs(spec: &TimeBucket, bucket: Bucket) -> f64 {
    (bucket as i64 * bucket_len_secs(spec)) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_id_monotonic_seconds() {
        let spec = TimeBucket::Seconds(60);

        let b0 = bucket_id(&spec, 0.0);
        let b1 = bucket_id(&spec, 1.0);
        let b2 = bucket_id(&spec, 60.0);
        let b3 = bucket_id(&spec, 61.5);

        assert!(b0 <= b1);
        assert!(b1 <= b2);
        assert!(b2 <= b3);
        assert_eq!(b0, b1); // still bucket 0
        assert_eq!(b2, b3); // both in bucket 1
        assert_eq!(b2, b0 + 1);
    }

    #[test]
    fn bucket_span_closed_interval() {
        let spec = TimeBucket::Seconds(60);
        let range = TimeRange::new(10.0, 180.0);

        let span = bucket_span(&spec, &range);
        // Buckets at 0, 60, 120, and 180 seconds all intersect [10, 180].
        assert_eq!((*span.start(), *span.end()), (0, 3));
    }

    #[test]
    fn bucket_span_single_bucket() {
        let spec = TimeBucket::Hours(1);
        let range = TimeRange::new(3600.0, 3630.0);

        let span = bucket_span(&spec, &range);
        assert_eq!(*span.start(), *span.end());
    }

    #[test]
    fn bucket_len_secs_covers_variants() {
        assert_eq!(bucket_len_secs(&TimeBucket::Seconds(7)), 7);
        assert_eq!(bucket_len_secs(&TimeBucket::Minutes(3)), 3 * 60);
        assert_eq!(bucket_len_secs(&TimeBucket::Hours(2)), 2 * 60 * 60);
        assert_eq!(bucket_len_secs(&TimeBucket::Days(1)), 24 * 60 * 60);
    }

    #[test]
    fn bucket_start_inverts_bucket_id() {
        let spec = TimeBucket::Seconds(30);
        let id = bucket_id(&spec, 95.0);
        assert_eq!(bucket_start_secs(&spec, id), 90.0);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic]
    fn bucket_id_pre_epoch_panics_in_debug() {
        let spec = TimeBucket::Minutes(1);
        let _ = bucket_id(&spec, -60.0);
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn bucket_id_pre_epoch_clamps_to_zero_in_release() {
        let spec = TimeBucket::Minutes(1);
        assert_eq!(bucket_id(&spec, -60.0), 0);
    }

    #[test]
    fn shrunk_applies_buffer_on_both_ends() {
        let range = TimeRange::new(100.0, 200.0);
        let shrunk = range.shrunk(5.0);
        assert_eq!(shrunk.start, 105.0);
        assert_eq!(shrunk.end, 195.0);
    }

    #[test]
    fn shrunk_degrades_to_midpoint_for_short_ranges() {
        let range = TimeRange::new(100.0, 104.0);
        let shrunk = range.shrunk(5.0);
        assert_eq!(shrunk.start, 102.0);
        assert_eq!(shrunk.end, 102.0);
    }

    #[test]
    fn from_times_empty_is_none() {
        assert!(TimeRange::from_times(&[]).is_none());
        let r = TimeRange::from_times(&[3.0, 4.0, 9.0]).expect("non-empty");
        assert_eq!((r.start, r.end), (3.0, 9.0));
    }

    #[test]
    fn intersects_closed_endpoints() {
        let a = TimeRange::new(0.0, 10.0);
        let b = TimeRange::new(10.0, 20.0);
        let c = TimeRange::new(10.5, 20.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }
}
