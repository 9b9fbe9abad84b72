//! Per-variable coverage bookkeeping.
//!
//! The [`CoverageTracker`] answers one question for the engine: has this
//! variable already been computed (or imported) over this time range?
//! Each tracked variable gets its own [`Coverage`] set, keyed by data
//! type plus an optional variable name so raw container coverage and
//! individual derived variables coexist in one tracker.
//!
//! Queries shrink the requested range by a tolerance before testing
//! coverage. Plot windows rarely land on exact cache boundaries, and
//! without the tolerance a request one second wider than the cached
//! span would force a full recomputation.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use log::debug;

use crate::coverage::{Bucket, Coverage};
use crate::time::{self, TimeBucket, TimeRange};

/// Key identifying one tracked coverage set.
///
/// `variable: None` tracks a data type as a whole (raw imported data);
/// `Some(name)` tracks a single derived variable within that type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CoverageKey {
    /// Data type the coverage belongs to.
    pub data_type: String,
    /// Variable within the data type, or `None` for the type as a whole.
    pub variable: Option<String>,
}

impl CoverageKey {
    /// Build a key from string-ish parts.
    pub fn new(data_type: impl Into<String>, variable: Option<&str>) -> Self {
        Self {
            data_type: data_type.into(),
            variable: variable.map(str::to_owned),
        }
    }
}

/// Tunables for the tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageConfig {
    /// Bucket width used to discretize recorded ranges.
    pub bucket: TimeBucket,
    /// Seconds shaved off both ends of a queried range before the
    /// coverage test.
    pub tolerance_secs: f64,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            bucket: TimeBucket::Seconds(1),
            tolerance_secs: 5.0,
        }
    }
}

/// Tracks which time ranges each variable has been calculated over.
#[derive(Debug, Clone, Default)]
pub struct CoverageTracker {
    config: CoverageConfig,
    records: BTreeMap<CoverageKey, Coverage>,
}

impl CoverageTracker {
    /// Tracker with the given configuration and no recorded coverage.
    pub fn new(config: CoverageConfig) -> Self {
        Self {
            config,
            records: BTreeMap::new(),
        }
    }

    /// The tracker's configuration.
    pub fn config(&self) -> &CoverageConfig {
        &self.config
    }

    /// Whether `range` still needs to be calculated for this variable.
    ///
    /// Returns `true` when the variable has never been recorded, or when
    /// any bucket of the tolerance-shrunk range is missing from its
    /// coverage.
    pub fn is_calculation_needed(
        &self,
        data_type: &str,
        variable: Option<&str>,
        range: &TimeRange,
    ) -> bool {
        let key = CoverageKey::new(data_type, variable);
        let Some(coverage) = self.records.get(&key) else {
            return true;
        };

        let probe = range.shrunk(self.config.tolerance_secs);
        let span = time::bucket_span(&self.config.bucket, &probe);
        let needed = !coverage.contains_span(span);
        if !needed {
            debug!(
                "coverage hit for {}/{:?} over [{}, {}]",
                data_type, variable, range.start, range.end
            );
        }
        needed
    }

    /// Record that `range` has been calculated for this variable.
    pub fn update_calculated_range(
        &mut self,
        data_type: &str,
        variable: Option<&str>,
        range: &TimeRange,
    ) {
        let key = CoverageKey::new(data_type, variable);
        let span = time::bucket_span(&self.config.bucket, range);
        self.records.entry(key).or_default().insert_span(span);
    }

    /// Forget all recorded coverage for one variable.
    pub fn clear_calculation_cache(&mut self, data_type: &str, variable: Option<&str>) {
        let key = CoverageKey::new(data_type, variable);
        self.records.remove(&key);
    }

    /// Forget all recorded coverage for every variable.
    pub fn clear_all(&mut self) {
        self.records.clear();
    }

    /// Recorded coverage for one variable as time ranges, one per
    /// maximal run of contiguous buckets.
    pub fn recorded_ranges(&self, data_type: &str, variable: Option<&str>) -> Vec<TimeRange> {
        let key = CoverageKey::new(data_type, variable);
        let Some(coverage) = self.records.get(&key) else {
            return Vec::new();
        };

        coverage
            .runs()
            .into_iter()
            .map(|run| self.run_to_range(run))
            .collect()
    }

    fn run_to_range(&self, run: RangeInclusive<Bucket>) -> TimeRange {
        let start = time::bucket_start_secs(&self.config.bucket, *run.start());
        let end = time::bucket_start_secs(&self.config.bucket, *run.end() + 1);
        TimeRange::new(start, end)
    }
}
