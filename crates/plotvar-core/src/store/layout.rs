//! Partition naming and calendar layout per data type.
//!
//! Each data type can register a [`TypeLayout`] describing where its
//! partitions live, how partition files are named, and how to recover a
//! [`PartitionKey`] from a raw source file name. Types without a
//! registered layout fall back to [`TypeLayout::generic`], which stores
//! everything under a directory named after the type.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, TimeZone, Timelike, Utc};
use regex::Regex;
use snafu::{ensure, OptionExt, ResultExt};

use crate::store::{BadStampSnafu, PatternMismatchSnafu, StoreResult};

/// Version token used when a source file name carries none.
pub const DEFAULT_VERSION: &str = "v00";

/// Calendar cadence partition files are cut on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionCadence {
    /// One partition per UTC calendar day.
    Daily,
    /// One partition per 6-hour UTC block (00, 06, 12, 18).
    SixHour,
}

impl PartitionCadence {
    /// Length of one partition block in seconds.
    pub fn period_secs(self) -> i64 {
        match self {
            PartitionCadence::Daily => 86_400,
            PartitionCadence::SixHour => 21_600,
        }
    }

    /// Date stamp for the block containing `epoch_secs`.
    ///
    /// `YYYYMMDD` for daily cadence, `YYYYMMDDHH` with the block start
    /// hour for 6-hour cadence. Unrepresentable timestamps stamp as
    /// `00000000`.
    pub fn stamp_for_epoch(self, epoch_secs: f64) -> String {
        let Some(dt) = DateTime::from_timestamp(epoch_secs.floor() as i64, 0) else {
            return "00000000".to_string();
        };

        let date = dt.format("%Y%m%d").to_string();
        match self {
            PartitionCadence::Daily => date,
            PartitionCadence::SixHour => {
                let block = dt.hour() - dt.hour() % 6;
                format!("{date}{block:02}")
            }
        }
    }
}

/// Calendar coordinates of one partition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PartitionKey {
    /// UTC calendar date of the partition.
    pub date: NaiveDate,
    /// Start hour of the 6-hour block, `None` for daily cadence.
    pub hour: Option<u32>,
    /// Version token carried into the partition file name.
    pub version: String,
}

impl PartitionKey {
    /// Date stamp as it appears in partition file names.
    pub fn stamp(&self) -> String {
        let date = self.date.format("%Y%m%d").to_string();
        match self.hour {
            Some(hour) => format!("{date}{hour:02}"),
            None => date,
        }
    }

    /// Epoch-second bounds `[start, end)` of the partition block.
    pub fn block_bounds(&self, cadence: PartitionCadence) -> (f64, f64) {
        let midnight = self
            .date
            .and_hms_opt(0, 0, 0)
            .map(|naive| Utc.from_utc_datetime(&naive).timestamp())
            .unwrap_or(0);
        let start = midnight + i64::from(self.hour.unwrap_or(0)) * 3_600;
        let end = start + cadence.period_secs();
        (start as f64, end as f64)
    }
}

/// Where one data type's partitions live and how they are named.
#[derive(Debug, Clone)]
pub struct TypeLayout {
    /// Data type the layout applies to.
    pub data_type: String,
    /// Directory for this type's partitions, relative to the store root.
    pub dir: PathBuf,
    /// Calendar cadence partitions are cut on.
    pub cadence: PartitionCadence,
    /// Pattern extracting `date` (and for 6-hour cadence `hour`, plus an
    /// optional `version`) named captures from a raw source file name.
    /// `None` disables per-source partitioning for the type.
    pub file_pattern: Option<Regex>,
    /// Leading token of generated partition file names.
    pub base_prefix: String,
    /// Extension of generated partition file names, without the dot.
    pub extension: String,
}

impl TypeLayout {
    /// Fallback layout: daily cadence, no source pattern, partitions in
    /// a directory named after the type.
    pub fn generic(data_type: &str) -> Self {
        Self {
            data_type: data_type.to_string(),
            dir: PathBuf::from(data_type),
            cadence: PartitionCadence::Daily,
            file_pattern: None,
            base_prefix: data_type.to_string(),
            extension: "bin".to_string(),
        }
    }

    /// Replace the cadence.
    pub fn with_cadence(mut self, cadence: PartitionCadence) -> Self {
        self.cadence = cadence;
        self
    }

    /// Attach a source file name pattern, enabling per-source
    /// partitioning for the type.
    pub fn with_pattern(mut self, pattern: Regex) -> Self {
        self.file_pattern = Some(pattern);
        self
    }

    /// Partition file name for a stamp and version.
    pub fn file_name(&self, stamp: &str, version: &str) -> String {
        self.file_name_with_prefix(&self.base_prefix, stamp, version)
    }

    /// Partition file name with an explicit leading token.
    pub fn file_name_with_prefix(&self, prefix: &str, stamp: &str, version: &str) -> String {
        format!("{prefix}_{stamp}_{version}.{ext}", ext = self.extension)
    }

    /// Recover the partition key encoded in a raw source file name.
    ///
    /// # Errors
    ///
    /// `PatternMismatch` when the type has no pattern, the name does not
    /// match, or a 6-hour layout carries an out-of-range hour; `BadStamp`
    /// when the date capture is not a valid `YYYYMMDD` date.
    pub fn partition_key_for(&self, name: &str) -> StoreResult<PartitionKey> {
        let pattern = self.file_pattern.as_ref().context(PatternMismatchSnafu {
            name,
            data_type: self.data_type.as_str(),
        })?;
        let caps = pattern.captures(name).context(PatternMismatchSnafu {
            name,
            data_type: self.data_type.as_str(),
        })?;

        let stamp = caps
            .name("date")
            .map(|m| m.as_str())
            .context(PatternMismatchSnafu {
                name,
                data_type: self.data_type.as_str(),
            })?;
        let date = NaiveDate::parse_from_str(stamp, "%Y%m%d").context(BadStampSnafu {
            name,
            stamp,
        })?;

        let hour = match self.cadence {
            PartitionCadence::Daily => None,
            PartitionCadence::SixHour => {
                let raw = caps
                    .name("hour")
                    .and_then(|m| m.as_str().parse::<u32>().ok())
                    .context(PatternMismatchSnafu {
                        name,
                        data_type: self.data_type.as_str(),
                    })?;
                ensure!(
                    raw < 24,
                    PatternMismatchSnafu {
                        name,
                        data_type: self.data_type.as_str(),
                    }
                );
                Some(raw - raw % 6)
            }
        };

        let version = caps
            .name("version")
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| DEFAULT_VERSION.to_string());

        Ok(PartitionKey { date, hour, version })
    }
}

/// Registered layouts for all data types.
#[derive(Debug, Clone, Default)]
pub struct StoreLayout {
    types: BTreeMap<String, TypeLayout>,
}

impl StoreLayout {
    /// Layout table with no registered types.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the layout for one data type.
    pub fn register(&mut self, layout: TypeLayout) {
        self.types.insert(layout.data_type.clone(), layout);
    }

    /// Layout for a data type, falling back to [`TypeLayout::generic`].
    pub fn for_type(&self, data_type: &str) -> TypeLayout {
        self.types
            .get(data_type)
            .cloned()
            .unwrap_or_else(|| TypeLayout::generic(data_type))
    }
}
