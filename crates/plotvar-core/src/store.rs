//! Partitioned on-disk persistence for containers and series.
//!
//! A store root holds one JSON index plus bincode partition payloads:
//!
//! ```text
//! <root>/
//!   index.json
//!   mag/
//!     mag_20240314_v00.bin
//!     mag_20240315_v00.bin
//!   ratio/
//!     ratio_20240314_v00.bin
//! ```
//!
//! Containers whose layout carries a source file pattern are cut into
//! one partition per calendar block recovered from their source file
//! names; everything else lands in a single file stamped from its first
//! timestamp. All writes are atomic (temp file plus rename) and the
//! index is rewritten wholesale when it changes.
//!
//! Flushing is best-effort by design: a failed partition is logged and
//! skipped, the remaining partitions are still attempted, and the first
//! error is reported to the caller. In-memory state is never touched by
//! a failed flush.

pub mod fs;
pub mod index;
pub mod layout;
pub mod partition;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::warn;
use snafu::{ensure, Backtrace, OptionExt, ResultExt, Snafu};

use crate::container::{BasicContainer, DataContainer};
use crate::series::TaggedSeries;
use crate::store::index::{IndexTarget, PartitionIndex};
use crate::store::layout::{StoreLayout, TypeLayout, DEFAULT_VERSION};
use crate::store::partition::{merge_partitions, PartitionFile};

/// Convenience alias for store results.
pub type StoreResult<T, E = StoreError> = std::result::Result<T, E>;

/// Errors produced by the partition store.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    /// A path was expected to exist but does not.
    #[snafu(display("path not found: {path}"))]
    NotFound {
        /// The missing path.
        path: String,
        /// Underlying io error.
        source: std::io::Error,
        /// Captured backtrace.
        backtrace: Backtrace,
    },

    /// Any io failure other than a missing path.
    #[snafu(display("io error at {path}"))]
    OtherIo {
        /// The path being read or written.
        path: String,
        /// Underlying io error.
        source: std::io::Error,
        /// Captured backtrace.
        backtrace: Backtrace,
    },

    /// A partition payload failed to encode.
    #[snafu(display("failed to encode partition for {ident}"))]
    EncodePartition {
        /// Identifier whose partition was being written.
        ident: String,
        /// Underlying codec error.
        source: bincode::Error,
    },

    /// A partition payload failed to decode.
    #[snafu(display("failed to decode partition at {path}"))]
    DecodePartition {
        /// Path of the unreadable partition file.
        path: String,
        /// Underlying codec error.
        source: bincode::Error,
    },

    /// The index file failed to encode or decode.
    #[snafu(display("partition index codec failure at {path}"))]
    IndexCodec {
        /// Path of the index file.
        path: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// A source file name did not match its type's partition pattern.
    #[snafu(display("source name {name} does not match the partition pattern for {data_type}"))]
    PatternMismatch {
        /// The offending source file name.
        name: String,
        /// Data type whose pattern was consulted.
        data_type: String,
    },

    /// A source file name carried an unparseable date stamp.
    #[snafu(display("source name {name} carries invalid date stamp {stamp}"))]
    BadStamp {
        /// The offending source file name.
        name: String,
        /// The stamp that failed to parse.
        stamp: String,
        /// Underlying parse error.
        source: chrono::ParseError,
    },

    /// An index entry pointed at data that does not match it.
    #[snafu(display("index entry for {ident} does not match its on-disk data"))]
    BadIndexEntry {
        /// Identifier of the stale index entry.
        ident: String,
    },
}

/// Root location of a partition store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// A directory on the local filesystem.
    Local(PathBuf),
}

impl StoreLocation {
    /// Store rooted at a local directory.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self::Local(root.into())
    }

    /// Resolve a store-relative path to an absolute one.
    pub fn join(&self, rel: &Path) -> PathBuf {
        match self {
            Self::Local(root) => root.join(rel),
        }
    }
}

/// A loaded registry entry, before the registry takes ownership.
#[derive(Debug)]
pub enum LoadedEntry {
    /// A container reconstructed from its partitions.
    Container(BasicContainer),
    /// A single stashed series.
    Series(TaggedSeries),
}

/// Outcome of a [`PartitionStore::load`] pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Identifiers loaded successfully.
    pub loaded: Vec<String>,
    /// Identifiers skipped because their data failed to load.
    pub skipped: Vec<String>,
}

impl LoadReport {
    /// Whether every indexed identifier loaded.
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Writes and reads partitioned container data under one root.
#[derive(Debug)]
pub struct PartitionStore {
    location: StoreLocation,
    layout: StoreLayout,
    index: PartitionIndex,
    persisted_index: PartitionIndex,
}

impl PartitionStore {
    /// Open a store, reading any existing index at the location.
    pub fn open(location: StoreLocation, layout: StoreLayout) -> StoreResult<Self> {
        let index_path = location.join(Path::new(PartitionIndex::FILE_NAME));
        let index = PartitionIndex::read_from(&index_path)?;
        let persisted_index = index.clone();
        Ok(Self {
            location,
            layout,
            index,
            persisted_index,
        })
    }

    /// The store's root location.
    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    /// The current in-memory index.
    pub fn index(&self) -> &PartitionIndex {
        &self.index
    }

    /// Flush a container to disk and index it.
    ///
    /// Containers with no data are skipped silently. When the type's
    /// layout has a source file pattern and the container reports its
    /// source files, data is cut into one partition per calendar block;
    /// otherwise a single file stamped from the first timestamp is
    /// written.
    ///
    /// # Errors
    ///
    /// Returns the first failure encountered; later partitions are
    /// still attempted first.
    pub fn flush_container(
        &mut self,
        ident: &str,
        container: &dyn DataContainer,
    ) -> StoreResult<()> {
        if container.times().is_empty() {
            return Ok(());
        }

        let layout = self.layout.for_type(container.data_type());
        let mut first_err: Option<StoreError> = None;
        let mut wrote_any = false;

        let sources = container.source_filenames();
        let target = if layout.file_pattern.is_some() && !sources.is_empty() {
            let mut keys = BTreeSet::new();
            for source in sources {
                match layout.partition_key_for(source_file_name(source)) {
                    Ok(key) => {
                        keys.insert(key);
                    }
                    Err(err) => {
                        warn!("no partition key for {ident} source {source}: {err}");
                        first_err.get_or_insert(err);
                    }
                }
            }

            for key in &keys {
                let bounds = key.block_bounds(layout.cadence);
                let part = PartitionFile::from_container(ident, container, Some(bounds));
                if part.times.is_empty() {
                    continue;
                }

                let rel = layout.dir.join(layout.file_name(&key.stamp(), &key.version));
                match self.write_partition(&rel, &part) {
                    Ok(()) => wrote_any = true,
                    Err(err) => {
                        warn!("partition {} of {ident} failed to flush: {err}", rel.display());
                        first_err.get_or_insert(err);
                    }
                }
            }

            IndexTarget::Dir(layout.dir.clone())
        } else {
            let first = container.times().first().copied().unwrap_or(0.0);
            let stamp = layout.cadence.stamp_for_epoch(first);
            let rel = layout.dir.join(layout.file_name(&stamp, DEFAULT_VERSION));

            let part = PartitionFile::from_container(ident, container, None);
            match self.write_partition(&rel, &part) {
                Ok(()) => wrote_any = true,
                Err(err) => {
                    warn!("flush of {ident} to {} failed: {err}", rel.display());
                    first_err.get_or_insert(err);
                }
            }

            IndexTarget::File(rel)
        };

        if wrote_any {
            self.index.insert_type(ident, target.clone());
            for comp in container.component_names() {
                self.index
                    .insert_component(format!("{ident}.{comp}"), target.clone());
            }
            if let Err(err) = self.persist_index_if_changed() {
                warn!("partition index write failed: {err}");
                first_err.get_or_insert(err);
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Flush a single stashed series to its own partition file.
    ///
    /// # Errors
    ///
    /// Fails when the partition cannot be encoded or written, or when
    /// the index cannot be persisted afterwards.
    pub fn flush_series(&mut self, ident: &str, series: &TaggedSeries) -> StoreResult<()> {
        if series.is_empty() {
            return Ok(());
        }

        let data_type = ident.split_once('.').map(|(t, _)| t).unwrap_or(ident);
        let layout = self.layout.for_type(data_type);

        let first = series.times().first().copied().unwrap_or(0.0);
        let stamp = layout.cadence.stamp_for_epoch(first);
        let file = layout.file_name_with_prefix(&ident.replace('.', "_"), &stamp, DEFAULT_VERSION);
        let rel = layout.dir.join(file);

        let part = PartitionFile::from_series(ident, series);
        self.write_partition(&rel, &part)?;

        let target = IndexTarget::File(rel);
        if ident.contains('.') {
            self.index.insert_component(ident, target);
        } else {
            self.index.insert_bare(ident, target);
        }
        self.persist_index_if_changed()
    }

    /// Load everything the index knows about.
    ///
    /// Containers load first, then dotted series that are not merely
    /// aliases of a loaded container's components, then bare series.
    /// Failures are logged and reported as skipped, never raised.
    pub fn load(&self) -> (Vec<(String, LoadedEntry)>, LoadReport) {
        let mut entries = Vec::new();
        let mut report = LoadReport::default();

        for (ident, target) in &self.index.types {
            match self.load_container(ident, target) {
                Ok(container) => {
                    entries.push((ident.clone(), LoadedEntry::Container(container)));
                    report.loaded.push(ident.clone());
                }
                Err(err) => {
                    warn!("load of container {ident} failed: {err}");
                    report.skipped.push(ident.clone());
                }
            }
        }

        for (ident, target) in &self.index.components {
            let type_name = ident.split_once('.').map(|(t, _)| t).unwrap_or(ident);
            if self.index.types.get(type_name) == Some(target) {
                // Alias of a container loaded above.
                continue;
            }
            match self.load_series(ident, target) {
                Ok(series) => {
                    entries.push((ident.clone(), LoadedEntry::Series(series)));
                    report.loaded.push(ident.clone());
                }
                Err(err) => {
                    warn!("load of series {ident} failed: {err}");
                    report.skipped.push(ident.clone());
                }
            }
        }

        for (ident, target) in &self.index.bare {
            match self.load_series(ident, target) {
                Ok(series) => {
                    entries.push((ident.clone(), LoadedEntry::Series(series)));
                    report.loaded.push(ident.clone());
                }
                Err(err) => {
                    warn!("load of series {ident} failed: {err}");
                    report.skipped.push(ident.clone());
                }
            }
        }

        (entries, report)
    }

    fn write_partition(&self, rel: &Path, part: &PartitionFile) -> StoreResult<()> {
        let bytes = part.to_bytes().context(EncodePartitionSnafu {
            ident: part.ident.as_str(),
        })?;
        fs::write_atomic(&self.location.join(rel), &bytes)
    }

    fn read_partition(&self, path: &Path) -> StoreResult<PartitionFile> {
        let bytes = fs::read_all_bytes(path)?;
        PartitionFile::from_bytes(&bytes).context(DecodePartitionSnafu {
            path: path.display().to_string(),
        })
    }

    fn persist_index_if_changed(&mut self) -> StoreResult<()> {
        if self.index == self.persisted_index {
            return Ok(());
        }
        let path = self.location.join(Path::new(PartitionIndex::FILE_NAME));
        self.index.write_to(&path)?;
        self.persisted_index = self.index.clone();
        Ok(())
    }

    fn load_container(&self, ident: &str, target: &IndexTarget) -> StoreResult<BasicContainer> {
        let paths = match target {
            IndexTarget::File(rel) => vec![self.location.join(rel)],
            IndexTarget::Dir(rel) => fs::list_files(&self.location.join(rel))?,
        };

        let mut parts = Vec::new();
        for path in paths {
            let part = self.read_partition(&path)?;
            if part.ident == ident {
                parts.push(part);
            }
        }
        ensure!(!parts.is_empty(), BadIndexEntrySnafu { ident });

        Ok(merge_partitions(ident, parts))
    }

    fn load_series(&self, ident: &str, target: &IndexTarget) -> StoreResult<TaggedSeries> {
        let IndexTarget::File(rel) = target else {
            return BadIndexEntrySnafu { ident }.fail();
        };

        let part = self.read_partition(&self.location.join(rel))?;
        let times = part.times;
        let snapshot = part
            .components
            .into_iter()
            .find(|c| c.name == ident)
            .context(BadIndexEntrySnafu { ident })?;

        Ok(snapshot.into_series(times))
    }
}

/// Final path component of a source token, so full paths recorded by
/// the import layer still match file-name patterns.
fn source_file_name(source: &str) -> &str {
    source.rsplit(['/', '\\']).next().unwrap_or(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{BasicContainer, ComponentSpec, ImportedData};
    use crate::series::{SeriesValues, TaggedSeries};
    use regex::Regex;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn mag_container(times: Vec<f64>, sources: Vec<String>) -> BasicContainer {
        let bx: Vec<f64> = times.iter().map(|t| t + 1.0).collect();
        let mut c = BasicContainer::new("mag", vec![ComponentSpec::from_field("bx")]);
        c.update(&ImportedData {
            times,
            fields: [("bx".to_string(), bx)].into_iter().collect(),
            source_files: sources,
        });
        c
    }

    fn open_store(dir: &TempDir) -> Result<PartitionStore, StoreError> {
        PartitionStore::open(StoreLocation::local(dir.path()), StoreLayout::new())
    }

    #[test]
    fn empty_container_flush_is_skipped() -> TestResult {
        let dir = TempDir::new()?;
        let mut store = open_store(&dir)?;

        let empty = BasicContainer::new("mag", vec![ComponentSpec::from_field("bx")]);
        store.flush_container("mag", &empty)?;

        assert!(store.index().is_empty());
        assert!(!dir.path().join(PartitionIndex::FILE_NAME).exists());
        Ok(())
    }

    #[test]
    fn single_file_flush_indexes_a_file_target() -> TestResult {
        let dir = TempDir::new()?;
        let mut store = open_store(&dir)?;

        let c = mag_container(vec![86_400.0, 86_460.0], Vec::new());
        store.flush_container("mag", &c)?;

        let target = store.index().get("mag").ok_or("mag not indexed")?;
        let IndexTarget::File(rel) = target else {
            return Err("expected file target".into());
        };
        assert!(rel.to_string_lossy().contains("mag_19700102_v00"));
        assert!(dir.path().join(rel).exists());
        assert!(store.index().get("mag.bx").is_some());
        Ok(())
    }

    #[test]
    fn patterned_flush_writes_one_partition_per_day() -> TestResult {
        let dir = TempDir::new()?;
        let mut layout = StoreLayout::new();
        layout.register(TypeLayout::generic("mag").with_pattern(Regex::new(
            r"^mag_(?P<date>\d{8})_(?P<version>v\d{2})\.cdf$",
        )?));
        let mut store = PartitionStore::open(StoreLocation::local(dir.path()), layout)?;

        // Two days of data: day 1 and day 2 past the epoch.
        let c = mag_container(
            vec![86_400.0, 90_000.0, 172_800.0, 176_400.0],
            vec![
                "mag_19700102_v01.cdf".to_string(),
                "mag_19700103_v01.cdf".to_string(),
            ],
        );
        store.flush_container("mag", &c)?;

        let files = fs::list_files(&dir.path().join("mag"))?;
        assert_eq!(files.len(), 2);
        assert!(matches!(
            store.index().get("mag"),
            Some(IndexTarget::Dir(_))
        ));
        Ok(())
    }

    #[test]
    fn series_flush_replaces_dots_in_file_names() -> TestResult {
        let dir = TempDir::new()?;
        let mut store = open_store(&dir)?;

        let series = TaggedSeries::new(
            "mag.br",
            SeriesValues::OneDim(vec![1.0, 2.0]),
            vec![0.0, 1.0],
        );
        store.flush_series("mag.br", &series)?;

        let target = store.index().get("mag.br").ok_or("mag.br not indexed")?;
        let IndexTarget::File(rel) = target else {
            return Err("expected file target".into());
        };
        assert!(rel.to_string_lossy().contains("mag_br_19700101_v00"));
        Ok(())
    }

    #[test]
    fn reopened_store_sees_the_persisted_index() -> TestResult {
        let dir = TempDir::new()?;
        {
            let mut store = open_store(&dir)?;
            let c = mag_container(vec![0.0, 60.0], Vec::new());
            store.flush_container("mag", &c)?;
        }

        let store = open_store(&dir)?;
        assert!(store.index().has_type("mag"));
        Ok(())
    }

    #[test]
    fn source_tokens_may_carry_paths() {
        assert_eq!(
            source_file_name("/data/mag/mag_20240101_v00.cdf"),
            "mag_20240101_v00.cdf"
        );
        assert_eq!(source_file_name("plain.cdf"), "plain.cdf");
    }
}
