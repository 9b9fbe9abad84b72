//! Partition file payloads and merge logic.
//!
//! A [`PartitionFile`] is one self-contained slice of a container (or a
//! single stashed series): the time-sliced timestamp array plus a
//! snapshot of every component whose buffers line up with it. Payloads
//! are bincode on disk since the index stays JSON and JSON cannot carry
//! NaN values.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::container::{BasicContainer, DataContainer};
use crate::series::lineage::{DeriveOp, Lineage, SourceRef};
use crate::series::style::PlotStyle;
use crate::series::{SeriesValues, TaggedSeries};

/// Persistable form of a derivation lineage: operands by name only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageSnapshot {
    /// Operation applied to the operands.
    pub op: DeriveOp,
    /// Registry identifiers of the series operands, in order.
    pub sources: Vec<String>,
    /// Scalar right-hand operand, if the derivation had one.
    pub scalar: Option<f64>,
}

impl LineageSnapshot {
    /// Snapshot a live lineage, keeping only operand identifiers.
    pub fn from_lineage(lineage: &Lineage) -> Self {
        Self {
            op: lineage.op,
            sources: lineage.sources.iter().map(|s| s.ident.clone()).collect(),
            scalar: lineage.scalar,
        }
    }

    /// Rebuild a live lineage with detached operand handles; the engine
    /// re-resolves them through the registry on first recompute.
    pub fn into_lineage(self) -> Lineage {
        Lineage {
            op: self.op,
            sources: self.sources.into_iter().map(SourceRef::detached).collect(),
            scalar: self.scalar,
        }
    }
}

/// Snapshot of one component series within a partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentSnapshot {
    /// Full series name, e.g. `mag.bx` or a derived name.
    pub name: String,
    /// Value buffer sliced to the partition's timestamps.
    pub values: SeriesValues,
    /// Plot style at flush time.
    pub style: PlotStyle,
    /// Derivation lineage, for derived series.
    pub lineage: Option<LineageSnapshot>,
}

impl ComponentSnapshot {
    /// Snapshot a series without slicing.
    pub fn from_series(series: &TaggedSeries) -> Self {
        Self {
            name: series.name().to_owned(),
            values: series.values().clone(),
            style: series.style().clone(),
            lineage: series.lineage().map(LineageSnapshot::from_lineage),
        }
    }

    /// Rebuild a live series on the given timestamp array.
    pub fn into_series(self, times: Vec<f64>) -> TaggedSeries {
        let mut series = TaggedSeries::with_style(self.name, self.values, times, self.style);
        series.set_lineage(self.lineage.map(LineageSnapshot::into_lineage));
        series
    }
}

/// One on-disk partition: a time slice of a container or series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionFile {
    /// Registry identifier the partition belongs to.
    pub ident: String,
    /// Data type of the owning container.
    pub data_type: String,
    /// Timestamps covered by this partition, ascending.
    pub times: Vec<f64>,
    /// Component snapshots sliced to `times`.
    pub components: Vec<ComponentSnapshot>,
    /// When the partition was written.
    pub written_at: DateTime<Utc>,
}

impl PartitionFile {
    /// Snapshot a container, optionally restricted to the half-open
    /// time bounds `[start, end)`.
    ///
    /// Components whose buffers do not line up with the container's
    /// timestamp array are skipped with a warning rather than written
    /// inconsistently.
    pub fn from_container(
        ident: &str,
        container: &dyn DataContainer,
        bounds: Option<(f64, f64)>,
    ) -> Self {
        let all_times = container.times();
        let (times, indices) = match bounds {
            Some((start, end)) => {
                let indices = mask_half_open(all_times, start, end);
                let times = indices.iter().map(|&i| all_times[i]).collect();
                (times, Some(indices))
            }
            None => (all_times.to_vec(), None),
        };

        let mut components = Vec::new();
        for name in container.component_names() {
            let Some(handle) = container.get(&name) else {
                continue;
            };
            let series = handle.borrow();
            if series.values().len() != all_times.len() {
                warn!(
                    "component {name} of {ident} skipped during flush: \
                     {} values vs {} times",
                    series.values().len(),
                    all_times.len()
                );
                continue;
            }

            let values = match &indices {
                Some(indices) => slice_values(series.values(), indices),
                None => series.values().clone(),
            };
            components.push(ComponentSnapshot {
                name: series.name().to_owned(),
                values,
                style: series.style().clone(),
                lineage: series.lineage().map(LineageSnapshot::from_lineage),
            });
        }

        Self {
            ident: ident.to_owned(),
            data_type: container.data_type().to_owned(),
            times,
            components,
            written_at: Utc::now(),
        }
    }

    /// Snapshot a single stashed series as its own partition.
    pub fn from_series(ident: &str, series: &TaggedSeries) -> Self {
        let data_type = ident.split_once('.').map(|(t, _)| t).unwrap_or(ident);
        Self {
            ident: ident.to_owned(),
            data_type: data_type.to_owned(),
            times: series.times().to_vec(),
            components: vec![ComponentSnapshot::from_series(series)],
            written_at: Utc::now(),
        }
    }

    /// Encode the partition payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Decode a partition payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// Indices of `times` falling inside the half-open interval
/// `[start, end)`.
pub fn mask_half_open(times: &[f64], start: f64, end: f64) -> Vec<usize> {
    times
        .iter()
        .enumerate()
        .filter(|(_, &t)| t >= start && t < end)
        .map(|(i, _)| i)
        .collect()
}

/// Take the rows of a value buffer selected by `indices`.
pub fn slice_values(values: &SeriesValues, indices: &[usize]) -> SeriesValues {
    match values {
        SeriesValues::OneDim(v) => {
            SeriesValues::OneDim(indices.iter().map(|&i| v[i]).collect())
        }
        SeriesValues::TwoDim(rows) => {
            SeriesValues::TwoDim(indices.iter().map(|&i| rows[i].clone()).collect())
        }
    }
}

/// Stitch partitions back into one container.
///
/// Partitions are ordered by their first timestamp and concatenated.
/// A component that changes shape mid-stream keeps its earlier data; a
/// component whose merged buffer does not span the merged timestamp
/// array is dropped with a warning.
pub fn merge_partitions(ident: &str, mut parts: Vec<PartitionFile>) -> BasicContainer {
    parts.sort_by(|a, b| {
        let ka = a.times.first().copied().unwrap_or(f64::MAX);
        let kb = b.times.first().copied().unwrap_or(f64::MAX);
        ka.partial_cmp(&kb).unwrap_or(Ordering::Equal)
    });

    let data_type = parts
        .first()
        .map(|p| p.data_type.clone())
        .unwrap_or_else(|| ident.to_owned());

    let mut times = Vec::new();
    let mut merged: BTreeMap<String, ComponentSnapshot> = BTreeMap::new();

    for part in &parts {
        for comp in &part.components {
            match merged.get_mut(&comp.name) {
                Some(existing) => {
                    if existing.values.append(&comp.values) {
                        existing.style = comp.style.clone();
                        existing.lineage = comp.lineage.clone();
                    } else {
                        warn!(
                            "component {} of {ident} changed shape across partitions; \
                             keeping earlier data",
                            comp.name
                        );
                    }
                }
                None => {
                    merged.insert(comp.name.clone(), comp.clone());
                }
            }
        }
        times.extend_from_slice(&part.times);
    }

    let mut series = Vec::new();
    for snapshot in merged.into_values() {
        if snapshot.values.len() != times.len() {
            warn!(
                "component {} of {ident} dropped after merge: \
                 {} values vs {} times",
                snapshot.name,
                snapshot.values.len(),
                times.len()
            );
            continue;
        }
        series.push(snapshot.into_series(times.clone()));
    }

    BasicContainer::from_loaded(data_type, times, series)
}
