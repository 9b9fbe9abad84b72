//! Tagged series: the unit of data everything else moves around.
//!
//! A [`TaggedSeries`] bundles a value buffer with its timestamp buffer,
//! a plot style, and optional derivation lineage. Series live inside
//! `Rc<RefCell<..>>` handles so a container, the registry, and any
//! number of derived-variable lineages can all point at the same
//! buffers; updating a series in place is immediately visible to every
//! holder of the handle.

pub mod lineage;
pub mod style;

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::series::lineage::Lineage;
use crate::series::style::PlotStyle;
use crate::time::TimeRange;

/// Shared, interiorly mutable handle to a series.
pub type SeriesHandle = Rc<RefCell<TaggedSeries>>;

/// Value buffer of a series: scalar-per-time or vector-per-time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SeriesValues {
    /// One scalar value per timestamp.
    OneDim(Vec<f64>),
    /// One fixed-width row of values per timestamp, e.g. spectrogram
    /// energy channels.
    TwoDim(Vec<Vec<f64>>),
}

impl SeriesValues {
    /// Number of time points the buffer holds.
    pub fn len(&self) -> usize {
        match self {
            SeriesValues::OneDim(v) => v.len(),
            SeriesValues::TwoDim(rows) => rows.len(),
        }
    }

    /// Whether the buffer holds no time points.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The scalar buffer, or `None` for two-dimensional data.
    pub fn as_one_dim(&self) -> Option<&[f64]> {
        match self {
            SeriesValues::OneDim(v) => Some(v),
            SeriesValues::TwoDim(_) => None,
        }
    }

    /// Append another buffer of the same shape; returns `false` and
    /// leaves `self` untouched when the shapes differ.
    pub fn append(&mut self, other: &SeriesValues) -> bool {
        match (self, other) {
            (SeriesValues::OneDim(dst), SeriesValues::OneDim(src)) => {
                dst.extend_from_slice(src);
                true
            }
            (SeriesValues::TwoDim(dst), SeriesValues::TwoDim(src)) => {
                dst.extend_from_slice(src);
                true
            }
            _ => false,
        }
    }
}

/// A named series: values, timestamps, style, and optional lineage.
#[derive(Debug, Clone)]
pub struct TaggedSeries {
    name: String,
    values: SeriesValues,
    times: Vec<f64>,
    style: PlotStyle,
    lineage: Option<Lineage>,
}

impl TaggedSeries {
    /// Build a series with a default style and no lineage.
    ///
    /// `values` and `times` must be the same length, except for the
    /// placeholder shape of a single zero value with empty times that
    /// marks a series with no usable data yet.
    pub fn new(name: impl Into<String>, values: SeriesValues, times: Vec<f64>) -> Self {
        debug_assert!(
            values.len() == times.len() || times.is_empty(),
            "series buffers disagree: {} values vs {} times",
            values.len(),
            times.len()
        );
        Self {
            name: name.into(),
            values,
            times,
            style: PlotStyle::default(),
            lineage: None,
        }
    }

    /// Build a series with an explicit style.
    pub fn with_style(
        name: impl Into<String>,
        values: SeriesValues,
        times: Vec<f64>,
        style: PlotStyle,
    ) -> Self {
        let mut series = Self::new(name, values, times);
        series.style = style;
        series
    }

    /// The series name, usually `type.component` or a derived name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the series.
    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// The value buffer.
    pub fn values(&self) -> &SeriesValues {
        &self.values
    }

    /// The timestamp buffer, seconds since the Unix epoch, ascending.
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// The plot style.
    pub fn style(&self) -> &PlotStyle {
        &self.style
    }

    /// Mutable access to the plot style.
    pub fn style_mut(&mut self) -> &mut PlotStyle {
        &mut self.style
    }

    /// The derivation lineage, or `None` for raw data.
    pub fn lineage(&self) -> Option<&Lineage> {
        self.lineage.as_ref()
    }

    /// Attach or replace the derivation lineage.
    pub fn set_lineage(&mut self, lineage: Option<Lineage>) {
        self.lineage = lineage;
    }

    /// Number of time points.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Whether the series holds no time points.
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Time range spanned by the timestamp buffer, or `None` when empty.
    pub fn time_range(&self) -> Option<TimeRange> {
        TimeRange::from_times(&self.times)
    }

    /// Swap in fresh buffers, keeping name, style, and lineage.
    pub fn replace_data(&mut self, values: SeriesValues, times: Vec<f64>) {
        debug_assert!(
            values.len() == times.len() || times.is_empty(),
            "series buffers disagree: {} values vs {} times",
            values.len(),
            times.len()
        );
        self.values = values;
        self.times = times;
    }

    /// Wrap the series in a shared handle.
    pub fn into_handle(self) -> SeriesHandle {
        Rc::new(RefCell::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series() -> TaggedSeries {
        TaggedSeries::new(
            "mag.bx",
            SeriesValues::OneDim(vec![1.0, 2.0, 3.0]),
            vec![0.0, 1.0, 2.0],
        )
    }

    #[test]
    fn accessors_reflect_construction() {
        let s = series();
        assert_eq!(s.name(), "mag.bx");
        assert_eq!(s.len(), 3);
        assert_eq!(s.times(), &[0.0, 1.0, 2.0]);
        assert_eq!(s.values().as_one_dim(), Some(&[1.0, 2.0, 3.0][..]));
        assert!(s.lineage().is_none());
    }

    #[test]
    fn time_range_spans_buffer() {
        let s = series();
        let range = s.time_range().expect("non-empty series");
        assert_eq!((range.start, range.end), (0.0, 2.0));

        let empty = TaggedSeries::new("e", SeriesValues::OneDim(vec![]), vec![]);
        assert!(empty.time_range().is_none());
    }

    #[test]
    fn replace_data_keeps_identity_fields() {
        let mut s = series();
        s.style_mut().label = Some("B_x".into());

        s.replace_data(SeriesValues::OneDim(vec![9.0]), vec![5.0]);
        assert_eq!(s.name(), "mag.bx");
        assert_eq!(s.style().label.as_deref(), Some("B_x"));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn placeholder_shape_is_accepted() {
        // One zero value with no timestamps marks "no usable data".
        let s = TaggedSeries::new("x", SeriesValues::OneDim(vec![0.0]), vec![]);
        assert!(s.is_empty());
        assert_eq!(s.values().len(), 1);
    }

    #[test]
    fn append_rejects_shape_mismatch() {
        let mut one = SeriesValues::OneDim(vec![1.0]);
        let two = SeriesValues::TwoDim(vec![vec![1.0, 2.0]]);
        assert!(!one.append(&two));
        assert_eq!(one.len(), 1);

        assert!(one.append(&SeriesValues::OneDim(vec![2.0, 3.0])));
        assert_eq!(one.len(), 3);
    }

    #[test]
    fn handles_share_mutations() {
        let handle = series().into_handle();
        let alias = Rc::clone(&handle);

        handle.borrow_mut().rename("renamed");
        assert_eq!(alias.borrow().name(), "renamed");
    }
}
