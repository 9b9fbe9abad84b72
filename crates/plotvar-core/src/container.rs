//! Data containers: named bundles of component series on one time base.
//!
//! A container owns the series for one instrument data type ("mag",
//! "plasma", ...) plus the timestamp array they share. Containers are
//! created once in an empty state and then refreshed in place by
//! [`DataContainer::update`] whenever the import layer delivers fresh
//! raw data. The refresh keeps every component's `Rc` handle alive, so
//! derived-variable lineages holding those handles see the new buffers
//! without re-resolving anything.
//!
//! [`BasicContainer`] is the general-purpose implementation driven by a
//! fixed [`ComponentSpec`] list. Instrument crates with bespoke
//! calibration logic implement [`DataContainer`] themselves.

use std::collections::BTreeMap;
use std::fmt;

use log::warn;

use crate::series::style::PlotStyle;
use crate::series::{SeriesHandle, SeriesValues, TaggedSeries};
use crate::time::TimeRange;

/// Raw data delivered by the import layer for one container refresh.
#[derive(Debug, Clone, Default)]
pub struct ImportedData {
    /// Timestamp array shared by every field, seconds since the epoch.
    pub times: Vec<f64>,
    /// Raw field name to raw value buffer, one value per timestamp.
    pub fields: BTreeMap<String, Vec<f64>>,
    /// Names of the source files the data came from, when known.
    pub source_files: Vec<String>,
}

impl ImportedData {
    /// Time range spanned by the timestamp array, or `None` when empty.
    pub fn time_range(&self) -> Option<TimeRange> {
        TimeRange::from_times(&self.times)
    }
}

/// Hook through which the engine asks for raw data it does not have.
pub trait ImportLayer {
    /// Fetch raw data for `data_type` covering `range`, or `None` when
    /// the layer cannot provide it.
    fn fetch(&mut self, data_type: &str, range: TimeRange) -> Option<ImportedData>;
}

/// Contract every container implementation satisfies.
pub trait DataContainer: fmt::Debug {
    /// The container's data type, also its registry identifier.
    fn data_type(&self) -> &str;

    /// Names of the components this container carries, short form.
    fn component_names(&self) -> Vec<String>;

    /// Look up a component series by short name. Never panics; unknown
    /// names return `None`.
    fn get(&self, component: &str) -> Option<SeriesHandle>;

    /// Recalculate every component from freshly imported raw data,
    /// mutating component series in place.
    fn update(&mut self, data: &ImportedData);

    /// The shared timestamp array.
    fn times(&self) -> &[f64];

    /// Source files backing the current buffers, for per-source
    /// partitioned persistence. Defaults to none.
    fn source_filenames(&self) -> &[String] {
        &[]
    }
}

/// Declares one component of a [`BasicContainer`].
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentSpec {
    /// Short component name, e.g. `"bx"`.
    pub name: String,
    /// Raw field name the component reads from [`ImportedData`].
    pub source_field: String,
    /// Style attached to the component series on every refresh.
    pub style: PlotStyle,
}

impl ComponentSpec {
    /// Component reading from a differently named raw field.
    pub fn new(name: impl Into<String>, source_field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_field: source_field.into(),
            style: PlotStyle::default(),
        }
    }

    /// Component whose name and raw field name coincide.
    pub fn from_field(field: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(field.clone(), field)
    }

    /// Attach a style.
    pub fn with_style(mut self, style: PlotStyle) -> Self {
        self.style = style;
        self
    }
}

/// Spec-driven container: each component copies one raw field.
#[derive(Debug)]
pub struct BasicContainer {
    data_type: String,
    specs: Vec<ComponentSpec>,
    times: Vec<f64>,
    components: BTreeMap<String, SeriesHandle>,
    source_files: Vec<String>,
}

impl BasicContainer {
    /// Empty container for `data_type` with a fixed component list.
    pub fn new(data_type: impl Into<String>, specs: Vec<ComponentSpec>) -> Self {
        Self {
            data_type: data_type.into(),
            specs,
            times: Vec::new(),
            components: BTreeMap::new(),
            source_files: Vec::new(),
        }
    }

    /// Rebuild a container from persisted component series.
    ///
    /// Specs are synthesized from the series so a later import refresh
    /// knows which raw fields to read.
    pub fn from_loaded(
        data_type: impl Into<String>,
        times: Vec<f64>,
        series: Vec<TaggedSeries>,
    ) -> Self {
        let data_type = data_type.into();
        let mut specs = Vec::with_capacity(series.len());
        let mut components = BTreeMap::new();

        for entry in series {
            let short = short_component_name(entry.name()).to_owned();
            specs.push(
                ComponentSpec::from_field(short.clone()).with_style(entry.style().clone()),
            );
            components.insert(short, entry.into_handle());
        }

        Self {
            data_type,
            specs,
            times,
            components,
            source_files: Vec::new(),
        }
    }
}

impl DataContainer for BasicContainer {
    fn data_type(&self) -> &str {
        &self.data_type
    }

    fn component_names(&self) -> Vec<String> {
        self.specs.iter().map(|s| s.name.clone()).collect()
    }

    fn get(&self, component: &str) -> Option<SeriesHandle> {
        self.components.get(component).cloned()
    }

    fn update(&mut self, data: &ImportedData) {
        self.times = data.times.clone();
        self.source_files = data.source_files.clone();

        for spec in &self.specs {
            let buffer = data
                .fields
                .get(&spec.source_field)
                .filter(|b| b.len() == data.times.len());

            let values = match buffer {
                Some(b) => SeriesValues::OneDim(b.clone()),
                None => {
                    warn!(
                        "import for {} carried no usable buffer for field {}; clearing component {}",
                        self.data_type, spec.source_field, spec.name
                    );
                    // Previous buffers no longer match the new time base.
                    SeriesValues::OneDim(Vec::new())
                }
            };
            let times = if values.is_empty() {
                Vec::new()
            } else {
                data.times.clone()
            };

            match self.components.get(&spec.name) {
                Some(handle) => {
                    let mut series = handle.borrow_mut();
                    series.replace_data(values, times);
                    *series.style_mut() = spec.style.clone();
                }
                None => {
                    let name = format!("{}.{}", self.data_type, spec.name);
                    let series =
                        TaggedSeries::with_style(name, values, times, spec.style.clone());
                    self.components.insert(spec.name.clone(), series.into_handle());
                }
            }
        }
    }

    fn times(&self) -> &[f64] {
        &self.times
    }

    fn source_filenames(&self) -> &[String] {
        &self.source_files
    }
}

/// Container holding every derived variable, keyed by derived name.
///
/// Unlike instrument containers there is no shared time base and no
/// import path; the engine inserts and replaces series as derivations
/// run. Registered under [`DerivedVariables::DATA_TYPE`].
#[derive(Debug, Default)]
pub struct DerivedVariables {
    components: BTreeMap<String, SeriesHandle>,
}

impl DerivedVariables {
    /// Registry identifier and coverage data type for derived variables.
    pub const DATA_TYPE: &'static str = "derived";

    /// Empty derived-variable container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a derived series handle.
    pub fn insert(&mut self, name: impl Into<String>, handle: SeriesHandle) {
        self.components.insert(name.into(), handle);
    }

    /// Remove a derived series handle.
    pub fn remove(&mut self, name: &str) -> Option<SeriesHandle> {
        self.components.remove(name)
    }

    /// Names of all derived variables, sorted.
    pub fn names(&self) -> Vec<String> {
        self.components.keys().cloned().collect()
    }
}

impl DataContainer for DerivedVariables {
    fn data_type(&self) -> &str {
        Self::DATA_TYPE
    }

    fn component_names(&self) -> Vec<String> {
        self.names()
    }

    fn get(&self, component: &str) -> Option<SeriesHandle> {
        self.components.get(component).cloned()
    }

    fn update(&mut self, _data: &ImportedData) {
        // Derived variables are recomputed by the engine, not imported.
    }

    fn times(&self) -> &[f64] {
        &[]
    }
}

/// Short component name of a dotted identifier: the part after the last
/// dot, or the whole identifier when undotted.
pub fn short_component_name(ident: &str) -> &str {
    ident.rsplit('.').next().unwrap_or(ident)
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;

    fn imported(times: Vec<f64>, fields: &[(&str, Vec<f64>)]) -> ImportedData {
        ImportedData {
            times,
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            source_files: vec!["mag_20240101_v00.cdf".into()],
        }
    }

    fn mag_container() -> BasicContainer {
        BasicContainer::new(
            "mag",
            vec![
                ComponentSpec::from_field("bx"),
                ComponentSpec::new("by", "b_y_raw"),
            ],
        )
    }

    #[test]
    fn update_builds_components_from_fields() {
        let mut c = mag_container();
        c.update(&imported(
            vec![0.0, 1.0],
            &[("bx", vec![1.0, 2.0]), ("b_y_raw", vec![3.0, 4.0])],
        ));

        assert_eq!(c.times(), &[0.0, 1.0]);
        assert_eq!(c.component_names(), vec!["bx".to_string(), "by".to_string()]);

        let by = c.get("by").expect("component by");
        assert_eq!(by.borrow().name(), "mag.by");
        assert_eq!(by.borrow().values().as_one_dim(), Some(&[3.0, 4.0][..]));
        assert_eq!(c.source_filenames(), &["mag_20240101_v00.cdf".to_string()]);
    }

    #[test]
    fn update_preserves_handle_identity() {
        let mut c = mag_container();
        c.update(&imported(
            vec![0.0],
            &[("bx", vec![1.0]), ("b_y_raw", vec![2.0])],
        ));
        let first = c.get("bx").expect("bx after first update");

        c.update(&imported(
            vec![10.0, 11.0],
            &[("bx", vec![5.0, 6.0]), ("b_y_raw", vec![7.0, 8.0])],
        ));
        let second = c.get("bx").expect("bx after second update");

        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(first.borrow().values().as_one_dim(), Some(&[5.0, 6.0][..]));
    }

    #[test]
    fn missing_field_clears_component() {
        let mut c = mag_container();
        c.update(&imported(
            vec![0.0],
            &[("bx", vec![1.0]), ("b_y_raw", vec![2.0])],
        ));

        c.update(&imported(vec![5.0, 6.0], &[("bx", vec![1.0, 2.0])]));

        let by = c.get("by").expect("by still registered");
        assert!(by.borrow().is_empty());
        let bx = c.get("bx").expect("bx");
        assert_eq!(bx.borrow().len(), 2);
    }

    #[test]
    fn wrong_length_field_is_rejected() {
        let mut c = BasicContainer::new("mag", vec![ComponentSpec::from_field("bx")]);
        c.update(&imported(vec![0.0, 1.0], &[("bx", vec![1.0, 2.0, 3.0])]));

        let bx = c.get("bx").expect("bx");
        assert!(bx.borrow().is_empty());
    }

    #[test]
    fn unknown_component_is_none() {
        let c = mag_container();
        assert!(c.get("bz").is_none());
    }

    #[test]
    fn from_loaded_rebuilds_components() {
        let series = vec![
            TaggedSeries::new("mag.bx", SeriesValues::OneDim(vec![1.0, 2.0]), vec![0.0, 1.0]),
            TaggedSeries::new("mag.by", SeriesValues::OneDim(vec![3.0, 4.0]), vec![0.0, 1.0]),
        ];
        let c = BasicContainer::from_loaded("mag", vec![0.0, 1.0], series);

        assert_eq!(c.data_type(), "mag");
        assert_eq!(c.component_names(), vec!["bx".to_string(), "by".to_string()]);
        let bx = c.get("bx").expect("bx");
        assert_eq!(bx.borrow().name(), "mag.bx");
    }

    #[test]
    fn derived_variables_insert_and_remove() {
        let mut derived = DerivedVariables::new();
        let handle = TaggedSeries::new("ratio", SeriesValues::OneDim(vec![]), vec![]).into_handle();
        derived.insert("ratio", Rc::clone(&handle));

        assert_eq!(derived.data_type(), "derived");
        assert_eq!(derived.names(), vec!["ratio".to_string()]);
        assert!(derived.get("ratio").is_some());

        derived.remove("ratio");
        assert!(derived.get("ratio").is_none());
    }

    #[test]
    fn short_names_strip_the_type_prefix() {
        assert_eq!(short_component_name("mag.bx"), "bx");
        assert_eq!(short_component_name("plain"), "plain");
        assert_eq!(short_component_name("a.b.c"), "c");
    }
}
