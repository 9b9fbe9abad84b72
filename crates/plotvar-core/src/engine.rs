//! The derived-variable engine.
//!
//! The engine owns the registry, the coverage tracker, and the derived
//! variables container, and wires them into one workflow:
//!
//! - [`VariableEngine::derive`] builds a new variable from an arithmetic
//!   expression over existing series, recording lineage so the result
//!   can be rebuilt later.
//! - [`VariableEngine::update`] answers "give me this variable over this
//!   range", recomputing only when the coverage tracker says the range
//!   is not already covered, and pulling fresh raw data through the
//!   import layer when an operand's container falls short.
//!
//! Update is fail-soft throughout: any problem that blocks a recompute
//! (missing operand, no overlap with the requested range, an arity the
//! recorded lineage cannot satisfy, a result outside the request) is
//! logged and the previous cached value is returned unchanged. Callers
//! always get the best value the engine has, never a panic.

mod ops;

use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, warn};

use crate::align::{self, InterpMethod};
use crate::container::{DataContainer, DerivedVariables, ImportLayer};
use crate::coverage::tracker::{CoverageConfig, CoverageTracker};
use crate::registry::VariableRegistry;
use crate::series::lineage::{DeriveOp, Lineage, SourceRef};
use crate::series::{SeriesHandle, SeriesValues, TaggedSeries};
use crate::store::{LoadReport, PartitionStore};
use crate::time::TimeRange;

/// Engine tunables.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Interpolation method used when aligning operand time bases.
    pub interp: InterpMethod,
    /// Coverage tracker configuration.
    pub coverage: CoverageConfig,
}

/// Right-hand operand of a derivation.
#[derive(Debug, Clone)]
pub enum Operand {
    /// Another series.
    Series(SeriesHandle),
    /// A scalar applied element-wise.
    Scalar(f64),
    /// No right-hand operand (unary operations).
    None,
}

/// Owns the registry, tracker, and derived-variable bookkeeping.
pub struct VariableEngine {
    registry: VariableRegistry,
    tracker: CoverageTracker,
    derived: Rc<RefCell<DerivedVariables>>,
    config: EngineConfig,
    importer: Option<Box<dyn ImportLayer>>,
}

impl Default for VariableEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl VariableEngine {
    /// Engine with the given configuration and an empty registry.
    pub fn new(config: EngineConfig) -> Self {
        let mut registry = VariableRegistry::new();
        let tracker = CoverageTracker::new(config.coverage.clone());
        let derived = Rc::new(RefCell::new(DerivedVariables::new()));
        registry.stash_container_handle(Rc::clone(&derived) as Rc<RefCell<dyn DataContainer>>);

        Self {
            registry,
            tracker,
            derived,
            config,
            importer: None,
        }
    }

    /// Attach the import layer used to refresh stale containers.
    pub fn set_importer(&mut self, importer: Box<dyn ImportLayer>) {
        self.importer = Some(importer);
    }

    /// The engine's registry.
    pub fn registry(&self) -> &VariableRegistry {
        &self.registry
    }

    /// Mutable access to the registry, for stashing raw data.
    pub fn registry_mut(&mut self) -> &mut VariableRegistry {
        &mut self.registry
    }

    /// The engine's coverage tracker.
    pub fn tracker(&self) -> &CoverageTracker {
        &self.tracker
    }

    /// The engine's configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Names of all defined derived variables, sorted.
    pub fn variables(&self) -> Vec<String> {
        self.derived.borrow().names()
    }

    /// Attach a partition store, loading whatever it has.
    ///
    /// Loaded series that carry lineage are re-linked into the derived
    /// variables container and their stored spans seed the coverage
    /// tracker, so a restarted process serves cached ranges without
    /// recomputing them.
    pub fn enable_persistence(&mut self, store: PartitionStore) -> LoadReport {
        let report = self.registry.enable_persistence(store);

        // The engine's own container stays authoritative for derived
        // variables, even if the load brought a stale copy in.
        self.registry
            .stash_container_handle(Rc::clone(&self.derived) as Rc<RefCell<dyn DataContainer>>);

        for ident in self.registry.idents() {
            let Some(handle) = self.registry.grab_series(&ident) else {
                continue;
            };
            let (has_lineage, span) = {
                let series = handle.borrow();
                (series.lineage().is_some(), series.time_range())
            };
            if !has_lineage {
                continue;
            }

            self.derived
                .borrow_mut()
                .insert(ident.clone(), Rc::clone(&handle));
            if let Some(range) = span {
                self.tracker.update_calculated_range(
                    DerivedVariables::DATA_TYPE,
                    Some(&ident),
                    &range,
                );
            }
        }

        report
    }

    /// Register a derived variable under `name`.
    ///
    /// Any prior coverage for `name` is cleared: a freshly defined
    /// variable is uncomputed until its first update, even when it
    /// replaces an existing one.
    pub fn define(&mut self, name: &str, series: TaggedSeries) -> SeriesHandle {
        self.tracker
            .clear_calculation_cache(DerivedVariables::DATA_TYPE, Some(name));
        let handle = self.registry.stash_series(name, series);
        self.derived.borrow_mut().insert(name, Rc::clone(&handle));
        handle
    }

    /// Derive a new variable, naming it from its operands.
    pub fn derive(&mut self, op: DeriveOp, lhs: &SeriesHandle, rhs: Operand) -> SeriesHandle {
        let name = compose_name(op, lhs, &rhs);
        self.derive_named(&name, op, lhs, rhs)
    }

    /// Derive a new variable under an explicit name.
    ///
    /// The lineage of a derived operand is flattened into the new
    /// variable's lineage, so chained expressions reference the
    /// original leaf series. The result copies the left operand's
    /// style, is computed eagerly, and its own time span is recorded as
    /// covered.
    pub fn derive_named(
        &mut self,
        name: &str,
        op: DeriveOp,
        lhs: &SeriesHandle,
        rhs: Operand,
    ) -> SeriesHandle {
        let mut sources = flatten_sources(lhs);

        let (values, times, scalar) = match &rhs {
            Operand::Series(rhs_handle) => {
                sources.extend(flatten_sources(rhs_handle));
                let aligned = align::align(&lhs.borrow(), &rhs_handle.borrow(), self.config.interp);
                let values = ops::apply_binary(op, &aligned.lhs, &aligned.rhs);
                (values, aligned.times, None)
            }
            Operand::Scalar(s) => {
                let (values, times) =
                    compute_with(&lhs.borrow(), |buf| ops::apply_scalar(op, buf, *s));
                (values, times, Some(*s))
            }
            Operand::None => {
                let (values, times) = compute_with(&lhs.borrow(), |buf| ops::apply_unary(op, buf));
                (values, times, None)
            }
        };

        let mut style = lhs.borrow().style().clone();
        style.label = Some(name.to_owned());

        let mut series =
            TaggedSeries::with_style(name, SeriesValues::OneDim(values), times, style);
        series.set_lineage(Some(Lineage { op, sources, scalar }));

        let handle = self.define(name, series);

        let span = handle.borrow().time_range();
        if let Some(range) = span {
            self.tracker
                .update_calculated_range(DerivedVariables::DATA_TYPE, Some(name), &range);
        }
        handle
    }

    /// Bring a derived variable up to date over `range`.
    ///
    /// Returns `None` only when `name` is unknown. A covered range
    /// returns the cached handle untouched; otherwise the lineage is
    /// recomputed against freshly resolved operands and the new handle
    /// replaces the old registry entry. Every recompute obstacle falls
    /// back to the previous cached handle.
    pub fn update(&mut self, name: &str, range: &TimeRange) -> Option<SeriesHandle> {
        let current = self.registry.grab_series(name)?;

        if !self
            .tracker
            .is_calculation_needed(DerivedVariables::DATA_TYPE, Some(name), range)
        {
            return Some(current);
        }

        let lineage = current.borrow().lineage().cloned();
        let Some(lineage) = lineage else {
            debug!("{name} has no lineage; serving stored data as-is");
            return Some(current);
        };

        let probe = range.shrunk(self.tracker.config().tolerance_secs);

        let mut resolved: Vec<(String, SeriesHandle)> = Vec::with_capacity(lineage.sources.len());
        for source in &lineage.sources {
            match self.resolve_operand(&source.ident, range) {
                Some(handle) => resolved.push((source.ident.clone(), handle)),
                None => {
                    warn!(
                        "operand {} of {name} is unavailable; keeping previous value",
                        source.ident
                    );
                    return Some(current);
                }
            }
        }

        for (ident, handle) in &resolved {
            let overlaps = handle
                .borrow()
                .time_range()
                .map(|r| r.intersects(&probe))
                .unwrap_or(false);
            if !overlaps {
                warn!(
                    "operand {ident} of {name} has no data in [{}, {}]; keeping previous value",
                    range.start, range.end
                );
                return Some(current);
            }
        }

        let needed = if lineage.op.is_unary() || lineage.scalar.is_some() {
            1
        } else {
            2
        };
        if resolved.len() != needed {
            warn!(
                "{name} lineage carries {} operands where {needed} are usable; \
                 keeping previous value",
                resolved.len()
            );
            return Some(current);
        }

        let (values, times) = match (resolved.as_slice(), lineage.scalar) {
            ([(_, only)], Some(scalar)) => compute_with(&only.borrow(), |buf| {
                ops::apply_scalar(lineage.op, buf, scalar)
            }),
            ([(_, only)], None) => {
                compute_with(&only.borrow(), |buf| ops::apply_unary(lineage.op, buf))
            }
            ([(_, lhs), (_, rhs)], _) => {
                let aligned = align::align(&lhs.borrow(), &rhs.borrow(), self.config.interp);
                (
                    ops::apply_binary(lineage.op, &aligned.lhs, &aligned.rhs),
                    aligned.times,
                )
            }
            _ => return Some(current),
        };

        if !times.iter().any(|&t| range.contains(t)) {
            warn!(
                "recompute of {name} produced no samples in [{}, {}]; keeping previous value",
                range.start, range.end
            );
            return Some(current);
        }

        // Carry the previous instance's style forward wholesale so the
        // caller's display tweaks survive the recompute.
        let style = current.borrow().style().clone();
        let mut series =
            TaggedSeries::with_style(name, SeriesValues::OneDim(values), times, style);
        let sources = resolved
            .iter()
            .map(|(ident, handle)| SourceRef::new(ident.clone(), handle))
            .collect();
        series.set_lineage(Some(Lineage {
            op: lineage.op,
            sources,
            scalar: lineage.scalar,
        }));

        let handle = self.registry.stash_series(name, series);
        self.derived.borrow_mut().insert(name, Rc::clone(&handle));
        self.tracker
            .update_calculated_range(DerivedVariables::DATA_TYPE, Some(name), range);

        Some(handle)
    }

    /// Resolve one lineage operand to its current series.
    ///
    /// Dotted identifiers go through the live container, refreshing it
    /// via the import layer when its data does not cover `range`.
    fn resolve_operand(&mut self, ident: &str, range: &TimeRange) -> Option<SeriesHandle> {
        let Some((data_type, component)) = ident.split_once('.') else {
            return self.registry.grab_series(ident);
        };

        let Some(container) = self.registry.grab_container(data_type) else {
            // A dotted stashed series with no live container behind it.
            return self.registry.grab_series(ident);
        };

        let tolerance = self.tracker.config().tolerance_secs;
        let covered = covers_range(container.borrow().times(), &range.shrunk(tolerance));
        if !covered {
            if let Some(importer) = self.importer.as_mut() {
                if let Some(data) = importer.fetch(data_type, *range) {
                    let span = data.time_range();
                    container.borrow_mut().update(&data);
                    self.registry
                        .stash_container_handle(Rc::clone(&container));
                    if let Some(span) = span {
                        self.tracker.update_calculated_range(data_type, None, &span);
                    }
                }
            }
        }

        let series = container.borrow().get(component);
        series
    }
}

fn compose_name(op: DeriveOp, lhs: &SeriesHandle, rhs: &Operand) -> String {
    let lhs_short = short_name(&lhs.borrow());
    match rhs {
        Operand::Series(rhs_handle) => {
            let rhs_short = short_name(&rhs_handle.borrow());
            format!("{lhs_short}_{}_{rhs_short}", op.token())
        }
        Operand::Scalar(s) => format!("{lhs_short}_{}_{}", op.token(), scalar_token(*s)),
        Operand::None => format!("{}_{lhs_short}", op.token()),
    }
}

fn short_name(series: &TaggedSeries) -> String {
    crate::container::short_component_name(series.name()).to_owned()
}

fn scalar_token(s: f64) -> String {
    s.to_string().replace('-', "m").replace('.', "p")
}

/// A derived operand contributes its own recorded sources; anything
/// else contributes itself.
fn flatten_sources(handle: &SeriesHandle) -> Vec<SourceRef> {
    let series = handle.borrow();
    match series.lineage() {
        Some(lineage) if !lineage.sources.is_empty() => lineage.sources.clone(),
        _ => vec![SourceRef::new(series.name(), handle)],
    }
}

fn compute_with<F>(series: &TaggedSeries, f: F) -> (Vec<f64>, Vec<f64>)
where
    F: FnOnce(&[f64]) -> Vec<f64>,
{
    match series.values().as_one_dim() {
        Some(buf) if !series.times().is_empty() && buf.len() == series.times().len() => {
            (f(buf), series.times().to_vec())
        }
        _ => {
            warn!("operand {} has no usable one-dimensional data", series.name());
            (vec![0.0], Vec::new())
        }
    }
}

fn covers_range(times: &[f64], probe: &TimeRange) -> bool {
    TimeRange::from_times(times)
        .map(|r| r.start <= probe.start && r.end >= probe.end)
        .unwrap_or(false)
}
