//! # plotvar
//!
//! Derived time-series variables with coverage-tracked lazy recomputation.
//!
//! This crate is the supported public entry point and provides a small, stable surface.
//!
//! ## Example
//!
//! ```rust,ignore
//! use plotvar::prelude::*;
//!
//! let mut engine = VariableEngine::new(EngineConfig::default());
//! let ratio = engine.derive(DeriveOp::Div, &density, Operand::Series(temperature));
//! engine.update("np_div_temp", &TimeRange::new(start, end));
//! ```

/// Convenience prelude with the stable, supported surface.
pub mod prelude;

/// Coverage namespace (wrapper-only).
pub mod coverage {
    pub use plotvar_core::coverage::tracker::{CoverageConfig, CoverageKey, CoverageTracker};
    pub use plotvar_core::coverage::{Bucket, Coverage};
}

/// Persistence namespace (wrapper-only).
pub mod store {
    pub use plotvar_core::store::layout::{PartitionCadence, StoreLayout, TypeLayout};
    pub use plotvar_core::store::{LoadReport, PartitionStore, StoreError, StoreLocation};
}

pub use plotvar_core::align::InterpMethod;
pub use plotvar_core::container::{
    BasicContainer, ComponentSpec, DataContainer, DerivedVariables, ImportLayer, ImportedData,
};
pub use plotvar_core::engine::{EngineConfig, Operand, VariableEngine};
pub use plotvar_core::registry::{ContainerHandle, RegistryEntry, VariableRegistry};
pub use plotvar_core::series::lineage::{DeriveOp, Lineage, SourceRef};
pub use plotvar_core::series::style::{AxisScale, PlotStyle};
pub use plotvar_core::series::{SeriesHandle, SeriesValues, TaggedSeries};
pub use plotvar_core::time::{TimeBucket, TimeRange};
