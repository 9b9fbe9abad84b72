//! Wrapper prelude.
//!
//! The `plotvar` crate is the supported public entry point. Downstream
//! code should prefer importing from this prelude instead of depending
//! on internal core module paths.

pub use crate::{coverage, store};
pub use crate::{
    AxisScale, BasicContainer, ComponentSpec, DataContainer, DeriveOp, DerivedVariables,
    EngineConfig, ImportLayer, ImportedData, InterpMethod, Lineage, Operand, PlotStyle,
    SeriesHandle, SeriesValues, TaggedSeries, TimeBucket, TimeRange, VariableEngine,
    VariableRegistry,
};
