//! Core engine for derived, lineage-tracked time-series variables.
//!
//! This crate provides the foundational pieces for `plotvar`:
//!
//! - A process-wide registry mapping string identifiers to live
//!   containers and series, with optional best-effort persistence into
//!   calendar-partitioned files (`registry`, `store`).
//! - RoaringBitmap-based coverage tracking that decides whether a
//!   requested time interval needs recomputation (`coverage`).
//! - A derived-variable engine that records arithmetic lineage on tagged
//!   series and lazily recomputes them with automatic time-base
//!   alignment (`engine`, `series`, `align`).
//! - The container and import contracts at the seam to the
//!   instrument-specific calculation classes and the download layer,
//!   which live outside this crate (`container`).
//!
//! The execution model is deliberately single-threaded and synchronous:
//! shared state lives in `Rc<RefCell<...>>` handles and partition I/O
//! blocks the caller. Higher layers (plot rendering, notebooks, download
//! tooling) are expected to depend on this core crate rather than
//! re-implement the bookkeeping.
#![deny(missing_docs)]
pub mod align;
pub mod container;
pub mod coverage;
pub mod engine;
pub mod registry;
pub mod series;
pub mod store;
pub mod time;
