//! Derivation lineage: how a derived series was computed.
//!
//! A derived series remembers the operation and the operands that
//! produced it, so the engine can recompute it later over a different
//! time range. Operand handles are held weakly; lineage must never keep
//! a source series alive on its own, and a dangling handle is resolved
//! back through the registry by name at recompute time.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

use crate::series::TaggedSeries;

/// Arithmetic operation a derived variable applies to its operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeriveOp {
    /// Elementwise addition.
    Add,
    /// Elementwise subtraction.
    Sub,
    /// Elementwise multiplication.
    Mul,
    /// Elementwise division.
    Div,
    /// Elementwise exponentiation.
    Pow,
    /// Elementwise floor division.
    FloorDiv,
    /// Elementwise negation.
    Neg,
    /// Elementwise absolute value.
    Abs,
}

impl DeriveOp {
    /// Whether the operation takes a single operand.
    pub fn is_unary(self) -> bool {
        matches!(self, DeriveOp::Neg | DeriveOp::Abs)
    }

    /// Short token used when composing derived variable names.
    pub fn token(self) -> &'static str {
        match self {
            DeriveOp::Add => "plus",
            DeriveOp::Sub => "minus",
            DeriveOp::Mul => "times",
            DeriveOp::Div => "div",
            DeriveOp::Pow => "pow",
            DeriveOp::FloorDiv => "floordiv",
            DeriveOp::Neg => "neg",
            DeriveOp::Abs => "abs",
        }
    }
}

/// One operand of a derivation: a registry identifier plus a weak
/// handle to the series it referred to when the lineage was built.
#[derive(Debug, Clone)]
pub struct SourceRef {
    /// Registry identifier the operand resolves through.
    pub ident: String,
    /// Weak handle to the operand series. May dangle after a reload;
    /// resolution falls back to `ident`.
    pub series: Weak<RefCell<TaggedSeries>>,
}

impl SourceRef {
    /// Reference an operand through a live handle.
    pub fn new(ident: impl Into<String>, handle: &Rc<RefCell<TaggedSeries>>) -> Self {
        Self {
            ident: ident.into(),
            series: Rc::downgrade(handle),
        }
    }

    /// Reference an operand by name only, with no live handle.
    ///
    /// Used when lineage is reconstructed from storage; the handle is
    /// re-established through the registry on first recompute.
    pub fn detached(ident: impl Into<String>) -> Self {
        Self {
            ident: ident.into(),
            series: Weak::new(),
        }
    }
}

/// Full derivation recipe for one derived series.
#[derive(Debug, Clone)]
pub struct Lineage {
    /// Operation applied to the operands.
    pub op: DeriveOp,
    /// Series operands, in application order.
    pub sources: Vec<SourceRef>,
    /// Scalar right-hand operand for series-scalar operations.
    pub scalar: Option<f64>,
}

impl Lineage {
    /// Identifiers of all series operands, in order.
    pub fn source_idents(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.ident.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::SeriesValues;

    #[test]
    fn unary_ops_are_unary() {
        assert!(DeriveOp::Neg.is_unary());
        assert!(DeriveOp::Abs.is_unary());
        assert!(!DeriveOp::Add.is_unary());
        assert!(!DeriveOp::Div.is_unary());
    }

    #[test]
    fn source_ref_holds_weakly() {
        let handle = TaggedSeries::new(
            "mag.bx",
            SeriesValues::OneDim(vec![1.0]),
            vec![0.0],
        )
        .into_handle();

        let source = SourceRef::new("mag.bx", &handle);
        assert!(source.series.upgrade().is_some());

        drop(handle);
        assert!(source.series.upgrade().is_none());
    }

    #[test]
    fn detached_source_has_no_handle() {
        let source = SourceRef::detached("mag.bx");
        assert_eq!(source.ident, "mag.bx");
        assert!(source.series.upgrade().is_none());
    }

    #[test]
    fn source_idents_preserve_order() {
        let lineage = Lineage {
            op: DeriveOp::Add,
            sources: vec![SourceRef::detached("a"), SourceRef::detached("b")],
            scalar: None,
        };
        assert_eq!(lineage.source_idents(), vec!["a", "b"]);
    }
}
