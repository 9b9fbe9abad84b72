//! Element-wise arithmetic kernels for derived variables.

use crate::series::lineage::DeriveOp;

pub(crate) fn apply_binary(op: DeriveOp, lhs: &[f64], rhs: &[f64]) -> Vec<f64> {
    debug_assert_eq!(lhs.len(), rhs.len());
    lhs.iter()
        .zip(rhs)
        .map(|(&a, &b)| binary_elem(op, a, b))
        .collect()
}

pub(crate) fn apply_scalar(op: DeriveOp, lhs: &[f64], scalar: f64) -> Vec<f64> {
    lhs.iter().map(|&a| binary_elem(op, a, scalar)).collect()
}

pub(crate) fn apply_unary(op: DeriveOp, operand: &[f64]) -> Vec<f64> {
    operand.iter().map(|&a| unary_elem(op, a)).collect()
}

fn binary_elem(op: DeriveOp, a: f64, b: f64) -> f64 {
    match op {
        DeriveOp::Add => a + b,
        DeriveOp::Sub => a - b,
        DeriveOp::Mul => a * b,
        DeriveOp::Div => {
            if b == 0.0 {
                f64::NAN
            } else {
                a / b
            }
        }
        DeriveOp::FloorDiv => {
            if b == 0.0 {
                f64::NAN
            } else {
                (a / b).floor()
            }
        }
        DeriveOp::Pow => a.powf(b),
        DeriveOp::Neg | DeriveOp::Abs => {
            debug_assert!(false, "unary {op:?} applied with two operands");
            f64::NAN
        }
    }
}

fn unary_elem(op: DeriveOp, a: f64) -> f64 {
    match op {
        DeriveOp::Neg => -a,
        DeriveOp::Abs => a.abs(),
        _ => {
            debug_assert!(false, "binary {op:?} applied with one operand");
            f64::NAN
        }
    }
}
