//! Time-base alignment for binary series arithmetic.
//!
//! Two series rarely share a timestamp grid, so before an element-wise
//! operation one of them is resampled onto the other's grid. The series
//! with the *shorter* time coverage supplies the target grid; resampling
//! never extrapolates, so widening the grid would only manufacture NaN
//! padding.
//!
//! Inputs that cannot produce a usable alignment (empty buffers, 2-D
//! values where a 1-D view is required) collapse to a degenerate result
//! with single-element zero buffers and an empty timestamp array, the
//! crate-wide marker for "no data yet".

use serde::{Deserialize, Serialize};

use crate::series::TaggedSeries;

/// Interpolation method used when resampling onto a target grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterpMethod {
    /// Take the value of the nearest source sample.
    #[default]
    Nearest,
    /// Linearly interpolate between the bracketing source samples.
    Linear,
}

/// Two value buffers on a common timestamp grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Aligned {
    /// Left operand values on the shared grid.
    pub lhs: Vec<f64>,
    /// Right operand values on the shared grid.
    pub rhs: Vec<f64>,
    /// The shared timestamp grid.
    pub times: Vec<f64>,
}

impl Aligned {
    fn degenerate() -> Self {
        Self {
            lhs: vec![0.0],
            rhs: vec![0.0],
            times: Vec::new(),
        }
    }
}

/// Bring two series onto a common timestamp grid.
///
/// Identical grids pass both value buffers through unchanged. Otherwise
/// the series with the shorter time coverage keeps its grid and the
/// other is resampled onto it with `method`.
pub fn align(a: &TaggedSeries, b: &TaggedSeries, method: InterpMethod) -> Aligned {
    let (Some((a_times, a_vals)), Some((b_times, b_vals))) = (one_dim_view(a), one_dim_view(b))
    else {
        return Aligned::degenerate();
    };

    if a_times == b_times {
        return Aligned {
            lhs: a_vals.to_vec(),
            rhs: b_vals.to_vec(),
            times: a_times.to_vec(),
        };
    }

    let a_span = span_secs(a_times);
    let b_span = span_secs(b_times);

    if b_span < a_span {
        Aligned {
            lhs: resample(a_times, a_vals, b_times, method),
            rhs: b_vals.to_vec(),
            times: b_times.to_vec(),
        }
    } else {
        Aligned {
            lhs: a_vals.to_vec(),
            rhs: resample(b_times, b_vals, a_times, method),
            times: a_times.to_vec(),
        }
    }
}

/// Resample `(src_times, src_vals)` onto `target` timestamps.
///
/// Sample pairs where either side is NaN are dropped before building the
/// interpolant. Fewer than two valid samples, or a target point outside
/// the valid samples' time range, yields NaN at the affected positions.
pub fn resample(
    src_times: &[f64],
    src_vals: &[f64],
    target: &[f64],
    method: InterpMethod,
) -> Vec<f64> {
    debug_assert_eq!(src_times.len(), src_vals.len());

    let mut xs = Vec::with_capacity(src_times.len());
    let mut ys = Vec::with_capacity(src_vals.len());
    for (&t, &v) in src_times.iter().zip(src_vals) {
        if t.is_nan() || v.is_nan() {
            continue;
        }
        xs.push(t);
        ys.push(v);
    }

    if xs.len() < 2 {
        return vec![f64::NAN; target.len()];
    }

    target
        .iter()
        .map(|&t| sample_at(&xs, &ys, t, method))
        .collect()
}

fn sample_at(xs: &[f64], ys: &[f64], t: f64, method: InterpMethod) -> f64 {
    let last = xs.len() - 1;
    if t.is_nan() || t < xs[0] || t > xs[last] {
        return f64::NAN;
    }
    // In range, so at least one knot is <= t.
    let hi = xs.partition_point(|&x| x <= t);
    if hi > last {
        return ys[last];
    }
    let lo = hi - 1;

    match method {
        InterpMethod::Nearest => {
            if t - xs[lo] <= xs[hi] - t {
                ys[lo]
            } else {
                ys[hi]
            }
        }
        InterpMethod::Linear => {
            let dx = xs[hi] - xs[lo];
            if dx <= 0.0 {
                return ys[lo];
            }
            ys[lo] + (ys[hi] - ys[lo]) * (t - xs[lo]) / dx
        }
    }
}

fn one_dim_view(series: &TaggedSeries) -> Option<(&[f64], &[f64])> {
    let vals = series.values().as_one_dim()?;
    let times = series.times();
    if times.is_empty() || vals.len() != times.len() {
        return None;
    }
    Some((times, vals))
}

fn span_secs(times: &[f64]) -> f64 {
    match (times.first(), times.last()) {
        (Some(first), Some(last)) => last - first,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::SeriesValues;

    fn series(name: &str, times: Vec<f64>, vals: Vec<f64>) -> TaggedSeries {
        TaggedSeries::new(name, SeriesValues::OneDim(vals), times)
    }

    #[test]
    fn identical_grids_pass_through() {
        let a = series("a", vec![0.0, 1.0, 2.0], vec![1.0, 2.0, 3.0]);
        let b = series("b", vec![0.0, 1.0, 2.0], vec![4.0, 5.0, 6.0]);

        let out = align(&a, &b, InterpMethod::Linear);
        assert_eq!(out.times, vec![0.0, 1.0, 2.0]);
        assert_eq!(out.lhs, vec![1.0, 2.0, 3.0]);
        assert_eq!(out.rhs, vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn shorter_coverage_becomes_target_grid() {
        // a: 101 points over [0, 100]; b: 11 points over [0, 10].
        let a_times: Vec<f64> = (0..=100).map(f64::from).collect();
        let a_vals: Vec<f64> = a_times.iter().map(|t| 2.0 * t).collect();
        let b_times: Vec<f64> = (0..=10).map(f64::from).collect();
        let b_vals = vec![1.0; 11];

        let a = series("a", a_times, a_vals);
        let b = series("b", b_times.clone(), b_vals.clone());

        let out = align(&a, &b, InterpMethod::Nearest);
        assert_eq!(out.times, b_times);
        assert_eq!(out.rhs, b_vals);
        // Grids coincide on integer seconds, so resampling is exact.
        let expected: Vec<f64> = out.times.iter().map(|t| 2.0 * t).collect();
        assert_eq!(out.lhs, expected);
    }

    #[test]
    fn nearest_picks_closer_sample() {
        let out = resample(&[0.0, 10.0], &[1.0, 2.0], &[4.0, 6.0], InterpMethod::Nearest);
        assert_eq!(out, vec![1.0, 2.0]);
    }

    #[test]
    fn linear_interpolates_between_samples() {
        let out = resample(
            &[0.0, 10.0],
            &[0.0, 10.0],
            &[2.5, 7.5],
            InterpMethod::Linear,
        );
        assert_eq!(out, vec![2.5, 7.5]);
    }

    #[test]
    fn nan_samples_are_dropped_before_interpolation() {
        let out = resample(
            &[0.0, 5.0, 10.0],
            &[0.0, f64::NAN, 10.0],
            &[5.0],
            InterpMethod::Linear,
        );
        assert_eq!(out, vec![5.0]);
    }

    #[test]
    fn no_extrapolation_beyond_source_range() {
        let out = resample(
            &[0.0, 10.0],
            &[1.0, 2.0],
            &[-1.0, 5.0, 11.0],
            InterpMethod::Nearest,
        );
        assert!(out[0].is_nan());
        assert!(!out[1].is_nan());
        assert!(out[2].is_nan());
    }

    #[test]
    fn fewer_than_two_valid_samples_yield_all_nan() {
        let out = resample(
            &[0.0, 1.0, 2.0],
            &[f64::NAN, f64::NAN, 3.0],
            &[0.0, 1.0, 2.0],
            InterpMethod::Linear,
        );
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn target_on_last_knot_takes_last_value() {
        let out = resample(&[0.0, 10.0], &[1.0, 2.0], &[10.0], InterpMethod::Linear);
        assert_eq!(out, vec![2.0]);
    }

    #[test]
    fn two_dim_operand_degenerates() {
        let a = series("a", vec![0.0, 1.0], vec![1.0, 2.0]);
        let b = TaggedSeries::new(
            "b",
            SeriesValues::TwoDim(vec![vec![1.0], vec![2.0]]),
            vec![0.0, 1.0],
        );

        let out = align(&a, &b, InterpMethod::Nearest);
        assert_eq!(out.lhs, vec![0.0]);
        assert_eq!(out.rhs, vec![0.0]);
        assert!(out.times.is_empty());
    }

    #[test]
    fn empty_operand_degenerates() {
        let a = series("a", vec![], vec![]);
        let b = series("b", vec![0.0, 1.0], vec![1.0, 2.0]);

        let out = align(&a, &b, InterpMethod::Linear);
        assert!(out.times.is_empty());
        assert_eq!(out.lhs, vec![0.0]);
    }
}
