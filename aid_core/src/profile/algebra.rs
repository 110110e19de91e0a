//! Pointwise composition of rate profiles.
//!
//! The result is sampled on the union of all input breakpoints, spans from
//! the earliest start to the latest end, and is normalized to its own end.
//! Inputs are never modified.

use super::Profile;
use crate::error::{AidError, Result};
use chrono::NaiveDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Add,
    Subtract,
}

impl Op {
    fn apply(self, acc: f64, v: f64) -> f64 {
        match self {
            Self::Add => acc + v,
            Self::Subtract => acc - v,
        }
    }
}

impl Profile<f64> {
    /// `self + others[0] + others[1] + ...` at every union breakpoint.
    pub fn add(&self, others: &[&Self]) -> Result<Self> {
        combine(self, others, Op::Add)
    }

    /// `self - others[0] - others[1] - ...` at every union breakpoint.
    pub fn subtract(&self, others: &[&Self]) -> Result<Self> {
        combine(self, others, Op::Subtract)
    }
}

fn combine(base: &Profile<f64>, others: &[&Profile<f64>], op: Op) -> Result<Profile<f64>> {
    if let Some(bad) = others.iter().find(|p| p.unit() != base.unit()) {
        return Err(AidError::UnitMismatch {
            expected: base.unit().to_string(),
            found: bad.unit().to_string(),
        }
        .into());
    }

    let mut times: Vec<NaiveDateTime> = base.times().to_vec();
    for p in others {
        times.extend_from_slice(p.times());
    }
    times.sort_unstable();
    times.dedup();

    let values: Vec<f64> = times
        .iter()
        .map(|&t| {
            others
                .iter()
                .fold(base.value_at(t), |acc, p| op.apply(acc, p.value_at(t)))
        })
        .collect();

    let reference = times[times.len() - 1];
    tracing::debug!(?op, inputs = others.len() + 1, n = times.len(), "combined profiles");
    Profile::from_parts(times, values, base.unit(), reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::{BgUnit, Unit};
    use chrono::{NaiveDate, TimeDelta};

    fn at(h: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + TimeDelta::hours(h)
    }

    fn rates(points: &[(i64, f64)]) -> Profile<f64> {
        let (times, values): (Vec<_>, Vec<_>) = points.iter().map(|&(h, v)| (at(h), v)).unzip();
        let end = times[times.len() - 1];
        Profile::from_parts(times, values, Unit::UnitsPerHour, end).unwrap()
    }

    #[test]
    fn add_samples_on_union_of_breakpoints() {
        let a = rates(&[(0, 1.0), (2, 2.0), (4, 2.0)]);
        let b = rates(&[(0, 0.5), (1, 0.0), (3, 1.0), (4, 1.0)]);
        let sum = a.add(&[&b]).unwrap();
        assert_eq!(sum.times(), &[at(0), at(1), at(2), at(3), at(4)]);
        assert_eq!(sum.values(), &[1.5, 1.0, 2.0, 3.0, 3.0]);
        assert_eq!(sum.reference(), at(4));
        assert_eq!(sum.offsets()[0], -4.0);
    }

    #[test]
    fn subtract_folds_left_to_right() {
        let a = rates(&[(0, 5.0), (2, 5.0)]);
        let b = rates(&[(0, 1.0), (2, 1.0)]);
        let c = rates(&[(0, 2.0), (1, 3.0), (2, 3.0)]);
        let diff = a.subtract(&[&b, &c]).unwrap();
        assert_eq!(diff.values(), &[2.0, 1.0, 1.0]);
    }

    #[test]
    fn result_spans_widest_input() {
        let a = rates(&[(1, 1.0), (2, 1.0)]);
        let b = rates(&[(0, 1.0), (5, 1.0)]);
        let sum = a.add(&[&b]).unwrap();
        assert_eq!(sum.start(), at(0));
        assert_eq!(sum.end(), at(5));
        // `a` contributes its boundary value outside its own window
        assert_eq!(sum.value_at(at(0)), 2.0);
    }

    #[test]
    fn mixed_units_are_rejected() {
        let a = rates(&[(0, 1.0), (2, 1.0)]);
        let isf = Profile::from_parts(
            vec![at(0), at(2)],
            vec![2.0, 2.0],
            Unit::GlucosePerUnit(BgUnit::MmolL),
            at(2),
        )
        .unwrap();
        let err = a.add(&[&isf]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AidError>(),
            Some(AidError::UnitMismatch { .. })
        ));
    }
}
