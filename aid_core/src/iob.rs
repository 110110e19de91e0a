//! Insulin on board.
//!
//! IOB at instant `T` convolves the net insulin profile with the decay
//! curve's integral: each step `[t_i, t_{i+1})` delivering `y_i` U/h
//! contributes `y_i * (F(T - t_i) - F(T - t_{i+1}))`. Delivery after the
//! profile end is taken as zero.
use crate::error::{AidError, Result};
use crate::idc::InsulinCurve;
use crate::profile::Profile;
use crate::units::Unit;
use crate::util::{from_minutes, grid_index, hours_between};
use chrono::NaiveDateTime;

/// Tolerance for matching a requested horizon to the prediction grid.
pub const GRID_TOLERANCE: f64 = 1e-6;

/// IOB of `net` at its own reference instant.
#[must_use]
pub fn compute(net: &Profile<f64>, curve: &InsulinCurve) -> f64 {
    net.offsets()
        .windows(2)
        .zip(net.values())
        .map(|(o, &y)| y * (curve.integral(-o[0]) - curve.integral(-o[1])))
        .sum()
}

/// IOB of `net` at an arbitrary instant `at`.
#[must_use]
pub fn compute_at(net: &Profile<f64>, curve: &InsulinCurve, at: NaiveDateTime) -> f64 {
    let shift = hours_between(net.reference(), at);
    net.offsets()
        .windows(2)
        .zip(net.values())
        .map(|(o, &y)| y * (curve.integral(shift - o[0]) - curve.integral(shift - o[1])))
        .sum()
}

/// IOB trajectory over `[now, now + DIA]` on a fixed grid.
#[derive(Debug, Clone)]
pub struct IobPrediction {
    profile: Profile<f64>,
    step_h: f64,
    derivative: Vec<f64>,
}

impl IobPrediction {
    /// Predict IOB from the net profile's reference instant ("now") on, one
    /// point every `step_min` minutes, assuming no further delivery.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn predict(net: &Profile<f64>, curve: &InsulinCurve, step_min: u32) -> Result<Self> {
        if step_min == 0 {
            return Err(AidError::Config("IOB step must be at least one minute".into()).into());
        }
        let step_h = f64::from(step_min) / 60.0;
        let n = (curve.dia() / step_h + GRID_TOLERANCE).floor() as usize;
        let now = net.reference();
        let step = from_minutes(step_min);

        let mut times = Vec::with_capacity(n + 1);
        let mut values = Vec::with_capacity(n + 1);
        let mut t = now;
        for _ in 0..=n {
            let iob = compute_at(net, curve, t);
            tracing::trace!(%t, iob, "IOB");
            times.push(t);
            values.push(iob);
            t += step;
        }
        let derivative = values.windows(2).map(|w| (w[1] - w[0]) / step_h).collect();
        let profile = Profile::from_parts(times, values, Unit::Units, now)?;
        tracing::debug!(iob = profile.first_value(), points = profile.len(), "predicted IOB");
        Ok(Self {
            profile,
            step_h,
            derivative,
        })
    }

    /// Current IOB (U).
    #[must_use]
    pub fn now(&self) -> f64 {
        self.profile.first_value()
    }

    #[must_use]
    pub const fn profile(&self) -> &Profile<f64> {
        &self.profile
    }

    #[must_use]
    pub const fn step_h(&self) -> f64 {
        self.step_h
    }

    /// `dIOB/dt` per grid step (U/h), one shorter than the profile.
    #[must_use]
    pub fn derivative(&self) -> &[f64] {
        &self.derivative
    }

    /// Grid index of the point `dt_h` hours ahead.
    pub fn index_of(&self, dt_h: f64) -> Result<usize> {
        match grid_index(dt_h, self.step_h, GRID_TOLERANCE) {
            Some(k) if k < self.profile.len() => Ok(k),
            _ => Err(AidError::BadPredictionTime(dt_h).into()),
        }
    }

    /// Predicted IOB `dt_h` hours ahead; `dt_h` must land on the grid.
    pub fn at(&self, dt_h: f64) -> Result<f64> {
        Ok(self.profile.values()[self.index_of(dt_h)?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeDelta};

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn single_step(rate: f64, from_min: i64, to_min: i64, dia: i64) -> Profile<f64> {
        let n = now();
        let mut times = vec![n - TimeDelta::hours(dia), n - TimeDelta::minutes(from_min)];
        let mut values = vec![0.0, rate];
        if to_min > 0 {
            times.push(n - TimeDelta::minutes(to_min));
            values.push(0.0);
        }
        times.push(n);
        values.push(0.0);
        Profile::from_parts(times, values, Unit::UnitsPerHour, n).unwrap()
    }

    #[test]
    fn one_hour_at_one_unit_just_delivered() {
        let c = InsulinCurve::walsh(4.0).unwrap();
        let p = single_step(1.0, 60, 0, 4);
        let iob = compute(&p, &c);
        assert!((iob - c.integral(1.0)).abs() < 1e-12);
        assert!(iob < 1.0 && iob > 0.9);
    }

    #[test]
    fn compute_at_reference_matches_compute() {
        let c = InsulinCurve::walsh(3.0).unwrap();
        let p = single_step(2.0, 90, 30, 3);
        assert!((compute(&p, &c) - compute_at(&p, &c, now())).abs() < 1e-12);
    }

    #[test]
    fn prediction_grid_and_lookup() {
        let c = InsulinCurve::walsh(3.0).unwrap();
        let pred = IobPrediction::predict(&single_step(1.0, 30, 0, 3), &c, 5).unwrap();
        assert_eq!(pred.profile().len(), 37);
        assert_eq!(pred.derivative().len(), 36);
        assert_eq!(pred.profile().end(), now() + TimeDelta::hours(3));
        assert_eq!(pred.index_of(0.5).unwrap(), 6);
        assert!(pred.at(3.0).unwrap().abs() < 1e-9);
        assert!(pred.derivative()[0] < 0.0);
        let err = pred.at(0.3).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AidError>(),
            Some(AidError::BadPredictionTime(_))
        ));
        assert!(pred.at(3.5).is_err());
    }

    #[test]
    fn zero_step_is_rejected() {
        let c = InsulinCurve::walsh(3.0).unwrap();
        assert!(IobPrediction::predict(&single_step(1.0, 30, 0, 3), &c, 0).is_err());
    }
}
