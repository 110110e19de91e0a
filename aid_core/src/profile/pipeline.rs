//! Profile construction pipeline.
//!
//! Stages run in a fixed order, each consuming the previous `Draft`:
//!
//! reset → decouple → filter → inject → cut → fill → smooth → normalize
//!
//! Every stage relies on the output invariants of the one before it, so the
//! order is enforced by `ProfileBuilder::build`. Unset values are explicit
//! `None`s until the final normalize stage, which rejects any that remain.

use super::Profile;
use crate::error::{AidError, Result};
use crate::units::Unit;
use crate::util::checked_add_hours;
use chrono::NaiveDateTime;
use std::fmt::Debug;

/// One decoded record: value in force from `time` on.
#[derive(Debug, Clone, PartialEq)]
pub struct Step<V> {
    pub time: NaiveDateTime,
    /// `None` marks a value to be taken from the filler profile.
    pub value: Option<V>,
    /// Nominal duration in hours for records that expire on their own.
    pub duration_h: Option<f64>,
    pub unit: Unit,
}

impl<V> Step<V> {
    #[must_use]
    pub const fn new(time: NaiveDateTime, value: Option<V>, unit: Unit) -> Self {
        Self {
            time,
            value,
            duration_h: None,
            unit,
        }
    }

    #[must_use]
    pub const fn with_duration(mut self, hours: f64) -> Self {
        self.duration_h = Some(hours);
        self
    }
}

/// Working buffers between pipeline stages.
#[derive(Debug, Clone)]
pub struct Draft<V> {
    times: Vec<NaiveDateTime>,
    values: Vec<Option<V>>,
    durations: Option<Vec<Option<f64>>>,
    zero: Option<V>,
    unit: Unit,
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl<V: Copy + PartialEq + Debug> Draft<V> {
    /// Empty buffers for a profile of `unit` over `[start, end]`.
    #[must_use]
    pub const fn reset(
        unit: Unit,
        zero: Option<V>,
        start: NaiveDateTime,
        end: NaiveDateTime,
        with_durations: bool,
    ) -> Self {
        Self {
            times: Vec::new(),
            values: Vec::new(),
            durations: if with_durations { Some(Vec::new()) } else { None },
            zero,
            unit,
            start,
            end,
        }
    }

    #[must_use]
    pub fn times(&self) -> &[NaiveDateTime] {
        &self.times
    }

    #[must_use]
    pub fn values(&self) -> &[Option<V>] {
        &self.values
    }

    /// Split steps into parallel axes, ordered by time. Of several steps
    /// sharing a timestamp the last one wins.
    pub fn decouple(mut self, steps: impl IntoIterator<Item = Step<V>>) -> Result<Self> {
        let mut steps: Vec<Step<V>> = steps.into_iter().collect();
        if let Some(bad) = steps.iter().find(|s| s.unit != self.unit) {
            return Err(AidError::UnitMismatch {
                expected: self.unit.to_string(),
                found: bad.unit.to_string(),
            }
            .into());
        }
        steps.sort_by_key(|s| s.time);
        for s in steps {
            if self.times.last() == Some(&s.time) {
                let i = self.times.len() - 1;
                self.values[i] = s.value;
                if let Some(d) = self.durations.as_mut() {
                    d[i] = s.duration_h;
                }
            } else {
                self.times.push(s.time);
                self.values.push(s.value);
                if let Some(d) = self.durations.as_mut() {
                    d.push(s.duration_h);
                }
            }
        }
        tracing::debug!(unit = %self.unit, n = self.times.len(), "decoupled");
        Ok(self)
    }

    /// Keep steps inside `[start, end]` plus the last one before `start`.
    #[must_use]
    pub fn filter(mut self) -> Self {
        let first_in = self.times.partition_point(|&t| t < self.start);
        let from = first_in.saturating_sub(1);
        let to = self.times.partition_point(|&t| t <= self.end);
        let to = to.max(from);
        self.times = self.times[from..to].to_vec();
        self.values = self.values[from..to].to_vec();
        if let Some(d) = self.durations.as_mut() {
            *d = d[from..to].to_vec();
        }
        tracing::debug!(unit = %self.unit, kept = self.times.len(), "filtered");
        self
    }

    /// Close duration-bearing steps that expire before the next one starts by
    /// inserting a `zero` step at `time + duration`. A step with no usable
    /// duration is a cancellation and takes the `zero` value itself. A step
    /// whose expiry falls past the calendar range never expires.
    #[must_use]
    pub fn inject(self) -> Self {
        let Some(durations) = self.durations else {
            return self;
        };
        let n = self.times.len();
        let mut times = Vec::with_capacity(2 * n);
        let mut values = Vec::with_capacity(2 * n);
        for i in 0..n {
            let t = self.times[i];
            match durations[i] {
                Some(d) if d > 0.0 => {
                    times.push(t);
                    values.push(self.values[i]);
                    let stop = checked_add_hours(t, d)
                        .filter(|&stop| i + 1 == n || stop < self.times[i + 1]);
                    if let Some(stop) = stop {
                        times.push(stop);
                        values.push(self.zero);
                    }
                }
                _ => {
                    times.push(t);
                    values.push(self.zero);
                }
            }
        }
        tracing::debug!(unit = %self.unit, n = times.len(), "injected expiries");
        Self {
            times,
            values,
            durations: None,
            ..self
        }
    }

    /// Clip to exactly `[start, end]`. The start value is the one in force at
    /// `start` (or `zero` when nothing precedes it); the end carries the last
    /// value forward unless a step sits exactly at `end`.
    #[must_use]
    pub fn cut(self) -> Self {
        let before = self.times.partition_point(|&t| t <= self.start);
        let first = if before == 0 {
            self.zero
        } else {
            self.values[before - 1]
        };
        let mut times = vec![self.start];
        let mut values = vec![first];
        let mut at_end = None;
        for (&t, &v) in self.times.iter().zip(self.values.iter()) {
            if t > self.start && t < self.end {
                times.push(t);
                values.push(v);
            } else if t == self.end {
                at_end = Some(v);
            }
        }
        let last = at_end.unwrap_or(values[values.len() - 1]);
        times.push(self.end);
        values.push(last);
        tracing::debug!(unit = %self.unit, n = times.len(), "cut to window");
        Self {
            times,
            values,
            ..self
        }
    }

    /// Replace unset values by sampling `filler`, splicing in the filler's
    /// breakpoints that fall strictly inside an unset step.
    #[must_use]
    pub fn fill(self, filler: Option<&Profile<V>>) -> Self {
        let Some(filler) = filler else {
            return self;
        };
        let n = self.times.len();
        let mut times = Vec::with_capacity(n + filler.len());
        let mut values = Vec::with_capacity(n + filler.len());
        for i in 0..n {
            let t = self.times[i];
            if self.values[i].is_some() {
                times.push(t);
                values.push(self.values[i]);
                continue;
            }
            times.push(t);
            values.push(Some(filler.value_at(t)));
            if i + 1 < n {
                let next = self.times[i + 1];
                let ft = filler.times();
                let lo = ft.partition_point(|&x| x <= t);
                let hi = ft.partition_point(|&x| x < next);
                for &x in &ft[lo..hi.max(lo)] {
                    times.push(x);
                    values.push(Some(filler.value_at(x)));
                }
            }
        }
        tracing::debug!(unit = %self.unit, n = times.len(), "filled");
        Self {
            times,
            values,
            ..self
        }
    }

    /// Drop steps repeating the previous kept value; the first and last
    /// breakpoints always stay.
    #[must_use]
    pub fn smooth(self) -> Self {
        let n = self.times.len();
        let mut times = Vec::with_capacity(n);
        let mut values: Vec<Option<V>> = Vec::with_capacity(n);
        for i in 0..n {
            if i == 0 || i + 1 == n || values.last() != Some(&self.values[i]) {
                times.push(self.times[i]);
                values.push(self.values[i]);
            }
        }
        Self {
            times,
            values,
            ..self
        }
    }

    /// Resolve into a `Profile` whose offsets are hours relative to
    /// `reference` (the window end when `None`).
    pub fn normalize(self, reference: Option<NaiveDateTime>) -> Result<Profile<V>> {
        let values: Option<Vec<V>> = self.values.iter().copied().collect();
        let Some(values) = values else {
            return Err(AidError::EmptyProfile {
                unit: self.unit.to_string(),
            }
            .into());
        };
        Profile::from_parts(
            self.times,
            values,
            self.unit,
            reference.unwrap_or(self.end),
        )
    }
}

/// Configures and runs the pipeline for one profile.
#[derive(Debug, Clone)]
pub struct ProfileBuilder<'a, V> {
    unit: Unit,
    start: NaiveDateTime,
    end: NaiveDateTime,
    zero: Option<V>,
    durations: bool,
    filler: Option<&'a Profile<V>>,
    reference: Option<NaiveDateTime>,
}

impl<'a, V: Copy + PartialEq + Debug> ProfileBuilder<'a, V> {
    #[must_use]
    pub const fn new(unit: Unit, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            unit,
            start,
            end,
            zero: None,
            durations: false,
            filler: None,
            reference: None,
        }
    }

    /// Value used for cancellations, expiries and an empty pre-start history.
    #[must_use]
    pub fn zero(mut self, zero: Option<V>) -> Self {
        self.zero = zero;
        self
    }

    /// Steps carry nominal durations; enables the inject stage.
    #[must_use]
    pub const fn with_durations(mut self) -> Self {
        self.durations = true;
        self
    }

    #[must_use]
    pub const fn filler(mut self, filler: &'a Profile<V>) -> Self {
        self.filler = Some(filler);
        self
    }

    #[must_use]
    pub const fn reference(mut self, reference: NaiveDateTime) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn build(self, steps: impl IntoIterator<Item = Step<V>>) -> Result<Profile<V>> {
        if self.start >= self.end {
            return Err(AidError::Config(format!(
                "profile window start {} must precede end {}",
                self.start, self.end
            ))
            .into());
        }
        if let Some(f) = self.filler {
            if f.unit() != self.unit {
                return Err(AidError::UnitMismatch {
                    expected: self.unit.to_string(),
                    found: f.unit().to_string(),
                }
                .into());
            }
        }
        Draft::reset(self.unit, self.zero, self.start, self.end, self.durations)
            .decouple(steps)?
            .filter()
            .inject()
            .cut()
            .fill(self.filler)
            .smooth()
            .normalize(self.reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeDelta};

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn rate(t: NaiveDateTime, v: f64) -> Step<f64> {
        Step::new(t, Some(v), Unit::UnitsPerHour)
    }

    #[test]
    fn decouple_sorts_and_keeps_last_duplicate() {
        let d = Draft::reset(Unit::UnitsPerHour, None, at(0, 0), at(6, 0), false)
            .decouple(vec![rate(at(3, 0), 2.0), rate(at(1, 0), 1.0), rate(at(3, 0), 5.0)])
            .unwrap();
        assert_eq!(d.times(), &[at(1, 0), at(3, 0)]);
        assert_eq!(d.values(), &[Some(1.0), Some(5.0)]);
    }

    #[test]
    fn decouple_rejects_foreign_units() {
        let err = Draft::reset(Unit::UnitsPerHour, None, at(0, 0), at(6, 0), false)
            .decouple(vec![Step::new(at(1, 0), Some(1.0), Unit::Units)])
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AidError>(),
            Some(AidError::UnitMismatch { .. })
        ));
    }

    #[test]
    fn filter_keeps_one_record_before_start() {
        let d = Draft::reset(Unit::UnitsPerHour, None, at(2, 0), at(4, 0), false)
            .decouple(vec![
                rate(at(0, 0), 0.1),
                rate(at(1, 0), 0.2),
                rate(at(3, 0), 0.3),
                rate(at(5, 0), 0.5),
            ])
            .unwrap()
            .filter();
        assert_eq!(d.times(), &[at(1, 0), at(3, 0)]);
    }

    #[test]
    fn inject_closes_expired_steps_and_cancels_zero_durations() {
        let d = Draft::reset(Unit::UnitsPerHour, None, at(0, 0), at(6, 0), true)
            .decouple(vec![
                rate(at(1, 0), 2.0).with_duration(0.5),
                rate(at(2, 0), 3.0).with_duration(2.0),
                rate(at(3, 0), 0.0).with_duration(0.0),
            ])
            .unwrap()
            .inject();
        assert_eq!(
            d.times(),
            &[at(1, 0), at(1, 30), at(2, 0), at(3, 0)]
        );
        assert_eq!(d.values(), &[Some(2.0), None, Some(3.0), None]);
    }

    #[test]
    fn inject_closes_the_last_step() {
        let d = Draft::reset(Unit::UnitsPerHour, Some(0.0), at(0, 0), at(6, 0), true)
            .decouple(vec![rate(at(1, 0), 90.0).with_duration(1.0 / 45.0)])
            .unwrap()
            .inject();
        assert_eq!(d.times().len(), 2);
        assert_eq!(d.times()[1], at(1, 0) + TimeDelta::seconds(80));
        assert_eq!(d.values()[1], Some(0.0));
    }

    #[test]
    fn cut_carries_values_to_both_edges() {
        let d = Draft::reset(Unit::UnitsPerHour, None, at(2, 0), at(4, 0), false)
            .decouple(vec![rate(at(1, 0), 0.2), rate(at(3, 0), 0.3)])
            .unwrap()
            .filter()
            .cut();
        assert_eq!(d.times(), &[at(2, 0), at(3, 0), at(4, 0)]);
        assert_eq!(d.values(), &[Some(0.2), Some(0.3), Some(0.3)]);
    }

    #[test]
    fn cut_without_history_uses_zero() {
        let d = Draft::reset(Unit::UnitsPerHour, Some(0.0), at(2, 0), at(4, 0), false)
            .decouple(vec![rate(at(3, 0), 0.3)])
            .unwrap()
            .filter()
            .cut();
        assert_eq!(d.values(), &[Some(0.0), Some(0.3), Some(0.3)]);
    }

    #[test]
    fn fill_splices_filler_breakpoints_into_open_steps() {
        let basal = ProfileBuilder::new(Unit::UnitsPerHour, at(0, 0), at(6, 0))
            .build(vec![rate(at(0, 0), 1.0), rate(at(2, 0), 1.5), rate(at(5, 0), 0.8)])
            .unwrap();
        let tbr = ProfileBuilder::new(Unit::UnitsPerHour, at(0, 0), at(6, 0))
            .with_durations()
            .filler(&basal)
            .build(vec![rate(at(1, 0), 0.0).with_duration(0.5)])
            .unwrap();
        assert_eq!(
            tbr.times(),
            &[at(0, 0), at(1, 0), at(1, 30), at(2, 0), at(5, 0), at(6, 0)]
        );
        assert_eq!(tbr.values(), &[1.0, 0.0, 1.0, 1.5, 0.8, 0.8]);
    }

    #[test]
    fn unresolved_values_fail_as_empty_profile() {
        let err = ProfileBuilder::<f64>::new(Unit::UnitsPerHour, at(0, 0), at(6, 0))
            .build(Vec::new())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AidError>(),
            Some(AidError::EmptyProfile { .. })
        ));
    }

    #[test]
    fn zero_defined_profile_without_records_is_flat() {
        let p = ProfileBuilder::new(Unit::UnitsPerHour, at(0, 0), at(6, 0))
            .zero(Some(0.0))
            .with_durations()
            .build(Vec::new())
            .unwrap();
        assert_eq!(p.times(), &[at(0, 0), at(6, 0)]);
        assert_eq!(p.values(), &[0.0, 0.0]);
    }

    #[test]
    fn inverted_window_is_rejected() {
        let err = ProfileBuilder::<f64>::new(Unit::UnitsPerHour, at(6, 0), at(0, 0))
            .zero(Some(0.0))
            .build(Vec::new())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AidError>(),
            Some(AidError::Config(_))
        ));
    }

    #[test]
    fn filler_unit_must_match() {
        let isf = Profile::constant(
            2.0,
            at(0, 0),
            at(6, 0),
            Unit::GlucosePerUnit(crate::units::BgUnit::MmolL),
        )
        .unwrap();
        let err = ProfileBuilder::new(Unit::UnitsPerHour, at(0, 0), at(6, 0))
            .filler(&isf)
            .build(vec![rate(at(1, 0), 1.0)])
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AidError>(),
            Some(AidError::UnitMismatch { .. })
        ));
    }

    #[test]
    fn reference_defaults_to_window_end() {
        let p = ProfileBuilder::new(Unit::UnitsPerHour, at(0, 0), at(3, 0))
            .build(vec![rate(at(0, 0), 1.0)])
            .unwrap();
        assert_eq!(p.offsets(), &[-3.0, 0.0]);
        let p = ProfileBuilder::new(Unit::UnitsPerHour, at(0, 0), at(3, 0))
            .reference(at(0, 0))
            .build(vec![rate(at(0, 0), 1.0)])
            .unwrap();
        assert_eq!(p.offsets(), &[0.0, 3.0]);
    }
}
