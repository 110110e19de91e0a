//! Repeating daily schedules (basal, ISF, CSF, BG targets).
use crate::error::{AidError, Result};
use crate::profile::{Profile, ProfileBuilder, Step};
use crate::units::Unit;
use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// BG target range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetRange {
    pub low: f64,
    pub high: f64,
}

impl TargetRange {
    pub fn new(low: f64, high: f64) -> Result<Self> {
        if !(low.is_finite() && high.is_finite()) || low > high {
            return Err(AidError::Config(format!(
                "target range [{low}, {high}] must satisfy low <= high"
            ))
            .into());
        }
        Ok(Self { low, high })
    }

    #[must_use]
    pub fn mean(&self) -> f64 {
        (self.low + self.high) / 2.0
    }

    #[must_use]
    pub fn contains(&self, bg: f64) -> bool {
        (self.low..=self.high).contains(&bg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleEntry<V> {
    pub start: NaiveTime,
    pub value: V,
}

/// Step schedule repeating every day. Entry `i` holds from its start time
/// until the next entry; the last entry wraps past midnight to the first.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySchedule<V> {
    entries: Vec<ScheduleEntry<V>>,
    unit: Unit,
}

impl<V: Copy + PartialEq + Debug> DailySchedule<V> {
    pub fn new(entries: Vec<(NaiveTime, V)>, unit: Unit) -> Result<Self> {
        if entries.is_empty() {
            return Err(AidError::Config(format!("{unit} schedule has no entries")).into());
        }
        if entries.windows(2).any(|w| w[0].0 >= w[1].0) {
            return Err(AidError::Config(format!(
                "{unit} schedule times must be strictly increasing"
            ))
            .into());
        }
        Ok(Self {
            entries: entries
                .into_iter()
                .map(|(start, value)| ScheduleEntry { start, value })
                .collect(),
            unit,
        })
    }

    #[must_use]
    pub fn entries(&self) -> &[ScheduleEntry<V>] {
        &self.entries
    }

    #[must_use]
    pub const fn unit(&self) -> Unit {
        self.unit
    }

    /// Value in force at time of day `t`.
    #[must_use]
    pub fn value_at(&self, t: NaiveTime) -> V {
        let idx = self.entries.partition_point(|e| e.start <= t);
        if idx == 0 {
            self.entries[self.entries.len() - 1].value
        } else {
            self.entries[idx - 1].value
        }
    }

    /// Dated steps covering `[start, end]`, led by the entry in force at
    /// `start`.
    #[must_use]
    pub fn expand(&self, start: NaiveDateTime, end: NaiveDateTime) -> Vec<Step<V>> {
        let mut steps = vec![Step::new(start, Some(self.value_at(start.time())), self.unit)];
        let mut day = Some(start.date());
        while let Some(d) = day {
            if d > end.date() {
                break;
            }
            for e in &self.entries {
                let t = d.and_time(e.start);
                if t > start && t <= end {
                    steps.push(Step::new(t, Some(e.value), self.unit));
                }
            }
            day = d.succ_opt();
        }
        steps
    }

    /// Schedule as a built profile over `[start, end]`, normalized to `end`.
    pub fn profile(&self, start: NaiveDateTime, end: NaiveDateTime) -> Result<Profile<V>> {
        ProfileBuilder::new(self.unit, start, end).build(self.expand(start, end))
    }
}

impl DailySchedule<f64> {
    /// Largest value over the day (max daily basal).
    #[must_use]
    pub fn max(&self) -> f64 {
        self.entries
            .iter()
            .map(|e| e.value)
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::BgUnit;
    use chrono::NaiveDate;

    fn tod(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn on(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn basal() -> DailySchedule<f64> {
        DailySchedule::new(
            vec![(tod(0, 0), 0.8), (tod(6, 0), 1.2), (tod(22, 0), 0.9)],
            Unit::UnitsPerHour,
        )
        .unwrap()
    }

    #[test]
    fn value_at_wraps_before_first_entry() {
        let s = DailySchedule::new(
            vec![(tod(6, 0), 1.2), (tod(22, 0), 0.9)],
            Unit::UnitsPerHour,
        )
        .unwrap();
        assert_eq!(s.value_at(tod(3, 0)), 0.9);
        assert_eq!(s.value_at(tod(6, 0)), 1.2);
        assert_eq!(s.value_at(tod(23, 59)), 0.9);
    }

    #[test]
    fn expand_crosses_midnight() {
        let steps = basal().expand(on(1, 21, 0), on(2, 7, 0));
        let times: Vec<_> = steps.iter().map(|s| s.time).collect();
        assert_eq!(
            times,
            vec![on(1, 21, 0), on(1, 22, 0), on(2, 0, 0), on(2, 6, 0)]
        );
        assert_eq!(steps[0].value, Some(1.2));
    }

    #[test]
    fn profile_covers_window() {
        let p = basal().profile(on(1, 3, 0), on(1, 9, 0)).unwrap();
        assert_eq!(p.start(), on(1, 3, 0));
        assert_eq!(p.end(), on(1, 9, 0));
        assert_eq!(p.values(), &[0.8, 1.2, 1.2]);
        assert_eq!(p.value_at(on(1, 8, 0)), 1.2);
    }

    #[test]
    fn max_daily_value() {
        assert!((basal().max() - 1.2).abs() < 1e-12);
    }

    #[test]
    fn rejects_unordered_entries() {
        assert!(
            DailySchedule::new(vec![(tod(6, 0), 1.0), (tod(6, 0), 1.1)], Unit::UnitsPerHour)
                .is_err()
        );
        assert!(DailySchedule::<f64>::new(Vec::new(), Unit::UnitsPerHour).is_err());
    }

    #[test]
    fn target_ranges() {
        let r = TargetRange::new(5.0, 7.0).unwrap();
        assert!((r.mean() - 6.0).abs() < 1e-12);
        assert!(r.contains(5.0) && r.contains(7.0) && !r.contains(7.1));
        assert!(TargetRange::new(7.0, 5.0).is_err());

        let targets = DailySchedule::new(
            vec![(tod(0, 0), r), (tod(12, 0), TargetRange::new(4.5, 6.5).unwrap())],
            Unit::Glucose(BgUnit::MmolL),
        )
        .unwrap();
        let p = targets.profile(on(1, 10, 0), on(1, 14, 0)).unwrap();
        assert_eq!(p.last_value().low, 4.5);
    }
}
