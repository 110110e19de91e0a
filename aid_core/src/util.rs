//! Time-axis helpers shared by the profile, IOB and BG modules.
use chrono::{NaiveDateTime, TimeDelta};

/// Milliseconds in one hour.
pub const MILLIS_PER_HOUR: f64 = 3_600_000.0;

// Well inside both `TimeDelta` and `i64` range.
const MAX_SPAN_MS: f64 = 1e17;

/// Signed elapsed time from `from` to `to`, in hours.
#[inline]
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn hours_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_milliseconds() as f64 / MILLIS_PER_HOUR
}

/// Convert fractional hours to a `TimeDelta`, rounded to the millisecond.
/// `None` for non-finite or out-of-range spans.
#[inline]
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn try_from_hours(h: f64) -> Option<TimeDelta> {
    let ms = (h * MILLIS_PER_HOUR).round();
    if !ms.is_finite() || ms.abs() >= MAX_SPAN_MS {
        return None;
    }
    TimeDelta::try_milliseconds(ms as i64)
}

/// `t + h` hours, `None` on overflow.
#[inline]
#[must_use]
pub fn checked_add_hours(t: NaiveDateTime, h: f64) -> Option<NaiveDateTime> {
    t.checked_add_signed(try_from_hours(h)?)
}

/// Convert whole minutes to a `TimeDelta`.
#[inline]
#[must_use]
pub fn from_minutes(m: u32) -> TimeDelta {
    TimeDelta::minutes(i64::from(m))
}

/// Number of grid steps of `step_h` that fit in `span_h`, if `span_h` is a
/// whole multiple within `tol`.
#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
#[must_use]
pub fn grid_index(span_h: f64, step_h: f64, tol: f64) -> Option<usize> {
    if step_h.is_nan() || step_h <= 0.0 || !span_h.is_finite() || span_h < -tol {
        return None;
    }
    let k = span_h / step_h;
    let r = k.round();
    ((k - r).abs() <= tol).then_some(r.max(0.0) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn hours_are_signed() {
        assert!((hours_between(at(10, 0), at(11, 30)) - 1.5).abs() < 1e-12);
        assert!((hours_between(at(11, 30), at(10, 0)) + 1.5).abs() < 1e-12);
    }

    #[test]
    fn hours_round_trip_minutes() {
        assert_eq!(try_from_hours(0.5), Some(TimeDelta::minutes(30)));
        assert_eq!(try_from_hours(5.0 / 60.0), Some(TimeDelta::minutes(5)));
    }

    #[test]
    fn checked_spans_reject_overflow() {
        assert_eq!(try_from_hours(1.0), Some(TimeDelta::hours(1)));
        assert_eq!(try_from_hours(f64::NAN), None);
        assert_eq!(try_from_hours(1e20), None);
        assert_eq!(try_from_hours(-1e20), None);
        assert_eq!(checked_add_hours(at(10, 0), -0.5), Some(at(9, 30)));
        assert_eq!(checked_add_hours(NaiveDateTime::MAX, 1.0), None);
    }

    #[test]
    fn grid_index_alignment() {
        let step = 5.0 / 60.0;
        assert_eq!(grid_index(0.5, step, 1e-6), Some(6));
        assert_eq!(grid_index(0.0, step, 1e-6), Some(0));
        assert_eq!(grid_index(0.3, step, 1e-6), None);
        assert_eq!(grid_index(-0.5, step, 1e-6), None);
        assert_eq!(grid_index(1.0, 0.0, 1e-6), None);
    }
}
