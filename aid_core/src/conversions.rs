//! `From` implementations bridging `aid_config` types to `aid_core` types.

use crate::config::{BgCfg, CurveChoice, DosingCfg, InsulinCfg, IobCfg, PumpSettings};
use crate::cycle::{CycleCfg, Schedules};
use crate::error::{AidError, Result};
use crate::schedule::{DailySchedule, TargetRange};
use crate::units::{BgUnit, Unit};

// ── PumpSettings ─────────────────────────────────────────────────────────────

impl From<&aid_config::Pump> for PumpSettings {
    fn from(c: &aid_config::Pump) -> Self {
        Self {
            dia_h: c.dia_h,
            max_basal_u_per_h: c.max_basal_u_per_h,
            max_bolus_u: c.max_bolus_u,
        }
    }
}

// ── InsulinCfg ───────────────────────────────────────────────────────────────

impl From<&aid_config::Insulin> for InsulinCfg {
    fn from(c: &aid_config::Insulin) -> Self {
        let curve = match c.curve {
            aid_config::CurveKind::Walsh => CurveChoice::Walsh,
            aid_config::CurveKind::Exponential => CurveChoice::Exponential {
                peak_h: c.peak_min.unwrap_or(crate::idc::RAPID_ACTING_PEAK_H * 60.0) / 60.0,
            },
        };
        Self { curve }
    }
}

// ── IobCfg ───────────────────────────────────────────────────────────────────

impl From<&aid_config::Iob> for IobCfg {
    fn from(c: &aid_config::Iob) -> Self {
        Self {
            step_min: c.step_min,
            bolus_rate_u_per_h: c.bolus_rate_u_per_h,
        }
    }
}

// ── BgCfg ────────────────────────────────────────────────────────────────────

impl From<aid_config::GlucoseUnit> for BgUnit {
    fn from(u: aid_config::GlucoseUnit) -> Self {
        match u {
            aid_config::GlucoseUnit::MmolL => Self::MmolL,
            aid_config::GlucoseUnit::MgDl => Self::MgDl,
        }
    }
}

impl From<&aid_config::Bg> for BgCfg {
    fn from(c: &aid_config::Bg) -> Self {
        Self {
            unit: c.unit.into(),
            trend_window_min: c.trend_window_min,
            analysis_horizon_h: c.analysis_horizon_h,
        }
    }
}

// ── DosingCfg ────────────────────────────────────────────────────────────────

impl From<&aid_config::Dosing> for DosingCfg {
    fn from(c: &aid_config::Dosing) -> Self {
        Self {
            enactment_window_h: c.enactment_window_h,
            hypo_threshold_mmol: c.hypo_threshold_mmol,
            snooze_factor: c.snooze_factor,
            basal_multiplier_cap: c.basal_multiplier_cap,
            max_daily_basal_multiplier_cap: c.max_daily_basal_multiplier_cap,
        }
    }
}

// ── CycleCfg ─────────────────────────────────────────────────────────────────

impl From<&aid_config::Config> for CycleCfg {
    fn from(c: &aid_config::Config) -> Self {
        Self {
            pump: (&c.pump).into(),
            insulin: (&c.insulin).into(),
            iob: (&c.iob).into(),
            bg: (&c.bg).into(),
            dosing: (&c.dosing).into(),
        }
    }
}

// ── Schedules ────────────────────────────────────────────────────────────────

fn times(name: &str, rows: &[aid_config::ScheduleRow]) -> Result<Vec<chrono::NaiveTime>> {
    if rows.is_empty() {
        return Err(AidError::Config(format!("schedules.{name} has no entries")).into());
    }
    rows.iter()
        .map(|r| {
            r.time_of_day()
                .map_err(|e| AidError::Config(format!("schedules.{name}: {e}")).into())
        })
        .collect()
}

/// Daily value schedule from config rows.
pub fn value_schedule(
    name: &str,
    rows: &[aid_config::ScheduleRow],
    unit: Unit,
) -> Result<DailySchedule<f64>> {
    let ts = times(name, rows)?;
    DailySchedule::new(ts.into_iter().zip(rows.iter().map(|r| r.value)).collect(), unit)
}

/// Daily target-range schedule from config rows (`value` = low, `high` = high).
pub fn target_schedule(
    rows: &[aid_config::ScheduleRow],
    unit: BgUnit,
) -> Result<DailySchedule<TargetRange>> {
    let ts = times("targets", rows)?;
    let mut entries = Vec::with_capacity(rows.len());
    for (t, r) in ts.into_iter().zip(rows) {
        let high = r.high.ok_or_else(|| {
            AidError::Config(format!("schedules.targets entry {} has no 'high'", r.time))
        })?;
        entries.push((t, TargetRange::new(r.value, high)?));
    }
    DailySchedule::new(entries, Unit::Glucose(unit))
}

impl Schedules {
    /// Build all four schedules from their config rows.
    pub fn from_rows(
        basal: &[aid_config::ScheduleRow],
        isf: &[aid_config::ScheduleRow],
        csf: &[aid_config::ScheduleRow],
        targets: &[aid_config::ScheduleRow],
        unit: BgUnit,
    ) -> Result<Self> {
        Ok(Self {
            basal: value_schedule("basal", basal, Unit::UnitsPerHour)?,
            isf: value_schedule("isf", isf, Unit::GlucosePerUnit(unit))?,
            csf: value_schedule("csf", csf, Unit::GramsPerUnit)?,
            targets: target_schedule(targets, unit)?,
        })
    }
}

impl TryFrom<(&aid_config::Schedules, BgUnit)> for Schedules {
    type Error = eyre::Report;

    fn try_from((s, unit): (&aid_config::Schedules, BgUnit)) -> Result<Self> {
        Self::from_rows(&s.basal, &s.isf, &s.csf, &s.targets, unit)
    }
}
