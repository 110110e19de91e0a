//! Dosing engine: dose → TBR → limits → snooze → recommendation.
//!
//! Warnings never abort a cycle. Each one is logged at `warn` level when it
//! is raised and returned alongside the (possibly clamped) recommendation.
use crate::bg::{self, BgAnalysis, BgForecast, GlucoseHistory};
use crate::config::{BgCfg, DosingCfg, PumpSettings};
use crate::error::Result;
use crate::idc::InsulinCurve;
use crate::iob::IobPrediction;
use crate::profile::Profile;
use crate::records::{CarbRecord, RateUnit, Record};
use crate::schedule::TargetRange;
use crate::util::{checked_add_hours, hours_between};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

/// Rates closer than this to the current basal are treated as equal (U/h).
pub const RATE_EPSILON: f64 = 1e-6;

/// Temporary basal to enact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TempBasal {
    pub rate: f64,
    pub units: RateUnit,
    pub duration_min: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum NoActionReason {
    /// Limited rate equals the scheduled basal.
    MatchesBasal,
    /// Carbs were logged inside the snooze window.
    Snoozed { remaining_min: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Recommendation {
    Tbr(TempBasal),
    NoAction(NoActionReason),
}

/// Command for the pump layer, given what is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum PumpAction {
    Set(TempBasal),
    /// No recommendation while a TBR is running.
    Cancel,
    Nothing,
}

impl PumpAction {
    #[must_use]
    pub const fn plan(rec: &Recommendation, active: Option<&TempBasal>) -> Self {
        match rec {
            Recommendation::Tbr(t) => Self::Set(*t),
            Recommendation::NoAction(_) if active.is_some() => Self::Cancel,
            Recommendation::NoAction(_) => Self::Nothing,
        }
    }
}

/// Conditions needing human attention.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum DosingWarning {
    /// BG falling yet expected above range, or rising yet expected below.
    TrendConflict { bgi: f64, eventual_bg: f64 },
    /// Computed rate was negative; carbs are needed.
    NegativeBasalRequired { rate: f64 },
    /// Computed rate exceeded the cap; the rest must be bolused manually.
    MaxBasalExceeded { requested: f64, cap: f64 },
    /// Correction dose is larger than the pump's max bolus.
    DoseAboveMaxBolus { dose: f64, max_bolus: f64 },
    /// Recent carbs suppressed the recommendation.
    Snoozed { remaining_min: u32 },
}

impl fmt::Display for DosingWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::TrendConflict { bgi, eventual_bg } => write!(
                f,
                "conflicting trend: BGI {bgi:.2}/h against eventual BG {eventual_bg:.1}"
            ),
            Self::NegativeBasalRequired { rate } => write!(
                f,
                "negative basal required ({rate:.2} U/h): eat something"
            ),
            Self::MaxBasalExceeded { requested, cap } => write!(
                f,
                "max basal exceeded ({requested:.2} > {cap:.2} U/h): enact dose manually"
            ),
            Self::DoseAboveMaxBolus { dose, max_bolus } => write!(
                f,
                "dose {dose:.2} U exceeds pump max bolus {max_bolus:.2} U"
            ),
            Self::Snoozed { remaining_min } => write!(
                f,
                "bolus snooze: looping resumes in {remaining_min} min"
            ),
        }
    }
}

fn raise(warnings: &mut Vec<DosingWarning>, w: DosingWarning) {
    tracing::warn!(warning = ?w, "{w}");
    warnings.push(w);
}

/// Read-only inputs of one dosing decision.
#[derive(Debug, Clone, Copy)]
pub struct DosingInputs<'a> {
    pub history: &'a GlucoseHistory,
    pub iob: &'a IobPrediction,
    pub forecast: &'a BgForecast,
    /// ISF over `[now, now + DIA]`.
    pub isf: &'a Profile<f64>,
    /// Target ranges over `[now, now + DIA]`.
    pub targets: &'a Profile<TargetRange>,
    pub curve: &'a InsulinCurve,
}

/// Intermediate values of `compute_dose`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DoseComputation {
    pub bg: f64,
    pub target_bg: f64,
    pub naive_bg: f64,
    pub eventual_bg: f64,
    /// target - eventual
    pub delta_target: f64,
    pub dose: f64,
    pub analysis: BgAnalysis,
}

/// Correction dose bringing the eventual BG back to the mean target at DIA.
pub fn compute_dose(
    inputs: &DosingInputs<'_>,
    pump: &PumpSettings,
    bg_cfg: &BgCfg,
    warnings: &mut Vec<DosingWarning>,
) -> Result<DoseComputation> {
    let bg = inputs.history.latest()?;
    let range = inputs.targets.last_value();
    let target_bg = range.mean();
    let naive_bg = inputs.forecast.expect(pump.dia_h)?;
    let analysis = bg::analyze(
        inputs.history,
        inputs.forecast,
        inputs.iob,
        inputs.isf,
        bg_cfg.analysis_horizon_h,
    )?;
    let eventual_bg = naive_bg + analysis.delta_bg;
    let delta_target = target_bg - eventual_bg;
    let dose = bg::dose(delta_target, inputs.isf, inputs.curve)?;

    tracing::info!(
        target_bg,
        bg,
        isf = inputs.isf.first_value(),
        iob = inputs.iob.now(),
        naive_bg,
        eventual_bg,
        in_range = range.contains(eventual_bg),
        delta_target,
        dose,
        "computed dose"
    );

    let bgi = analysis.bgi;
    if (bgi < 0.0 && eventual_bg > range.high) || (bgi > 0.0 && eventual_bg < range.low) {
        raise(warnings, DosingWarning::TrendConflict { bgi, eventual_bg });
    }
    if dose > pump.max_bolus_u {
        raise(
            warnings,
            DosingWarning::DoseAboveMaxBolus {
                dose,
                max_bolus: pump.max_bolus_u,
            },
        );
    }
    Ok(DoseComputation {
        bg,
        target_bg,
        naive_bg,
        eventual_bg,
        delta_target,
        dose,
        analysis,
    })
}

/// TBR delivering `dose` on top of `basal` over the enactment window, or a
/// full stop when `latest_bg` is below the hypo threshold.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn compute_tbr(
    dose: f64,
    basal: f64,
    latest_bg: f64,
    hypo_threshold: f64,
    cfg: &DosingCfg,
) -> TempBasal {
    let window = cfg.enactment_window_h;
    let delta = if latest_bg < hypo_threshold {
        tracing::info!(latest_bg, hypo_threshold, "BG below hypo threshold, stopping delivery");
        -basal
    } else {
        dose / window
    };
    let rate = basal + delta;
    tracing::info!(basal, delta, rate, window_h = window, "temporary basal");
    TempBasal {
        rate,
        units: RateUnit::UnitsPerHour,
        duration_min: (window * 60.0).round().max(0.0) as u32,
    }
}

/// Pump and scheduling limits applied to a TBR.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BasalLimits {
    pub current_basal: f64,
    pub max_daily_basal: f64,
    pub pump_max_basal: f64,
    pub basal_multiplier_cap: f64,
    pub max_daily_basal_multiplier_cap: f64,
}

impl BasalLimits {
    #[must_use]
    pub const fn new(
        current_basal: f64,
        max_daily_basal: f64,
        pump: &PumpSettings,
        cfg: &DosingCfg,
    ) -> Self {
        Self {
            current_basal,
            max_daily_basal,
            pump_max_basal: pump.max_basal_u_per_h,
            basal_multiplier_cap: cfg.basal_multiplier_cap,
            max_daily_basal_multiplier_cap: cfg.max_daily_basal_multiplier_cap,
        }
    }

    /// `min(k1 * basal, k2 * max daily basal, pump max)`.
    #[must_use]
    pub fn cap(&self) -> f64 {
        (self.basal_multiplier_cap * self.current_basal)
            .min(self.max_daily_basal_multiplier_cap * self.max_daily_basal)
            .min(self.pump_max_basal)
    }
}

/// Clamp negative rates to zero and positive rates to `limits.cap()`.
#[must_use]
pub fn limit_tbr(
    tbr: TempBasal,
    limits: &BasalLimits,
    warnings: &mut Vec<DosingWarning>,
) -> TempBasal {
    let mut out = tbr;
    if tbr.rate < 0.0 {
        raise(warnings, DosingWarning::NegativeBasalRequired { rate: tbr.rate });
        out.rate = 0.0;
    } else if tbr.rate > 0.0 {
        let cap = limits.cap();
        if tbr.rate > cap {
            raise(
                warnings,
                DosingWarning::MaxBasalExceeded {
                    requested: tbr.rate,
                    cap,
                },
            );
            out.rate = cap;
        }
    }
    out
}

/// Minutes left in the snooze window opened by the most recent carbs, if
/// any. Carbs logged after `now` are ignored.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn snooze(now: NaiveDateTime, carbs: &[CarbRecord], window_h: f64) -> Option<u32> {
    let last = carbs.iter().map(|c| c.time).filter(|&t| t <= now).max()?;
    let elapsed = hours_between(last, now);
    (elapsed < window_h).then(|| ((window_h - elapsed) * 60.0).round() as u32)
}

/// TBR currently running according to the records, with its remaining
/// duration.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn active_tbr(records: &[Record], now: NaiveDateTime) -> Option<TempBasal> {
    let last = records
        .iter()
        .filter_map(|r| match r {
            Record::Tbr(t) if t.time <= now => Some(*t),
            _ => None,
        })
        .max_by_key(|t| t.time)?;
    if last.duration_min.is_nan() || last.duration_min <= 0.0 {
        return None;
    }
    let ends = checked_add_hours(last.time, last.duration_min / 60.0)?;
    if ends <= now {
        return None;
    }
    Some(TempBasal {
        rate: last.rate,
        units: last.units,
        duration_min: (hours_between(now, ends) * 60.0).round() as u32,
    })
}

/// Everything the dosing engine produced in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DosingResult {
    pub recommendation: Recommendation,
    pub dose: DoseComputation,
    pub warnings: Vec<DosingWarning>,
}

/// Run dose → TBR → limits → snooze and emit the recommendation.
pub fn recommend(
    inputs: &DosingInputs<'_>,
    limits: &BasalLimits,
    carbs: &[CarbRecord],
    now: NaiveDateTime,
    pump: &PumpSettings,
    bg_cfg: &BgCfg,
    cfg: &DosingCfg,
) -> Result<DosingResult> {
    let mut warnings = Vec::new();
    let dose = compute_dose(inputs, pump, bg_cfg, &mut warnings)?;
    let hypo = cfg.hypo_threshold(bg_cfg.unit);
    let tbr = compute_tbr(dose.dose, limits.current_basal, dose.bg, hypo, cfg);
    let tbr = limit_tbr(tbr, limits, &mut warnings);

    let recommendation = if let Some(remaining_min) =
        snooze(now, carbs, cfg.snooze_factor * pump.dia_h)
    {
        raise(&mut warnings, DosingWarning::Snoozed { remaining_min });
        Recommendation::NoAction(NoActionReason::Snoozed { remaining_min })
    } else if (tbr.rate - limits.current_basal).abs() < RATE_EPSILON {
        tracing::info!("no modification to insulin dosage necessary");
        Recommendation::NoAction(NoActionReason::MatchesBasal)
    } else {
        tracing::info!(
            rate = tbr.rate,
            units = tbr.units.as_str(),
            duration_min = tbr.duration_min,
            "recommended TBR"
        );
        Recommendation::Tbr(tbr)
    };
    Ok(DosingResult {
        recommendation,
        dose,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::TbrRecord;
    use chrono::{NaiveDate, TimeDelta};
    use rstest::rstest;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn limits(basal: f64, max_daily: f64, pump_max: f64) -> BasalLimits {
        BasalLimits::new(
            basal,
            max_daily,
            &PumpSettings {
                max_basal_u_per_h: pump_max,
                ..PumpSettings::default()
            },
            &DosingCfg::default(),
        )
    }

    fn tbr(rate: f64) -> TempBasal {
        TempBasal {
            rate,
            units: RateUnit::UnitsPerHour,
            duration_min: 30,
        }
    }

    #[test]
    fn tbr_spreads_dose_over_window() {
        let t = compute_tbr(0.5, 1.0, 8.0, 4.2, &DosingCfg::default());
        assert!((t.rate - 2.0).abs() < 1e-12);
        assert_eq!(t.duration_min, 30);
    }

    #[test]
    fn hypo_overrides_any_dose() {
        for dose in [-3.0, 0.0, 0.4, 12.0] {
            let t = compute_tbr(dose, 1.3, 4.0, 4.2, &DosingCfg::default());
            assert_eq!(t.rate, 0.0);
        }
    }

    #[test]
    fn negative_rate_clamps_to_zero_with_warning() {
        let mut w = Vec::new();
        let out = limit_tbr(tbr(-0.7), &limits(1.0, 1.2, 3.0), &mut w);
        assert_eq!(out.rate, 0.0);
        assert!(matches!(w[..], [DosingWarning::NegativeBasalRequired { .. }]));
    }

    #[test]
    fn cap_picks_smallest_limit() {
        assert_eq!(limits(1.0, 1.2, 3.0).cap(), 3.0);
        assert_eq!(limits(0.5, 1.2, 3.0).cap(), 2.0);
        assert!((limits(1.0, 0.5, 3.0).cap() - 1.5).abs() < 1e-12);
        assert_eq!(limits(1.0, 1.2, 2.5).cap(), 2.5);
    }

    #[test]
    fn zero_rate_passes_through() {
        let mut w = Vec::new();
        assert_eq!(limit_tbr(tbr(0.0), &limits(1.0, 1.0, 3.0), &mut w).rate, 0.0);
        assert!(w.is_empty());
    }

    #[test]
    fn snooze_window() {
        let carbs = [CarbRecord {
            time: now() - TimeDelta::minutes(30),
            grams: 40.0,
        }];
        assert_eq!(snooze(now(), &carbs, 1.5), Some(60));
        assert_eq!(snooze(now(), &carbs, 0.5), None);
        assert_eq!(snooze(now(), &[], 1.5), None);
        let future = [CarbRecord {
            time: now() + TimeDelta::minutes(5),
            grams: 10.0,
        }];
        assert_eq!(snooze(now(), &future, 1.5), None);
    }

    #[test]
    fn active_tbr_reports_remaining_time() {
        let recs = [Record::Tbr(TbrRecord {
            time: now() - TimeDelta::minutes(10),
            rate: 0.4,
            units: RateUnit::UnitsPerHour,
            duration_min: 30.0,
        })];
        let a = active_tbr(&recs, now()).unwrap();
        assert_eq!(a.duration_min, 20);
        assert_eq!(a.rate, 0.4);
        assert!(active_tbr(&recs, now() + TimeDelta::minutes(25)).is_none());
    }

    #[rstest]
    #[case(-1e20)]
    #[case(f64::NAN)]
    #[case(1e20)]
    fn unusable_tbr_durations_are_not_running(#[case] duration_min: f64) {
        let recs = [Record::Tbr(TbrRecord {
            time: now() - TimeDelta::minutes(10),
            rate: 0.4,
            units: RateUnit::UnitsPerHour,
            duration_min,
        })];
        assert!(active_tbr(&recs, now()).is_none());
    }

    #[test]
    fn pump_action_planning() {
        let none = Recommendation::NoAction(NoActionReason::MatchesBasal);
        assert_eq!(PumpAction::plan(&none, None), PumpAction::Nothing);
        assert_eq!(PumpAction::plan(&none, Some(&tbr(0.4))), PumpAction::Cancel);
        let set = Recommendation::Tbr(tbr(1.5));
        assert_eq!(PumpAction::plan(&set, Some(&tbr(0.4))), PumpAction::Set(tbr(1.5)));
    }

    #[test]
    fn warnings_render() {
        let w = DosingWarning::MaxBasalExceeded {
            requested: 5.0,
            cap: 3.0,
        };
        assert!(w.to_string().contains("enact dose manually"));
    }
}
