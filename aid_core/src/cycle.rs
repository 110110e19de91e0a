//! One control cycle: profiles → net insulin → IOB → BG → dosing.
use crate::bg::{BgForecast, GlucoseHistory, GlucoseReading};
use crate::config::{BgCfg, DosingCfg, InsulinCfg, IobCfg, PumpSettings};
use crate::dosing::{
    BasalLimits, DosingInputs, DosingWarning, PumpAction, Recommendation, active_tbr, recommend,
};
use crate::error::{AidError, Result};
use crate::iob::IobPrediction;
use crate::net::NetInsulin;
use crate::records::{CarbRecord, DecodeCtx, Record};
use crate::schedule::{DailySchedule, TargetRange};
use crate::units::Unit;
use crate::util::checked_add_hours;
use aid_traits::CycleReporter;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Everything observed since the last cycle.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CycleInput {
    /// Cycle timestamp; taken from the clock when absent.
    #[serde(default)]
    pub now: Option<NaiveDateTime>,
    #[serde(default)]
    pub records: Vec<Record>,
    #[serde(default)]
    pub readings: Vec<GlucoseReading>,
    #[serde(default)]
    pub carbs: Vec<CarbRecord>,
}

/// Daily schedules consulted by the cycle.
#[derive(Debug, Clone)]
pub struct Schedules {
    pub basal: DailySchedule<f64>,
    pub isf: DailySchedule<f64>,
    pub csf: DailySchedule<f64>,
    pub targets: DailySchedule<TargetRange>,
}

impl Schedules {
    /// Check each schedule carries the unit the cycle expects.
    pub fn check_units(&self, bg: &BgCfg) -> Result<()> {
        let expected = [
            (self.basal.unit(), Unit::UnitsPerHour),
            (self.isf.unit(), Unit::GlucosePerUnit(bg.unit)),
            (self.csf.unit(), Unit::GramsPerUnit),
            (self.targets.unit(), Unit::Glucose(bg.unit)),
        ];
        for (found, expected) in expected {
            if found != expected {
                return Err(AidError::UnitMismatch {
                    expected: expected.to_string(),
                    found: found.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CycleCfg {
    pub pump: PumpSettings,
    pub insulin: InsulinCfg,
    pub iob: IobCfg,
    pub bg: BgCfg,
    pub dosing: DosingCfg,
}

/// Values worth logging or displaying after a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Diagnostics {
    pub bg: f64,
    pub isf: f64,
    pub csf: f64,
    pub iob: f64,
    pub basal: f64,
    pub max_daily_basal: f64,
    pub target_bg: f64,
    pub naive_bg: f64,
    pub eventual_bg: f64,
    pub expected_bg: f64,
    pub projected_bg: f64,
    pub delta_bg: f64,
    pub bgi: f64,
    pub expected_bgi: f64,
    pub delta_bgi: f64,
    pub dose: f64,
}

impl Diagnostics {
    #[must_use]
    pub const fn values(&self) -> [(&'static str, f64); 16] {
        [
            ("bg", self.bg),
            ("isf", self.isf),
            ("csf", self.csf),
            ("iob", self.iob),
            ("basal", self.basal),
            ("max_daily_basal", self.max_daily_basal),
            ("target_bg", self.target_bg),
            ("naive_bg", self.naive_bg),
            ("eventual_bg", self.eventual_bg),
            ("expected_bg", self.expected_bg),
            ("projected_bg", self.projected_bg),
            ("delta_bg", self.delta_bg),
            ("bgi", self.bgi),
            ("expected_bgi", self.expected_bgi),
            ("delta_bgi", self.delta_bgi),
            ("dose", self.dose),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleOutcome {
    pub now: NaiveDateTime,
    pub recommendation: Recommendation,
    pub action: PumpAction,
    pub warnings: Vec<DosingWarning>,
    pub iob_now: f64,
    pub diagnostics: Diagnostics,
}

/// Run one control cycle at `now`.
///
/// The IOB snapshot is reported as soon as it is known, so it is persisted
/// even when the BG stage later aborts the cycle. A failing reporter is
/// logged and does not abort the cycle.
pub fn run_cycle(
    input: &CycleInput,
    now: NaiveDateTime,
    schedules: &Schedules,
    cfg: &CycleCfg,
    reporter: &mut dyn CycleReporter,
) -> Result<CycleOutcome> {
    schedules.check_units(&cfg.bg)?;
    let dia = cfg.pump.dia_h;
    let curve = cfg.insulin.curve(dia)?;
    let (Some(past), Some(future)) = (checked_add_hours(now, -dia), checked_add_hours(now, dia))
    else {
        return Err(AidError::Config(format!("cycle time {now} out of range")).into());
    };
    tracing::debug!(%now, dia, curve = curve.name(), "cycle start");

    let basal = schedules.basal.profile(past, now)?;
    let ctx = DecodeCtx {
        bolus_rate_u_per_h: cfg.iob.bolus_rate_u_per_h,
    };
    let net = NetInsulin::build(&input.records, &basal, &ctx)?;
    let iob = IobPrediction::predict(&net.net, &curve, cfg.iob.step_min)?;
    if let Err(e) = reporter.iob_snapshot(now, iob.now()) {
        tracing::warn!(error = %e, "failed to report IOB snapshot");
    }

    let isf = schedules.isf.profile(now, future)?.normalized(now);
    let csf = schedules.csf.profile(now, future)?.normalized(now);
    let targets = schedules.targets.profile(now, future)?.normalized(now);

    let history = GlucoseHistory::new(&input.readings, cfg.bg.unit, now, cfg.bg.trend_window_min)?;
    let forecast = BgForecast::build(&history, &iob, &isf)?;

    let limits = BasalLimits::new(
        net.current_basal(),
        schedules.basal.max(),
        &cfg.pump,
        &cfg.dosing,
    );
    let inputs = DosingInputs {
        history: &history,
        iob: &iob,
        forecast: &forecast,
        isf: &isf,
        targets: &targets,
        curve: &curve,
    };
    let result = recommend(
        &inputs,
        &limits,
        &input.carbs,
        now,
        &cfg.pump,
        &cfg.bg,
        &cfg.dosing,
    )?;

    let active = active_tbr(&input.records, now);
    let action = PumpAction::plan(&result.recommendation, active.as_ref());
    let d = result.dose;
    let diagnostics = Diagnostics {
        bg: d.bg,
        isf: isf.first_value(),
        csf: csf.first_value(),
        iob: iob.now(),
        basal: limits.current_basal,
        max_daily_basal: limits.max_daily_basal,
        target_bg: d.target_bg,
        naive_bg: d.naive_bg,
        eventual_bg: d.eventual_bg,
        expected_bg: d.analysis.expected_bg,
        projected_bg: d.analysis.projected_bg,
        delta_bg: d.analysis.delta_bg,
        bgi: d.analysis.bgi,
        expected_bgi: d.analysis.expected_bgi,
        delta_bgi: d.analysis.delta_bgi,
        dose: d.dose,
    };
    reporter.diagnostics(now, &diagnostics.values());
    tracing::info!(
        recommendation = ?result.recommendation,
        action = ?action,
        warnings = result.warnings.len(),
        "cycle complete"
    );

    Ok(CycleOutcome {
        now,
        recommendation: result.recommendation,
        action,
        warnings: result.warnings,
        iob_now: iob.now(),
        diagnostics,
    })
}
