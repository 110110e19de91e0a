#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and schedule parsing for the insulin-delivery calculator.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Schedule CSV loader enforces headers and time ordering before the rows
//!   are handed to the core as daily step schedules.
use chrono::NaiveTime;
use serde::Deserialize;

/// One step of a repeating daily schedule.
///
/// CSV headers:
/// time,value[,high]
///
/// Example (BG targets):
/// time,value,high
/// 00:00,5.0,6.5
/// 07:00,4.5,6.0
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ScheduleRow {
    /// Time of day, `HH:MM` or `HH:MM:SS`.
    pub time: String,
    pub value: f64,
    /// Upper bound; only meaningful for target-range schedules.
    #[serde(default)]
    pub high: Option<f64>,
}

impl ScheduleRow {
    pub fn time_of_day(&self) -> eyre::Result<NaiveTime> {
        parse_time_of_day(&self.time)
    }
}

/// Parse `HH:MM` or `HH:MM:SS`.
pub fn parse_time_of_day(s: &str) -> eyre::Result<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|e| eyre::eyre!("invalid time of day {s:?}: {e}"))
}

#[derive(Debug, Deserialize)]
pub struct Pump {
    /// Duration of insulin action (h)
    pub dia_h: f64,
    /// Pump-enforced max basal rate (U/h)
    pub max_basal_u_per_h: f64,
    /// Pump-enforced max bolus (U)
    pub max_bolus_u: f64,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CurveKind {
    /// Published 4th-order polynomial curves (DIA of 3, 4, 5 or 6 h)
    #[default]
    Walsh,
    /// Exponential activity model parametrized by DIA and peak time
    Exponential,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Insulin {
    pub curve: CurveKind,
    /// Activity peak in minutes (exponential curve only)
    pub peak_min: Option<f64>,
}

impl Default for Insulin {
    fn default() -> Self {
        Self {
            curve: CurveKind::Walsh,
            peak_min: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Iob {
    /// Prediction grid step (min)
    pub step_min: u32,
    /// Rate at which a bolus is assumed to be delivered (U/h)
    pub bolus_rate_u_per_h: f64,
}

impl Default for Iob {
    fn default() -> Self {
        Self {
            step_min: 5,
            bolus_rate_u_per_h: 90.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub enum GlucoseUnit {
    #[serde(rename = "mmol/L")]
    #[default]
    MmolL,
    #[serde(rename = "mg/dL")]
    MgDl,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Bg {
    pub unit: GlucoseUnit,
    /// Readings younger than this feed the trend fit (min)
    pub trend_window_min: u32,
    /// Horizon for projected vs expected BG comparison (h)
    pub analysis_horizon_h: f64,
}

impl Default for Bg {
    fn default() -> Self {
        Self {
            unit: GlucoseUnit::MmolL,
            trend_window_min: 30,
            analysis_horizon_h: 0.5,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Dosing {
    /// Window over which a correction dose is spread as a TBR (h)
    pub enactment_window_h: f64,
    /// Below this BG every TBR becomes a full stop (mmol/L; converted for mg/dL)
    pub hypo_threshold_mmol: f64,
    /// Snooze window after carbs, as a fraction of DIA
    pub snooze_factor: f64,
    /// TBR cap as a multiple of the current basal
    pub basal_multiplier_cap: f64,
    /// TBR cap as a multiple of the max daily basal
    pub max_daily_basal_multiplier_cap: f64,
}

impl Default for Dosing {
    fn default() -> Self {
        Self {
            enactment_window_h: 0.5,
            hypo_threshold_mmol: 4.2,
            snooze_factor: 0.5,
            basal_multiplier_cap: 4.0,
            max_daily_basal_multiplier_cap: 3.0,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Schedules {
    /// Basal rates (U/h)
    pub basal: Vec<ScheduleRow>,
    /// Insulin sensitivity (BG unit per U)
    pub isf: Vec<ScheduleRow>,
    /// Carb sensitivity (g per U)
    pub csf: Vec<ScheduleRow>,
    /// BG target ranges (`value` = low, `high` = high)
    pub targets: Vec<ScheduleRow>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub pump: Pump,
    #[serde(default)]
    pub insulin: Insulin,
    #[serde(default)]
    pub iob: Iob,
    #[serde(default)]
    pub bg: Bg,
    #[serde(default)]
    pub dosing: Dosing,
    #[serde(default)]
    pub schedules: Schedules,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Load a daily schedule from a CSV file with a `time,value` or
/// `time,value,high` header.
pub fn load_schedule_csv(path: &std::path::Path) -> eyre::Result<Vec<ScheduleRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open schedule CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != ["time", "value"] && actual != ["time", "value", "high"] {
        eyre::bail!(
            "schedule CSV must have headers 'time,value' or 'time,value,high', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<ScheduleRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }
    validate_schedule("csv", &rows, false)?;
    Ok(rows)
}

/// Check that a schedule is non-empty, strictly increasing in time of day,
/// finite, and (for ranges) carries a `high >= value` on every row.
pub fn validate_schedule(name: &str, rows: &[ScheduleRow], ranged: bool) -> eyre::Result<()> {
    if rows.is_empty() {
        eyre::bail!("schedules.{name} must have at least one entry");
    }
    let mut prev: Option<NaiveTime> = None;
    for (i, row) in rows.iter().enumerate() {
        let t = row
            .time_of_day()
            .map_err(|e| eyre::eyre!("schedules.{name}[{i}]: {e}"))?;
        if prev.is_some_and(|p| t <= p) {
            eyre::bail!("schedules.{name} times must be strictly increasing (entry {i})");
        }
        prev = Some(t);
        if !row.value.is_finite() || row.value < 0.0 {
            eyre::bail!("schedules.{name}[{i}].value must be finite and >= 0");
        }
        if ranged {
            match row.high {
                Some(h) if h.is_finite() && h >= row.value => {}
                Some(_) => eyre::bail!("schedules.{name}[{i}].high must be >= value"),
                None => eyre::bail!("schedules.{name}[{i}] is missing 'high'"),
            }
        }
    }
    Ok(())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Pump
        if !(self.pump.dia_h > 0.0 && self.pump.dia_h <= 24.0) {
            eyre::bail!("pump.dia_h must be in (0, 24]");
        }
        if !(self.pump.max_basal_u_per_h > 0.0 && self.pump.max_basal_u_per_h.is_finite()) {
            eyre::bail!("pump.max_basal_u_per_h must be > 0");
        }
        if !(self.pump.max_bolus_u > 0.0 && self.pump.max_bolus_u.is_finite()) {
            eyre::bail!("pump.max_bolus_u must be > 0");
        }

        // Insulin
        match self.insulin.curve {
            CurveKind::Walsh => {
                let d = self.pump.dia_h;
                if (d - d.round()).abs() > 1e-9 || !(3.0..=6.0).contains(&d) {
                    eyre::bail!("insulin.curve = \"walsh\" requires pump.dia_h of 3, 4, 5 or 6");
                }
            }
            CurveKind::Exponential => {
                let Some(peak) = self.insulin.peak_min else {
                    eyre::bail!("insulin.peak_min is required for the exponential curve");
                };
                if !(peak > 0.0 && peak < self.pump.dia_h * 60.0 / 2.0) {
                    eyre::bail!("insulin.peak_min must be in (0, dia/2)");
                }
            }
        }

        // IOB
        if self.iob.step_min == 0 || self.iob.step_min > 60 {
            eyre::bail!("iob.step_min must be in [1, 60]");
        }
        if !(self.iob.bolus_rate_u_per_h > 0.0 && self.iob.bolus_rate_u_per_h.is_finite()) {
            eyre::bail!("iob.bolus_rate_u_per_h must be > 0");
        }

        // BG
        if self.bg.trend_window_min == 0 {
            eyre::bail!("bg.trend_window_min must be >= 1");
        }
        let horizon_min = self.bg.analysis_horizon_h * 60.0;
        let steps = horizon_min / f64::from(self.iob.step_min);
        if !(self.bg.analysis_horizon_h > 0.0 && self.bg.analysis_horizon_h <= self.pump.dia_h) {
            eyre::bail!("bg.analysis_horizon_h must be in (0, dia]");
        }
        if (steps - steps.round()).abs() > 1e-6 {
            eyre::bail!("bg.analysis_horizon_h must be a multiple of iob.step_min");
        }
        let dia_steps = self.pump.dia_h * 60.0 / f64::from(self.iob.step_min);
        if (dia_steps - dia_steps.round()).abs() > 1e-6 {
            eyre::bail!("pump.dia_h must be a multiple of iob.step_min");
        }

        // Dosing
        if !(self.dosing.enactment_window_h > 0.0 && self.dosing.enactment_window_h <= 24.0) {
            eyre::bail!("dosing.enactment_window_h must be in (0, 24]");
        }
        if !(self.dosing.hypo_threshold_mmol >= 0.0 && self.dosing.hypo_threshold_mmol < 20.0) {
            eyre::bail!("dosing.hypo_threshold_mmol must be in [0, 20)");
        }
        if !(0.0..=1.0).contains(&self.dosing.snooze_factor) {
            eyre::bail!("dosing.snooze_factor must be in [0.0, 1.0]");
        }
        if self.dosing.basal_multiplier_cap <= 0.0 {
            eyre::bail!("dosing.basal_multiplier_cap must be > 0");
        }
        if self.dosing.max_daily_basal_multiplier_cap <= 0.0 {
            eyre::bail!("dosing.max_daily_basal_multiplier_cap must be > 0");
        }

        // Schedules (optional inline; an empty list means "provided elsewhere")
        for (name, rows, ranged) in [
            ("basal", &self.schedules.basal, false),
            ("isf", &self.schedules.isf, false),
            ("csf", &self.schedules.csf, false),
            ("targets", &self.schedules.targets, true),
        ] {
            if !rows.is_empty() {
                validate_schedule(name, rows, ranged)?;
            }
        }
        if self.schedules.isf.iter().any(|r| r.value <= 0.0) {
            eyre::bail!("schedules.isf values must be > 0");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref() {
            if !matches!(rot, "never" | "daily" | "hourly") {
                eyre::bail!("logging.rotation must be one of never|daily|hourly");
            }
        }

        Ok(())
    }
}
