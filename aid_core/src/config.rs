//! Runtime configuration for the decision core.
//!
//! These are separate from the TOML-deserialized config in `aid_config`;
//! `conversions` bridges the two.
use crate::error::Result;
use crate::idc::InsulinCurve;
use crate::units::BgUnit;

/// Pump limits and insulin action duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PumpSettings {
    /// Duration of insulin action (h).
    pub dia_h: f64,
    /// Pump-enforced maximum basal rate (U/h).
    pub max_basal_u_per_h: f64,
    /// Pump-enforced maximum bolus (U). Larger corrections only raise a warning.
    pub max_bolus_u: f64,
}

impl Default for PumpSettings {
    fn default() -> Self {
        Self {
            dia_h: 3.0,
            max_basal_u_per_h: 3.0,
            max_bolus_u: 10.0,
        }
    }
}

/// Which decay curve family to use.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum CurveChoice {
    #[default]
    Walsh,
    /// Exponential model with the given activity peak (h).
    Exponential { peak_h: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InsulinCfg {
    pub curve: CurveChoice,
}

impl InsulinCfg {
    /// Instantiate the configured curve for `dia_h`.
    pub fn curve(&self, dia_h: f64) -> Result<InsulinCurve> {
        match self.curve {
            CurveChoice::Walsh => InsulinCurve::walsh(dia_h),
            CurveChoice::Exponential { peak_h } => InsulinCurve::exponential(dia_h, peak_h),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IobCfg {
    /// IOB / BG prediction grid step (min). Default: 5.
    pub step_min: u32,
    /// Assumed bolus delivery rate (U/h). Default: 90.
    pub bolus_rate_u_per_h: f64,
}

impl Default for IobCfg {
    fn default() -> Self {
        Self {
            step_min: 5,
            bolus_rate_u_per_h: 90.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BgCfg {
    pub unit: BgUnit,
    /// Readings younger than this feed the BGI fit (min). Default: 30.
    pub trend_window_min: u32,
    /// Horizon of the projected vs expected comparison (h). Default: 0.5.
    pub analysis_horizon_h: f64,
}

impl Default for BgCfg {
    fn default() -> Self {
        Self {
            unit: BgUnit::MmolL,
            trend_window_min: 30,
            analysis_horizon_h: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DosingCfg {
    /// Time over which a correction dose is spread as a TBR (h). Default: 0.5.
    pub enactment_window_h: f64,
    /// BG below which every TBR becomes a full stop, in mmol/L. Default: 4.2.
    pub hypo_threshold_mmol: f64,
    /// Snooze window after carbs as a fraction of DIA. Default: 0.5.
    pub snooze_factor: f64,
    /// TBR cap as a multiple of the current basal. Default: 4.
    pub basal_multiplier_cap: f64,
    /// TBR cap as a multiple of the max daily basal. Default: 3.
    pub max_daily_basal_multiplier_cap: f64,
}

impl Default for DosingCfg {
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

impl DosingCfg {
    /// Hypo threshold expressed in `unit`.
    #[must_use]
    pub fn hypo_threshold(&self, unit: BgUnit) -> f64 {
        unit.from_mmol(self.hypo_threshold_mmol)
    }
}
