//! Blood-glucose engine: recent trend, IOB-driven expectation, deviation and
//! correction dose.
use crate::error::{AidError, Result};
use crate::idc::InsulinCurve;
use crate::iob::{GRID_TOLERANCE, IobPrediction};
use crate::profile::Profile;
use crate::units::{BgUnit, Unit};
use crate::util::{grid_index, hours_between};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One CGM reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlucoseReading {
    pub time: NaiveDateTime,
    pub value: f64,
    #[serde(default)]
    pub unit: BgUnit,
}

/// Readings up to `now`, ordered by time, in a single unit.
#[derive(Debug, Clone)]
pub struct GlucoseHistory {
    readings: Vec<GlucoseReading>,
    unit: BgUnit,
    now: NaiveDateTime,
    trend_window_h: f64,
}

impl GlucoseHistory {
    /// Readings after `now` are dropped; of several readings sharing a
    /// timestamp the last one wins.
    pub fn new(
        readings: &[GlucoseReading],
        unit: BgUnit,
        now: NaiveDateTime,
        trend_window_min: u32,
    ) -> Result<Self> {
        if let Some(bad) = readings.iter().find(|r| r.unit != unit) {
            return Err(AidError::UnitMismatch {
                expected: unit.to_string(),
                found: bad.unit.to_string(),
            }
            .into());
        }
        let mut sorted: Vec<GlucoseReading> =
            readings.iter().copied().filter(|r| r.time <= now).collect();
        sorted.sort_by_key(|r| r.time);
        let mut kept: Vec<GlucoseReading> = Vec::with_capacity(sorted.len());
        for r in sorted {
            match kept.last_mut() {
                Some(last) if last.time == r.time => *last = r,
                _ => kept.push(r),
            }
        }
        Ok(Self {
            readings: kept,
            unit,
            now,
            trend_window_h: f64::from(trend_window_min) / 60.0,
        })
    }

    #[must_use]
    pub fn readings(&self) -> &[GlucoseReading] {
        &self.readings
    }

    #[must_use]
    pub const fn unit(&self) -> BgUnit {
        self.unit
    }

    #[must_use]
    pub const fn now(&self) -> NaiveDateTime {
        self.now
    }

    /// Readings inside the trend window ending at `now`.
    #[must_use]
    pub fn recent(&self) -> &[GlucoseReading] {
        let from = crate::util::checked_add_hours(self.now, -self.trend_window_h)
            .unwrap_or(NaiveDateTime::MIN);
        let idx = self.readings.partition_point(|r| r.time < from);
        &self.readings[idx..]
    }

    /// Fail with `InsufficientData` unless `needed` recent readings exist.
    pub fn verify(&self, needed: usize) -> Result<()> {
        let found = self.recent().len();
        tracing::debug!(found, window_h = self.trend_window_h, "recent BG readings");
        if found < needed {
            return Err(AidError::InsufficientData { needed, found }.into());
        }
        Ok(())
    }

    /// Most recent reading inside the trend window.
    pub fn latest(&self) -> Result<f64> {
        self.verify(1)?;
        let recent = self.recent();
        Ok(recent[recent.len() - 1].value)
    }

    /// BGI: slope of a least-squares line through the recent readings, in BG
    /// units per hour.
    #[allow(clippy::cast_precision_loss)]
    pub fn impact(&self) -> Result<f64> {
        self.verify(2)?;
        let pts: Vec<(f64, f64)> = self
            .recent()
            .iter()
            .map(|r| (hours_between(self.now, r.time), r.value))
            .collect();
        let n = pts.len() as f64;
        let mean_x = pts.iter().map(|p| p.0).sum::<f64>() / n;
        let mean_y = pts.iter().map(|p| p.1).sum::<f64>() / n;
        let mut sxx = 0.0f64;
        let mut sxy = 0.0f64;
        for (x, y) in &pts {
            let dx = x - mean_x;
            sxx += dx * dx;
            sxy += dx * (y - mean_y);
        }
        if !sxx.is_finite() || sxx == 0.0 {
            return Err(AidError::InsufficientData {
                needed: 2,
                found: 1,
            }
            .into());
        }
        Ok(sxy / sxx)
    }

    /// Latest reading carried `dt_h` hours ahead along the current trend.
    pub fn project(&self, dt_h: f64) -> Result<f64> {
        Ok(dt_h.mul_add(self.impact()?, self.latest()?))
    }
}

/// BG trajectory expected from IOB decay alone, starting at the latest
/// reading: `BG[k+1] = BG[k] + ISF(T[k]) * (IOB[k+1] - IOB[k])`.
#[derive(Debug, Clone)]
pub struct BgForecast {
    profile: Profile<f64>,
    step_h: f64,
}

impl BgForecast {
    pub fn build(
        history: &GlucoseHistory,
        iob: &IobPrediction,
        isf: &Profile<f64>,
    ) -> Result<Self> {
        let expected = Unit::GlucosePerUnit(history.unit());
        if isf.unit() != expected {
            return Err(AidError::UnitMismatch {
                expected: expected.to_string(),
                found: isf.unit().to_string(),
            }
            .into());
        }
        let mut bg = history.latest()?;
        let times = iob.profile().times();
        let iobs = iob.profile().values();
        let mut values = Vec::with_capacity(iobs.len());
        values.push(bg);
        for k in 0..iobs.len() - 1 {
            let isf_k = isf.value_at(times[k]);
            bg = isf_k.mul_add(iobs[k + 1] - iobs[k], bg);
            tracing::trace!(t = %times[k + 1], isf = isf_k, bg, "expected BG");
            values.push(bg);
        }
        let profile = Profile::from_parts(
            times.to_vec(),
            values,
            Unit::Glucose(history.unit()),
            iob.profile().reference(),
        )?;
        Ok(Self {
            profile,
            step_h: iob.step_h(),
        })
    }

    #[must_use]
    pub const fn profile(&self) -> &Profile<f64> {
        &self.profile
    }

    /// Expected BG `dt_h` hours ahead; `dt_h` must land on the IOB grid.
    pub fn expect(&self, dt_h: f64) -> Result<f64> {
        match grid_index(dt_h, self.step_h, GRID_TOLERANCE) {
            Some(k) if k < self.profile.len() => Ok(self.profile.values()[k]),
            _ => Err(AidError::BadPredictionTime(dt_h).into()),
        }
    }
}

/// Output of `analyze`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BgAnalysis {
    pub horizon_h: f64,
    pub projected_bg: f64,
    pub expected_bg: f64,
    /// projected - expected
    pub delta_bg: f64,
    pub bgi: f64,
    pub expected_bgi: f64,
    /// bgi - expected_bgi
    pub delta_bgi: f64,
}

/// Compare where the current trend leads with where IOB decay alone would
/// lead, `horizon_h` hours ahead.
pub fn analyze(
    history: &GlucoseHistory,
    forecast: &BgForecast,
    iob: &IobPrediction,
    isf: &Profile<f64>,
    horizon_h: f64,
) -> Result<BgAnalysis> {
    let projected_bg = history.project(horizon_h)?;
    let expected_bg = forecast.expect(horizon_h)?;
    let bgi = history.impact()?;
    let d_iob = iob.derivative().first().copied().unwrap_or(0.0);
    let expected_bgi = d_iob * isf.value_at(iob.profile().start());
    let a = BgAnalysis {
        horizon_h,
        projected_bg,
        expected_bg,
        delta_bg: projected_bg - expected_bg,
        bgi,
        expected_bgi,
        delta_bgi: bgi - expected_bgi,
    };
    tracing::info!(
        expected_bg = a.expected_bg,
        projected_bg = a.projected_bg,
        delta_bg = a.delta_bg,
        expected_bgi = a.expected_bgi,
        bgi = a.bgi,
        delta_bgi = a.delta_bgi,
        unit = %history.unit(),
        "BG analysis"
    );
    Ok(a)
}

/// Units of insulin given now that move eventual BG by `delta_bg`.
///
/// Each ISF step `[t_i, t_{i+1})` (hours from the ISF profile start) is
/// weighted by the change in remaining activity of a dose given now over
/// that step: `f(DIA - t_i) - f(DIA - t_{i+1})`. Steps past DIA carry no
/// weight.
pub fn dose(delta_bg: f64, isf: &Profile<f64>, curve: &InsulinCurve) -> Result<f64> {
    let dia = curve.dia();
    let origin = isf.start();
    let factor: f64 = isf
        .steps()
        .map(|(a, b, y)| {
            let ta = hours_between(origin, a).min(dia);
            let tb = hours_between(origin, b).min(dia);
            y * (curve.remaining(dia - ta) - curve.remaining(dia - tb))
        })
        .sum();
    if !factor.is_finite() || factor.abs() < 1e-12 {
        return Err(AidError::InvalidProfile("ISF profile yields no insulin effect").into());
    }
    Ok(delta_bg / factor)
}
