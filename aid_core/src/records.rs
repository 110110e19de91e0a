//! Treatment records and their decoding into profile steps.
//!
//! Each record kind decodes into a `Step<f64>` in U/h:
//!
//! | kind    | value                    | duration            |
//! |---------|--------------------------|---------------------|
//! | basal   | scheduled rate           | none                |
//! | tbr     | override rate            | `duration_min`      |
//! | bolus   | bolus delivery rate      | `amount / rate`, ending at `time` |
//! | suspend | 0 if suspended, else unset (filled from TBR/basal) | none |
use crate::error::{AidError, Result};
use crate::profile::{Profile, ProfileBuilder, Step};
use crate::units::Unit;
use crate::util::try_from_hours;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Longest delivery a single TBR or bolus record may describe (h).
pub const MAX_RECORD_DURATION_H: f64 = 24.0;

/// Unit of a temporary basal rate as reported by the pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RateUnit {
    #[serde(rename = "U/h")]
    #[default]
    UnitsPerHour,
    #[serde(rename = "%")]
    Percent,
}

impl RateUnit {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnitsPerHour => "U/h",
            Self::Percent => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BasalRecord {
    pub time: NaiveDateTime,
    pub rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TbrRecord {
    pub time: NaiveDateTime,
    pub rate: f64,
    #[serde(default)]
    pub units: RateUnit,
    pub duration_min: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BolusRecord {
    pub time: NaiveDateTime,
    pub amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuspendRecord {
    pub time: NaiveDateTime,
    /// `true` for a suspend event, `false` for a resume.
    pub suspended: bool,
}

/// Logged carbohydrate intake; only its timestamp matters to the loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CarbRecord {
    pub time: NaiveDateTime,
    #[serde(default)]
    pub grams: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Basal(BasalRecord),
    Tbr(TbrRecord),
    Bolus(BolusRecord),
    Suspend(SuspendRecord),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Basal,
    Tbr,
    Bolus,
    Suspend,
}

impl RecordKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Basal => "basal",
            Self::Tbr => "tbr",
            Self::Bolus => "bolus",
            Self::Suspend => "suspend",
        }
    }

    /// Value used for cancellations, expiries and an empty history before
    /// the window. Unset kinds defer to their filler.
    #[must_use]
    pub const fn zero(self) -> Option<f64> {
        match self {
            Self::Bolus => Some(0.0),
            Self::Basal | Self::Tbr | Self::Suspend => None,
        }
    }

    #[must_use]
    pub const fn has_durations(self) -> bool {
        matches!(self, Self::Tbr | Self::Bolus)
    }
}

/// Parameters needed to decode records.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeCtx {
    /// Rate at which a bolus is assumed to be delivered (U/h)
    pub bolus_rate_u_per_h: f64,
}

impl Default for DecodeCtx {
    fn default() -> Self {
        Self {
            bolus_rate_u_per_h: 90.0,
        }
    }
}

impl Record {
    #[must_use]
    pub const fn kind(&self) -> RecordKind {
        match self {
            Self::Basal(_) => RecordKind::Basal,
            Self::Tbr(_) => RecordKind::Tbr,
            Self::Bolus(_) => RecordKind::Bolus,
            Self::Suspend(_) => RecordKind::Suspend,
        }
    }

    #[must_use]
    pub const fn time(&self) -> NaiveDateTime {
        match self {
            Self::Basal(r) => r.time,
            Self::Tbr(r) => r.time,
            Self::Bolus(r) => r.time,
            Self::Suspend(r) => r.time,
        }
    }

    /// Decode into a profile step. A bolus is logged when its delivery
    /// completes, so its step ends at the record time.
    pub fn decode(&self, ctx: &DecodeCtx) -> Result<Step<f64>> {
        let u = Unit::UnitsPerHour;
        let step = match *self {
            Self::Basal(r) => Step::new(r.time, Some(finite("basal rate", r.rate)?), u),
            Self::Tbr(r) => {
                if r.units != RateUnit::UnitsPerHour {
                    return Err(AidError::UnitMismatch {
                        expected: RateUnit::UnitsPerHour.as_str().to_string(),
                        found: r.units.as_str().to_string(),
                    }
                    .into());
                }
                let hours = delivery_hours("TBR duration", r.duration_min / 60.0)?;
                Step::new(r.time, Some(finite("TBR rate", r.rate)?), u).with_duration(hours)
            }
            Self::Bolus(r) => {
                let rate = ctx.bolus_rate_u_per_h;
                if !(rate > 0.0 && rate.is_finite()) {
                    return Err(AidError::Config("bolus delivery rate must be > 0".into()).into());
                }
                let amount = finite("bolus amount", r.amount)?.max(0.0);
                let hours = delivery_hours("bolus delivery", amount / rate)?;
                let begin = try_from_hours(hours)
                    .and_then(|d| r.time.checked_sub_signed(d))
                    .ok_or_else(|| AidError::Config(format!("bolus at {} out of range", r.time)))?;
                Step::new(begin, Some(rate), u).with_duration(hours)
            }
            Self::Suspend(r) => Step::new(r.time, r.suspended.then_some(0.0), u),
        };
        Ok(step)
    }
}

fn finite(what: &str, v: f64) -> Result<f64> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(AidError::Config(format!("{what} must be finite, got {v}")).into())
    }
}

fn delivery_hours(what: &str, hours: f64) -> Result<f64> {
    if (0.0..=MAX_RECORD_DURATION_H).contains(&hours) {
        Ok(hours)
    } else {
        Err(AidError::Config(format!(
            "{what} of {hours} h outside [0, {MAX_RECORD_DURATION_H}] h"
        ))
        .into())
    }
}

/// Records of one kind, in input order.
#[must_use]
pub fn of_kind(records: &[Record], kind: RecordKind) -> Vec<Record> {
    records.iter().copied().filter(|r| r.kind() == kind).collect()
}

/// Run the profile pipeline over records of a single `kind`.
pub fn build_profile(
    kind: RecordKind,
    records: &[Record],
    start: NaiveDateTime,
    end: NaiveDateTime,
    filler: Option<&Profile<f64>>,
    ctx: &DecodeCtx,
) -> Result<Profile<f64>> {
    let mut steps = Vec::with_capacity(records.len());
    for r in records {
        if r.kind() != kind {
            return Err(AidError::MixedRecords {
                expected: kind.name(),
                found: r.kind().name(),
            }
            .into());
        }
        steps.push(r.decode(ctx)?);
    }
    let mut builder = ProfileBuilder::new(Unit::UnitsPerHour, start, end).zero(kind.zero());
    if kind.has_durations() {
        builder = builder.with_durations();
    }
    if let Some(f) = filler {
        builder = builder.filler(f);
    }
    let p = builder.build(steps)?;
    tracing::debug!(kind = kind.name(), n = p.len(), "built profile");
    Ok(p)
}
