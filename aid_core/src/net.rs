//! Net insulin profile: delivered rate minus scheduled basal, plus boluses.
//!
//! Delivered rate is the suspend profile filled by the TBR profile, itself
//! filled by the scheduled basal. An untouched basal therefore nets to zero
//! and only deviations from the schedule count towards IOB.
use crate::error::Result;
use crate::profile::Profile;
use crate::records::{DecodeCtx, Record, RecordKind, build_profile, of_kind};

#[derive(Debug, Clone)]
pub struct NetInsulin {
    pub basal: Profile<f64>,
    pub tbr: Profile<f64>,
    pub suspend: Profile<f64>,
    pub bolus: Profile<f64>,
    pub net: Profile<f64>,
}

impl NetInsulin {
    /// Compose the net profile over the basal profile's window. `records` may
    /// mix TBR, bolus and suspend records; any others are ignored.
    pub fn build(records: &[Record], basal: &Profile<f64>, ctx: &DecodeCtx) -> Result<Self> {
        let (start, end) = (basal.start(), basal.end());
        let tbr = build_profile(
            RecordKind::Tbr,
            &of_kind(records, RecordKind::Tbr),
            start,
            end,
            Some(basal),
            ctx,
        )?;
        let suspend = build_profile(
            RecordKind::Suspend,
            &of_kind(records, RecordKind::Suspend),
            start,
            end,
            Some(&tbr),
            ctx,
        )?;
        let bolus = build_profile(
            RecordKind::Bolus,
            &of_kind(records, RecordKind::Bolus),
            start,
            end,
            None,
            ctx,
        )?;
        let net = suspend
            .subtract(&[basal])?
            .add(&[&bolus])?
            .smoothed()
            .normalized(end);
        tracing::debug!(steps = net.len(), "net insulin profile");
        Ok(Self {
            basal: basal.clone(),
            tbr,
            suspend,
            bolus,
            net,
        })
    }

    /// Scheduled basal in force at the end of the window (U/h).
    #[must_use]
    pub fn current_basal(&self) -> f64 {
        self.basal.last_value()
    }
}
