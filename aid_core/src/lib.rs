#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Decision core of an automated insulin-delivery loop (device-agnostic).
//!
//! All I/O happens outside this crate. A control cycle is a pure function of
//! the treatment records, glucose readings and daily schedules handed in; the
//! only side channels are `tracing` events and the injected
//! `aid_traits::CycleReporter`.
//!
//! ## Architecture
//!
//! - **Profiles**: step-function time series built by a fixed pipeline
//!   (`profile` module) and composed by `Profile::add` / `Profile::subtract`
//! - **Records / schedules**: tagged treatment records and repeating daily
//!   schedules that feed the pipeline (`records`, `schedule`)
//! - **Insulin curve**: remaining-activity fraction and its integral (`idc`)
//! - **IOB**: convolution of the net insulin profile with the curve (`iob`)
//! - **BG**: trend fit, expected trajectory, deviation analysis (`bg`)
//! - **Dosing**: dose, TBR, safety limits, snooze (`dosing`)
//! - **Cycle**: sequencing of all of the above (`cycle`)
//!
//! ## Time axis
//!
//! Timestamps are `chrono::NaiveDateTime` in pump-local time. Normalized
//! offsets are `f64` hours relative to a reference instant; negative values
//! lie in the past.

pub mod bg;
pub mod config;
pub mod conversions;
pub mod cycle;
pub mod dosing;
pub mod error;
pub mod idc;
pub mod iob;
pub mod net;
pub mod profile;
pub mod records;
pub mod schedule;
pub mod units;
pub mod util;

pub use bg::{BgAnalysis, BgForecast, GlucoseHistory, GlucoseReading};
pub use config::{BgCfg, DosingCfg, InsulinCfg, IobCfg, PumpSettings};
pub use cycle::{CycleCfg, CycleInput, CycleOutcome, Diagnostics, Schedules, run_cycle};
pub use dosing::{DosingWarning, NoActionReason, PumpAction, Recommendation, TempBasal};
pub use error::{AidError, Report, Result};
pub use idc::InsulinCurve;
pub use iob::IobPrediction;
pub use profile::{Profile, ProfileBuilder};
pub use records::{Record, RecordKind};
pub use schedule::{DailySchedule, TargetRange};
pub use units::{BgUnit, Unit};
