//! Collaborator seams for the dosing core.
//!
//! The core never reads a wall clock or writes reports on its own; callers hand
//! it a [`Clock`] and a [`CycleReporter`] so a control cycle can run without any
//! filesystem or global state.

pub mod clock;

pub use clock::{Clock, FixedClock, SystemClock};

use chrono::NaiveDateTime;

/// Receives what a control cycle wants persisted or displayed.
///
/// Implementations decide where the data goes (JSONL file, memory, nowhere).
pub trait CycleReporter {
    /// Current insulin-on-board snapshot, one per cycle, keyed by cycle time.
    fn iob_snapshot(
        &mut self,
        at: NaiveDateTime,
        iob_u: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Named diagnostic values computed during the cycle.
    fn diagnostics(&mut self, _at: NaiveDateTime, _values: &[(&'static str, f64)]) {}
}

/// Reporter that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl CycleReporter for NullReporter {
    fn iob_snapshot(
        &mut self,
        _at: NaiveDateTime,
        _iob_u: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

/// Reporter that keeps everything in memory; handy in tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryReporter {
    pub snapshots: Vec<(NaiveDateTime, f64)>,
    pub values: Vec<(NaiveDateTime, &'static str, f64)>,
}

impl CycleReporter for MemoryReporter {
    fn iob_snapshot(
        &mut self,
        at: NaiveDateTime,
        iob_u: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.snapshots.push((at, iob_u));
        Ok(())
    }

    fn diagnostics(&mut self, at: NaiveDateTime, values: &[(&'static str, f64)]) {
        self.values
            .extend(values.iter().map(|(name, v)| (at, *name, *v)));
    }
}
