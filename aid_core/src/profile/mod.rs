//! Step-function profiles.
//!
//! A `Profile<V>` is a piecewise-constant signal: `values[i]` holds from
//! `times[i]` (inclusive) to `times[i + 1]` (exclusive), and the last value
//! holds as the terminal value. A built profile always starts at its window
//! start, ends at its window end, has no unset values and carries a parallel
//! axis of hour offsets relative to a reference instant.
//!
//! Profiles are built from dated steps by `ProfileBuilder` (see `pipeline`)
//! and composed with `Profile::add` / `Profile::subtract` (see `algebra`).

pub mod algebra;
pub mod pipeline;

pub use pipeline::{Draft, ProfileBuilder, Step};

use crate::error::{AidError, Result};
use crate::units::Unit;
use crate::util::hours_between;
use chrono::NaiveDateTime;

#[derive(Debug, Clone, PartialEq)]
pub struct Profile<V> {
    times: Vec<NaiveDateTime>,
    values: Vec<V>,
    offsets: Vec<f64>,
    reference: NaiveDateTime,
    unit: Unit,
}

impl<V: Copy + PartialEq> Profile<V> {
    /// Assemble a profile from already-clean axes.
    ///
    /// Fails with `InvalidProfile` if the axes differ in length, hold fewer
    /// than two breakpoints, or are not strictly increasing in time.
    pub fn from_parts(
        times: Vec<NaiveDateTime>,
        values: Vec<V>,
        unit: Unit,
        reference: NaiveDateTime,
    ) -> Result<Self> {
        if times.len() != values.len() {
            return Err(AidError::InvalidProfile("time and value axes differ in length").into());
        }
        if times.len() < 2 {
            return Err(AidError::InvalidProfile("a profile needs at least two breakpoints").into());
        }
        if times.windows(2).any(|w| w[0] >= w[1]) {
            return Err(AidError::InvalidProfile("breakpoints must be strictly increasing").into());
        }
        let offsets = times.iter().map(|&t| hours_between(reference, t)).collect();
        Ok(Self {
            times,
            values,
            offsets,
            reference,
            unit,
        })
    }

    /// Constant profile over `[start, end]`.
    pub fn constant(
        value: V,
        start: NaiveDateTime,
        end: NaiveDateTime,
        unit: Unit,
    ) -> Result<Self> {
        Self::from_parts(vec![start, end], vec![value, value], unit, end)
    }

    #[must_use]
    pub fn times(&self) -> &[NaiveDateTime] {
        &self.times
    }

    #[must_use]
    pub fn values(&self) -> &[V] {
        &self.values
    }

    /// Hour offsets of each breakpoint relative to `reference()`.
    #[must_use]
    pub fn offsets(&self) -> &[f64] {
        &self.offsets
    }

    #[must_use]
    pub const fn reference(&self) -> NaiveDateTime {
        self.reference
    }

    #[must_use]
    pub const fn unit(&self) -> Unit {
        self.unit
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.times.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// First breakpoint (window start).
    #[must_use]
    pub fn start(&self) -> NaiveDateTime {
        self.times[0]
    }

    /// Last breakpoint (window end).
    #[must_use]
    pub fn end(&self) -> NaiveDateTime {
        self.times[self.times.len() - 1]
    }

    #[must_use]
    pub fn first_value(&self) -> V {
        self.values[0]
    }

    #[must_use]
    pub fn last_value(&self) -> V {
        self.values[self.values.len() - 1]
    }

    /// Value of the step covering `t`. Outside the axis the boundary value
    /// is returned.
    #[must_use]
    pub fn value_at(&self, t: NaiveDateTime) -> V {
        let idx = self.times.partition_point(|&x| x <= t);
        self.values[idx.saturating_sub(1)]
    }

    /// Value of the step covering the normalized offset `h` (hours relative
    /// to `reference()`).
    #[must_use]
    pub fn value_at_offset(&self, h: f64) -> V {
        let idx = self.offsets.partition_point(|&x| x <= h);
        self.values[idx.saturating_sub(1)]
    }

    /// Iterate over the right-open steps `(from, to, value)` between
    /// consecutive breakpoints. The terminal value is not included.
    pub fn steps(&self) -> impl Iterator<Item = (NaiveDateTime, NaiveDateTime, V)> + '_ {
        self.times
            .windows(2)
            .zip(self.values.iter())
            .map(|(w, &v)| (w[0], w[1], v))
    }

    /// Recompute the offset axis relative to `reference`.
    #[must_use]
    pub fn normalized(mut self, reference: NaiveDateTime) -> Self {
        self.offsets = self
            .times
            .iter()
            .map(|&t| hours_between(reference, t))
            .collect();
        self.reference = reference;
        self
    }

    /// Drop breakpoints whose value equals the preceding kept value. The
    /// first and last breakpoints are always kept.
    #[must_use]
    pub fn smoothed(self) -> Self {
        let n = self.times.len();
        let mut times = Vec::with_capacity(n);
        let mut values = Vec::with_capacity(n);
        let mut offsets = Vec::with_capacity(n);
        for i in 0..n {
            let keep = i == 0 || i == n - 1 || values.last() != Some(&self.values[i]);
            if keep {
                times.push(self.times[i]);
                values.push(self.values[i]);
                offsets.push(self.offsets[i]);
            }
        }
        Self {
            times,
            values,
            offsets,
            reference: self.reference,
            unit: self.unit,
        }
    }

    /// Map every value, keeping the time axis.
    #[must_use]
    pub fn map<W: Copy + PartialEq>(&self, unit: Unit, f: impl Fn(V) -> W) -> Profile<W> {
        Profile {
            times: self.times.clone(),
            values: self.values.iter().map(|&v| f(v)).collect(),
            offsets: self.offsets.clone(),
            reference: self.reference,
            unit,
        }
    }
}
