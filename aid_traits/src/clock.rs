use chrono::{Local, NaiveDateTime, TimeDelta};

/// Wall-clock abstraction for the control loop.
///
/// `now()` is local naive time, the axis every treatment record is dated on.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

/// Default clock backed by the system's local time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Deterministic clock pinned to a given instant; can be advanced manually.
#[derive(Debug, Clone)]
pub struct FixedClock {
    at: std::sync::Arc<std::sync::Mutex<NaiveDateTime>>,
}

impl FixedClock {
    pub fn new(at: NaiveDateTime) -> Self {
        Self {
            at: std::sync::Arc::new(std::sync::Mutex::new(at)),
        }
    }

    /// Advance the clock by the given delta.
    pub fn advance(&self, d: TimeDelta) {
        if let Ok(mut at) = self.at.lock() {
            *at += d;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        // A poisoned lock still holds the last instant written.
        match self.at.lock() {
            Ok(g) => *g,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
