//! Access-time measurement.
//!
//! Every transport cycle is timed. [`Measurements`] keeps the slowest and the
//! fastest cycle since the last reader reset, each with the time it happened, the
//! number of bus operations it carried and what kind of access it was.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use scu_core::common::AccessKind;

/// One timed cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Measurement {
    /// Wall time the cycle took.
    pub duration: Duration,
    /// When the cycle started.
    pub timestamp: SystemTime,
    /// Bus operations in the cycle.
    pub size: usize,
    /// Kind of access.
    pub kind: AccessKind,
}

/// Slowest and fastest cycle of a window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Extremes {
    /// Slowest cycle.
    pub max: Option<Measurement>,
    /// Fastest cycle.
    pub min: Option<Measurement>,
    /// Cycles seen.
    pub count: u64,
}

impl Extremes {
    fn update(&mut self, m: Measurement) {
        self.count += 1;
        if self.max.is_none_or(|max| m.duration > max.duration) {
            self.max = Some(m);
        }
        if self.min.is_none_or(|min| m.duration < min.duration) {
            self.min = Some(m);
        }
    }
}

/// Thread-safe extremum tracker.
#[derive(Debug, Default)]
pub struct Measurements {
    window: Mutex<Extremes>,
}

impl Measurements {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one cycle.
    pub fn record(&self, m: Measurement) {
        self.window.lock().unwrap_or_else(PoisonError::into_inner).update(m);
    }

    /// Returns the extremes without resetting them.
    pub fn peek(&self) -> Extremes {
        *self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the extremes and starts a new window.
    pub fn take(&self) -> Extremes {
        std::mem::take(&mut *self.window.lock().unwrap_or_else(PoisonError::into_inner))
    }
}
