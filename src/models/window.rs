//! Time windows and facility calendars.
//!
//! # Time Model
//! All intervals are half-open `[start, end)` over UTC timestamps. Two
//! events overlap iff `max(start_a, start_b) < min(end_a, end_b)`; windows
//! that merely touch do not overlap.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Interval start (inclusive).
    pub start: DateTime<Utc>,
    /// Interval end (exclusive).
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a new time window.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Duration of this window.
    #[inline]
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Whether a timestamp falls within this window.
    #[inline]
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t < self.end
    }

    /// Whether two windows overlap.
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Overlap duration between two windows, `None` if disjoint.
    pub fn overlap_duration(&self, other: &Self) -> Option<Duration> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if end > start {
            Some(end - start)
        } else {
            None
        }
    }

    /// Overlap as a fraction of the shorter of the two windows.
    ///
    /// Returns 0.0 for disjoint windows. This is the quantity the severity
    /// rule is defined over: a full containment of the shorter window
    /// yields 1.0 regardless of how long the other window is.
    pub fn overlap_fraction_of_shorter(&self, other: &Self) -> f64 {
        let Some(overlap) = self.overlap_duration(other) else {
            return 0.0;
        };
        let shorter = self.duration().min(other.duration());
        let shorter_ms = shorter.num_milliseconds();
        if shorter_ms <= 0 {
            return 0.0;
        }
        overlap.num_milliseconds() as f64 / shorter_ms as f64
    }

    /// This window shifted forward (or backward, for negative deltas).
    pub fn shifted(&self, delta: Duration) -> Self {
        Self {
            start: self.start + delta,
            end: self.end + delta,
        }
    }
}

/// Facility opening exceptions.
///
/// Records the windows during which a facility is closed (maintenance,
/// holidays, external bookings). This is an external fact supplied to the
/// detector alongside a candidate event — the engine never computes
/// closures itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FacilityCalendar {
    /// Facility this calendar applies to.
    pub facility_id: String,
    /// Windows during which the facility is unavailable.
    pub closures: Vec<TimeWindow>,
}

impl FacilityCalendar {
    /// Creates a calendar with no closures (always open).
    pub fn new(facility_id: impl Into<String>) -> Self {
        Self {
            facility_id: facility_id.into(),
            closures: Vec::new(),
        }
    }

    /// Adds a closure window.
    pub fn with_closure(mut self, window: TimeWindow) -> Self {
        self.closures.push(window);
        self
    }

    /// Whether the facility is open for the entire window.
    pub fn is_open(&self, window: &TimeWindow) -> bool {
        !self.closures.iter().any(|c| c.overlaps(window))
    }

    /// Closures overlapping the given window.
    pub fn closures_in(&self, window: &TimeWindow) -> Vec<TimeWindow> {
        self.closures
            .iter()
            .filter(|c| c.overlaps(window))
            .copied()
            .collect()
    }
}
