//! Availability signals.
//!
//! A thin read-only consumer of an external availability provider, used to
//! bias window selection when several candidate windows are equally
//! conflict-free. This is a tie-break heuristic, not a correctness
//! requirement: a provider that fails or has no data yields 0.0 ("no
//! preference") and selection degrades to earliest-window-first.

use chrono::{Datelike, Weekday};
use std::collections::HashMap;

use crate::models::TimeWindow;

/// External source of per-person availability propensities.
///
/// Implementations must be infallible at this boundary: provider failure
/// is reported as 0.0, never as an error.
pub trait AvailabilityProvider: Send + Sync {
    /// Propensity in `[0, 1]` that the person is free during the window.
    ///
    /// 0.0 means "no data" and is treated as no preference.
    fn availability(&self, person_id: &str, window: &TimeWindow) -> f64;
}

/// Provider with no data. Every query scores 0.0.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAvailability;

impl AvailabilityProvider for NoAvailability {
    fn availability(&self, _person_id: &str, _window: &TimeWindow) -> f64 {
        0.0
    }
}

/// In-memory weekly propensity table.
///
/// Keyed by (person, day-of-week). The window's start day selects the
/// signal; values are clamped into `[0, 1]`.
#[derive(Debug, Clone, Default)]
pub struct WeeklyAvailability {
    signals: HashMap<(String, Weekday), f64>,
}

impl WeeklyAvailability {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a person's propensity for a day of week.
    pub fn set(&mut self, person_id: impl Into<String>, day: Weekday, value: f64) {
        self.signals
            .insert((person_id.into(), day), value.clamp(0.0, 1.0));
    }

    /// Builder form of [`set`](Self::set).
    pub fn with_signal(mut self, person_id: impl Into<String>, day: Weekday, value: f64) -> Self {
        self.set(person_id, day, value);
        self
    }
}

impl AvailabilityProvider for WeeklyAvailability {
    fn availability(&self, person_id: &str, window: &TimeWindow) -> f64 {
        let day = window.start.weekday();
        self.signals
            .get(&(person_id.to_string(), day))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Sum of availability signals across all participants for a window.
///
/// Used to order equally conflict-free candidate windows; a total of 0.0
/// carries no ordering information.
pub fn window_score(
    provider: &dyn AvailabilityProvider,
    participants: &[&str],
    window: &TimeWindow,
) -> f64 {
    participants
        .iter()
        .map(|p| provider.availability(p, window))
        .sum()
}
