//! Conflict model.
//!
//! A conflict is a derived record describing an incompatibility between
//! events over a shared resource. Conflicts are recomputed by the
//! detector, never hand-edited — only status transitions
//! (resolved/ignored) are applied directly.
//!
//! # Identity
//! A conflict's id is derived deterministically from its kind, the
//! (unordered) event pair, and the contested resource, so re-running
//! detection against unchanged state reproduces the same records.

use serde::{Deserialize, Serialize};

use super::{ResourceRef, TimeWindow};

/// Classification of scheduling conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Two events booked into the same facility at overlapping times.
    DoubleBooking,
    /// Event scheduled while its facility is closed.
    FacilityUnavailable,
    /// The same coach committed to two overlapping events.
    CoachConflict,
    /// The same required player committed to two overlapping events.
    PlayerConflict,
    /// A shared limited resource double-committed.
    ResourceConflict,
}

impl ConflictKind {
    /// Stable tag used in identities and emission payloads.
    pub fn tag(&self) -> &'static str {
        match self {
            ConflictKind::DoubleBooking => "double_booking",
            ConflictKind::FacilityUnavailable => "facility_unavailable",
            ConflictKind::CoachConflict => "coach_conflict",
            ConflictKind::PlayerConflict => "player_conflict",
            ConflictKind::ResourceConflict => "resource_conflict",
        }
    }
}

/// Conflict severity, derived deterministically from kind and overlap.
///
/// Ordered so that `High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Conflict lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    /// Detected and not yet addressed.
    Pending,
    /// Underlying cause removed (by the engine or a user action).
    Resolved,
    /// Explicitly dismissed by a human.
    Ignored,
}

/// A proposed event mutation that would clear a conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedMove {
    /// Event to move.
    pub event_id: String,
    /// Conflict-free target window.
    pub window: TimeWindow,
    /// Human-readable summary of the proposal.
    pub note: String,
}

/// A detected scheduling conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// Deterministic identity (kind + event pair + resource).
    pub id: String,
    /// Conflict classification.
    pub kind: ConflictKind,
    /// Derived severity.
    pub severity: Severity,
    /// Referenced events, candidate first. `FacilityUnavailable` conflicts
    /// reference a single event.
    pub event_ids: Vec<String>,
    /// The contested resource.
    pub resource: ResourceRef,
    /// The contested time region.
    pub window: TimeWindow,
    /// Human-readable description.
    pub description: String,
    /// Whether policy permits automatic resolution.
    pub auto_resolvable: bool,
    /// Lifecycle status.
    pub status: ConflictStatus,
    /// Proposed fix, when one was found at detection time.
    pub suggested_resolution: Option<SuggestedMove>,
}

impl Conflict {
    /// Creates a pending conflict with a deterministic id.
    pub fn new(
        kind: ConflictKind,
        event_ids: Vec<String>,
        resource: ResourceRef,
        window: TimeWindow,
        severity: Severity,
    ) -> Self {
        let id = Self::identity(kind, &event_ids, &resource);
        Self {
            id,
            kind,
            severity,
            event_ids,
            resource,
            window,
            description: String::new(),
            auto_resolvable: false,
            status: ConflictStatus::Pending,
            suggested_resolution: None,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Marks the conflict auto-resolvable and attaches the proposal.
    pub fn with_suggestion(mut self, suggestion: SuggestedMove) -> Self {
        self.auto_resolvable = true;
        self.suggested_resolution = Some(suggestion);
        self
    }

    /// Derives the deterministic identity.
    ///
    /// The event pair is sorted so detection from either side yields the
    /// same id.
    pub fn identity(kind: ConflictKind, event_ids: &[String], resource: &ResourceRef) -> String {
        let mut ids: Vec<&str> = event_ids.iter().map(String::as_str).collect();
        ids.sort_unstable();
        format!("{}:{}:{}", kind.tag(), ids.join("+"), resource)
    }

    /// The event paired with `event_id`, if this is a two-event conflict.
    pub fn other_event(&self, event_id: &str) -> Option<&str> {
        self.event_ids
            .iter()
            .map(String::as_str)
            .find(|id| *id != event_id)
    }

    /// Whether the conflict references the given event.
    pub fn references(&self, event_id: &str) -> bool {
        self.event_ids.iter().any(|id| id == event_id)
    }
}

/// Query filter for stored conflicts.
#[derive(Debug, Clone, Default)]
pub struct ConflictFilter {
    /// Restrict to a severity.
    pub severity: Option<Severity>,
    /// Restrict to a status.
    pub status: Option<ConflictStatus>,
    /// Restrict to conflicts whose contested region overlaps this range.
    pub window: Option<TimeWindow>,
}

impl ConflictFilter {
    /// Matches everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts to a severity.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Restricts to a status.
    pub fn with_status(mut self, status: ConflictStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Restricts to a date range.
    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = Some(window);
        self
    }

    /// Whether a conflict passes this filter.
    pub fn matches(&self, conflict: &Conflict) -> bool {
        if let Some(sev) = self.severity {
            if conflict.severity != sev {
                return false;
            }
        }
        if let Some(status) = self.status {
            if conflict.status != status {
                return false;
            }
        }
        if let Some(window) = &self.window {
            if !conflict.window.overlaps(window) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn window() -> TimeWindow {
        TimeWindow::new(
            Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 10, 10, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_identity_is_order_independent() {
        let r = ResourceRef::Coach("C1".into());
        let a = Conflict::identity(
            ConflictKind::CoachConflict,
            &["E1".into(), "E2".into()],
            &r,
        );
        let b = Conflict::identity(
            ConflictKind::CoachConflict,
            &["E2".into(), "E1".into()],
            &r,
        );
        assert_eq!(a, b);
        assert_eq!(a, "coach_conflict:E1+E2:coach:C1");
    }

    #[test]
    fn test_identity_distinguishes_kind_and_resource() {
        let ids: Vec<String> = vec!["E1".into(), "E2".into()];
        let a = Conflict::identity(
            ConflictKind::CoachConflict,
            &ids,
            &ResourceRef::Coach("C1".into()),
        );
        let b = Conflict::identity(
            ConflictKind::PlayerConflict,
            &ids,
            &ResourceRef::Player("C1".into()),
        );
        assert_ne!(a, b);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_other_event() {
        let c = Conflict::new(
            ConflictKind::CoachConflict,
            vec!["E1".into(), "E2".into()],
            ResourceRef::Coach("C1".into()),
            window(),
            Severity::Medium,
        );
        assert_eq!(c.other_event("E1"), Some("E2"));
        assert_eq!(c.other_event("E2"), Some("E1"));
        assert!(c.references("E1"));
        assert!(!c.references("E3"));
    }

    #[test]
    fn test_filter() {
        let mut c = Conflict::new(
            ConflictKind::DoubleBooking,
            vec!["E1".into(), "E2".into()],
            ResourceRef::Facility("F1".into()),
            window(),
            Severity::High,
        );

        assert!(ConflictFilter::all().matches(&c));
        assert!(ConflictFilter::all()
            .with_severity(Severity::High)
            .matches(&c));
        assert!(!ConflictFilter::all()
            .with_severity(Severity::Low)
            .matches(&c));
        assert!(ConflictFilter::all()
            .with_status(ConflictStatus::Pending)
            .matches(&c));

        c.status = ConflictStatus::Resolved;
        assert!(!ConflictFilter::all()
            .with_status(ConflictStatus::Pending)
            .matches(&c));

        let far = TimeWindow::new(
            Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 4, 2, 0, 0, 0).unwrap(),
        );
        assert!(!ConflictFilter::all().with_window(far).matches(&c));
    }
}
