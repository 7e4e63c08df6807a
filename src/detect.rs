//! Conflict detection.
//!
//! Pure classification of a candidate event against the booking index:
//! given the candidate, the closures of its facility, and the index, the
//! detector returns zero or more conflict records and never mutates
//! shared state. Callers persist the records and keep the index in sync.
//!
//! # Severity Rule
//!
//! Deterministic, no randomness. `High` if the kind is `DoubleBooking` or
//! `FacilityUnavailable`, or if the overlap covers at least
//! `high_overlap_threshold` (default 50%) of the shorter event; `Medium`
//! from `medium_overlap_threshold` (default 10%); `Low` otherwise.
//! Boundaries resolve toward the higher severity.
//!
//! # Auto-Resolution Policy
//!
//! Only coach and player conflicts are auto-resolvable, and only when a
//! zero-conflict alternative window exists within the look-ahead bound
//! (default 7 days, stepped by 30 minutes). Double bookings and facility
//! closures always require a human decision: they imply an irreversible
//! double commitment of a physical space.

use chrono::Duration;

use crate::index::BookingIndex;
use crate::models::{
    Conflict, ConflictKind, Event, ResourceRef, Severity, SuggestedMove, TimeWindow,
};

/// Configurable detection and search constants.
///
/// The thresholds are policy, not law — see the crate docs. Defaults match
/// the reference behavior: 50% / 10% severity cut-offs, 7-day look-ahead,
/// 30-minute search step.
#[derive(Debug, Clone)]
pub struct DetectionPolicy {
    /// Overlap fraction (of the shorter event) at or above which a
    /// person-dimension conflict is `High`.
    pub high_overlap_threshold: f64,
    /// Overlap fraction at or above which a conflict is `Medium`.
    pub medium_overlap_threshold: f64,
    /// How far forward the alternative-window search may look.
    pub look_ahead: Duration,
    /// Increment between candidate windows in the search.
    pub search_step: Duration,
}

impl Default for DetectionPolicy {
    fn default() -> Self {
        Self {
            high_overlap_threshold: 0.50,
            medium_overlap_threshold: 0.10,
            look_ahead: Duration::days(7),
            search_step: Duration::minutes(30),
        }
    }
}

impl DetectionPolicy {
    /// Sets the severity thresholds.
    pub fn with_thresholds(mut self, high: f64, medium: f64) -> Self {
        self.high_overlap_threshold = high;
        self.medium_overlap_threshold = medium;
        self
    }

    /// Sets the look-ahead bound.
    pub fn with_look_ahead(mut self, look_ahead: Duration) -> Self {
        self.look_ahead = look_ahead;
        self
    }

    /// Sets the search step.
    pub fn with_search_step(mut self, step: Duration) -> Self {
        self.search_step = step;
        self
    }

    /// Derives severity from kind and overlap fraction.
    pub fn severity_for(&self, kind: ConflictKind, overlap_fraction: f64) -> Severity {
        if matches!(
            kind,
            ConflictKind::DoubleBooking | ConflictKind::FacilityUnavailable
        ) {
            return Severity::High;
        }
        if overlap_fraction >= self.high_overlap_threshold {
            Severity::High
        } else if overlap_fraction >= self.medium_overlap_threshold {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    /// Whether policy permits automatic resolution for this conflict kind.
    ///
    /// Person conflicts may be moved by the engine at any severity;
    /// contested physical space never is.
    pub fn eligible_for_auto_resolution(&self, kind: ConflictKind) -> bool {
        matches!(
            kind,
            ConflictKind::CoachConflict | ConflictKind::PlayerConflict
        )
    }
}

/// Pure conflict detector.
#[derive(Debug, Clone, Default)]
pub struct ConflictDetector {
    policy: DetectionPolicy,
}

impl ConflictDetector {
    /// Creates a detector with the default policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a detector with an explicit policy.
    pub fn with_policy(policy: DetectionPolicy) -> Self {
        Self { policy }
    }

    /// The active policy.
    pub fn policy(&self) -> &DetectionPolicy {
        &self.policy
    }

    /// Detects conflicts for a candidate event.
    ///
    /// `facility_closures` are the closure windows of the candidate's
    /// facility over the whole look-ahead horizon (an external fact — the
    /// detector never computes closures). A candidate with zero overlaps
    /// returns an empty vec; an inactive candidate never conflicts.
    ///
    /// Eligible conflicts get their auto-resolvable flag and a suggested
    /// move when a clear alternative window exists within the look-ahead.
    pub fn detect(
        &self,
        candidate: &Event,
        facility_closures: &[TimeWindow],
        index: &BookingIndex,
    ) -> Vec<Conflict> {
        let mut conflicts = self.classify(candidate, facility_closures, index);
        if conflicts.is_empty() {
            return conflicts;
        }

        // One search serves every eligible conflict: the proposal always
        // moves the candidate itself.
        let mut suggestion: Option<SuggestedMove> = None;
        let mut searched = false;

        for conflict in &mut conflicts {
            if !self.policy.eligible_for_auto_resolution(conflict.kind) {
                continue;
            }
            if !searched {
                searched = true;
                suggestion = self
                    .find_clear_window(candidate, facility_closures, index)
                    .map(|window| SuggestedMove {
                        event_id: candidate.id.clone(),
                        window,
                        note: format!(
                            "Move '{}' to {} - {}",
                            candidate.id, window.start, window.end
                        ),
                    });
            }
            if let Some(s) = &suggestion {
                *conflict = conflict.clone().with_suggestion(s.clone());
            }
        }
        conflicts
    }

    /// Classifies overlaps without computing auto-resolution flags.
    ///
    /// Each shared resource dimension against each overlapping event
    /// yields its own record — overlaps on several dimensions with the
    /// same other event are not merged, preserving auditability.
    pub fn classify(
        &self,
        candidate: &Event,
        facility_closures: &[TimeWindow],
        index: &BookingIndex,
    ) -> Vec<Conflict> {
        if !candidate.is_active() {
            return Vec::new();
        }

        let mut conflicts = Vec::new();

        // Facility closure: a single-event conflict.
        if let Some(closure) = facility_closures
            .iter()
            .find(|c| c.overlaps(&candidate.window))
        {
            let region = TimeWindow::new(
                candidate.window.start.max(closure.start),
                candidate.window.end.min(closure.end),
            );
            conflicts.push(
                Conflict::new(
                    ConflictKind::FacilityUnavailable,
                    vec![candidate.id.clone()],
                    ResourceRef::Facility(candidate.facility_id.clone()),
                    region,
                    Severity::High,
                )
                .with_description(format!(
                    "Facility '{}' is closed during '{}' ({} - {})",
                    candidate.facility_id, candidate.id, region.start, region.end
                )),
            );
        }

        for resource in candidate.resource_refs() {
            // The team dimension is ownership, not a booking; a team may
            // hold back-to-back events and overlapping team events already
            // surface through coach/player/facility dimensions.
            let kind = match &resource {
                ResourceRef::Facility(_) => ConflictKind::DoubleBooking,
                ResourceRef::Coach(_) => ConflictKind::CoachConflict,
                ResourceRef::Player(_) => ConflictKind::PlayerConflict,
                ResourceRef::Equipment(_) => ConflictKind::ResourceConflict,
                ResourceRef::Team(_) => continue,
            };

            for other in index.overlapping(&resource, &candidate.window, &candidate.id) {
                let fraction = candidate
                    .window
                    .overlap_fraction_of_shorter(&other.window);
                let severity = self.policy.severity_for(kind, fraction);
                let region = TimeWindow::new(
                    candidate.window.start.max(other.window.start),
                    candidate.window.end.min(other.window.end),
                );
                conflicts.push(
                    Conflict::new(
                        kind,
                        vec![candidate.id.clone(), other.id.clone()],
                        resource.clone(),
                        region,
                        severity,
                    )
                    .with_description(describe(kind, &resource, candidate, other)),
                );
            }
        }

        conflicts
    }

    /// Whether the event, placed at `window`, would be conflict-free.
    pub fn is_clear(
        &self,
        event: &Event,
        window: TimeWindow,
        facility_closures: &[TimeWindow],
        index: &BookingIndex,
    ) -> bool {
        let mut moved = event.clone();
        moved.window = window;
        self.classify(&moved, facility_closures, index).is_empty()
    }

    /// First conflict-free window within the look-ahead bound.
    ///
    /// Steps forward from the event's current window in `search_step`
    /// increments. Returns `None` when no window inside the bound is clear
    /// — an expected negative result, not an error.
    pub fn find_clear_window(
        &self,
        event: &Event,
        facility_closures: &[TimeWindow],
        index: &BookingIndex,
    ) -> Option<TimeWindow> {
        self.clear_windows(event, facility_closures, index)
            .into_iter()
            .next()
    }

    /// Every conflict-free window within the look-ahead bound, earliest
    /// first. Used by the resolution engine to apply availability bias.
    pub fn clear_windows(
        &self,
        event: &Event,
        facility_closures: &[TimeWindow],
        index: &BookingIndex,
    ) -> Vec<TimeWindow> {
        let step_ms = self.policy.search_step.num_milliseconds();
        if step_ms <= 0 {
            return Vec::new();
        }
        let steps = self.policy.look_ahead.num_milliseconds() / step_ms;
        let mut clear = Vec::new();
        for i in 1..=steps {
            let window = event.window.shifted(Duration::milliseconds(step_ms * i));
            if self.is_clear(event, window, facility_closures, index) {
                clear.push(window);
            }
        }
        clear
    }
}

fn describe(kind: ConflictKind, resource: &ResourceRef, candidate: &Event, other: &Event) -> String {
    match kind {
        ConflictKind::DoubleBooking => format!(
            "Facility '{}' is double-booked by '{}' and '{}'",
            resource.id(),
            candidate.id,
            other.id
        ),
        ConflictKind::CoachConflict => format!(
            "Coach '{}' is committed to both '{}' and '{}'",
            resource.id(),
            candidate.id,
            other.id
        ),
        ConflictKind::PlayerConflict => format!(
            "Player '{}' is required by both '{}' and '{}'",
            resource.id(),
            candidate.id,
            other.id
        ),
        ConflictKind::ResourceConflict => format!(
            "Equipment '{}' is double-committed by '{}' and '{}'",
            resource.id(),
            candidate.id,
            other.id
        ),
        ConflictKind::FacilityUnavailable => format!(
            "Facility '{}' is unavailable for '{}'",
            resource.id(),
            candidate.id
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventStatus, EventType};
    use chrono::{TimeZone, Utc};

    fn window(start_hour: u32, start_min: u32, end_hour: u32, end_min: u32) -> TimeWindow {
        TimeWindow::new(
            Utc.with_ymd_and_hms(2025, 3, 10, start_hour, start_min, 0)
                .unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 10, end_hour, end_min, 0)
                .unwrap(),
        )
    }

    fn event(id: &str, facility: &str, coach: &str, w: TimeWindow) -> Event {
        Event::new(id, EventType::Practice, w)
            .with_facility(facility)
            .with_coach(coach)
    }

    #[test]
    fn test_disjoint_events_no_conflict() {
        let mut index = BookingIndex::new();
        index.insert(event("E1", "F1", "C1", window(9, 0, 10, 0)));

        let detector = ConflictDetector::new();
        let candidate = event("E2", "F2", "C2", window(9, 0, 10, 0))
            .with_player("P1");
        assert!(detector.detect(&candidate, &[], &index).is_empty());

        // Same resources, disjoint windows
        let candidate = event("E3", "F1", "C1", window(11, 0, 12, 0));
        assert!(detector.detect(&candidate, &[], &index).is_empty());
    }

    #[test]
    fn test_double_booking_always_high_not_auto() {
        let mut index = BookingIndex::new();
        index.insert(event("E1", "F1", "C1", window(9, 0, 10, 0)));

        let detector = ConflictDetector::new();
        // Identical window at the same facility, different coach
        let candidate = event("E2", "F1", "C2", window(9, 0, 10, 0));
        let conflicts = detector.detect(&candidate, &[], &index);

        assert_eq!(conflicts.len(), 1);
        let c = &conflicts[0];
        assert_eq!(c.kind, ConflictKind::DoubleBooking);
        assert_eq!(c.severity, Severity::High);
        assert!(!c.auto_resolvable);
        assert!(c.suggested_resolution.is_none());
    }

    #[test]
    fn test_coach_conflict_scenario_50_percent() {
        // Event A: coach X, facility F, 09:00-10:00.
        // Event B: coach X, facility G, 09:30-10:30 → 50% overlap of the
        // 60-minute events → High, still auto-resolvable (person conflict).
        let mut index = BookingIndex::new();
        index.insert(event("A", "F", "X", window(9, 0, 10, 0)));

        let detector = ConflictDetector::new();
        let candidate = event("B", "G", "X", window(9, 30, 10, 30));
        let conflicts = detector.detect(&candidate, &[], &index);

        assert_eq!(conflicts.len(), 1);
        let c = &conflicts[0];
        assert_eq!(c.kind, ConflictKind::CoachConflict);
        assert_eq!(c.severity, Severity::High); // exactly 50% resolves upward
        assert!(c.auto_resolvable);
        // First clear step: 10:00-11:00 touches A without overlapping
        let s = c.suggested_resolution.as_ref().unwrap();
        assert_eq!(s.event_id, "B");
        assert_eq!(s.window, window(10, 0, 11, 0));
    }

    #[test]
    fn test_severity_boundaries() {
        let policy = DetectionPolicy::default();
        assert_eq!(
            policy.severity_for(ConflictKind::CoachConflict, 0.50),
            Severity::High
        );
        assert_eq!(
            policy.severity_for(ConflictKind::CoachConflict, 0.49),
            Severity::Medium
        );
        assert_eq!(
            policy.severity_for(ConflictKind::CoachConflict, 0.10),
            Severity::Medium
        );
        assert_eq!(
            policy.severity_for(ConflictKind::CoachConflict, 0.09),
            Severity::Low
        );
        // Kind overrides fraction
        assert_eq!(
            policy.severity_for(ConflictKind::DoubleBooking, 0.0),
            Severity::High
        );
        assert_eq!(
            policy.severity_for(ConflictKind::FacilityUnavailable, 0.0),
            Severity::High
        );
    }

    #[test]
    fn test_medium_coach_conflict_auto_resolvable_with_suggestion() {
        // 15 min of a 60-min event → 25% → Medium
        let mut index = BookingIndex::new();
        index.insert(event("A", "F", "X", window(9, 0, 10, 0)));

        let detector = ConflictDetector::new();
        let candidate = event("B", "G", "X", window(9, 45, 10, 45));
        let conflicts = detector.detect(&candidate, &[], &index);

        assert_eq!(conflicts.len(), 1);
        let c = &conflicts[0];
        assert_eq!(c.severity, Severity::Medium);
        assert!(c.auto_resolvable);
        let s = c.suggested_resolution.as_ref().unwrap();
        assert_eq!(s.event_id, "B");
        // First clear step: 10:15-11:15 overlaps nothing
        assert_eq!(s.window, window(10, 15, 11, 15));
    }

    #[test]
    fn test_facility_unavailable() {
        let index = BookingIndex::new();
        let detector = ConflictDetector::new();
        let candidate = event("E1", "F1", "C1", window(9, 0, 10, 0));
        let closures = vec![window(9, 30, 11, 0)];

        let conflicts = detector.detect(&candidate, &closures, &index);
        assert_eq!(conflicts.len(), 1);
        let c = &conflicts[0];
        assert_eq!(c.kind, ConflictKind::FacilityUnavailable);
        assert_eq!(c.severity, Severity::High);
        assert!(!c.auto_resolvable);
        assert_eq!(c.event_ids, vec!["E1".to_string()]);
        assert_eq!(c.window, window(9, 30, 10, 0));
    }

    #[test]
    fn test_multiple_dimensions_multiple_records() {
        // Same pair conflicting on facility AND coach AND one player
        let mut index = BookingIndex::new();
        index.insert(
            event("E1", "F1", "C1", window(9, 0, 10, 0)).with_player("P1"),
        );

        let detector = ConflictDetector::new();
        let candidate = event("E2", "F1", "C1", window(9, 0, 10, 0)).with_player("P1");
        let conflicts = detector.detect(&candidate, &[], &index);

        let kinds: Vec<ConflictKind> = conflicts.iter().map(|c| c.kind).collect();
        assert!(kinds.contains(&ConflictKind::DoubleBooking));
        assert!(kinds.contains(&ConflictKind::CoachConflict));
        assert!(kinds.contains(&ConflictKind::PlayerConflict));
        assert_eq!(conflicts.len(), 3);
    }

    #[test]
    fn test_cancelled_other_event_not_a_conflict() {
        let mut index = BookingIndex::new();
        index.insert(
            event("E1", "F1", "C1", window(9, 0, 10, 0)).with_status(EventStatus::Cancelled),
        );

        let detector = ConflictDetector::new();
        let candidate = event("E2", "F1", "C1", window(9, 0, 10, 0));
        assert!(detector.detect(&candidate, &[], &index).is_empty());
    }

    #[test]
    fn test_detection_is_idempotent() {
        let mut index = BookingIndex::new();
        index.insert(event("E1", "F1", "C1", window(9, 0, 10, 0)).with_player("P1"));

        let detector = ConflictDetector::new();
        let candidate = event("E2", "F1", "C1", window(9, 30, 10, 30)).with_player("P1");

        let first = detector.detect(&candidate, &[], &index);
        let second = detector.detect(&candidate, &[], &index);
        assert_eq!(first, second);
        // Identities are stable across runs
        let ids_a: Vec<&str> = first.iter().map(|c| c.id.as_str()).collect();
        let ids_b: Vec<&str> = second.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn test_no_clear_window_not_auto_resolvable() {
        // Saturate the coach for the whole look-ahead so no alternative
        // window exists.
        let mut index = BookingIndex::new();
        index.insert(event("A", "F", "X", window(9, 0, 10, 0)));
        let start = Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap();
        index.insert(event(
            "BLOCK",
            "F2",
            "X",
            TimeWindow::new(start, start + Duration::days(9)),
        ));

        let detector = ConflictDetector::new();
        let candidate = event("B", "G", "X", window(9, 45, 10, 45));
        let conflicts = detector.detect(&candidate, &[], &index);

        // Medium against A, High (full containment) against BLOCK
        let medium = conflicts
            .iter()
            .find(|c| c.references("A"))
            .unwrap();
        assert_eq!(medium.severity, Severity::Medium);
        assert!(!medium.auto_resolvable);
        assert!(medium.suggested_resolution.is_none());
    }

    #[test]
    fn test_clear_window_skips_closures() {
        let mut index = BookingIndex::new();
        index.insert(event("A", "F", "X", window(9, 0, 10, 0)));

        let detector = ConflictDetector::new();
        let candidate = event("B", "G", "X", window(9, 45, 10, 45));
        // Facility G closed 10:00-14:00: the earliest clear window must
        // start at or after 14:00.
        let closures = vec![window(10, 0, 14, 0)];
        let found = detector
            .find_clear_window(&candidate, &closures, &index)
            .unwrap();
        assert!(found.start >= Utc.with_ymd_and_hms(2025, 3, 10, 14, 0, 0).unwrap());
    }

    #[test]
    fn test_search_only_shifts_forward() {
        let mut index = BookingIndex::new();
        index.insert(event("A", "F", "X", window(9, 0, 10, 0)));

        // A fine step over a long horizon must still produce strictly
        // increasing, duration-preserving candidate windows.
        let policy = DetectionPolicy::default()
            .with_look_ahead(Duration::days(2))
            .with_search_step(Duration::minutes(5));
        let detector = ConflictDetector::with_policy(policy);
        let candidate = event("B", "G", "X", window(9, 30, 10, 30));

        let windows = detector.clear_windows(&candidate, &[], &index);
        assert!(!windows.is_empty());
        let mut previous = candidate.window.start;
        for w in windows {
            assert!(w.start > previous);
            assert_eq!(w.duration(), candidate.window.duration());
            previous = w.start;
        }
    }

    #[test]
    fn test_inactive_candidate_never_conflicts() {
        let mut index = BookingIndex::new();
        index.insert(event("E1", "F1", "C1", window(9, 0, 10, 0)));

        let detector = ConflictDetector::new();
        let candidate =
            event("E2", "F1", "C1", window(9, 0, 10, 0)).with_status(EventStatus::Cancelled);
        assert!(detector.detect(&candidate, &[], &index).is_empty());
    }
}
