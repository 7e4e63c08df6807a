//! Event and conflict persistence.
//!
//! The engine never retries storage failures internally: transient errors
//! ([`StorageUnavailable`](crate::SchedulerError::StorageUnavailable),
//! [`Stale`](crate::SchedulerError::Stale)) surface to the caller, which
//! owns the retry policy. Writes use optimistic concurrency — every event
//! carries a version token, and a save whose token does not match the
//! stored one fails with `Stale` without touching state.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::{Result, SchedulerError};
use crate::models::{
    Conflict, ConflictFilter, ConflictStatus, Event, EventStatus, FacilityCalendar, ResourceRef,
    TimeWindow,
};

/// Conflict-table changes applied atomically with an event write.
#[derive(Debug, Clone, Default)]
pub struct ConflictUpdates {
    /// Conflict ids to delete.
    pub remove: Vec<String>,
    /// Conflict records to insert or replace.
    pub upsert: Vec<Conflict>,
}

impl ConflictUpdates {
    /// No changes.
    pub fn none() -> Self {
        Self::default()
    }

    /// Adds ids to delete.
    pub fn removing<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.remove.extend(ids);
        self
    }

    /// Adds records to insert or replace.
    pub fn upserting<I>(mut self, conflicts: I) -> Self
    where
        I: IntoIterator<Item = Conflict>,
    {
        self.upsert.extend(conflicts);
        self
    }
}

/// Commit-time re-validation hook.
///
/// Runs under the store's write lock, immediately before an atomic save
/// applies, against the full current event set. Returning `false` aborts
/// the save with `Stale` — this is how a commit verifies that the window
/// it validated against a snapshot is still clear at apply time.
pub type CommitCheck<'a> = &'a (dyn Fn(&[Event]) -> bool + 'a);

/// Storage boundary for events and conflicts.
pub trait EventStore: Send + Sync {
    /// Looks up an event by id.
    fn event(&self, event_id: &str) -> Result<Option<Event>>;

    /// All stored events, ordered by window start then id.
    fn events(&self) -> Result<Vec<Event>>;

    /// Events whose windows overlap `window`, ordered by start then id.
    fn events_in_window(&self, window: &TimeWindow) -> Result<Vec<Event>>;

    /// Events committing `resource` whose windows overlap `window`,
    /// ordered by start then id.
    fn events_for_resource(
        &self,
        resource: &ResourceRef,
        window: &TimeWindow,
    ) -> Result<Vec<Event>>;

    /// Inserts a new event at version 0, together with its conflict-table
    /// changes, as one atomic step.
    ///
    /// # Errors
    /// `PreconditionFailed` if an event with the same id already exists;
    /// neither side is written on failure.
    fn insert_event(&self, event: Event, updates: ConflictUpdates) -> Result<()>;

    /// Persists an event mutation and its conflict-table changes as one
    /// atomic step.
    ///
    /// The write succeeds only if `event.version` matches the stored
    /// version; on success the version is bumped and returned. When a
    /// `check` is supplied it runs under the write lock after the version
    /// checks — a `false` verdict aborts the save with `Stale`. Either the
    /// event and every conflict update land together, or nothing does.
    ///
    /// # Errors
    /// - `NotFound` if the event does not exist.
    /// - `Stale` on a version mismatch or a failed commit check.
    /// - `PreconditionFailed` if the event is `Completed` and the save
    ///   changes its window.
    fn save_event_atomic(
        &self,
        event: &Event,
        updates: ConflictUpdates,
        check: Option<CommitCheck<'_>>,
    ) -> Result<u64>;

    /// Inserts or replaces conflict records.
    ///
    /// Upserting over an `Ignored` record keeps it ignored — a human
    /// dismissal survives re-detection of the same conflict.
    fn put_conflicts(&self, conflicts: Vec<Conflict>) -> Result<()>;

    /// Looks up a conflict by id.
    fn conflict(&self, conflict_id: &str) -> Result<Option<Conflict>>;

    /// Stored conflicts passing the filter, ordered by id.
    fn conflicts(&self, filter: &ConflictFilter) -> Result<Vec<Conflict>>;

    /// Sets a conflict's lifecycle status.
    ///
    /// # Errors
    /// `NotFound` if the conflict does not exist.
    fn set_conflict_status(&self, conflict_id: &str, status: ConflictStatus) -> Result<()>;

    /// Deletes conflict records. Unknown ids are ignored.
    fn remove_conflicts(&self, conflict_ids: &[String]) -> Result<()>;
}

/// Shared registry of facility calendars.
///
/// Closures are external reference data, not engine state: the directory
/// is written by whoever administers facilities and read by detection and
/// resolution. A facility with no calendar is always open.
#[derive(Debug, Default)]
pub struct FacilityDirectory {
    calendars: RwLock<HashMap<String, FacilityCalendar>>,
}

impl FacilityDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs or replaces a facility's calendar.
    pub fn set(&self, calendar: FacilityCalendar) {
        self.calendars
            .write()
            .insert(calendar.facility_id.clone(), calendar);
    }

    /// All closure windows for a facility. Empty for unknown facilities.
    pub fn closures(&self, facility_id: &str) -> Vec<TimeWindow> {
        self.calendars
            .read()
            .get(facility_id)
            .map(|c| c.closures.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct StoreState {
    events: HashMap<String, Event>,
    conflicts: HashMap<String, Conflict>,
    unavailable: bool,
}

/// In-memory store guarded by a single lock.
///
/// The one-lock design is what makes `save_event_atomic` atomic: readers
/// see either the full write or none of it. The `set_unavailable` switch
/// simulates an outage for failure-path tests.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    state: RwLock<StoreState>,
}

impl InMemoryEventStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggles the simulated outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unavailable = unavailable;
    }

    fn check_available(state: &StoreState) -> Result<()> {
        if state.unavailable {
            Err(SchedulerError::StorageUnavailable(
                "event store is unavailable".into(),
            ))
        } else {
            Ok(())
        }
    }
}

fn sort_events(events: &mut [Event]) {
    events.sort_by(|a, b| {
        a.window
            .start
            .cmp(&b.window.start)
            .then_with(|| a.id.cmp(&b.id))
    });
}

impl EventStore for InMemoryEventStore {
    fn event(&self, event_id: &str) -> Result<Option<Event>> {
        let state = self.state.read();
        Self::check_available(&state)?;
        Ok(state.events.get(event_id).cloned())
    }

    fn events(&self) -> Result<Vec<Event>> {
        let state = self.state.read();
        Self::check_available(&state)?;
        let mut events: Vec<Event> = state.events.values().cloned().collect();
        sort_events(&mut events);
        Ok(events)
    }

    fn events_in_window(&self, window: &TimeWindow) -> Result<Vec<Event>> {
        let state = self.state.read();
        Self::check_available(&state)?;
        let mut events: Vec<Event> = state
            .events
            .values()
            .filter(|e| e.window.overlaps(window))
            .cloned()
            .collect();
        sort_events(&mut events);
        Ok(events)
    }

    fn events_for_resource(
        &self,
        resource: &ResourceRef,
        window: &TimeWindow,
    ) -> Result<Vec<Event>> {
        let state = self.state.read();
        Self::check_available(&state)?;
        let mut events: Vec<Event> = state
            .events
            .values()
            .filter(|e| e.window.overlaps(window) && e.resource_refs().contains(resource))
            .cloned()
            .collect();
        sort_events(&mut events);
        Ok(events)
    }

    fn insert_event(&self, event: Event, updates: ConflictUpdates) -> Result<()> {
        let mut state = self.state.write();
        Self::check_available(&state)?;
        if state.events.contains_key(&event.id) {
            return Err(SchedulerError::PreconditionFailed(format!(
                "event '{}' already exists",
                event.id
            )));
        }
        state.events.insert(event.id.clone(), event);
        for id in &updates.remove {
            state.conflicts.remove(id);
        }
        for conflict in updates.upsert {
            upsert_conflict(&mut state.conflicts, conflict);
        }
        Ok(())
    }

    fn save_event_atomic(
        &self,
        event: &Event,
        updates: ConflictUpdates,
        check: Option<CommitCheck<'_>>,
    ) -> Result<u64> {
        let mut state = self.state.write();
        Self::check_available(&state)?;

        let stored = state.events.get(&event.id).ok_or_else(|| {
            SchedulerError::NotFound(format!("event '{}' not found", event.id))
        })?;
        if stored.version != event.version {
            return Err(SchedulerError::Stale(format!(
                "event '{}' is at version {}, save expected {}",
                event.id, stored.version, event.version
            )));
        }
        if stored.status == EventStatus::Completed && stored.window != event.window {
            return Err(SchedulerError::PreconditionFailed(format!(
                "event '{}' is completed; its window is immutable",
                event.id
            )));
        }
        if let Some(check) = check {
            let mut current: Vec<Event> = state.events.values().cloned().collect();
            sort_events(&mut current);
            if !check(&current) {
                return Err(SchedulerError::Stale(format!(
                    "commit re-validation failed for event '{}'",
                    event.id
                )));
            }
        }

        // Point of no return: all checks passed, apply everything.
        let new_version = event.version + 1;
        let mut saved = event.clone();
        saved.version = new_version;
        state.events.insert(saved.id.clone(), saved);

        for id in &updates.remove {
            state.conflicts.remove(id);
        }
        for conflict in updates.upsert {
            upsert_conflict(&mut state.conflicts, conflict);
        }
        Ok(new_version)
    }

    fn put_conflicts(&self, conflicts: Vec<Conflict>) -> Result<()> {
        let mut state = self.state.write();
        Self::check_available(&state)?;
        for conflict in conflicts {
            upsert_conflict(&mut state.conflicts, conflict);
        }
        Ok(())
    }

    fn conflict(&self, conflict_id: &str) -> Result<Option<Conflict>> {
        let state = self.state.read();
        Self::check_available(&state)?;
        Ok(state.conflicts.get(conflict_id).cloned())
    }

    fn conflicts(&self, filter: &ConflictFilter) -> Result<Vec<Conflict>> {
        let state = self.state.read();
        Self::check_available(&state)?;
        let mut conflicts: Vec<Conflict> = state
            .conflicts
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        conflicts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(conflicts)
    }

    fn set_conflict_status(&self, conflict_id: &str, status: ConflictStatus) -> Result<()> {
        let mut state = self.state.write();
        Self::check_available(&state)?;
        let conflict = state.conflicts.get_mut(conflict_id).ok_or_else(|| {
            SchedulerError::NotFound(format!("conflict '{conflict_id}' not found"))
        })?;
        conflict.status = status;
        Ok(())
    }

    fn remove_conflicts(&self, conflict_ids: &[String]) -> Result<()> {
        let mut state = self.state.write();
        Self::check_available(&state)?;
        for id in conflict_ids {
            state.conflicts.remove(id);
        }
        Ok(())
    }
}

fn upsert_conflict(table: &mut HashMap<String, Conflict>, mut conflict: Conflict) {
    if let Some(existing) = table.get(&conflict.id) {
        if existing.status == ConflictStatus::Ignored {
            conflict.status = ConflictStatus::Ignored;
        }
    }
    table.insert(conflict.id.clone(), conflict);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConflictKind, EventType, ResourceRef, Severity};
    use chrono::{TimeZone, Utc};

    fn window(start_hour: u32, end_hour: u32) -> TimeWindow {
        TimeWindow::new(
            Utc.with_ymd_and_hms(2025, 3, 10, start_hour, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 10, end_hour, 0, 0).unwrap(),
        )
    }

    fn event(id: &str, w: TimeWindow) -> Event {
        Event::new(id, EventType::Practice, w)
            .with_facility("F1")
            .with_coach("C1")
    }

    fn conflict(a: &str, b: &str) -> Conflict {
        Conflict::new(
            ConflictKind::CoachConflict,
            vec![a.to_string(), b.to_string()],
            ResourceRef::Coach("C1".into()),
            window(9, 10),
            Severity::Medium,
        )
    }

    #[test]
    fn test_insert_and_lookup() {
        let store = InMemoryEventStore::new();
        store
            .insert_event(event("E1", window(9, 10)), ConflictUpdates::none())
            .unwrap();
        assert!(store.event("E1").unwrap().is_some());
        assert!(store.event("E2").unwrap().is_none());
    }

    #[test]
    fn test_insert_duplicate_rejected() {
        let store = InMemoryEventStore::new();
        store
            .insert_event(event("E1", window(9, 10)), ConflictUpdates::none())
            .unwrap();
        let err = store
            .insert_event(event("E1", window(11, 12)), ConflictUpdates::none())
            .unwrap_err();
        assert!(matches!(err, SchedulerError::PreconditionFailed(_)));
    }

    #[test]
    fn test_save_bumps_version() {
        let store = InMemoryEventStore::new();
        store
            .insert_event(event("E1", window(9, 10)), ConflictUpdates::none())
            .unwrap();

        let mut e = store.event("E1").unwrap().unwrap();
        e.window = window(11, 12);
        let v = store
            .save_event_atomic(&e, ConflictUpdates::none(), None)
            .unwrap();
        assert_eq!(v, 1);
        assert_eq!(store.event("E1").unwrap().unwrap().version, 1);
    }

    #[test]
    fn test_stale_save_leaves_state_unchanged() {
        let store = InMemoryEventStore::new();
        store
            .insert_event(event("E1", window(9, 10)), ConflictUpdates::none())
            .unwrap();

        let mut first = store.event("E1").unwrap().unwrap();
        let mut second = first.clone();

        first.window = window(11, 12);
        store
            .save_event_atomic(&first, ConflictUpdates::none(), None)
            .unwrap();

        // Second writer still holds version 0
        second.window = window(13, 14);
        let err = store
            .save_event_atomic(
                &second,
                ConflictUpdates::none().upserting([conflict("E1", "E2")]),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Stale(_)));
        assert!(err.is_retryable());

        // Neither the event nor the conflict table changed
        let stored = store.event("E1").unwrap().unwrap();
        assert_eq!(stored.window, window(11, 12));
        assert!(store.conflicts(&ConflictFilter::all()).unwrap().is_empty());
    }

    #[test]
    fn test_completed_window_is_immutable() {
        let store = InMemoryEventStore::new();
        store
            .insert_event(
                event("E1", window(9, 10)).with_status(EventStatus::Completed),
                ConflictUpdates::none(),
            )
            .unwrap();

        let mut e = store.event("E1").unwrap().unwrap();
        e.window = window(11, 12);
        let err = store
            .save_event_atomic(&e, ConflictUpdates::none(), None)
            .unwrap_err();
        assert!(matches!(err, SchedulerError::PreconditionFailed(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_atomic_conflict_updates() {
        let store = InMemoryEventStore::new();
        store
            .insert_event(event("E1", window(9, 10)), ConflictUpdates::none())
            .unwrap();
        let old = conflict("E1", "E2");
        store.put_conflicts(vec![old.clone()]).unwrap();

        let mut e = store.event("E1").unwrap().unwrap();
        e.window = window(11, 12);
        let new = conflict("E1", "E3");
        store
            .save_event_atomic(
                &e,
                ConflictUpdates::none()
                    .removing([old.id.clone()])
                    .upserting([new.clone()]),
                None,
            )
            .unwrap();

        let stored = store.conflicts(&ConflictFilter::all()).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, new.id);
    }

    #[test]
    fn test_ignored_status_survives_redetection() {
        let store = InMemoryEventStore::new();
        let c = conflict("E1", "E2");
        store.put_conflicts(vec![c.clone()]).unwrap();
        store
            .set_conflict_status(&c.id, ConflictStatus::Ignored)
            .unwrap();

        // Re-detection upserts the same record as pending
        store.put_conflicts(vec![c.clone()]).unwrap();
        let stored = store.conflict(&c.id).unwrap().unwrap();
        assert_eq!(stored.status, ConflictStatus::Ignored);
    }

    #[test]
    fn test_unavailable_store_fails_retryably() {
        let store = InMemoryEventStore::new();
        store
            .insert_event(event("E1", window(9, 10)), ConflictUpdates::none())
            .unwrap();
        store.set_unavailable(true);

        let err = store.event("E1").unwrap_err();
        assert!(matches!(err, SchedulerError::StorageUnavailable(_)));
        assert!(err.is_retryable());

        store.set_unavailable(false);
        assert!(store.event("E1").unwrap().is_some());
    }

    #[test]
    fn test_events_ordered_by_start() {
        let store = InMemoryEventStore::new();
        store
            .insert_event(event("B", window(14, 15)), ConflictUpdates::none())
            .unwrap();
        store
            .insert_event(event("A", window(9, 10)), ConflictUpdates::none())
            .unwrap();
        store
            .insert_event(event("C", window(9, 10)), ConflictUpdates::none())
            .unwrap();

        let ids: Vec<String> = store.events().unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["A", "C", "B"]);
    }

    #[test]
    fn test_facility_directory() {
        let directory = FacilityDirectory::new();
        assert!(directory.closures("F1").is_empty());

        directory.set(FacilityCalendar::new("F1").with_closure(window(12, 13)));
        assert_eq!(directory.closures("F1"), vec![window(12, 13)]);

        // Replacing wipes prior closures
        directory.set(FacilityCalendar::new("F1"));
        assert!(directory.closures("F1").is_empty());
    }

    #[test]
    fn test_events_in_window() {
        let store = InMemoryEventStore::new();
        store
            .insert_event(event("A", window(9, 10)), ConflictUpdates::none())
            .unwrap();
        store
            .insert_event(event("B", window(14, 15)), ConflictUpdates::none())
            .unwrap();

        let hits = store.events_in_window(&window(9, 11)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "A");
    }

    #[test]
    fn test_events_for_resource() {
        let store = InMemoryEventStore::new();
        store
            .insert_event(event("A", window(9, 10)), ConflictUpdates::none())
            .unwrap();
        store
            .insert_event(event("B", window(10, 11)), ConflictUpdates::none())
            .unwrap();
        store
            .insert_event(
                Event::new("C", EventType::Practice, window(9, 10))
                    .with_facility("F2")
                    .with_coach("C2"),
                ConflictUpdates::none(),
            )
            .unwrap();

        let coach = ResourceRef::Coach("C1".into());
        let hits = store.events_for_resource(&coach, &window(9, 11)).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "A");
        assert_eq!(hits[1].id, "B");

        // Window cut-off applies before resource matching
        let hits = store.events_for_resource(&coach, &window(10, 11)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "B");
    }

    #[test]
    fn test_insert_stores_event_and_conflicts_together() {
        let store = InMemoryEventStore::new();
        store
            .insert_event(event("E1", window(9, 10)), ConflictUpdates::none())
            .unwrap();
        store
            .insert_event(
                event("E2", window(9, 10)),
                ConflictUpdates::none().upserting([conflict("E1", "E2")]),
            )
            .unwrap();
        assert_eq!(store.conflicts(&ConflictFilter::all()).unwrap().len(), 1);

        // A rejected insert writes neither side
        let err = store
            .insert_event(
                event("E2", window(11, 12)),
                ConflictUpdates::none().upserting([conflict("E1", "E3")]),
            )
            .unwrap_err();
        assert!(matches!(err, SchedulerError::PreconditionFailed(_)));
        assert_eq!(store.conflicts(&ConflictFilter::all()).unwrap().len(), 1);
    }

    #[test]
    fn test_commit_check_vetoes_save_under_lock() {
        let store = InMemoryEventStore::new();
        store
            .insert_event(event("E1", window(9, 10)), ConflictUpdates::none())
            .unwrap();

        let mut e = store.event("E1").unwrap().unwrap();
        e.window = window(11, 12);

        let seen = std::cell::Cell::new(0usize);
        let veto = |current: &[Event]| {
            seen.set(current.len());
            false
        };
        let err = store
            .save_event_atomic(
                &e,
                ConflictUpdates::none().upserting([conflict("E1", "E2")]),
                Some(&veto),
            )
            .unwrap_err();

        assert!(matches!(err, SchedulerError::Stale(_)));
        assert!(err.is_retryable());
        // The check saw current state; nothing was applied
        assert_eq!(seen.get(), 1);
        let stored = store.event("E1").unwrap().unwrap();
        assert_eq!(stored.window, window(9, 10));
        assert_eq!(stored.version, 0);
        assert!(store.conflicts(&ConflictFilter::all()).unwrap().is_empty());

        let accept = |_: &[Event]| true;
        store
            .save_event_atomic(&e, ConflictUpdates::none(), Some(&accept))
            .unwrap();
        assert_eq!(store.event("E1").unwrap().unwrap().window, window(11, 12));
    }
}
