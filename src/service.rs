//! Scheduling facade.
//!
//! [`Scheduler`] wires the store, detector, resolution engine and
//! optimizer together behind one API: schedule, update, cancel and
//! complete events; inspect, ignore and resolve conflicts; run
//! optimization passes. The facade owns no policy of its own — it
//! validates input, keeps the conflict table in step with event
//! mutations, and delegates.

use std::sync::Arc;

use crate::availability::{AvailabilityProvider, NoAvailability};
use crate::detect::{ConflictDetector, DetectionPolicy};
use crate::emit::{EmissionSink, LogSink, SchedulingEvent};
use crate::error::{Result, SchedulerError};
use crate::index::BookingIndex;
use crate::models::{
    Conflict, ConflictFilter, ConflictStatus, Event, EventStatus, FacilityCalendar, ResourceRef,
    TimeWindow,
};
use crate::optimize::{
    CancelToken, OptimizationReport, OptimizationScope, Optimizer, Progress,
};
use crate::resolve::{resolved, ResolutionEngine, ResolutionOutcome};
use crate::store::{ConflictUpdates, EventStore, FacilityDirectory};
use crate::validation::{describe_errors, validate_event};

/// A running optimization pass handed back to the caller.
pub struct OptimizationHandle {
    /// Cancels the pass at its next iteration boundary.
    pub cancel: CancelToken,
    /// Live counters.
    pub progress: Arc<Progress>,
    /// Joins the pass and yields its report.
    pub handle: std::thread::JoinHandle<Result<OptimizationReport>>,
}

/// The scheduling engine facade.
pub struct Scheduler {
    store: Arc<dyn EventStore>,
    facilities: Arc<FacilityDirectory>,
    availability: Arc<dyn AvailabilityProvider>,
    sink: Arc<dyn EmissionSink>,
    detector: ConflictDetector,
}

impl Scheduler {
    /// Creates a scheduler over a store, with logging emission and no
    /// availability data.
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            facilities: Arc::new(FacilityDirectory::new()),
            availability: Arc::new(NoAvailability),
            sink: Arc::new(LogSink),
            detector: ConflictDetector::new(),
        }
    }

    /// Sets the availability provider used to bias window selection.
    pub fn with_availability(mut self, availability: Arc<dyn AvailabilityProvider>) -> Self {
        self.availability = availability;
        self
    }

    /// Sets the emission sink.
    pub fn with_sink(mut self, sink: Arc<dyn EmissionSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Sets the detection policy.
    pub fn with_policy(mut self, policy: DetectionPolicy) -> Self {
        self.detector = ConflictDetector::with_policy(policy);
        self
    }

    /// Installs or replaces a facility calendar.
    pub fn set_facility_calendar(&self, calendar: FacilityCalendar) {
        self.facilities.set(calendar);
    }

    /// The shared facility directory.
    pub fn facilities(&self) -> Arc<FacilityDirectory> {
        self.facilities.clone()
    }

    /// Schedules a new event and returns the conflicts it creates.
    ///
    /// The event is stored even when it conflicts — detection reports,
    /// it does not veto. Callers that want veto semantics preview with
    /// [`detect_conflicts`](Self::detect_conflicts) first.
    ///
    /// # Errors
    /// `InvalidEvent` for malformed input; the event is not stored.
    pub fn schedule_event(&self, event: Event) -> Result<Vec<Conflict>> {
        self.validate(&event)?;
        let conflicts = self.detect(&event)?;
        self.store.insert_event(
            event,
            ConflictUpdates::none().upserting(conflicts.clone()),
        )?;
        self.emit_detections(&conflicts);
        Ok(conflicts)
    }

    /// Applies an event mutation and reconciles the conflict table.
    ///
    /// The caller passes the event as read (including its version); the
    /// save is atomic and fails with `Stale` if anyone wrote in between.
    /// Pending conflicts the mutation clears are marked resolved; new
    /// ones are stored. Returns the conflicts the updated event now has.
    pub fn update_event(&self, event: Event) -> Result<Vec<Conflict>> {
        self.validate(&event)?;
        let fresh = self.detect(&event)?;

        let stale: Vec<Conflict> = self
            .store
            .conflicts(&ConflictFilter::all().with_status(ConflictStatus::Pending))?
            .into_iter()
            .filter(|c| c.references(&event.id) && !fresh.iter().any(|f| f.id == c.id))
            .map(|c| resolved(&c))
            .collect();

        let updates = ConflictUpdates::none()
            .upserting(stale)
            .upserting(fresh.clone());

        // Detection ran against a snapshot; verify under the store's write
        // lock that it still holds, so the recorded conflicts match the
        // state the save lands in.
        let mut expected: Vec<String> = fresh.iter().map(|c| c.id.clone()).collect();
        expected.sort_unstable();
        let detector = self.detector.clone();
        let closures = self.facilities.closures(&event.facility_id);
        let candidate = event.clone();
        let unchanged = move |current: &[Event]| {
            let index = BookingIndex::from_events(current.iter().cloned());
            let mut now: Vec<String> = detector
                .classify(&candidate, &closures, &index)
                .iter()
                .map(|c| c.id.clone())
                .collect();
            now.sort_unstable();
            now == expected
        };
        self.store
            .save_event_atomic(&event, updates, Some(&unchanged))?;
        self.emit_detections(&fresh);
        Ok(fresh)
    }

    /// Cancels an event, releasing its resources.
    ///
    /// Every pending conflict the event was part of is marked resolved in
    /// the same write.
    pub fn cancel_event(&self, event_id: &str) -> Result<()> {
        self.transition(event_id, EventStatus::Cancelled)
    }

    /// Marks an event completed. Its window becomes immutable.
    pub fn complete_event(&self, event_id: &str) -> Result<()> {
        self.transition(event_id, EventStatus::Completed)
    }

    /// Looks up an event.
    pub fn event(&self, event_id: &str) -> Result<Option<Event>> {
        self.store.event(event_id)
    }

    /// Events overlapping a range, ordered by start.
    pub fn events_in_window(&self, window: &TimeWindow) -> Result<Vec<Event>> {
        self.store.events_in_window(window)
    }

    /// Events committing a resource inside a range, ordered by start.
    pub fn events_for_resource(
        &self,
        resource: &ResourceRef,
        window: &TimeWindow,
    ) -> Result<Vec<Event>> {
        self.store.events_for_resource(resource, window)
    }

    /// Previews the conflicts an event would create, without writing
    /// anything.
    pub fn detect_conflicts(&self, candidate: &Event) -> Result<Vec<Conflict>> {
        self.validate(candidate)?;
        self.detect(candidate)
    }

    /// Stored conflicts passing a filter.
    pub fn conflicts(&self, filter: &ConflictFilter) -> Result<Vec<Conflict>> {
        self.store.conflicts(filter)
    }

    /// Dismisses a conflict. It stays ignored even if re-detected.
    pub fn ignore_conflict(&self, conflict_id: &str) -> Result<()> {
        self.store
            .set_conflict_status(conflict_id, ConflictStatus::Ignored)
    }

    /// Records that a human resolved a conflict out of band.
    pub fn mark_resolved(&self, conflict_id: &str) -> Result<()> {
        self.store
            .set_conflict_status(conflict_id, ConflictStatus::Resolved)?;
        self.sink.emit(&SchedulingEvent::ConflictResolved {
            conflict_id: conflict_id.to_string(),
            auto: false,
        });
        Ok(())
    }

    /// Attempts automatic resolution of one conflict.
    pub fn resolve_conflict(&self, conflict_id: &str) -> Result<ResolutionOutcome> {
        self.resolution_engine().resolve(conflict_id)
    }

    /// Runs an optimization pass on the calling thread.
    pub fn optimize(
        &self,
        scope: &OptimizationScope,
        budget: std::time::Duration,
    ) -> Result<OptimizationReport> {
        self.optimizer()
            .run(scope, budget, &CancelToken::new(), &Progress::new())
    }

    /// Starts an optimization pass on a background thread.
    pub fn spawn_optimize(
        &self,
        scope: OptimizationScope,
        budget: std::time::Duration,
    ) -> OptimizationHandle {
        let cancel = CancelToken::new();
        let progress = Arc::new(Progress::new());
        let handle = self
            .optimizer()
            .spawn(scope, budget, cancel.clone(), progress.clone());
        OptimizationHandle {
            cancel,
            progress,
            handle,
        }
    }

    fn resolution_engine(&self) -> ResolutionEngine {
        ResolutionEngine::new(
            self.store.clone(),
            self.facilities.clone(),
            self.availability.clone(),
            self.sink.clone(),
            self.detector.clone(),
        )
    }

    fn optimizer(&self) -> Optimizer {
        Optimizer::new(
            self.store.clone(),
            self.facilities.clone(),
            self.availability.clone(),
            self.sink.clone(),
            self.detector.clone(),
        )
    }

    fn validate(&self, event: &Event) -> Result<()> {
        validate_event(event)
            .map_err(|errors| SchedulerError::InvalidEvent(describe_errors(&errors)))
    }

    fn detect(&self, candidate: &Event) -> Result<Vec<Conflict>> {
        let index = BookingIndex::from_events(self.store.events()?);
        let closures = self.facilities.closures(&candidate.facility_id);
        Ok(self.detector.detect(candidate, &closures, &index))
    }

    fn transition(&self, event_id: &str, status: EventStatus) -> Result<()> {
        let mut event = self.store.event(event_id)?.ok_or_else(|| {
            SchedulerError::NotFound(format!("event '{event_id}' not found"))
        })?;
        event.status = status;

        let released: Vec<Conflict> = self
            .store
            .conflicts(&ConflictFilter::all().with_status(ConflictStatus::Pending))?
            .into_iter()
            .filter(|c| c.references(event_id))
            .map(|c| resolved(&c))
            .collect();

        self.store
            .save_event_atomic(&event, ConflictUpdates::none().upserting(released), None)?;
        Ok(())
    }

    fn emit_detections(&self, conflicts: &[Conflict]) {
        for conflict in conflicts {
            self.sink.emit(&SchedulingEvent::detected(conflict));
        }
    }
}
