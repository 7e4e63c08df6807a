//! Automatic conflict resolution.
//!
//! Resolution re-validates everything at commit time: the stored conflict
//! is re-derived against current state before any write, and the chosen
//! target window is re-checked under the store's write lock as part of the
//! atomic save, so a suggestion computed at detection time is never
//! trusted blindly. On a concurrent mutation — a version bump or a target
//! window no longer clear — the engine surfaces
//! [`Stale`](crate::SchedulerError::Stale) and never retries internally.
//!
//! # Which Event Moves
//!
//! The suggestion attached at detection time names the event to move. When
//! a conflict carries no suggestion, the later-starting event of the pair
//! moves: the earlier event is more likely confirmed and communicated.
//!
//! # Window Choice
//!
//! Among the conflict-free windows inside the look-ahead, the engine
//! prefers the one with the highest summed participant availability,
//! breaking ties by earliest start. With no availability data every window
//! scores 0.0 and the earliest clear window wins.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::availability::{window_score, AvailabilityProvider};
use crate::detect::ConflictDetector;
use crate::emit::{EmissionSink, SchedulingEvent};
use crate::error::{Result, SchedulerError};
use crate::index::BookingIndex;
use crate::models::{Conflict, ConflictFilter, ConflictStatus, Event, TimeWindow};
use crate::store::{ConflictUpdates, EventStore, FacilityDirectory};

/// Result of one resolution attempt.
///
/// "No clear window found" is an expected outcome, not an error: the
/// conflict simply stays pending for a human.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionOutcome {
    /// The conflict the attempt targeted.
    pub conflict_id: String,
    /// Whether an event was moved.
    pub moved: bool,
    /// The moved event, when `moved`.
    pub event_id: Option<String>,
    /// Its new window, when `moved`.
    pub new_window: Option<TimeWindow>,
}

impl ResolutionOutcome {
    /// A successful move.
    pub fn moved(conflict_id: impl Into<String>, event_id: impl Into<String>, window: TimeWindow) -> Self {
        Self {
            conflict_id: conflict_id.into(),
            moved: true,
            event_id: Some(event_id.into()),
            new_window: Some(window),
        }
    }

    /// No move was possible (or necessary).
    pub fn unmoved(conflict_id: impl Into<String>) -> Self {
        Self {
            conflict_id: conflict_id.into(),
            moved: false,
            event_id: None,
            new_window: None,
        }
    }
}

/// Policy-driven automatic resolver.
pub struct ResolutionEngine {
    store: Arc<dyn EventStore>,
    facilities: Arc<FacilityDirectory>,
    availability: Arc<dyn AvailabilityProvider>,
    sink: Arc<dyn EmissionSink>,
    detector: ConflictDetector,
}

impl ResolutionEngine {
    /// Creates a resolution engine.
    pub fn new(
        store: Arc<dyn EventStore>,
        facilities: Arc<FacilityDirectory>,
        availability: Arc<dyn AvailabilityProvider>,
        sink: Arc<dyn EmissionSink>,
        detector: ConflictDetector,
    ) -> Self {
        Self {
            store,
            facilities,
            availability,
            sink,
            detector,
        }
    }

    /// Attempts to resolve a pending auto-resolvable conflict.
    ///
    /// On success the chosen event is moved to a conflict-free window and
    /// every pending conflict that move clears is marked resolved, in one
    /// atomic store write.
    ///
    /// # Errors
    /// - `NotFound` if the conflict or its event no longer exists.
    /// - `PreconditionFailed` if the conflict is not pending or policy
    ///   forbids automatic resolution for it.
    /// - `Stale` if another writer changed the event mid-flight; the
    ///   caller may re-invoke, resolution never retries on its own.
    pub fn resolve(&self, conflict_id: &str) -> Result<ResolutionOutcome> {
        let conflict = self.store.conflict(conflict_id)?.ok_or_else(|| {
            SchedulerError::NotFound(format!("conflict '{conflict_id}' not found"))
        })?;
        if conflict.status != ConflictStatus::Pending {
            return Err(SchedulerError::PreconditionFailed(format!(
                "conflict '{conflict_id}' is not pending"
            )));
        }
        if !conflict.auto_resolvable {
            return Err(SchedulerError::PreconditionFailed(format!(
                "conflict '{conflict_id}' requires a human decision"
            )));
        }

        let event_id = pick_event_to_move(&conflict, self.store.as_ref())?;
        let event = self.store.event(&event_id)?.ok_or_else(|| {
            SchedulerError::NotFound(format!("event '{event_id}' not found"))
        })?;

        let index = BookingIndex::from_events(self.store.events()?);
        let closures = self.facilities.closures(&event.facility_id);

        // The conflict may already be gone (someone moved an event since
        // detection). Re-derive before committing anything.
        if self
            .detector
            .classify(&event, &closures, &index)
            .iter()
            .all(|c| c.id != conflict.id)
        {
            let updates = ConflictUpdates::none().upserting([resolved(&conflict)]);
            self.store.save_event_atomic(&event, updates, None)?;
            self.emit_resolved(&conflict.id);
            return Ok(ResolutionOutcome::unmoved(&conflict.id));
        }

        let Some(target) = self.pick_window(&event, &closures, &index) else {
            log::debug!(
                "no clear window for event '{}' within look-ahead; conflict '{}' stays pending",
                event.id,
                conflict.id
            );
            return Ok(ResolutionOutcome::unmoved(&conflict.id));
        };

        // Every pending conflict the move clears gets marked resolved
        // atomically with the event write.
        let mut moved = event.clone();
        let from = moved.window;
        moved.window = target;

        let cleared: Vec<Conflict> = self
            .store
            .conflicts(&ConflictFilter::all())?
            .into_iter()
            .filter(|c| c.status == ConflictStatus::Pending && c.references(&event.id))
            .map(|c| resolved(&c))
            .collect();

        // The target was chosen against a snapshot; re-check it under the
        // store's write lock so a concurrent commit cannot slip a booking
        // into the same window.
        let detector = self.detector.clone();
        let target_closures = closures.clone();
        let placed = moved.clone();
        let still_clear = move |current: &[Event]| {
            let index = BookingIndex::from_events(current.iter().cloned());
            detector.classify(&placed, &target_closures, &index).is_empty()
        };
        self.store.save_event_atomic(
            &moved,
            ConflictUpdates::none().upserting(cleared),
            Some(&still_clear),
        )?;

        self.sink.emit(&SchedulingEvent::EventMoved {
            event_id: moved.id.clone(),
            from,
            to: target,
        });
        self.emit_resolved(&conflict.id);
        log::info!(
            "auto-resolved conflict '{}' by moving event '{}' to {} - {}",
            conflict.id,
            moved.id,
            target.start,
            target.end
        );

        Ok(ResolutionOutcome::moved(&conflict.id, &moved.id, target))
    }

    fn pick_window(
        &self,
        event: &Event,
        closures: &[TimeWindow],
        index: &BookingIndex,
    ) -> Option<TimeWindow> {
        best_window(&self.detector, self.availability.as_ref(), event, closures, index)
    }

    fn emit_resolved(&self, conflict_id: &str) {
        self.sink.emit(&SchedulingEvent::ConflictResolved {
            conflict_id: conflict_id.to_string(),
            auto: true,
        });
    }
}

/// Best clear window for an event: highest summed participant availability
/// first, earliest start on ties. Shared with the optimizer.
pub(crate) fn best_window(
    detector: &ConflictDetector,
    availability: &dyn AvailabilityProvider,
    event: &Event,
    closures: &[TimeWindow],
    index: &BookingIndex,
) -> Option<TimeWindow> {
    let participants = event.participant_ids();
    let mut scored: Vec<(f64, TimeWindow)> = detector
        .clear_windows(event, closures, index)
        .into_iter()
        .map(|w| (window_score(availability, &participants, &w), w))
        .collect();
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.1.start.cmp(&b.1.start))
    });
    scored.first().map(|(_, w)| *w)
}

pub(crate) fn resolved(conflict: &Conflict) -> Conflict {
    let mut c = conflict.clone();
    c.status = ConflictStatus::Resolved;
    c
}

/// Chooses which event of the pair to move.
fn pick_event_to_move(conflict: &Conflict, store: &dyn EventStore) -> Result<String> {
    if let Some(s) = &conflict.suggested_resolution {
        return Ok(s.event_id.clone());
    }
    let mut latest: Option<(String, TimeWindow)> = None;
    for id in &conflict.event_ids {
        let event = store.event(id)?.ok_or_else(|| {
            SchedulerError::NotFound(format!("event '{id}' not found"))
        })?;
        let replace = match &latest {
            Some((_, w)) => event.window.start > w.start,
            None => true,
        };
        if replace {
            latest = Some((id.clone(), event.window));
        }
    }
    latest
        .map(|(id, _)| id)
        .ok_or_else(|| SchedulerError::PreconditionFailed("conflict references no events".into()))
}
