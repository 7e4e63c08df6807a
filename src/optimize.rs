//! Bounded-time schedule optimization.
//!
//! A greedy, deterministic pass over the pending conflicts in scope:
//! worst first (severity descending, then earliest contested window, then
//! conflict id), moving one event of each conflict to a conflict-free
//! window and committing move by move. Every move targets a zero-conflict
//! window, so a pass can only reduce the pending count, never grow it —
//! which is also why cancellation is safe: the token is checked between
//! iterations only, and whatever committed before the check stands.
//!
//! The pass is time-bounded, not count-bounded. The budget is checked
//! before each conflict; a pass that runs out of budget reports
//! `budget_exhausted` and leaves the rest pending.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crate::availability::AvailabilityProvider;
use crate::detect::ConflictDetector;
use crate::emit::{EmissionSink, SchedulingEvent};
use crate::error::{Result, SchedulerError};
use crate::index::BookingIndex;
use crate::models::{Conflict, ConflictFilter, ConflictStatus, Event, TimeWindow};
use crate::resolve::{best_window, resolved};
use crate::store::{ConflictUpdates, EventStore, FacilityDirectory};

/// Cooperative cancellation flag, shared between the requester and a
/// running pass.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates an unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Takes effect at the next iteration boundary.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Live counters for a running pass.
#[derive(Debug, Default)]
pub struct Progress {
    total: AtomicUsize,
    processed: AtomicUsize,
    moves: AtomicUsize,
}

impl Progress {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Conflicts the pass set out to examine.
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    /// Conflicts examined so far.
    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }

    /// Moves committed so far.
    pub fn moves_applied(&self) -> usize {
        self.moves.load(Ordering::Relaxed)
    }

    fn set_total(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
    }

    fn mark_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    fn mark_move(&self) {
        self.moves.fetch_add(1, Ordering::Relaxed);
    }
}

/// Which part of the schedule a pass may touch.
///
/// The default scope covers everything. A scoped pass only examines
/// conflicts whose contested region overlaps `window`, and only moves
/// events belonging to `team_ids` (when non-empty).
#[derive(Debug, Clone, Default)]
pub struct OptimizationScope {
    /// Restrict to conflicts overlapping this range.
    pub window: Option<TimeWindow>,
    /// Restrict movable events to these teams.
    pub team_ids: Vec<String>,
}

impl OptimizationScope {
    /// The whole schedule.
    pub fn everything() -> Self {
        Self::default()
    }

    /// Restricts to a date range.
    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = Some(window);
        self
    }

    /// Restricts movable events to a team.
    pub fn with_team(mut self, team_id: impl Into<String>) -> Self {
        self.team_ids.push(team_id.into());
        self
    }

    fn includes_conflict(&self, conflict: &Conflict) -> bool {
        match &self.window {
            Some(w) => conflict.window.overlaps(w),
            None => true,
        }
    }

    fn may_move(&self, event: &Event) -> bool {
        self.team_ids.is_empty() || self.team_ids.iter().any(|t| *t == event.team_id)
    }
}

/// One committed move.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleMove {
    /// Conflict the move targeted.
    pub conflict_id: String,
    /// Event that moved.
    pub event_id: String,
    /// Window before the move.
    pub from: TimeWindow,
    /// Window after the move.
    pub to: TimeWindow,
}

/// Outcome of one optimization pass.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationReport {
    /// Pending conflicts in scope when the pass started.
    pub initial_pending: usize,
    /// Conflicts transitioned to resolved by this pass.
    pub resolved: usize,
    /// Pending conflicts in scope when the pass ended.
    pub remaining: usize,
    /// Moves committed, in order.
    pub moves: Vec<ScheduleMove>,
    /// Change in facility utilization over the measured range
    /// (after minus before; negative when moves pushed events out of it).
    pub utilization_delta: f64,
    /// Whether the pass stopped on a cancellation request.
    pub cancelled: bool,
    /// Whether the pass stopped on the time budget.
    pub budget_exhausted: bool,
}

/// Greedy deterministic optimizer.
#[derive(Clone)]
pub struct Optimizer {
    store: Arc<dyn EventStore>,
    facilities: Arc<FacilityDirectory>,
    availability: Arc<dyn AvailabilityProvider>,
    sink: Arc<dyn EmissionSink>,
    detector: ConflictDetector,
}

impl Optimizer {
    /// Creates an optimizer.
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

    /// Runs one pass within the time budget.
    ///
    /// # Errors
    /// `StorageUnavailable` aborts the pass; moves committed before the
    /// failure stand. A `Stale` commit on an individual conflict is a
    /// concurrent writer winning that race — the conflict is skipped, not
    /// retried, and the pass continues.
    pub fn run(
        &self,
        scope: &OptimizationScope,
        budget: std::time::Duration,
        cancel: &CancelToken,
        progress: &Progress,
    ) -> Result<OptimizationReport> {
        let started = Instant::now();
        let pending = self.pending_in_scope(scope)?;
        progress.set_total(pending.len());

        let events_before = self.store.events()?;
        let measure = scope.window.or_else(|| bounding_window(&events_before));
        let utilization_before = measure
            .map(|w| facility_utilization(&events_before, &w))
            .unwrap_or(0.0);

        let initial_pending = pending.len();
        let mut moves = Vec::new();
        let mut resolved_count = 0usize;
        let mut cancelled = false;
        let mut budget_exhausted = false;

        for conflict in pending {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            if started.elapsed() >= budget {
                budget_exhausted = true;
                break;
            }

            // An earlier move in this pass may already have cleared it.
            let current = match self.store.conflict(&conflict.id)? {
                Some(c) if c.status == ConflictStatus::Pending => c,
                _ => {
                    progress.mark_processed();
                    continue;
                }
            };

            match self.try_move(&current, scope) {
                Ok(Some((mv, cleared))) => {
                    resolved_count += cleared;
                    progress.mark_move();
                    moves.push(mv);
                }
                Ok(None) => {}
                Err(SchedulerError::Stale(reason)) => {
                    log::warn!(
                        "skipping conflict '{}': concurrent write ({reason})",
                        current.id
                    );
                }
                Err(e) => return Err(e),
            }
            progress.mark_processed();
        }

        let remaining = self.pending_in_scope(scope)?.len();
        let utilization_after = match measure {
            Some(w) => facility_utilization(&self.store.events()?, &w),
            None => 0.0,
        };
        let utilization_delta = utilization_after - utilization_before;

        self.sink.emit(&SchedulingEvent::OptimizationCompleted {
            resolved: resolved_count,
            remaining,
            cancelled,
        });
        log::info!(
            "optimization pass: {} -> {} pending, {} moves, cancelled={}, budget_exhausted={}",
            initial_pending,
            remaining,
            moves.len(),
            cancelled,
            budget_exhausted
        );

        Ok(OptimizationReport {
            initial_pending,
            resolved: resolved_count,
            remaining,
            moves,
            utilization_delta,
            cancelled,
            budget_exhausted,
        })
    }

    /// Runs a pass on a background thread.
    ///
    /// The caller keeps the token and counters; the report comes back
    /// through the join handle.
    pub fn spawn(
        &self,
        scope: OptimizationScope,
        budget: std::time::Duration,
        cancel: CancelToken,
        progress: Arc<Progress>,
    ) -> thread::JoinHandle<Result<OptimizationReport>> {
        let optimizer = self.clone();
        thread::spawn(move || optimizer.run(&scope, budget, &cancel, &progress))
    }

    /// Pending conflicts in scope, worst first.
    fn pending_in_scope(&self, scope: &OptimizationScope) -> Result<Vec<Conflict>> {
        let mut pending: Vec<Conflict> = self
            .store
            .conflicts(&ConflictFilter::all().with_status(ConflictStatus::Pending))?
            .into_iter()
            .filter(|c| scope.includes_conflict(c))
            .collect();
        pending.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.window.start.cmp(&b.window.start))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(pending)
    }

    /// Attempts to clear one conflict by moving one of its events.
    ///
    /// Candidate events are tried in a deterministic order: the event
    /// referenced by the most pending conflicts first (its move clears the
    /// most), then the later-starting one, then id order. Returns the move
    /// and the number of conflicts it cleared, or `None` when no candidate
    /// has a clear window in the look-ahead.
    fn try_move(
        &self,
        conflict: &Conflict,
        scope: &OptimizationScope,
    ) -> Result<Option<(ScheduleMove, usize)>> {
        let index = BookingIndex::from_events(self.store.events()?);
        let all_pending = self
            .store
            .conflicts(&ConflictFilter::all().with_status(ConflictStatus::Pending))?;

        let mut candidates: Vec<Event> = Vec::new();
        for id in &conflict.event_ids {
            if let Some(event) = self.store.event(id)? {
                if event.is_active() && scope.may_move(&event) {
                    candidates.push(event);
                }
            }
        }
        candidates.sort_by(|a, b| {
            let refs_a = all_pending.iter().filter(|c| c.references(&a.id)).count();
            let refs_b = all_pending.iter().filter(|c| c.references(&b.id)).count();
            refs_b
                .cmp(&refs_a)
                .then_with(|| b.window.start.cmp(&a.window.start))
                .then_with(|| a.id.cmp(&b.id))
        });

        for event in candidates {
            let closures = self.facilities.closures(&event.facility_id);
            let Some(target) =
                best_window(&self.detector, self.availability.as_ref(), &event, &closures, &index)
            else {
                continue;
            };

            let cleared: Vec<Conflict> = all_pending
                .iter()
                .filter(|c| c.references(&event.id))
                .map(resolved)
                .collect();
            let cleared_count = cleared.len();

            let mut moved = event.clone();
            let from = moved.window;
            moved.window = target;
            // The target was picked against a snapshot; re-check it under
            // the store's write lock. A losing race surfaces as Stale and
            // the pass skips this conflict.
            let detector = self.detector.clone();
            let target_closures = closures.clone();
            let placed = moved.clone();
            let still_clear = move |current: &[Event]| {
                let index = BookingIndex::from_events(current.iter().cloned());
                detector
                    .classify(&placed, &target_closures, &index)
                    .is_empty()
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
            self.sink.emit(&SchedulingEvent::ConflictResolved {
                conflict_id: conflict.id.clone(),
                auto: true,
            });

            return Ok(Some((
                ScheduleMove {
                    conflict_id: conflict.id.clone(),
                    event_id: moved.id,
                    from,
                    to: target,
                },
                cleared_count,
            )));
        }
        Ok(None)
    }
}

/// Smallest window covering every stored event.
fn bounding_window(events: &[Event]) -> Option<TimeWindow> {
    let start = events.iter().map(|e| e.window.start).min()?;
    let end = events.iter().map(|e| e.window.end).max()?;
    Some(TimeWindow::new(start, end))
}

/// Fraction of the range the booked facilities spend occupied.
///
/// Busy time is summed per active event clipped to the range; the horizon
/// is the range duration times the number of distinct facilities booked in
/// it. An empty schedule scores 0.0.
fn facility_utilization(events: &[Event], range: &TimeWindow) -> f64 {
    let mut facilities = std::collections::HashSet::new();
    let mut busy_ms = 0i64;
    for event in events {
        if !event.is_active() || event.facility_id.is_empty() {
            continue;
        }
        if let Some(overlap) = event.window.overlap_duration(range) {
            facilities.insert(event.facility_id.as_str());
            busy_ms += overlap.num_milliseconds();
        }
    }
    let horizon_ms = range.duration().num_milliseconds() * facilities.len() as i64;
    if horizon_ms <= 0 {
        return 0.0;
    }
    busy_ms as f64 / horizon_ms as f64
}
