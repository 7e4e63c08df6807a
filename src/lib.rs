//! Scheduling conflict engine for sports-organization schedules.
//!
//! Detects overlapping or incompatible bookings across teams, coaches,
//! players, facilities, and shared equipment; auto-resolves the subset of
//! conflicts that policy permits; and runs a bounded-time, cancellable
//! optimization pass over the whole schedule.
//!
//! # Modules
//!
//! - **`models`**: Domain types — `Event`, `Conflict`, `ResourceRef`,
//!   `TimeWindow`, `FacilityCalendar`
//! - **`validation`**: Input integrity checks (inverted intervals, empty
//!   ids, duplicate roster entries)
//! - **`index`**: The `BookingIndex` materialized view that keeps detection
//!   sub-quadratic
//! - **`detect`**: Pure conflict detection with a configurable policy
//! - **`resolve`**: Auto-resolution of eligible conflicts via forward
//!   window search and atomic apply
//! - **`optimize`**: Greedy, deterministic, budget-bounded schedule
//!   optimization with cancellation and progress reporting
//! - **`availability`**: Read-only availability signals used to bias
//!   window selection
//! - **`store`**: The event/conflict persistence seam (versioned
//!   compare-and-swap)
//! - **`emit`**: Fire-and-forget analytics emission
//! - **`service`**: The `Scheduler` facade tying the engines together
//!
//! # Concurrency Model
//!
//! Detection is pure and side-effect free. Resolution and optimizer commits
//! are the only mutations; each covers the event's new window and the
//! conflict's status change in one atomic unit, guarded by optimistic
//! version checks (`Stale` on contention). The core never retries
//! internally — transient failures surface to the caller.

pub mod availability;
pub mod detect;
pub mod emit;
pub mod error;
pub mod index;
pub mod models;
pub mod optimize;
pub mod resolve;
pub mod service;
pub mod store;
pub mod validation;

pub use availability::{AvailabilityProvider, NoAvailability, WeeklyAvailability};
pub use detect::{ConflictDetector, DetectionPolicy};
pub use emit::{EmissionSink, LogSink, MemorySink, NullSink, SchedulingEvent};
pub use error::SchedulerError;
pub use index::BookingIndex;
pub use models::{
    Conflict, ConflictFilter, ConflictKind, ConflictStatus, Event, EventStatus, EventType,
    FacilityCalendar, ResourceRef, Severity, SuggestedMove, TimeWindow,
};
pub use optimize::{
    CancelToken, OptimizationReport, OptimizationScope, Optimizer, Progress, ScheduleMove,
};
pub use resolve::{ResolutionEngine, ResolutionOutcome};
pub use service::{OptimizationHandle, Scheduler};
pub use store::{CommitCheck, ConflictUpdates, EventStore, FacilityDirectory, InMemoryEventStore};
