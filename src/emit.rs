//! Outcome emission.
//!
//! The engine reports what it did through an [`EmissionSink`]; delivery to
//! users (push, email, UI toast) lives outside the crate. Sinks must be
//! cheap and infallible — a slow or failing sink must never block or fail
//! a scheduling operation, so the trait returns nothing and implementations
//! swallow their own errors.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::models::{Conflict, Severity, TimeWindow};

/// A notable engine outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchedulingEvent {
    /// New conflicts were detected and stored.
    ConflictDetected {
        conflict_id: String,
        severity: Severity,
        description: String,
    },
    /// A conflict was cleared, automatically or by a human decision.
    ConflictResolved {
        conflict_id: String,
        auto: bool,
    },
    /// An event was moved to a new window.
    EventMoved {
        event_id: String,
        from: TimeWindow,
        to: TimeWindow,
    },
    /// An optimization pass finished (or was cancelled).
    OptimizationCompleted {
        resolved: usize,
        remaining: usize,
        cancelled: bool,
    },
}

impl SchedulingEvent {
    /// Builds a detection notice from a stored conflict.
    pub fn detected(conflict: &Conflict) -> Self {
        SchedulingEvent::ConflictDetected {
            conflict_id: conflict.id.clone(),
            severity: conflict.severity,
            description: conflict.description.clone(),
        }
    }
}

/// Receiver for engine outcomes.
pub trait EmissionSink: Send + Sync {
    /// Delivers one outcome. Must not block or panic.
    fn emit(&self, event: &SchedulingEvent);
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EmissionSink for NullSink {
    fn emit(&self, _event: &SchedulingEvent) {}
}

/// Sink that writes outcomes to the log as JSON lines.
///
/// High-severity detections log at warn, everything else at info.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EmissionSink for LogSink {
    fn emit(&self, event: &SchedulingEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(p) => p,
            Err(e) => {
                log::error!("failed to serialize scheduling event: {e}");
                return;
            }
        };
        match event {
            SchedulingEvent::ConflictDetected {
                severity: Severity::High,
                ..
            } => log::warn!("{payload}"),
            _ => log::info!("{payload}"),
        }
    }
}

/// Sink that records outcomes in memory, for tests and audits.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<SchedulingEvent>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything emitted so far, in order.
    pub fn events(&self) -> Vec<SchedulingEvent> {
        self.events.lock().clone()
    }

    /// Number of recorded outcomes.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether nothing was emitted.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EmissionSink for MemorySink {
    fn emit(&self, event: &SchedulingEvent) {
        self.events.lock().push(event.clone());
    }
}
