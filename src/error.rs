//! Engine error taxonomy.
//!
//! Distinguishes caller mistakes from transient failures so retry behavior
//! stays with the caller:
//!
//! - **Input errors** (`InvalidEvent`) are rejected before detection runs.
//! - **Precondition errors** (`NotFound`, `PreconditionFailed`) are caller
//!   mistakes and must not be retried.
//! - **Transient errors** (`StorageUnavailable`, `Stale`) are retryable
//!   with backoff. The core itself never retries internally.
//!
//! Expected negative results (no resolving window found, budget exhausted
//! with conflicts remaining) are values, not errors — see
//! [`ResolutionOutcome`](crate::resolve::ResolutionOutcome) and
//! [`OptimizationReport`](crate::optimize::OptimizationReport).

use thiserror::Error;

/// Errors produced by the scheduling engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// Malformed event rejected before detection (e.g. start >= end).
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// Referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation invoked against state that does not permit it
    /// (e.g. resolving a non-auto-resolvable or already-resolved conflict).
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// Persistence layer could not complete an atomic apply.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Optimistic concurrency check failed: the event changed since the
    /// snapshot was read.
    #[error("stale snapshot: {0}")]
    Stale(String),
}

impl SchedulerError {
    /// Whether the caller may retry this error with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SchedulerError::StorageUnavailable(_) | SchedulerError::Stale(_)
        )
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SchedulerError::Stale("E1".into()).is_retryable());
        assert!(SchedulerError::StorageUnavailable("down".into()).is_retryable());
        assert!(!SchedulerError::PreconditionFailed("resolved".into()).is_retryable());
        assert!(!SchedulerError::InvalidEvent("start >= end".into()).is_retryable());
        assert!(!SchedulerError::NotFound("C1".into()).is_retryable());
    }

    #[test]
    fn test_display_messages() {
        let e = SchedulerError::Stale("event 'E1' moved".into());
        assert_eq!(e.to_string(), "stale snapshot: event 'E1' moved");
    }
}
