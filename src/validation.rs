//! Input validation for events.
//!
//! Checks structural integrity of an event before it reaches the
//! detector. Detects:
//! - Empty identifiers
//! - Inverted or empty time intervals (start >= end)
//! - Duplicate roster or equipment entries
//!
//! Malformed events are rejected synchronously, never silently coerced.

use crate::models::Event;
use std::collections::HashSet;

/// Validation result.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// A validation error.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Error category.
    pub kind: ValidationErrorKind,
    /// Human-readable description.
    pub message: String,
}

/// Categories of validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// A required identifier is empty.
    MissingId,
    /// The interval has start >= end.
    InvalidInterval,
    /// The same person or equipment unit is listed twice.
    DuplicateEntry,
}

impl ValidationError {
    fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Validates a single event.
///
/// # Returns
/// `Ok(())` if all checks pass, `Err(errors)` with every detected issue.
pub fn validate_event(event: &Event) -> ValidationResult {
    let mut errors = Vec::new();

    if event.id.is_empty() {
        errors.push(ValidationError::new(
            ValidationErrorKind::MissingId,
            "event id is empty",
        ));
    }

    if event.window.start >= event.window.end {
        errors.push(ValidationError::new(
            ValidationErrorKind::InvalidInterval,
            format!(
                "event '{}' has start >= end ({} >= {})",
                event.id, event.window.start, event.window.end
            ),
        ));
    }

    let mut seen = HashSet::new();
    for p in &event.player_ids {
        if !seen.insert(p.as_str()) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateEntry,
                format!("event '{}' lists player '{}' twice", event.id, p),
            ));
        }
    }

    let mut seen_eq = HashSet::new();
    for e in &event.equipment_ids {
        if !seen_eq.insert(e.as_str()) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateEntry,
                format!("event '{}' lists equipment '{}' twice", event.id, e),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Formats validation errors into a single message line.
pub fn describe_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}
