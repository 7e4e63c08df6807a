//! Event model.
//!
//! An event is one scheduled occurrence bound to a time window, a
//! facility, a team, a coach, and a roster of required players. Recurring
//! series are materialized one occurrence per event — there is no implicit
//! repetition logic in the engine.

use serde::{Deserialize, Serialize};

use super::{ResourceRef, TimeWindow};

/// A scheduled occurrence.
///
/// Invariants enforced by [`validation`](crate::validation) and the store:
/// `window.start < window.end`; the window of a `Completed` event is
/// immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub id: String,
    /// Human-readable title.
    pub title: String,
    /// Event classification.
    pub event_type: EventType,
    /// Booked interval, half-open, UTC.
    pub window: TimeWindow,
    /// Facility the event occupies.
    pub facility_id: String,
    /// Team the event belongs to.
    pub team_id: String,
    /// Coach committed to run the event.
    pub coach_id: String,
    /// Players required to attend.
    pub player_ids: Vec<String>,
    /// Shared equipment units committed for the duration.
    pub equipment_ids: Vec<String>,
    /// Lifecycle status.
    pub status: EventStatus,
    /// Whether this occurrence was materialized from a recurring series.
    pub recurring: bool,
    /// Optimistic-concurrency token, bumped on every persisted mutation.
    pub version: u64,
}

/// Event classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Practice,
    Game,
    Tournament,
    Meeting,
}

/// Event lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Scheduled,
    Confirmed,
    Cancelled,
    Completed,
}

impl Event {
    /// Creates a new scheduled event.
    pub fn new(id: impl Into<String>, event_type: EventType, window: TimeWindow) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            event_type,
            window,
            facility_id: String::new(),
            team_id: String::new(),
            coach_id: String::new(),
            player_ids: Vec::new(),
            equipment_ids: Vec::new(),
            status: EventStatus::Scheduled,
            recurring: false,
            version: 0,
        }
    }

    /// Sets the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Sets the facility.
    pub fn with_facility(mut self, facility_id: impl Into<String>) -> Self {
        self.facility_id = facility_id.into();
        self
    }

    /// Sets the team.
    pub fn with_team(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = team_id.into();
        self
    }

    /// Sets the coach.
    pub fn with_coach(mut self, coach_id: impl Into<String>) -> Self {
        self.coach_id = coach_id.into();
        self
    }

    /// Adds a required player.
    pub fn with_player(mut self, player_id: impl Into<String>) -> Self {
        self.player_ids.push(player_id.into());
        self
    }

    /// Sets the full roster of required players.
    pub fn with_players(mut self, player_ids: Vec<String>) -> Self {
        self.player_ids = player_ids;
        self
    }

    /// Adds a committed equipment unit.
    pub fn with_equipment(mut self, equipment_id: impl Into<String>) -> Self {
        self.equipment_ids.push(equipment_id.into());
        self
    }

    /// Sets the lifecycle status.
    pub fn with_status(mut self, status: EventStatus) -> Self {
        self.status = status;
        self
    }

    /// Marks this occurrence as part of a recurring series.
    pub fn with_recurring(mut self, recurring: bool) -> Self {
        self.recurring = recurring;
        self
    }

    /// Whether this event still occupies its resources.
    ///
    /// Cancelled and completed events do not participate in detection.
    pub fn is_active(&self) -> bool {
        matches!(self.status, EventStatus::Scheduled | EventStatus::Confirmed)
    }

    /// Every resource dimension this event commits.
    pub fn resource_refs(&self) -> Vec<ResourceRef> {
        let mut refs = Vec::with_capacity(3 + self.player_ids.len() + self.equipment_ids.len());
        if !self.facility_id.is_empty() {
            refs.push(ResourceRef::Facility(self.facility_id.clone()));
        }
        if !self.coach_id.is_empty() {
            refs.push(ResourceRef::Coach(self.coach_id.clone()));
        }
        for p in &self.player_ids {
            refs.push(ResourceRef::Player(p.clone()));
        }
        for e in &self.equipment_ids {
            refs.push(ResourceRef::Equipment(e.clone()));
        }
        refs
    }

    /// Person ids whose availability matters for this event (coach first).
    pub fn participant_ids(&self) -> Vec<&str> {
        let mut ids = Vec::with_capacity(1 + self.player_ids.len());
        if !self.coach_id.is_empty() {
            ids.push(self.coach_id.as_str());
        }
        ids.extend(self.player_ids.iter().map(String::as_str));
        ids
    }
}
