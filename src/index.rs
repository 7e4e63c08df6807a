//! Booking index.
//!
//! A materialized view mapping each resource to the time windows it is
//! committed to, so detection does not scan the whole event set per
//! candidate. Internal to the engine — callers are responsible for keeping
//! it in sync with the store (detection itself never mutates it).
//!
//! Entries per resource are kept sorted by window start; lookups cut the
//! scan off with a binary search on the query window's end, so a lookup
//! touches only bookings starting before the query ends.

use std::collections::HashMap;

use crate::models::{Event, ResourceRef, TimeWindow};

#[derive(Debug, Clone)]
struct Booking {
    window: TimeWindow,
    event_id: String,
}

/// Resource → booked-windows index over active events.
///
/// Cancelled and completed events are never indexed.
#[derive(Debug, Clone, Default)]
pub struct BookingIndex {
    bookings: HashMap<ResourceRef, Vec<Booking>>,
    events: HashMap<String, Event>,
}

impl BookingIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from an event set.
    pub fn from_events<I>(events: I) -> Self
    where
        I: IntoIterator<Item = Event>,
    {
        let mut index = Self::new();
        for event in events {
            index.insert(event);
        }
        index
    }

    /// Inserts an event, indexing every resource dimension it touches.
    ///
    /// Inactive events are stored for lookup but not indexed, so they can
    /// never produce an overlap hit.
    pub fn insert(&mut self, event: Event) {
        self.remove(&event.id);
        if event.is_active() {
            for resource in event.resource_refs() {
                let entries = self.bookings.entry(resource).or_default();
                let booking = Booking {
                    window: event.window,
                    event_id: event.id.clone(),
                };
                let pos = entries
                    .partition_point(|b| b.window.start < booking.window.start);
                entries.insert(pos, booking);
            }
        }
        self.events.insert(event.id.clone(), event);
    }

    /// Removes an event from the index.
    pub fn remove(&mut self, event_id: &str) {
        if self.events.remove(event_id).is_some() {
            for entries in self.bookings.values_mut() {
                entries.retain(|b| b.event_id != event_id);
            }
            self.bookings.retain(|_, entries| !entries.is_empty());
        }
    }

    /// Looks up an indexed event.
    pub fn event(&self, event_id: &str) -> Option<&Event> {
        self.events.get(event_id)
    }

    /// Active events booked on `resource` with windows overlapping `window`.
    ///
    /// Results are ordered by booking start. `exclude` suppresses the
    /// candidate itself on the update path.
    pub fn overlapping(
        &self,
        resource: &ResourceRef,
        window: &TimeWindow,
        exclude: &str,
    ) -> Vec<&Event> {
        let Some(entries) = self.bookings.get(resource) else {
            return Vec::new();
        };
        // Bookings starting at or after the query end cannot overlap.
        let cutoff = entries.partition_point(|b| b.window.start < window.end);
        entries[..cutoff]
            .iter()
            .filter(|b| b.window.end > window.start && b.event_id != exclude)
            .filter_map(|b| self.events.get(&b.event_id))
            .collect()
    }

    /// Number of indexed events (active and inactive).
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the index holds no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// All events in the index.
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.values()
    }
}
