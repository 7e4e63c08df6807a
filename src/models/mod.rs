//! Scheduling domain models.
//!
//! Pure data types for events, resources, conflicts, and time windows.
//! No engine behavior lives here — detection, resolution, and optimization
//! operate on these values without mutating shared state.
//!
//! # Domain Mapping
//!
//! | teamsched | Sports org |
//! |-----------|------------|
//! | Event | Practice / Game / Tournament / Meeting |
//! | ResourceRef | Facility, Coach, Player, Team, Equipment |
//! | Conflict | Incompatible commitment of a shared resource |
//! | TimeWindow | Booked interval, half-open |

mod conflict;
mod event;
mod resource;
mod window;

pub use conflict::{
    Conflict, ConflictFilter, ConflictKind, ConflictStatus, Severity, SuggestedMove,
};
pub use event::{Event, EventStatus, EventType};
pub use resource::ResourceRef;
pub use window::{FacilityCalendar, TimeWindow};
