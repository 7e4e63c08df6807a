//! Resource references.
//!
//! A resource is any entity an event commits for its duration: the
//! facility it occupies, the coach running it, each required player, and
//! any shared equipment unit. `ResourceRef` is the key of the booking
//! index and the subject of every conflict record.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A typed reference to a bookable resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceRef {
    /// A physical space (field, gym, rink).
    Facility(String),
    /// A coach committed to run the event.
    Coach(String),
    /// A player required on the roster.
    Player(String),
    /// The team the event belongs to.
    Team(String),
    /// A shared limited resource (e.g. a portable goal set).
    Equipment(String),
}

impl ResourceRef {
    /// The underlying identifier, without the type tag.
    pub fn id(&self) -> &str {
        match self {
            ResourceRef::Facility(id)
            | ResourceRef::Coach(id)
            | ResourceRef::Player(id)
            | ResourceRef::Team(id)
            | ResourceRef::Equipment(id) => id,
        }
    }

    /// Whether this reference points at a person (coach or player).
    pub fn is_person(&self) -> bool {
        matches!(self, ResourceRef::Coach(_) | ResourceRef::Player(_))
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceRef::Facility(id) => write!(f, "facility:{id}"),
            ResourceRef::Coach(id) => write!(f, "coach:{id}"),
            ResourceRef::Player(id) => write!(f, "player:{id}"),
            ResourceRef::Team(id) => write!(f, "team:{id}"),
            ResourceRef::Equipment(id) => write!(f, "equipment:{id}"),
        }
    }
}
