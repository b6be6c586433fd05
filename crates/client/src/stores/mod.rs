//! Client-side state for the active room.

pub mod messages;
pub mod presence;

pub use messages::{AppendOutcome, Timeline};
pub use presence::{PresenceChange, Roster};

use bubble_shared::RoomId;

/// Generation of a room activation. Fetch results tagged with an older
/// generation are discarded.
pub type Generation = u64;

/// The room currently on screen and everything known about it.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveRoom {
    pub room: RoomId,
    pub generation: Generation,
    pub roster: Roster,
    pub timeline: Timeline,
}

impl ActiveRoom {
    pub fn new(room: RoomId, generation: Generation) -> Self {
        Self {
            timeline: Timeline::for_room(room.clone()),
            roster: Roster::new(),
            room,
            generation,
        }
    }

    pub fn is(&self, room: &RoomId) -> bool {
        &self.room == room
    }
}
