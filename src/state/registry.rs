//! PIN-keyed registry of live rooms.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use rand::Rng;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::state::room::{Room, RoomSettings};

/// PIN range matching the classic six-digit game PINs.
const PIN_MIN: u32 = 100_000;
const PIN_MAX: u32 = 999_999;

/// Owns every live room, keyed by PIN.
///
/// This is the only state shared across rooms; each room is guarded by its
/// own mutex so operations on independent rooms never serialize against each
/// other. The registry is a plain value owned by the application root (not a
/// global), so tests can run several independent registries in-process.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<String, Arc<Mutex<Room>>>,
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a room with a PIN not currently in use, retrying generation on
    /// collision, and return the PIN with a handle to the new room.
    pub fn create_room(
        &self,
        settings: RoomSettings,
        topic_pool: Vec<String>,
        host: Uuid,
    ) -> (String, Arc<Mutex<Room>>) {
        loop {
            let pin = generate_pin();
            match self.rooms.entry(pin.clone()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    let room = Arc::new(Mutex::new(Room::new(
                        pin.clone(),
                        settings,
                        topic_pool,
                        host,
                    )));
                    slot.insert(room.clone());
                    return (pin, room);
                }
            }
        }
    }

    /// Look up a room by PIN. A stale or garbage PIN is a normal outcome.
    pub fn get(&self, pin: &str) -> Option<Arc<Mutex<Room>>> {
        self.rooms.get(pin).map(|entry| entry.value().clone())
    }

    /// Remove a room, freeing its PIN for regeneration. Idempotent; dropping
    /// the room aborts its timers.
    pub fn remove(&self, pin: &str) {
        self.rooms.remove(pin);
    }

    /// True iff a room with that PIN currently exists, regardless of phase.
    pub fn validate_pin(&self, pin: &str) -> bool {
        self.rooms.contains_key(pin)
    }

    /// Number of live rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// True when no rooms are registered.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

fn generate_pin() -> String {
    rand::rng().random_range(PIN_MIN..=PIN_MAX).to_string()
}
