//! Event identity types.
//!
//! Event ids are assigned once, when an incident is raised, and never reused.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Event identifier.
///
/// `EventId(0)` marks an event that has not been assigned an id yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub i64);

impl EventId {
    pub const UNASSIGNED: EventId = EventId(0);

    pub fn is_assigned(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EventId {
    fn from(id: i64) -> Self {
        EventId(id)
    }
}

impl std::str::FromStr for EventId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(EventId)
    }
}

/// Thread-safe, strictly monotonic event id source.
///
/// Seeded from the wall clock in microseconds so that ids issued after a
/// restart do not collide with ids persisted before it.
#[derive(Debug)]
pub struct EventIdGenerator {
    last: AtomicI64,
}

impl EventIdGenerator {
    /// Generator seeded from the current time.
    pub fn new() -> Self {
        Self::starting_after(chrono::Utc::now().timestamp_micros())
    }

    /// Generator whose first id is `last + 1`.
    pub fn starting_after(last: i64) -> Self {
        EventIdGenerator {
            last: AtomicI64::new(last.max(0)),
        }
    }

    /// Next id. Never returns [`EventId::UNASSIGNED`].
    pub fn next_id(&self) -> EventId {
        let now = chrono::Utc::now().timestamp_micros();
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = if now > current { now } else { current + 1 };
            match self.last.compare_exchange_weak(
                current,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return EventId(candidate),
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for EventIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
