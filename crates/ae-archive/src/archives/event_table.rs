//! In-memory event index shared by the event archives.

use std::collections::{BTreeMap, HashMap};

use ae_common::{DataFilter, Event, EventId};
use chrono::{DateTime, Utc};

use crate::filter::select_events;

/// Events ordered by `(timestamp, id)` with a lookup index by id.
#[derive(Debug, Default)]
pub(crate) struct EventTable {
    by_time: BTreeMap<(DateTime<Utc>, EventId), Event>,
    by_id: HashMap<EventId, DateTime<Utc>>,
}

impl EventTable {
    pub(crate) fn new() -> Self {
        EventTable::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_id.len()
    }

    pub(crate) fn contains(&self, id: EventId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Store `event`. An event whose id is already stored is ignored and
    /// false is returned.
    pub(crate) fn insert(&mut self, event: Event) -> bool {
        if self.by_id.contains_key(&event.id) {
            return false;
        }
        self.by_id.insert(event.id, event.timestamp);
        self.by_time.insert((event.timestamp, event.id), event);
        true
    }

    pub(crate) fn get(&self, id: EventId) -> Option<&Event> {
        let timestamp = self.by_id.get(&id)?;
        self.by_time.get(&(*timestamp, id))
    }

    /// Apply an acknowledgment. Returns false when the event is unknown.
    pub(crate) fn acknowledge(&mut self, id: EventId, timestamp: DateTime<Utc>, user_id: i32) -> bool {
        let Some(&event_time) = self.by_id.get(&id) else {
            return false;
        };
        match self.by_time.get_mut(&(event_time, id)) {
            Some(event) => {
                event.acknowledge(timestamp, user_id);
                true
            }
            None => false,
        }
    }

    pub(crate) fn select(
        &self,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        filter: &DataFilter,
    ) -> Vec<Event> {
        select_events(self.by_time.values(), start_time, end_time, filter)
    }

    /// Drop events older than `cutoff`. Returns the number removed.
    pub(crate) fn remove_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let kept = self.by_time.split_off(&(cutoff, EventId(i64::MIN)));
        let removed = std::mem::replace(&mut self.by_time, kept);
        for id in removed.keys().map(|(_, id)| id) {
            self.by_id.remove(id);
        }
        removed.len()
    }
}
