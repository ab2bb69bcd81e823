//! Event archive keeping events in memory.

use std::sync::RwLock;
use std::time::Duration;

use ae_common::{DataFilter, Event, EventId};
use chrono::{DateTime, Utc};

use super::event_table::EventTable;
use super::{read, retention_cutoff, write};
use crate::context::CallContext;
use crate::contract::{Archive, ArchiveState, EventArchive};
use crate::error::ArchiveResult;

#[derive(Debug)]
pub struct MemoryEventArchive {
    code: String,
    state: ArchiveState,
    retention: Duration,
    table: RwLock<EventTable>,
}

impl MemoryEventArchive {
    pub fn new(code: impl Into<String>, cleanup_period: Duration, retention: Duration) -> Self {
        MemoryEventArchive {
            code: code.into(),
            state: ArchiveState::new(cleanup_period),
            retention,
            table: RwLock::new(EventTable::new()),
        }
    }

    pub fn event_count(&self) -> usize {
        read(&self.table).len()
    }
}

impl Archive for MemoryEventArchive {
    fn code(&self) -> &str {
        &self.code
    }

    fn state(&self) -> &ArchiveState {
        &self.state
    }

    fn delete_outdated_data(&self, ctx: &CallContext) -> ArchiveResult<()> {
        let cutoff = retention_cutoff(ctx.now(), self.retention);
        let removed = write(&self.table).remove_before(cutoff);
        tracing::debug!(archive = %self.code, removed, "dropped outdated events");
        Ok(())
    }
}

impl EventArchive for MemoryEventArchive {
    fn write_event(&self, event: &Event, _ctx: &CallContext) -> ArchiveResult<()> {
        if write(&self.table).insert(event.clone()) {
            self.state.mark_written(event.timestamp);
        }
        Ok(())
    }

    fn get_event_by_id(&self, id: EventId, _ctx: &CallContext) -> ArchiveResult<Option<Event>> {
        Ok(read(&self.table).get(id).cloned())
    }

    fn get_events(
        &self,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        filter: &DataFilter,
        ctx: &CallContext,
    ) -> ArchiveResult<Vec<Event>> {
        ctx.checkpoint()?;
        Ok(read(&self.table).select(start_time, end_time, filter))
    }

    fn ack_event(
        &self,
        id: EventId,
        timestamp: DateTime<Utc>,
        user_id: i32,
        _ctx: &CallContext,
    ) -> ArchiveResult<bool> {
        Ok(write(&self.table).acknowledge(id, timestamp, user_id))
    }
}
