//! Event archive persisting to daily JSON-lines logs.
//!
//! Each `events_YYYYMMDD.jsonl` file holds two record types:
//!
//! ```text
//! {"op":"event","event":{...}}
//! {"op":"ack","id":17,"timestamp":"...","user_id":3}
//! ```
//!
//! Acknowledgments are appended to the day file of the event they refer to.
//! The log is replayed into memory on open.

use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use ae_common::{DataFilter, Event, EventId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::daily_files::DailyFiles;
use super::event_table::EventTable;
use super::{read, retention_cutoff, write};
use crate::context::CallContext;
use crate::contract::{Archive, ArchiveState, EventArchive};
use crate::error::ArchiveResult;

const FILE_PREFIX: &str = "events";

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum LogRecord {
    Event {
        event: Event,
    },
    Ack {
        id: EventId,
        timestamp: DateTime<Utc>,
        user_id: i32,
    },
}

#[derive(Debug)]
pub struct JsonlEventArchive {
    code: String,
    state: ArchiveState,
    retention_days: u32,
    files: DailyFiles,
    table: RwLock<EventTable>,
}

impl JsonlEventArchive {
    /// Open the archive in `dir` and replay its log.
    pub fn open(
        code: impl Into<String>,
        dir: impl Into<PathBuf>,
        cleanup_period: Duration,
        retention_days: u32,
    ) -> ArchiveResult<Self> {
        let code = code.into();
        let files = DailyFiles::open(dir, FILE_PREFIX)?;
        let state = ArchiveState::new(cleanup_period);
        let mut table = EventTable::new();
        let mut latest: Option<DateTime<Utc>> = None;

        let records: Vec<LogRecord> = files.read_all()?;
        for record in records {
            match record {
                LogRecord::Event { event } => {
                    latest = latest.max(Some(event.timestamp));
                    table.insert(event);
                }
                LogRecord::Ack {
                    id,
                    timestamp,
                    user_id,
                } => {
                    table.acknowledge(id, timestamp, user_id);
                }
            }
        }
        if let Some(ts) = latest {
            state.mark_written(ts);
        }
        tracing::debug!(
            archive = %code,
            dir = %files.dir().display(),
            events = table.len(),
            "opened event archive"
        );

        Ok(JsonlEventArchive {
            code,
            state,
            retention_days,
            files,
            table: RwLock::new(table),
        })
    }

    pub fn dir(&self) -> &Path {
        self.files.dir()
    }

    pub fn event_count(&self) -> usize {
        read(&self.table).len()
    }
}

impl Archive for JsonlEventArchive {
    fn code(&self) -> &str {
        &self.code
    }

    fn state(&self) -> &ArchiveState {
        &self.state
    }

    fn delete_outdated_data(&self, ctx: &CallContext) -> ArchiveResult<()> {
        let retention = Duration::from_secs(u64::from(self.retention_days) * 86_400);
        let cutoff = retention_cutoff(ctx.now(), retention);
        let day_start = cutoff
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|d| d.and_utc())
            .unwrap_or(cutoff);
        let files = self.files.prune_before(day_start)?;
        let events = write(&self.table).remove_before(day_start);
        tracing::debug!(archive = %self.code, files, events, "pruned event archive");
        Ok(())
    }
}

impl EventArchive for JsonlEventArchive {
    fn write_event(&self, event: &Event, _ctx: &CallContext) -> ArchiveResult<()> {
        let mut table = write(&self.table);
        if table.contains(event.id) {
            return Ok(());
        }
        let path = self.files.path_for(event.timestamp);
        self.files.append(
            &path,
            &[LogRecord::Event {
                event: event.clone(),
            }],
        )?;
        table.insert(event.clone());
        self.state.mark_written(event.timestamp);
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
        let mut table = write(&self.table);
        let Some(event_time) = table.get(id).map(|e| e.timestamp) else {
            return Ok(false);
        };
        let path = self.files.path_for(event_time);
        self.files.append(
            &path,
            &[LogRecord::Ack {
                id,
                timestamp,
                user_id,
            }],
        )?;
        Ok(table.acknowledge(id, timestamp, user_id))
    }
}
