//! Archive capability contracts.
//!
//! An archive implements exactly one of three capabilities:
//!
//! - [`CurrentArchive`]: keeps the instantaneous snapshot and may restore it
//! - [`HistoricalArchive`]: stores trends and answers time-range queries
//! - [`EventArchive`]: stores incidents and their acknowledgments
//!
//! All of them share the [`Archive`] base: a stable code, runtime state and a
//! retention hook. The holder resolves the capability once, at registration,
//! through [`ArchiveHandle`].
//!
//! Query methods must return empty containers when there is no data, never an
//! error. Time ranges are closed (`start <= t <= end`) and results are in
//! ascending time order.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use ae_common::{
    ArchiveKind, CurrentData, DataFilter, Event, EventId, Slice, Trend, TrendBundle,
};
use chrono::{DateTime, Utc};

use crate::context::CallContext;
use crate::error::ArchiveResult;

/// Runtime bookkeeping owned by every archive.
///
/// The cleanup period is fixed at construction. Write and cleanup times are
/// advisory and only change through the methods below.
#[derive(Debug)]
pub struct ArchiveState {
    cleanup_period: Duration,
    times: Mutex<StateTimes>,
}

#[derive(Debug, Default, Clone, Copy)]
struct StateTimes {
    last_write: Option<DateTime<Utc>>,
    last_cleanup: Option<DateTime<Utc>>,
}

impl ArchiveState {
    pub fn new(cleanup_period: Duration) -> Self {
        ArchiveState {
            cleanup_period,
            times: Mutex::new(StateTimes::default()),
        }
    }

    pub fn cleanup_period(&self) -> Duration {
        self.cleanup_period
    }

    pub fn last_write_time(&self) -> Option<DateTime<Utc>> {
        self.times().last_write
    }

    pub fn last_cleanup_time(&self) -> Option<DateTime<Utc>> {
        self.times().last_cleanup
    }

    /// Record that data was written at `timestamp`.
    pub fn mark_written(&self, timestamp: DateTime<Utc>) {
        self.lock().last_write = Some(timestamp);
    }

    /// Claim a cleanup run at `now`.
    ///
    /// Returns true and stamps `now` as the last cleanup time when more than
    /// the cleanup period has elapsed since the previous run (or there was
    /// none). The stamp happens before the caller runs the cleanup, so a
    /// failing cleanup is not retried until the next period.
    pub fn begin_cleanup(&self, now: DateTime<Utc>) -> bool {
        let mut times = self.lock();
        let due = match times.last_cleanup {
            None => true,
            Some(last) => now
                .signed_duration_since(last)
                .to_std()
                .is_ok_and(|elapsed| elapsed > self.cleanup_period),
        };
        if due {
            times.last_cleanup = Some(now);
        }
        due
    }

    fn times(&self) -> StateTimes {
        *self.lock()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StateTimes> {
        self.times.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Behaviour shared by every archive kind.
pub trait Archive: Send + Sync {
    /// Stable human-readable identifier used in diagnostics.
    fn code(&self) -> &str;

    /// Runtime state owned by this archive.
    fn state(&self) -> &ArchiveState;

    /// Apply the archive's retention policy. Defaults to a no-op.
    fn delete_outdated_data(&self, _ctx: &CallContext) -> ArchiveResult<()> {
        Ok(())
    }
}

/// Instantaneous snapshot storage.
pub trait CurrentArchive: Archive {
    /// Fill known values into the live snapshot.
    ///
    /// Returns true when this archive supplied authoritative values; the
    /// holder then stops asking further current archives.
    fn read_data(&self, cur: &mut CurrentData, ctx: &CallContext) -> ArchiveResult<bool>;

    /// Absorb the snapshot after every current archive had a chance to read.
    fn process_data(&self, cur: &CurrentData, ctx: &CallContext) -> ArchiveResult<()>;

    /// Persist whatever `process_data` has not written yet. Called on
    /// shutdown. Defaults to a no-op.
    fn flush(&self, _ctx: &CallContext) -> ArchiveResult<()> {
        Ok(())
    }
}

/// Historical trend storage.
pub trait HistoricalArchive: Archive {
    /// Ingest a snapshot for later trend queries.
    fn process_data(&self, cur: &CurrentData, ctx: &CallContext) -> ArchiveResult<()>;

    /// Trends of several channels on a shared timestamp axis.
    fn get_trends(
        &self,
        cnl_nums: &[i32],
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        ctx: &CallContext,
    ) -> ArchiveResult<TrendBundle>;

    /// Trend of a single channel.
    fn get_trend(
        &self,
        cnl_num: i32,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        ctx: &CallContext,
    ) -> ArchiveResult<Trend>;

    /// Timestamps of stored rows in the range.
    fn get_timestamps(
        &self,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        ctx: &CallContext,
    ) -> ArchiveResult<Vec<DateTime<Utc>>>;

    /// Values of several channels at one timestamp.
    fn get_slice(
        &self,
        cnl_nums: &[i32],
        timestamp: DateTime<Utc>,
        ctx: &CallContext,
    ) -> ArchiveResult<Slice>;

    /// Flush or commit after an update cycle. Defaults to a no-op.
    fn end_update(&self, _ctx: &CallContext) -> ArchiveResult<()> {
        Ok(())
    }
}

/// Event log storage.
pub trait EventArchive: Archive {
    fn write_event(&self, event: &Event, ctx: &CallContext) -> ArchiveResult<()>;

    fn get_event_by_id(&self, id: EventId, ctx: &CallContext) -> ArchiveResult<Option<Event>>;

    /// Events in the range that match `filter`.
    fn get_events(
        &self,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        filter: &DataFilter,
        ctx: &CallContext,
    ) -> ArchiveResult<Vec<Event>>;

    /// Acknowledge an event. Returns false when this archive does not hold it.
    fn ack_event(
        &self,
        id: EventId,
        timestamp: DateTime<Utc>,
        user_id: i32,
        ctx: &CallContext,
    ) -> ArchiveResult<bool>;
}

/// A registered archive, tagged by the capability it implements.
#[derive(Clone)]
pub enum ArchiveHandle {
    Current(Arc<dyn CurrentArchive>),
    Historical(Arc<dyn HistoricalArchive>),
    Event(Arc<dyn EventArchive>),
}

impl ArchiveHandle {
    pub fn current(archive: impl CurrentArchive + 'static) -> Self {
        ArchiveHandle::Current(Arc::new(archive))
    }

    pub fn historical(archive: impl HistoricalArchive + 'static) -> Self {
        ArchiveHandle::Historical(Arc::new(archive))
    }

    pub fn event(archive: impl EventArchive + 'static) -> Self {
        ArchiveHandle::Event(Arc::new(archive))
    }

    pub fn kind(&self) -> ArchiveKind {
        match self {
            ArchiveHandle::Current(_) => ArchiveKind::Current,
            ArchiveHandle::Historical(_) => ArchiveKind::Historical,
            ArchiveHandle::Event(_) => ArchiveKind::Event,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            ArchiveHandle::Current(a) => a.code(),
            ArchiveHandle::Historical(a) => a.code(),
            ArchiveHandle::Event(a) => a.code(),
        }
    }

    pub fn state(&self) -> &ArchiveState {
        match self {
            ArchiveHandle::Current(a) => a.state(),
            ArchiveHandle::Historical(a) => a.state(),
            ArchiveHandle::Event(a) => a.state(),
        }
    }
}

impl fmt::Debug for ArchiveHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveHandle")
            .field("kind", &self.kind())
            .field("code", &self.code())
            .finish()
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for dyn super::CurrentArchive {}
    impl Sealed for dyn super::HistoricalArchive {}
    impl Sealed for dyn super::EventArchive {}
}

/// Capability selector for [`crate::ArchiveHolder::get_archive`].
///
/// Implemented for `dyn CurrentArchive`, `dyn HistoricalArchive` and
/// `dyn EventArchive`.
pub trait Capability: sealed::Sealed {
    /// The archive behind `handle`, if it implements this capability.
    fn select(handle: &ArchiveHandle) -> Option<Arc<Self>>;
}

impl Capability for dyn CurrentArchive {
    fn select(handle: &ArchiveHandle) -> Option<Arc<Self>> {
        match handle {
            ArchiveHandle::Current(a) => Some(Arc::clone(a)),
            _ => None,
        }
    }
}

impl Capability for dyn HistoricalArchive {
    fn select(handle: &ArchiveHandle) -> Option<Arc<Self>> {
        match handle {
            ArchiveHandle::Historical(a) => Some(Arc::clone(a)),
            _ => None,
        }
    }
}

impl Capability for dyn EventArchive {
    fn select(handle: &ArchiveHandle) -> Option<Arc<Self>> {
        match handle {
            ArchiveHandle::Event(a) => Some(Arc::clone(a)),
            _ => None,
        }
    }
}
