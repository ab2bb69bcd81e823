//! Historical archive keeping trend rows in memory.

use std::sync::RwLock;
use std::time::Duration;

use ae_common::{CurrentData, Slice, Trend, TrendBundle};
use chrono::{DateTime, Utc};

use super::trend_table::TrendTable;
use super::{read, retention_cutoff, write};
use crate::context::CallContext;
use crate::contract::{Archive, ArchiveState, HistoricalArchive};
use crate::error::ArchiveResult;

/// Trend rows held in memory, recorded at most once per write period and
/// dropped after the retention period.
#[derive(Debug)]
pub struct MemoryTrendArchive {
    code: String,
    state: ArchiveState,
    retention: Duration,
    table: RwLock<TrendTable>,
}

impl MemoryTrendArchive {
    pub fn new(
        code: impl Into<String>,
        cleanup_period: Duration,
        retention: Duration,
        write_period: Duration,
    ) -> Self {
        MemoryTrendArchive {
            code: code.into(),
            state: ArchiveState::new(cleanup_period),
            retention,
            table: RwLock::new(TrendTable::new(write_period)),
        }
    }

    /// Number of stored rows.
    pub fn row_count(&self) -> usize {
        read(&self.table).len()
    }
}

impl Archive for MemoryTrendArchive {
    fn code(&self) -> &str {
        &self.code
    }

    fn state(&self) -> &ArchiveState {
        &self.state
    }

    fn delete_outdated_data(&self, ctx: &CallContext) -> ArchiveResult<()> {
        let cutoff = retention_cutoff(ctx.now(), self.retention);
        let removed = write(&self.table).remove_before(cutoff);
        tracing::debug!(archive = %self.code, removed, "dropped outdated trend rows");
        Ok(())
    }
}

impl HistoricalArchive for MemoryTrendArchive {
    fn process_data(&self, cur: &CurrentData, _ctx: &CallContext) -> ArchiveResult<()> {
        if write(&self.table).record(cur).is_some() {
            self.state.mark_written(cur.timestamp);
        }
        Ok(())
    }

    fn get_trends(
        &self,
        cnl_nums: &[i32],
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        ctx: &CallContext,
    ) -> ArchiveResult<TrendBundle> {
        read(&self.table).trends(cnl_nums, start_time, end_time, ctx)
    }

    fn get_trend(
        &self,
        cnl_num: i32,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        ctx: &CallContext,
    ) -> ArchiveResult<Trend> {
        read(&self.table).trend(cnl_num, start_time, end_time, ctx)
    }

    fn get_timestamps(
        &self,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        _ctx: &CallContext,
    ) -> ArchiveResult<Vec<DateTime<Utc>>> {
        Ok(read(&self.table).timestamps(start_time, end_time))
    }

    fn get_slice(
        &self,
        cnl_nums: &[i32],
        timestamp: DateTime<Utc>,
        _ctx: &CallContext,
    ) -> ArchiveResult<Slice> {
        Ok(read(&self.table).slice(cnl_nums, timestamp))
    }
}
