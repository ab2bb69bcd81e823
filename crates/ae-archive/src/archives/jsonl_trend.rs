//! Historical archive persisting trend rows to daily JSON-lines files.

use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use ae_common::{CurrentData, Slice, Trend, TrendBundle};
use chrono::{DateTime, Utc};

use super::daily_files::DailyFiles;
use super::trend_table::{TrendRow, TrendTable};
use super::{read, retention_cutoff, write};
use crate::context::CallContext;
use crate::contract::{Archive, ArchiveState, HistoricalArchive};
use crate::error::ArchiveResult;

const FILE_PREFIX: &str = "trend";

#[derive(Debug)]
struct TrendStore {
    table: TrendTable,
    /// Recorded rows not yet appended to disk.
    pending: Vec<TrendRow>,
}

/// Trend rows buffered in memory and appended to `trend_YYYYMMDD.jsonl`.
///
/// Rows are flushed on [`HistoricalArchive::end_update`] or once
/// `flush_rows` rows are pending. Existing files are loaded on open.
#[derive(Debug)]
pub struct JsonlTrendArchive {
    code: String,
    state: ArchiveState,
    retention_days: u32,
    flush_rows: usize,
    files: DailyFiles,
    store: RwLock<TrendStore>,
}

impl JsonlTrendArchive {
    /// Open the archive in `dir`, creating the directory if needed.
    pub fn open(
        code: impl Into<String>,
        dir: impl Into<PathBuf>,
        cleanup_period: Duration,
        retention_days: u32,
        write_period: Duration,
        flush_rows: usize,
    ) -> ArchiveResult<Self> {
        let code = code.into();
        let files = DailyFiles::open(dir, FILE_PREFIX)?;
        let mut table = TrendTable::new(write_period);
        let rows: Vec<TrendRow> = files.read_all()?;
        let loaded = rows.len();
        for row in rows {
            table.insert(row);
        }
        let state = ArchiveState::new(cleanup_period);
        if let Some(last) = table.last_timestamp() {
            state.mark_written(last);
        }
        tracing::debug!(archive = %code, dir = %files.dir().display(), loaded, "opened trend archive");

        Ok(JsonlTrendArchive {
            code,
            state,
            retention_days,
            flush_rows: flush_rows.max(1),
            files,
            store: RwLock::new(TrendStore {
                table,
                pending: Vec::new(),
            }),
        })
    }

    pub fn dir(&self) -> &Path {
        self.files.dir()
    }

    /// Rows recorded but not yet written to disk.
    pub fn pending_rows(&self) -> usize {
        read(&self.store).pending.len()
    }

    fn flush(&self, store: &mut TrendStore) -> ArchiveResult<()> {
        if store.pending.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut store.pending);
        if let Err(err) = self.append_by_day(&pending) {
            // Keep the rows for the next flush; reloading tolerates duplicates.
            store.pending = pending;
            return Err(err);
        }
        Ok(())
    }

    fn append_by_day(&self, rows: &[TrendRow]) -> ArchiveResult<()> {
        let mut start = 0;
        while start < rows.len() {
            let day = rows[start].timestamp.date_naive();
            let end = rows[start..]
                .iter()
                .position(|r| r.timestamp.date_naive() != day)
                .map_or(rows.len(), |offset| start + offset);
            let path = self.files.path_for(rows[start].timestamp);
            self.files.append(&path, &rows[start..end])?;
            start = end;
        }
        Ok(())
    }
}

impl Archive for JsonlTrendArchive {
    fn code(&self) -> &str {
        &self.code
    }

    fn state(&self) -> &ArchiveState {
        &self.state
    }

    fn delete_outdated_data(&self, ctx: &CallContext) -> ArchiveResult<()> {
        let retention = Duration::from_secs(u64::from(self.retention_days) * 86_400);
        let cutoff = retention_cutoff(ctx.now(), retention);
        // Whole days only, so memory and disk agree after a restart.
        let day_start = cutoff
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|d| d.and_utc())
            .unwrap_or(cutoff);
        let mut store = write(&self.store);
        let files = self.files.prune_before(day_start)?;
        let rows = store.table.remove_before(day_start);
        let buffered = store.pending.len();
        store.pending.retain(|row| row.timestamp >= day_start);
        let pending = buffered - store.pending.len();
        tracing::debug!(archive = %self.code, files, rows, pending, "pruned trend archive");
        Ok(())
    }
}

impl HistoricalArchive for JsonlTrendArchive {
    fn process_data(&self, cur: &CurrentData, _ctx: &CallContext) -> ArchiveResult<()> {
        let mut store = write(&self.store);
        if let Some(row) = store.table.record(cur) {
            store.pending.push(row);
            self.state.mark_written(cur.timestamp);
            if store.pending.len() >= self.flush_rows {
                self.flush(&mut store)?;
            }
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
        read(&self.store).table.trends(cnl_nums, start_time, end_time, ctx)
    }

    fn get_trend(
        &self,
        cnl_num: i32,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        ctx: &CallContext,
    ) -> ArchiveResult<Trend> {
        read(&self.store).table.trend(cnl_num, start_time, end_time, ctx)
    }

    fn get_timestamps(
        &self,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        _ctx: &CallContext,
    ) -> ArchiveResult<Vec<DateTime<Utc>>> {
        Ok(read(&self.store).table.timestamps(start_time, end_time))
    }

    fn get_slice(
        &self,
        cnl_nums: &[i32],
        timestamp: DateTime<Utc>,
        _ctx: &CallContext,
    ) -> ArchiveResult<Slice> {
        Ok(read(&self.store).table.slice(cnl_nums, timestamp))
    }

    fn end_update(&self, ctx: &CallContext) -> ArchiveResult<()> {
        ctx.checkpoint()?;
        let mut store = write(&self.store);
        self.flush(&mut store)
    }
}
