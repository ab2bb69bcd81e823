//! In-memory trend rows shared by the historical archives.

use std::collections::btree_map::Range;
use std::collections::BTreeMap;
use std::time::Duration;

use ae_common::{CnlData, CurrentData, Slice, Trend, TrendBundle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::CallContext;
use crate::error::ArchiveResult;

/// Rows between two context checkpoints during a scan.
const CHECKPOINT_EVERY: usize = 256;

/// One stored row: every channel value of a snapshot at one time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct TrendRow {
    pub timestamp: DateTime<Utc>,
    pub values: BTreeMap<i32, CnlData>,
}

impl TrendRow {
    pub(crate) fn from_snapshot(cur: &CurrentData) -> Self {
        TrendRow {
            timestamp: cur.timestamp,
            values: cur.iter().collect(),
        }
    }
}

/// Time-ordered rows with a minimum spacing between recorded rows.
#[derive(Debug)]
pub(crate) struct TrendTable {
    rows: BTreeMap<DateTime<Utc>, BTreeMap<i32, CnlData>>,
    write_period: Duration,
}

impl TrendTable {
    pub(crate) fn new(write_period: Duration) -> Self {
        TrendTable {
            rows: BTreeMap::new(),
            write_period,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.rows.keys().next_back().copied()
    }

    /// Whether a snapshot taken at `timestamp` is due for recording.
    ///
    /// Rows never go back in time; a later row must be at least one write
    /// period after the last one.
    pub(crate) fn is_due(&self, timestamp: DateTime<Utc>) -> bool {
        match self.last_timestamp() {
            None => true,
            Some(last) if timestamp <= last => false,
            Some(last) => timestamp
                .signed_duration_since(last)
                .to_std()
                .is_ok_and(|gap| gap >= self.write_period),
        }
    }

    /// Record `cur` when due. Returns the stored row.
    pub(crate) fn record(&mut self, cur: &CurrentData) -> Option<TrendRow> {
        if !self.is_due(cur.timestamp) {
            return None;
        }
        let row = TrendRow::from_snapshot(cur);
        self.insert(row.clone());
        Some(row)
    }

    /// Insert a row as-is. A row at an existing timestamp replaces it.
    pub(crate) fn insert(&mut self, row: TrendRow) {
        self.rows.insert(row.timestamp, row.values);
    }

    pub(crate) fn trends(
        &self,
        cnl_nums: &[i32],
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        ctx: &CallContext,
    ) -> ArchiveResult<TrendBundle> {
        let mut bundle = TrendBundle::empty(cnl_nums);
        let mut values = Vec::with_capacity(cnl_nums.len());
        for (index, (&timestamp, row)) in self.range(start_time, end_time).enumerate() {
            if index % CHECKPOINT_EVERY == 0 {
                ctx.checkpoint()?;
            }
            values.clear();
            values.extend(cnl_nums.iter().map(|n| value_of(row, *n)));
            bundle.push_row(timestamp, &values)?;
        }
        Ok(bundle)
    }

    pub(crate) fn trend(
        &self,
        cnl_num: i32,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        ctx: &CallContext,
    ) -> ArchiveResult<Trend> {
        let mut trend = Trend::empty(cnl_num, start_time, end_time);
        for (index, (&timestamp, row)) in self.range(start_time, end_time).enumerate() {
            if index % CHECKPOINT_EVERY == 0 {
                ctx.checkpoint()?;
            }
            trend.push(timestamp, value_of(row, cnl_num))?;
        }
        Ok(trend)
    }

    pub(crate) fn timestamps(
        &self,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Vec<DateTime<Utc>> {
        self.range(start_time, end_time).map(|(&ts, _)| ts).collect()
    }

    /// Values of the row stored exactly at `timestamp`, else undefined.
    pub(crate) fn slice(&self, cnl_nums: &[i32], timestamp: DateTime<Utc>) -> Slice {
        match self.rows.get(&timestamp) {
            Some(row) => Slice {
                timestamp,
                cnl_nums: cnl_nums.to_vec(),
                values: cnl_nums.iter().map(|n| value_of(row, *n)).collect(),
            },
            None => Slice::undefined(cnl_nums, timestamp),
        }
    }

    /// Drop rows older than `cutoff`. Returns the number removed.
    pub(crate) fn remove_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let kept = self.rows.split_off(&cutoff);
        let removed = self.rows.len();
        self.rows = kept;
        removed
    }

    fn range(
        &self,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Range<'_, DateTime<Utc>, BTreeMap<i32, CnlData>> {
        if start_time <= end_time {
            self.rows.range(start_time..=end_time)
        } else {
            self.rows.range(start_time..start_time)
        }
    }
}

fn value_of(row: &BTreeMap<i32, CnlData>, cnl_num: i32) -> CnlData {
    row.get(&cnl_num).copied().unwrap_or(CnlData::EMPTY)
}
