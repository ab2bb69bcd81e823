//! Built-in archive implementations.
//!
//! - [`SnapshotArchive`]: current archive keeping the latest snapshot
//! - [`MemoryTrendArchive`] and [`JsonlTrendArchive`]: historical archives
//! - [`MemoryEventArchive`] and [`JsonlEventArchive`]: event archives
//!
//! The file-backed variants share their in-memory index with the memory
//! variants and persist to one JSON-lines file per UTC day.

mod daily_files;
mod event_table;
mod jsonl_events;
mod jsonl_trend;
mod memory_events;
mod memory_trend;
mod snapshot;
mod trend_table;

pub use jsonl_events::JsonlEventArchive;
pub use jsonl_trend::JsonlTrendArchive;
pub use memory_events::MemoryEventArchive;
pub use memory_trend::MemoryTrendArchive;
pub use snapshot::SnapshotArchive;

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard, PoisonError};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// `now - retention`, saturating at the earliest representable time.
fn retention_cutoff(
    now: chrono::DateTime<chrono::Utc>,
    retention: std::time::Duration,
) -> chrono::DateTime<chrono::Utc> {
    chrono::Duration::from_std(retention)
        .ok()
        .and_then(|r| now.checked_sub_signed(r))
        .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC)
}
