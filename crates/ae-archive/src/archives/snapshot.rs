//! Current archive keeping the latest snapshot.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ae_common::CurrentData;
use chrono::{DateTime, Utc};

use crate::context::CallContext;
use crate::contract::{Archive, ArchiveState, CurrentArchive};
use crate::error::ArchiveResult;

#[derive(Debug, Default)]
struct SnapshotState {
    stored: Option<CurrentData>,
    restored: bool,
    last_flush: Option<DateTime<Utc>>,
}

/// Latest snapshot, optionally persisted to a JSON file.
///
/// On the first [`CurrentArchive::read_data`] after start-up the stored
/// values fill every channel the live snapshot does not define yet. The file
/// is rewritten at most once per flush period, by snapshot time.
#[derive(Debug)]
pub struct SnapshotArchive {
    code: String,
    state: ArchiveState,
    path: Option<PathBuf>,
    flush_period: Duration,
    inner: Mutex<SnapshotState>,
}

impl SnapshotArchive {
    /// Snapshot archive without persistence.
    pub fn in_memory(code: impl Into<String>, cleanup_period: Duration) -> Self {
        SnapshotArchive {
            code: code.into(),
            state: ArchiveState::new(cleanup_period),
            path: None,
            flush_period: Duration::ZERO,
            inner: Mutex::new(SnapshotState::default()),
        }
    }

    /// Snapshot archive persisted at `path`, loading it when present.
    ///
    /// A file that does not parse is ignored with a warning.
    pub fn open(
        code: impl Into<String>,
        path: impl Into<PathBuf>,
        cleanup_period: Duration,
        flush_period: Duration,
    ) -> ArchiveResult<Self> {
        let code = code.into();
        let path = path.into();
        let stored = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<CurrentData>(&bytes) {
                Ok(snapshot) => Some(snapshot),
                Err(err) => {
                    tracing::warn!(
                        archive = %code,
                        file = %path.display(),
                        error = %err,
                        "ignoring unreadable snapshot file"
                    );
                    None
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        };

        let state = ArchiveState::new(cleanup_period);
        if let Some(snapshot) = &stored {
            state.mark_written(snapshot.timestamp);
        }
        Ok(SnapshotArchive {
            code,
            state,
            path: Some(path),
            flush_period,
            inner: Mutex::new(SnapshotState {
                last_flush: stored.as_ref().map(|s| s.timestamp),
                stored,
                restored: false,
            }),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Copy of the stored snapshot.
    pub fn stored(&self) -> Option<CurrentData> {
        self.lock().stored.clone()
    }

    fn lock(&self) -> MutexGuard<'_, SnapshotState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush_due(&self, inner: &SnapshotState, timestamp: DateTime<Utc>) -> bool {
        match inner.last_flush {
            None => true,
            Some(last) => timestamp
                .signed_duration_since(last)
                .to_std()
                .is_ok_and(|gap| gap >= self.flush_period),
        }
    }
}

/// Write `snapshot` to `path` through a temporary file and a rename.
fn persist(path: &Path, snapshot: &CurrentData) -> ArchiveResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    let json = serde_json::to_vec_pretty(snapshot)?;
    {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(&json)?;
        file.flush()?;
    }
    fs::rename(tmp_path, path)?;
    Ok(())
}

impl Archive for SnapshotArchive {
    fn code(&self) -> &str {
        &self.code
    }

    fn state(&self) -> &ArchiveState {
        &self.state
    }
}

impl CurrentArchive for SnapshotArchive {
    fn read_data(&self, cur: &mut CurrentData, _ctx: &CallContext) -> ArchiveResult<bool> {
        let mut inner = self.lock();
        if inner.restored {
            return Ok(false);
        }
        inner.restored = true;
        let Some(stored) = &inner.stored else {
            return Ok(false);
        };

        let mut supplied = false;
        for (cnl_num, data) in stored.iter() {
            if data.is_undefined() || !cur.get(cnl_num).is_undefined() {
                continue;
            }
            cur.set(cnl_num, data);
            supplied = true;
        }
        if supplied {
            tracing::info!(archive = %self.code, "restored current data");
        }
        Ok(supplied)
    }

    fn process_data(&self, cur: &CurrentData, _ctx: &CallContext) -> ArchiveResult<()> {
        let mut inner = self.lock();
        inner.stored = Some(cur.clone());
        self.state.mark_written(cur.timestamp);

        let Some(path) = &self.path else {
            return Ok(());
        };
        if self.flush_due(&inner, cur.timestamp) {
            persist(path, cur)?;
            inner.last_flush = Some(cur.timestamp);
        }
        Ok(())
    }

    fn flush(&self, _ctx: &CallContext) -> ArchiveResult<()> {
        let mut inner = self.lock();
        let (Some(path), Some(stored)) = (&self.path, &inner.stored) else {
            return Ok(());
        };
        let timestamp = stored.timestamp;
        if inner.last_flush == Some(timestamp) {
            return Ok(());
        }
        persist(path, stored)?;
        inner.last_flush = Some(timestamp);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ae_common::CnlData;
    use chrono::TimeZone;

    fn t(sec: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(sec)
    }

    #[test]
    fn test_in_memory_restores_once() {
        let archive = SnapshotArchive::in_memory("Cur", Duration::from_secs(60));
        let ctx = CallContext::unbounded();
        let mut first = CurrentData::new(t(0));
        first.set(1, CnlData::defined(5.0));
        archive.process_data(&first, &ctx).unwrap();

        // Not yet restored, so the stored value fills the gap.
        let mut live = CurrentData::with_channels(t(10), &[1, 2]);
        assert!(archive.read_data(&mut live, &ctx).unwrap());
        assert_eq!(live.get(1).val, 5.0);
        assert!(live.get(2).is_undefined());

        let mut again = CurrentData::with_channels(t(20), &[1]);
        assert!(!archive.read_data(&mut again, &ctx).unwrap());
        assert!(again.get(1).is_undefined());
    }

    #[test]
    fn test_defined_live_values_win() {
        let archive = SnapshotArchive::in_memory("Cur", Duration::from_secs(60));
        let ctx = CallContext::unbounded();
        let mut stored = CurrentData::new(t(0));
        stored.set(1, CnlData::defined(5.0));
        archive.process_data(&stored, &ctx).unwrap();

        let mut live = CurrentData::new(t(1));
        live.set(1, CnlData::defined(9.0));
        assert!(!archive.read_data(&mut live, &ctx).unwrap());
        assert_eq!(live.get(1).val, 9.0);
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("cur.json");
        let ctx = CallContext::unbounded();
        {
            let archive =
                SnapshotArchive::open("Cur", &path, Duration::from_secs(60), Duration::from_secs(10))
                    .unwrap();
            let mut cur = CurrentData::new(t(0));
            cur.set(3, CnlData::defined(1.5));
            archive.process_data(&cur, &ctx).unwrap();
            // Within the flush period and never flushed: lost on reopen.
            cur.timestamp = t(5);
            cur.set(3, CnlData::defined(2.5));
            archive.process_data(&cur, &ctx).unwrap();
        }
        assert!(!path.with_extension("json.tmp").exists());

        let reopened =
            SnapshotArchive::open("Cur", &path, Duration::from_secs(60), Duration::from_secs(10))
                .unwrap();
        assert_eq!(reopened.state().last_write_time(), Some(t(0)));
        let mut live = CurrentData::with_channels(t(100), &[3]);
        assert!(reopened.read_data(&mut live, &ctx).unwrap());
        assert_eq!(live.get(3).val, 1.5);
    }

    #[test]
    fn test_flush_writes_latest_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cur.json");
        let ctx = CallContext::unbounded();
        {
            let archive =
                SnapshotArchive::open("Cur", &path, Duration::from_secs(60), Duration::from_secs(10))
                    .unwrap();
            let mut cur = CurrentData::new(t(0));
            cur.set(3, CnlData::defined(1.5));
            archive.process_data(&cur, &ctx).unwrap();
            cur.timestamp = t(5);
            cur.set(3, CnlData::defined(2.5));
            archive.process_data(&cur, &ctx).unwrap();
            archive.flush(&ctx).unwrap();
        }

        let reopened =
            SnapshotArchive::open("Cur", &path, Duration::from_secs(60), Duration::from_secs(10))
                .unwrap();
        assert_eq!(reopened.state().last_write_time(), Some(t(5)));
        let mut live = CurrentData::with_channels(t(100), &[3]);
        assert!(reopened.read_data(&mut live, &ctx).unwrap());
        assert_eq!(live.get(3).val, 2.5);
    }

    #[test]
    fn test_flush_without_new_data_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cur.json");
        let ctx = CallContext::unbounded();
        let archive =
            SnapshotArchive::open("Cur", &path, Duration::from_secs(60), Duration::from_secs(10))
                .unwrap();
        archive.flush(&ctx).unwrap();
        assert!(!path.exists());

        let mut cur = CurrentData::new(t(0));
        cur.set(1, CnlData::defined(4.0));
        archive.process_data(&cur, &ctx).unwrap();
        let written = fs::read(&path).unwrap();
        archive.flush(&ctx).unwrap();
        assert_eq!(fs::read(&path).unwrap(), written);

        // In-memory archives have nothing to flush.
        let memory = SnapshotArchive::in_memory("Mem", Duration::from_secs(60));
        memory.process_data(&cur, &ctx).unwrap();
        memory.flush(&ctx).unwrap();
    }

    #[test]
    fn test_corrupt_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cur.json");
        fs::write(&path, "not json").unwrap();
        let archive =
            SnapshotArchive::open("Cur", &path, Duration::from_secs(60), Duration::from_secs(10))
                .unwrap();
        assert!(archive.stored().is_none());
    }
}
