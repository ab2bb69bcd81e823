//! Build archives and a populated holder from `archives.json`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ae_common::{Error, Result};
use ae_config::{ArchiveConfig, ArchiveEntry, StorageOptions};

use crate::archives::{
    JsonlEventArchive, JsonlTrendArchive, MemoryEventArchive, MemoryTrendArchive, SnapshotArchive,
};
use crate::contract::ArchiveHandle;
use crate::error::ArchiveError;
use crate::fault::FaultSink;
use crate::holder::ArchiveHolder;

/// Instantiate the archive described by `entry`.
///
/// Relative storage paths are resolved against `base_dir` when given.
pub fn build_archive(entry: &ArchiveEntry, base_dir: Option<&Path>) -> Result<ArchiveHandle> {
    let resolve = |path: &Path| -> PathBuf {
        match base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    };
    let code = entry.code.clone();
    let cleanup_period = entry.cleanup_period();
    let open_failed = |err: ArchiveError| Error::ArchiveFailed {
        code: entry.code.clone(),
        operation: "open".to_string(),
        detail: err.to_string(),
    };

    let handle = match &entry.storage {
        StorageOptions::Snapshot {
            path: None,
            flush_period_secs: _,
        } => ArchiveHandle::current(SnapshotArchive::in_memory(code, cleanup_period)),
        StorageOptions::Snapshot {
            path: Some(path),
            flush_period_secs,
        } => ArchiveHandle::current(
            SnapshotArchive::open(
                code,
                resolve(path),
                cleanup_period,
                Duration::from_secs(*flush_period_secs),
            )
            .map_err(open_failed)?,
        ),
        StorageOptions::MemoryTrend {
            retention_secs,
            write_period_secs,
        } => ArchiveHandle::historical(MemoryTrendArchive::new(
            code,
            cleanup_period,
            Duration::from_secs(*retention_secs),
            Duration::from_secs(*write_period_secs),
        )),
        StorageOptions::JsonlTrend {
            dir,
            retention_days,
            write_period_secs,
            flush_rows,
        } => ArchiveHandle::historical(
            JsonlTrendArchive::open(
                code,
                resolve(dir),
                cleanup_period,
                *retention_days,
                Duration::from_secs(*write_period_secs),
                *flush_rows,
            )
            .map_err(open_failed)?,
        ),
        StorageOptions::MemoryEvents { retention_secs } => ArchiveHandle::event(
            MemoryEventArchive::new(code, cleanup_period, Duration::from_secs(*retention_secs)),
        ),
        StorageOptions::JsonlEvents {
            dir,
            retention_days,
        } => ArchiveHandle::event(
            JsonlEventArchive::open(code, resolve(dir), cleanup_period, *retention_days)
                .map_err(open_failed)?,
        ),
    };
    Ok(handle)
}

/// Build a holder with every enabled archive of `config` registered.
///
/// Any archive that fails to open, or any registration error, aborts the
/// build.
pub fn build_holder(config: &ArchiveConfig, fault_sink: Arc<dyn FaultSink>) -> Result<ArchiveHolder> {
    let holder = ArchiveHolder::new(fault_sink, config.call_budget());
    for entry in config.enabled_archives() {
        let handle = build_archive(entry, config.base_dir.as_deref())?;
        holder.add_archive(handle, entry.bit)?;
    }
    Ok(holder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::MemoryFaultSink;
    use ae_common::ArchiveKind;

    #[test]
    fn test_default_config_builds_one_archive_per_kind() {
        let holder =
            build_holder(&ArchiveConfig::default(), Arc::new(MemoryFaultSink::new())).unwrap();
        assert_eq!(holder.archive_count(), 3);
        assert_eq!(holder.archive_kind(0), Some(ArchiveKind::Current));
        assert_eq!(holder.archive_kind(1), Some(ArchiveKind::Historical));
        assert_eq!(holder.archive_kind(2), Some(ArchiveKind::Event));
    }

    #[test]
    fn test_relative_paths_resolve_against_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let entry: ArchiveEntry = serde_json::from_str(
            r#"{ "code": "Hour", "bit": 4,
                 "storage": { "driver": "jsonl_trend", "dir": "hour" } }"#,
        )
        .unwrap();
        let handle = build_archive(&entry, Some(dir.path())).unwrap();
        assert_eq!(handle.kind(), ArchiveKind::Historical);
        assert!(dir.path().join("hour").is_dir());
    }

    #[test]
    fn test_open_failure_names_archive() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();
        let entry: ArchiveEntry = serde_json::from_str(
            r#"{ "code": "Ev", "bit": 2,
                 "storage": { "driver": "jsonl_events", "dir": "blocker/events" } }"#,
        )
        .unwrap();
        match build_archive(&entry, Some(dir.path())) {
            Err(Error::ArchiveFailed { code, operation, .. }) => {
                assert_eq!(code, "Ev");
                assert_eq!(operation, "open");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
