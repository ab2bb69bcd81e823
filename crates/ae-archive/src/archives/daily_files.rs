//! One JSON-lines file per UTC day: naming, appending, reading, pruning.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ArchiveResult;

/// Day-partitioned JSON-lines directory with a fixed file prefix.
#[derive(Debug, Clone)]
pub(crate) struct DailyFiles {
    dir: PathBuf,
    prefix: &'static str,
}

impl DailyFiles {
    pub(crate) fn open(dir: impl Into<PathBuf>, prefix: &'static str) -> ArchiveResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(DailyFiles { dir, prefix })
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    /// `{prefix}_YYYYMMDD.jsonl`
    pub(crate) fn file_name(&self, day: NaiveDate) -> String {
        format!("{}_{}.jsonl", self.prefix, day.format("%Y%m%d"))
    }

    pub(crate) fn path_for(&self, timestamp: DateTime<Utc>) -> PathBuf {
        self.dir.join(self.file_name(timestamp.date_naive()))
    }

    /// Day encoded in a file name produced by [`DailyFiles::file_name`].
    pub(crate) fn parse_day(&self, file_name: &str) -> Option<NaiveDate> {
        let stem = file_name
            .strip_prefix(self.prefix)?
            .strip_prefix('_')?
            .strip_suffix(".jsonl")?;
        NaiveDate::parse_from_str(stem, "%Y%m%d").ok()
    }

    /// Day files in ascending day order. Unrelated files are ignored.
    pub(crate) fn list(&self) -> ArchiveResult<Vec<(NaiveDate, PathBuf)>> {
        let mut days = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(day) = self.parse_day(name) {
                days.push((day, path));
            }
        }
        days.sort();
        Ok(days)
    }

    /// Append records to `path`, one JSON document per line.
    pub(crate) fn append<T: Serialize>(&self, path: &Path, records: &[T]) -> ArchiveResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::new(file);
        for record in records {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Read every record of every day file in day order.
    ///
    /// Lines that fail to parse are skipped with a warning; a torn final line
    /// after a crash must not make the whole archive unreadable.
    pub(crate) fn read_all<T: DeserializeOwned>(&self) -> ArchiveResult<Vec<T>> {
        let mut records = Vec::new();
        for (_, path) in self.list()? {
            let reader = BufReader::new(File::open(&path)?);
            for (index, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str(&line) {
                    Ok(record) => records.push(record),
                    Err(err) => warn!(
                        file = %path.display(),
                        line = index + 1,
                        error = %err,
                        "skipping unreadable archive record"
                    ),
                }
            }
        }
        Ok(records)
    }

    /// Delete day files strictly older than the day of `cutoff`.
    ///
    /// Returns the number of files removed.
    pub(crate) fn prune_before(&self, cutoff: DateTime<Utc>) -> ArchiveResult<usize> {
        let cutoff_day = cutoff.date_naive();
        let mut removed = 0;
        for (day, path) in self.list()? {
            if day < cutoff_day {
                fs::remove_file(&path)?;
                debug!(file = %path.display(), "removed outdated day file");
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Row {
        n: i32,
    }

    #[test]
    fn test_file_name_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let files = DailyFiles::open(dir.path(), "trend").unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 4, 9).unwrap();
        assert_eq!(files.file_name(day), "trend_20260409.jsonl");
        assert_eq!(files.parse_day("trend_20260409.jsonl"), Some(day));
        assert_eq!(files.parse_day("events_20260409.jsonl"), None);
        assert_eq!(files.parse_day("trend_2026.jsonl"), None);
    }

    #[test]
    fn test_append_and_read_skip_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let files = DailyFiles::open(dir.path(), "trend").unwrap();
        let ts = Utc.with_ymd_and_hms(2026, 4, 9, 10, 0, 0).unwrap();
        let path = files.path_for(ts);
        files.append(&path, &[Row { n: 1 }, Row { n: 2 }]).unwrap();
        fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"{\"n\":")
            .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let rows: Vec<Row> = files.read_all().unwrap();
        assert_eq!(rows, vec![Row { n: 1 }, Row { n: 2 }]);
    }

    #[test]
    fn test_prune_before_keeps_cutoff_day() {
        let dir = tempfile::tempdir().unwrap();
        let files = DailyFiles::open(dir.path(), "events").unwrap();
        for day in 1..=3 {
            let ts = Utc.with_ymd_and_hms(2026, 4, day, 12, 0, 0).unwrap();
            files.append(&files.path_for(ts), &[Row { n: day as i32 }]).unwrap();
        }
        let cutoff = Utc.with_ymd_and_hms(2026, 4, 2, 18, 0, 0).unwrap();
        assert_eq!(files.prune_before(cutoff).unwrap(), 1);
        let left: Vec<u32> = files
            .list()
            .unwrap()
            .iter()
            .map(|(d, _)| chrono::Datelike::day(d))
            .collect();
        assert_eq!(left, vec![2, 3]);
    }
}
