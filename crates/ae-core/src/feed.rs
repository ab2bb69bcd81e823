//! Recorded acquisition feeds.
//!
//! A feed is a JSON-lines file where each line is one record:
//!
//! ```text
//! {"type":"snapshot","timestamp":"2026-07-01T00:00:00Z","values":{"10":{"val":1.5,"stat":1}}}
//! {"type":"event","mask":8,"event":{"id":0,"timestamp":"2026-07-01T00:00:05Z","severity":800}}
//! {"type":"ack","id":42,"timestamp":"2026-07-01T00:01:00Z","user_id":3}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use ae_common::{ArchiveMask, CnlData, CurrentData, Event, EventId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};
use crate::service::{AcquisitionService, ServiceStats};

/// Errors reading a feed file.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("cannot read feed {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

impl From<FeedError> for ae_common::Error {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::Io { source, .. } => ae_common::Error::Io(source),
            parse @ FeedError::Parse { .. } => ae_common::Error::Config(parse.to_string()),
        }
    }
}

fn default_mask() -> ArchiveMask {
    ArchiveMask::ALL
}

/// One line of a feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedRecord {
    /// Current-data snapshot for one update cycle.
    Snapshot {
        timestamp: DateTime<Utc>,
        #[serde(default, with = "cnl_keys")]
        values: BTreeMap<i32, CnlData>,
    },

    /// Event to raise. An id of 0 is assigned by the service.
    Event {
        #[serde(default = "default_mask")]
        mask: ArchiveMask,
        event: Event,
    },

    /// Acknowledgment of an earlier event.
    Ack {
        id: EventId,
        timestamp: DateTime<Utc>,
        #[serde(default)]
        user_id: i32,
    },
}

/// Channel-number keys as JSON object keys.
///
/// Tagged enums buffer their content, which loses serde_json's parsing of
/// numeric object keys, so the keys are converted by hand.
mod cnl_keys {
    use std::collections::BTreeMap;

    use ae_common::CnlData;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        values: &BTreeMap<i32, CnlData>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        values
            .iter()
            .map(|(cnl_num, data)| (cnl_num.to_string(), *data))
            .collect::<BTreeMap<String, CnlData>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<i32, CnlData>, D::Error> {
        BTreeMap::<String, CnlData>::deserialize(deserializer)?
            .into_iter()
            .map(|(key, data)| {
                key.trim()
                    .parse::<i32>()
                    .map(|cnl_num| (cnl_num, data))
                    .map_err(|_| D::Error::custom(format!("invalid channel number: {key:?}")))
            })
            .collect()
    }
}

impl FeedRecord {
    /// Snapshot record from live data.
    pub fn snapshot(cur: &CurrentData) -> Self {
        FeedRecord::Snapshot {
            timestamp: cur.timestamp,
            values: cur.iter().collect(),
        }
    }

    /// Current data carried by a snapshot record.
    pub fn current_data(&self) -> Option<CurrentData> {
        match self {
            FeedRecord::Snapshot { timestamp, values } => Some(snapshot_data(*timestamp, values)),
            _ => None,
        }
    }

    /// Time the record happened at.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            FeedRecord::Snapshot { timestamp, .. } => *timestamp,
            FeedRecord::Event { event, .. } => event.timestamp,
            FeedRecord::Ack { timestamp, .. } => *timestamp,
        }
    }
}

fn snapshot_data(timestamp: DateTime<Utc>, values: &BTreeMap<i32, CnlData>) -> CurrentData {
    let mut cur = CurrentData::new(timestamp);
    for (&cnl_num, &data) in values {
        cur.set(cnl_num, data);
    }
    cur
}

/// Parse every record of the feed at `path`.
pub fn read_feed(path: &Path) -> Result<Vec<FeedRecord>, FeedError> {
    let file = File::open(path).map_err(|source| FeedError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_feed(BufReader::new(file), path)
}

/// Parse feed records from `reader`; `path` only labels errors.
pub fn parse_feed<R: BufRead>(reader: R, path: &Path) -> Result<Vec<FeedRecord>, FeedError> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| FeedError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let record = serde_json::from_str::<FeedRecord>(trimmed).map_err(|e| FeedError::Parse {
            path: path.to_path_buf(),
            line: index + 1,
            message: e.to_string(),
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Drive `service` through `records` on feed time.
///
/// The first snapshot starts the service, so current archives may restore
/// channels it leaves undefined. A heartbeat is offered before every record.
pub fn replay(service: &mut AcquisitionService, records: Vec<FeedRecord>, log: &LogContext) -> ServiceStats {
    log_event!(
        log,
        INFO,
        event_names::REPLAY_STARTED,
        Stage::Replay,
        "replaying feed",
        records = records.len()
    );

    for record in records {
        service.heartbeat(record.timestamp());
        match record {
            FeedRecord::Snapshot { timestamp, values } => {
                let mut cur = snapshot_data(timestamp, &values);
                if !service.is_started() {
                    service.start(&mut cur);
                }
                service.update(&cur);
            }
            FeedRecord::Event { mask, event } => {
                service.raise_event(event, mask);
            }
            FeedRecord::Ack {
                id,
                timestamp,
                user_id,
            } => {
                service.ack_event(id, timestamp, user_id);
            }
        }
    }

    let stats = service.stop();
    log_event!(
        log,
        INFO,
        event_names::REPLAY_FINISHED,
        Stage::Replay,
        "feed replay finished",
        cycles = stats.cycles,
        events = stats.events
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Cursor;

    fn parse(text: &str) -> Result<Vec<FeedRecord>, FeedError> {
        parse_feed(Cursor::new(text), Path::new("feed.jsonl"))
    }

    #[test]
    fn test_parse_all_record_types() {
        let records = parse(concat!(
            "# boiler house feed\n",
            r#"{"type":"snapshot","timestamp":"2026-07-01T00:00:00Z","values":{"10":{"val":1.5,"stat":1}}}"#,
            "\n\n",
            r#"{"type":"event","mask":4,"event":{"id":0,"timestamp":"2026-07-01T00:00:05Z","severity":800}}"#,
            "\n",
            r#"{"type":"ack","id":42,"timestamp":"2026-07-01T00:01:00Z","user_id":3}"#,
            "\n",
        ))
        .unwrap();
        assert_eq!(records.len(), 3);

        let cur = records[0].current_data().unwrap();
        assert_eq!(cur.get(10), CnlData::defined(1.5));
        assert!(records[1].current_data().is_none());
        match &records[1] {
            FeedRecord::Event { mask, event } => {
                assert_eq!(*mask, ArchiveMask::from_bit(2));
                assert_eq!(event.severity, 800);
                assert!(!event.id.is_assigned());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            records[2].timestamp(),
            Utc.with_ymd_and_hms(2026, 7, 1, 0, 1, 0).unwrap()
        );
    }

    #[test]
    fn test_event_mask_defaults_to_all() {
        let records =
            parse(r#"{"type":"event","event":{"id":5,"timestamp":"2026-07-01T00:00:00Z"}}"#).unwrap();
        assert!(matches!(records[0], FeedRecord::Event { mask: ArchiveMask::ALL, .. }));
    }

    #[test]
    fn test_parse_error_names_line() {
        let err = parse(concat!(
            r#"{"type":"ack","id":1,"timestamp":"2026-07-01T00:00:00Z"}"#,
            "\n",
            r#"{"type":"reading"}"#,
            "\n",
        ))
        .unwrap_err();
        match err {
            FeedError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_snapshot_record_round_trips_channel_keys() {
        let mut cur = CurrentData::new(Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap());
        cur.set(-3, CnlData::defined(0.5));
        cur.set(120, CnlData::new(9.0, 14));
        let line = serde_json::to_string(&FeedRecord::snapshot(&cur)).unwrap();
        assert!(line.contains(r#""type":"snapshot""#));
        assert!(line.contains(r#""120":{"val":9.0,"stat":14}"#));

        let back: FeedRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(back.current_data().unwrap(), cur);
    }

    #[test]
    fn test_non_numeric_channel_key_is_rejected() {
        let err = parse(
            r#"{"type":"snapshot","timestamp":"2026-07-01T00:00:00Z","values":{"ten":{"val":1.0,"stat":1}}}"#,
        )
        .unwrap_err();
        match err {
            FeedError::Parse { line, message, .. } => {
                assert_eq!(line, 1);
                assert!(message.contains("invalid channel number"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = read_feed(Path::new("/nonexistent/feed.jsonl")).unwrap_err();
        assert!(matches!(err, FeedError::Io { .. }));
        let err: ae_common::Error = err.into();
        assert_eq!(err.category(), ae_common::ErrorCategory::Io);
    }
}
