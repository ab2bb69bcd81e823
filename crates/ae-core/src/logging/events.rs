//! Structured event definitions for logging.
//!
//! Events follow a consistent schema for machine-parseable JSONL output.
//! All events carry the run id, the host id and the service stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Log levels for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Stages of the acquisition service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Configuration loading and archive registration.
    Init,
    /// Restoring current data on start-up.
    Restore,
    /// Processing a current-data snapshot.
    Update,
    /// Writing an event.
    Event,
    /// Acknowledging an event.
    Ack,
    /// Periodic retention cleanup.
    Cleanup,
    /// Read-only queries from the command line.
    Query,
    /// Replaying a recorded feed.
    Replay,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Restore => "restore",
            Stage::Update => "update",
            Stage::Event => "event",
            Stage::Ack => "ack",
            Stage::Cleanup => "cleanup",
            Stage::Query => "query",
            Stage::Replay => "replay",
        };
        write!(f, "{}", s)
    }
}

/// Standard event names used in logging.
pub mod event_names {
    // Service lifecycle
    pub const SERVICE_STARTED: &str = "service.started";
    pub const SERVICE_STOPPED: &str = "service.stopped";

    // Archives
    pub const ARCHIVE_REGISTERED: &str = "archive.registered";
    pub const ARCHIVE_FAULT: &str = "archive.fault";
    pub const CURRENT_RESTORED: &str = "current.restored";
    pub const EVENT_WRITTEN: &str = "event.written";
    pub const EVENT_ACKED: &str = "event.acked";
    pub const CLEANUP_STARTED: &str = "cleanup.started";
    pub const HEARTBEAT: &str = "service.heartbeat";

    // Replay
    pub const REPLAY_STARTED: &str = "replay.started";
    pub const REPLAY_FINISHED: &str = "replay.finished";

    // Config/init events
    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_DEFAULT_USED: &str = "config.default_used";
    pub const CONFIG_ERROR: &str = "config.error";

    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// A structured log event for JSONL output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub ts: DateTime<Utc>,

    pub level: Level,

    /// Event name (e.g., "replay.started", "archive.fault").
    pub event: String,

    /// Unique ID for this invocation.
    pub run_id: String,

    pub stage: Stage,

    pub host_id: String,

    pub message: String,

    /// Additional structured fields (stable keys).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, serde_json::Value>,

    /// Archive bit when the event concerns a single archive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_bit: Option<usize>,
}

impl LogEvent {
    /// Create a new log event with required fields.
    pub fn new(
        level: Level,
        event: impl Into<String>,
        run_id: impl Into<String>,
        host_id: impl Into<String>,
        stage: Stage,
        message: impl Into<String>,
    ) -> Self {
        LogEvent {
            ts: Utc::now(),
            level,
            event: event.into(),
            run_id: run_id.into(),
            stage,
            host_id: host_id.into(),
            message: message.into(),
            fields: BTreeMap::new(),
            archive_bit: None,
        }
    }

    /// Add a field to the event.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.fields.insert(key.into(), v);
        }
        self
    }

    pub fn with_archive_bit(mut self, bit: usize) -> Self {
        self.archive_bit = Some(bit);
        self
    }

    /// Serialize to a single JSON line.
    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"error":"serialization_failed","event":"{}"}}"#,
                self.event
            )
        })
    }
}

/// Context for generating log events with consistent run/host IDs.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub run_id: String,
    pub host_id: String,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>, host_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
            host_id: host_id.into(),
        }
    }

    /// Context with a fresh run id for this host.
    pub fn generate() -> Self {
        LogContext::new(super::generate_run_id(), super::get_host_id())
    }

    /// Create an event with this context.
    pub fn event(
        &self,
        level: Level,
        event: impl Into<String>,
        stage: Stage,
        message: impl Into<String>,
    ) -> LogEvent {
        LogEvent::new(level, event, &self.run_id, &self.host_id, stage, message)
    }

    pub fn info(
        &self,
        event: impl Into<String>,
        stage: Stage,
        message: impl Into<String>,
    ) -> LogEvent {
        self.event(Level::Info, event, stage, message)
    }

    pub fn debug(
        &self,
        event: impl Into<String>,
        stage: Stage,
        message: impl Into<String>,
    ) -> LogEvent {
        self.event(Level::Debug, event, stage, message)
    }

    pub fn warn(
        &self,
        event: impl Into<String>,
        stage: Stage,
        message: impl Into<String>,
    ) -> LogEvent {
        self.event(Level::Warn, event, stage, message)
    }

    pub fn error(
        &self,
        event: impl Into<String>,
        stage: Stage,
        message: impl Into<String>,
    ) -> LogEvent {
        self.event(Level::Error, event, stage, message)
    }
}
