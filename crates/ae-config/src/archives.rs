//! Archive configuration document (`archives.json`).
//!
//! Describes which archives the engine registers at start-up, the bit each
//! one owns, how often its retention cleanup runs and the storage driver
//! with its options.

use std::path::{Path, PathBuf};

use ae_common::ArchiveKind;
use serde::{Deserialize, Serialize};

use crate::validate::{validate_config, ValidationError, ValidationResult};

/// Top-level archive configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Document schema version.
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    /// Interval between retention cleanup heartbeats, in seconds.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,

    /// Time budget for a single archive call, in milliseconds. 0 disables the budget.
    #[serde(default = "default_call_budget_ms")]
    pub call_budget_ms: u64,

    /// Archives in registration order.
    #[serde(default)]
    pub archives: Vec<ArchiveEntry>,

    /// Directory relative storage paths are resolved against.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

/// One archive to register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    /// Stable identifier used in diagnostics.
    pub code: String,

    /// Archive bit owned by this archive.
    pub bit: usize,

    /// Skip this entry without removing it from the document.
    #[serde(default)]
    pub disabled: bool,

    /// Minimum time between two retention cleanups, in seconds.
    #[serde(default = "default_cleanup_period_secs")]
    pub cleanup_period_secs: u64,

    /// Storage driver and its options.
    pub storage: StorageOptions,
}

/// Storage driver selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "driver", rename_all = "snake_case")]
pub enum StorageOptions {
    /// Latest snapshot, optionally persisted to a JSON file.
    Snapshot {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
        #[serde(default = "default_flush_period_secs")]
        flush_period_secs: u64,
    },

    /// In-memory trend rows.
    MemoryTrend {
        #[serde(default = "default_trend_retention_secs")]
        retention_secs: u64,
        #[serde(default = "default_write_period_secs")]
        write_period_secs: u64,
    },

    /// Trend rows appended to daily JSON-lines files.
    JsonlTrend {
        dir: PathBuf,
        #[serde(default = "default_retention_days")]
        retention_days: u32,
        #[serde(default = "default_write_period_secs")]
        write_period_secs: u64,
        #[serde(default = "default_flush_rows")]
        flush_rows: usize,
    },

    /// In-memory event log.
    MemoryEvents {
        #[serde(default = "default_event_retention_secs")]
        retention_secs: u64,
    },

    /// Event log appended to daily JSON-lines files.
    JsonlEvents {
        dir: PathBuf,
        #[serde(default = "default_retention_days")]
        retention_days: u32,
    },
}

fn default_schema_version() -> String {
    crate::CONFIG_SCHEMA_VERSION.to_string()
}

fn default_heartbeat_secs() -> u64 {
    60
}

fn default_call_budget_ms() -> u64 {
    5_000
}

fn default_cleanup_period_secs() -> u64 {
    3_600
}

fn default_flush_period_secs() -> u64 {
    10
}

fn default_trend_retention_secs() -> u64 {
    86_400 // 1 day
}

fn default_event_retention_secs() -> u64 {
    30 * 86_400 // 30 days
}

fn default_write_period_secs() -> u64 {
    60
}

fn default_retention_days() -> u32 {
    365
}

fn default_flush_rows() -> usize {
    100
}

impl StorageOptions {
    /// Capability kind implemented by this driver.
    pub fn kind(&self) -> ArchiveKind {
        match self {
            StorageOptions::Snapshot { .. } => ArchiveKind::Current,
            StorageOptions::MemoryTrend { .. } | StorageOptions::JsonlTrend { .. } => {
                ArchiveKind::Historical
            }
            StorageOptions::MemoryEvents { .. } | StorageOptions::JsonlEvents { .. } => {
                ArchiveKind::Event
            }
        }
    }

    /// Driver name as written in the document.
    pub fn driver(&self) -> &'static str {
        match self {
            StorageOptions::Snapshot { .. } => "snapshot",
            StorageOptions::MemoryTrend { .. } => "memory_trend",
            StorageOptions::JsonlTrend { .. } => "jsonl_trend",
            StorageOptions::MemoryEvents { .. } => "memory_events",
            StorageOptions::JsonlEvents { .. } => "jsonl_events",
        }
    }
}

impl ArchiveEntry {
    pub fn kind(&self) -> ArchiveKind {
        self.storage.kind()
    }

    pub fn cleanup_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cleanup_period_secs)
    }
}

impl Default for ArchiveConfig {
    /// Built-in configuration: one in-memory archive of each kind.
    fn default() -> Self {
        ArchiveConfig {
            schema_version: default_schema_version(),
            heartbeat_secs: default_heartbeat_secs(),
            call_budget_ms: default_call_budget_ms(),
            archives: vec![
                ArchiveEntry {
                    code: "Cur".to_string(),
                    bit: 0,
                    disabled: false,
                    cleanup_period_secs: default_cleanup_period_secs(),
                    storage: StorageOptions::Snapshot {
                        path: None,
                        flush_period_secs: default_flush_period_secs(),
                    },
                },
                ArchiveEntry {
                    code: "Min".to_string(),
                    bit: 1,
                    disabled: false,
                    cleanup_period_secs: default_cleanup_period_secs(),
                    storage: StorageOptions::MemoryTrend {
                        retention_secs: default_trend_retention_secs(),
                        write_period_secs: default_write_period_secs(),
                    },
                },
                ArchiveEntry {
                    code: "Events".to_string(),
                    bit: 2,
                    disabled: false,
                    cleanup_period_secs: default_cleanup_period_secs(),
                    storage: StorageOptions::MemoryEvents {
                        retention_secs: default_event_retention_secs(),
                    },
                },
            ],
            base_dir: None,
        }
    }
}

impl ArchiveConfig {
    /// Entries that will be registered.
    pub fn enabled_archives(&self) -> impl Iterator<Item = &ArchiveEntry> {
        self.archives.iter().filter(|a| !a.disabled)
    }

    /// Resolve a storage path against the configuration directory.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match &self.base_dir {
            Some(base) => base.join(path),
            None => path.to_path_buf(),
        }
    }

    pub fn heartbeat(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.heartbeat_secs)
    }

    /// Per-call budget, `None` when disabled.
    pub fn call_budget(&self) -> Option<std::time::Duration> {
        (self.call_budget_ms > 0).then(|| std::time::Duration::from_millis(self.call_budget_ms))
    }

    /// Parse a configuration document from a JSON string.
    pub fn from_json(json: &str) -> ValidationResult<Self> {
        serde_json::from_str(json).map_err(|e| ValidationError::ParseError(e.to_string()))
    }
}

/// Read, parse and validate `archives.json`.
///
/// Relative storage paths in the returned config resolve against the
/// directory containing `path`.
pub fn load_config(path: &Path) -> ValidationResult<ArchiveConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ValidationError::IoError(format!("{}: {}", path.display(), e)))?;
    let mut config = ArchiveConfig::from_json(&content)?;
    config.base_dir = path.parent().map(Path::to_path_buf);
    validate_config(&config)?;
    Ok(config)
}
