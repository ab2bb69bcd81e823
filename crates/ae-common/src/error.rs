//! Error types for the archive engine.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Recoverability hints for automation
//! - Remediation suggestions for humans
//!
//! # Human-Facing Output
//!
//! ```text
//! ✗ Invalid Archive Bit
//!   Reason: archive bit 40 is out of range [0, 32)
//!   Fix: Assign each archive a bit below the maximum archive count in archives.json.
//! ```
//!
//! # Agent-Facing Output
//!
//! ```json
//! {
//!   "code": 20,
//!   "category": "registration",
//!   "message": "archive bit 40 is out of range [0, 32)",
//!   "recoverable": false,
//!   "context": { "bit": 40, "max": 32 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for archive engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration document errors.
    Config,
    /// Archive registration errors (fatal at start-up).
    Registration,
    /// Faults raised inside an archive implementation.
    Archive,
    /// Data model invariant violations.
    Data,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Registration => write!(f, "registration"),
            ErrorCategory::Archive => write!(f, "archive"),
            ErrorCategory::Data => write!(f, "data"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for the archive engine.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    // Registration errors (20-29)
    #[error("archive bit {bit} is out of range [0, {max})")]
    InvalidArchiveBit { bit: usize, max: usize },

    #[error("archive bit {bit} is already assigned to archive {existing}")]
    DuplicateArchiveBit { bit: usize, existing: String },

    #[error("archive code {0} is registered more than once")]
    DuplicateArchiveCode(String),

    // Archive errors (30-39)
    #[error("archive {code} failed during {operation}: {detail}")]
    ArchiveFailed {
        code: String,
        operation: String,
        detail: String,
    },

    // Data errors (40-49)
    #[error("alignment error: {0}")]
    Alignment(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Registration errors
    /// - 30-39: Archive errors
    /// - 40-49: Data errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidArchiveBit { .. } => 20,
            Error::DuplicateArchiveBit { .. } => 21,
            Error::DuplicateArchiveCode(_) => 22,
            Error::ArchiveFailed { .. } => 30,
            Error::Alignment(_) => 40,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) => ErrorCategory::Config,
            Error::InvalidArchiveBit { .. }
            | Error::DuplicateArchiveBit { .. }
            | Error::DuplicateArchiveCode(_) => ErrorCategory::Registration,
            Error::ArchiveFailed { .. } => ErrorCategory::Archive,
            Error::Alignment(_) => ErrorCategory::Data,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether this error is potentially recoverable without a restart.
    ///
    /// Registration errors are never recoverable: the engine must not start
    /// with an inconsistent archive table.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Config(_) => true,
            Error::InvalidArchiveBit { .. } => false,
            Error::DuplicateArchiveBit { .. } => false,
            Error::DuplicateArchiveCode(_) => false,
            Error::ArchiveFailed { .. } => true,
            Error::Alignment(_) => false,
            Error::Io(_) => true,
            Error::Json(_) => true,
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::InvalidArchiveBit { .. } => "Invalid Archive Bit",
            Error::DuplicateArchiveBit { .. } => "Duplicate Archive Bit",
            Error::DuplicateArchiveCode(_) => "Duplicate Archive Code",
            Error::ArchiveFailed { .. } => "Archive Failure",
            Error::Alignment(_) => "Misaligned Data",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Parse Error",
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) => {
                "Run 'ae-core check' to validate the archive configuration."
            }
            Error::InvalidArchiveBit { .. } => {
                "Assign each archive a bit below the maximum archive count in archives.json."
            }
            Error::DuplicateArchiveBit { .. } => {
                "Every archive needs its own bit. Renumber the conflicting entries in archives.json."
            }
            Error::DuplicateArchiveCode(_) => {
                "Archive codes identify archives in logs and must be unique."
            }
            Error::ArchiveFailed { .. } => {
                "Inspect the archive's storage location and the log for the failing operation."
            }
            Error::Alignment(_) => {
                "Internal invariant violated. Report with the input that produced it."
            }
            Error::Io(_) => {
                "Check disk space, permissions, and that archive directories exist. Retry the operation."
            }
            Error::Json(_) => {
                "Invalid JSON in file. Check syntax with 'jq . <file>' or restore from backup."
            }
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is potentially recoverable.
    pub recoverable: bool,

    /// Additional structured context (e.g., bit, archive code).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::InvalidArchiveBit { bit, max } => {
                context.insert("bit".to_string(), serde_json::json!(bit));
                context.insert("max".to_string(), serde_json::json!(max));
            }
            Error::DuplicateArchiveBit { bit, existing } => {
                context.insert("bit".to_string(), serde_json::json!(bit));
                context.insert("existing".to_string(), serde_json::json!(existing));
            }
            Error::ArchiveFailed {
                code, operation, ..
            } => {
                context.insert("archive_code".to_string(), serde_json::json!(code));
                context.insert("operation".to_string(), serde_json::json!(operation));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            context,
        }
    }
}

impl StructuredError {
    /// Add additional context to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}

/// Format an error for human-readable stderr output.
///
/// Output format:
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        red = red,
        cyan = cyan,
        reset = reset,
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}
