//! Errors raised by archive implementations.
//!
//! These never reach callers of the holder; they are converted into logged
//! faults and default results at the dispatch boundary.

use thiserror::Error;

/// Result type for archive capability methods.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Errors from archive operations.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("data error: {0}")]
    Data(#[from] ae_common::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("call budget of {budget_ms} ms exceeded")]
    DeadlineExceeded { budget_ms: u64 },

    #[error("call cancelled")]
    Cancelled,
}
