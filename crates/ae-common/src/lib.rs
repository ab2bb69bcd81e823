//! Archive engine common types, ids, and errors.
//!
//! This crate provides the data model shared by every archive engine crate:
//! - Channel values and the live current-data snapshot
//! - Trend, trend bundle and slice query results
//! - Events with their acknowledgment sub-state
//! - Archive addressing (bits, masks, kinds)
//! - Common error types and output format specifications

pub mod archive;
pub mod data;
pub mod error;
pub mod event;
pub mod filter;
pub mod id;
pub mod output;
pub mod trend;

pub use archive::{ArchiveKind, ArchiveMask, MAX_ARCHIVE_COUNT};
pub use data::{cnl_status, CnlData, CurrentData};
pub use error::{format_error_human, Error, ErrorCategory, Result, StructuredError};
pub use event::{AckState, Event, Severity};
pub use filter::DataFilter;
pub use id::{EventId, EventIdGenerator};
pub use output::OutputFormat;
pub use trend::{Slice, Trend, TrendBundle, TrendPoint};

/// Schema version for persisted records and configuration documents.
pub const SCHEMA_VERSION: &str = "1.0.0";
