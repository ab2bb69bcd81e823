//! Archive engine storage subsystem.
//!
//! This crate provides:
//! - Capability contracts for current, historical and event archives
//! - The [`ArchiveHolder`] registry that dispatches to archives by bit and
//!   contains every archive fault at its boundary
//! - Built-in archive implementations (in-memory and JSON-lines files)
//! - A factory that turns `archives.json` into a populated holder

pub mod archives;
pub mod context;
pub mod contract;
pub mod error;
pub mod factory;
pub mod fault;
pub mod filter;
pub mod holder;

pub use context::{CallContext, CancelToken};
pub use contract::{
    Archive, ArchiveHandle, ArchiveState, Capability, CurrentArchive, EventArchive,
    HistoricalArchive,
};
pub use error::{ArchiveError, ArchiveResult};
pub use factory::{build_archive, build_holder};
pub use fault::{FaultKind, FaultReport, FaultSink, MemoryFaultSink, TracingFaultSink};
pub use holder::{ArchiveHolder, ArchiveInfo};
