//! Archive engine core library.
//!
//! This library provides the runtime around the archive holder:
//! - Exit codes for CLI operations
//! - Structured logging
//! - Configuration discovery and holder start-up
//! - The acquisition service (update cycle, events, heartbeat)
//! - Recorded feed parsing and replay
//!
//! The binary entry point is in `main.rs`.

pub mod exit_codes;
pub mod feed;
pub mod logging;
pub mod service;
pub mod setup;
