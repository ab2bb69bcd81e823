//! Archive engine configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for archives.json
//! - Config resolution (CLI → env → XDG → system → defaults)
//! - Semantic validation of archive bits, codes and periods

pub mod archives;
pub mod resolve;
pub mod validate;

pub use archives::{load_config, ArchiveConfig, ArchiveEntry, StorageOptions};
pub use resolve::{resolve_config, ConfigPaths, ConfigSource};
pub use validate::{validate_config, ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";
