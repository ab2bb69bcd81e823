//! Configuration validation errors and semantic validation.

use std::collections::HashMap;

use ae_common::MAX_ARCHIVE_COUNT;
use thiserror::Error;

use crate::archives::{ArchiveConfig, ArchiveEntry, StorageOptions};

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 60,
            ValidationError::ParseError(_) => 61,
            ValidationError::SemanticError(_) => 63,
            ValidationError::MissingField(_) => 64,
            ValidationError::InvalidValue { .. } => 65,
            ValidationError::VersionMismatch { .. } => 66,
        }
    }
}

impl From<ValidationError> for ae_common::Error {
    fn from(err: ValidationError) -> Self {
        ae_common::Error::Config(err.to_string())
    }
}

/// Validate an archive configuration semantically.
///
/// Disabled entries are still checked for well-formed values, but they do
/// not claim their bit or code.
pub fn validate_config(config: &ArchiveConfig) -> ValidationResult<()> {
    if config.schema_version != crate::CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: config.schema_version.clone(),
        });
    }

    if config.heartbeat_secs == 0 {
        return Err(ValidationError::InvalidValue {
            field: "heartbeat_secs".to_string(),
            message: "Must be greater than 0".to_string(),
        });
    }

    let mut bits: HashMap<usize, &str> = HashMap::new();
    let mut codes: HashMap<String, usize> = HashMap::new();

    for (index, entry) in config.archives.iter().enumerate() {
        validate_entry(index, entry)?;
        if entry.disabled {
            continue;
        }

        if let Some(existing) = bits.insert(entry.bit, &entry.code) {
            return Err(ValidationError::SemanticError(format!(
                "archive bit {} is used by both {} and {}",
                entry.bit, existing, entry.code
            )));
        }

        let key = entry.code.to_lowercase();
        if let Some(existing) = codes.insert(key, index) {
            return Err(ValidationError::SemanticError(format!(
                "archive code {} is duplicated (entries {} and {})",
                entry.code, existing, index
            )));
        }
    }

    Ok(())
}

/// Validate a single archive entry.
fn validate_entry(index: usize, entry: &ArchiveEntry) -> ValidationResult<()> {
    let prefix = format!("archives[{}]", index);

    if entry.code.trim().is_empty() {
        return Err(ValidationError::MissingField(format!("{}.code", prefix)));
    }

    if entry.bit >= MAX_ARCHIVE_COUNT {
        return Err(ValidationError::InvalidValue {
            field: format!("{}.bit", prefix),
            message: format!("Must be in [0, {}), got {}", MAX_ARCHIVE_COUNT, entry.bit),
        });
    }

    if entry.cleanup_period_secs == 0 {
        return Err(ValidationError::InvalidValue {
            field: format!("{}.cleanup_period_secs", prefix),
            message: "Must be greater than 0".to_string(),
        });
    }

    match &entry.storage {
        StorageOptions::Snapshot {
            flush_period_secs, ..
        } => {
            require_positive(&prefix, "storage.flush_period_secs", *flush_period_secs)?;
        }
        StorageOptions::MemoryTrend {
            retention_secs,
            write_period_secs,
        } => {
            require_positive(&prefix, "storage.retention_secs", *retention_secs)?;
            require_positive(&prefix, "storage.write_period_secs", *write_period_secs)?;
        }
        StorageOptions::JsonlTrend {
            dir,
            retention_days,
            write_period_secs,
            flush_rows,
        } => {
            if dir.as_os_str().is_empty() {
                return Err(ValidationError::MissingField(format!("{}.storage.dir", prefix)));
            }
            require_positive(&prefix, "storage.retention_days", u64::from(*retention_days))?;
            require_positive(&prefix, "storage.write_period_secs", *write_period_secs)?;
            require_positive(&prefix, "storage.flush_rows", *flush_rows as u64)?;
        }
        StorageOptions::MemoryEvents { retention_secs } => {
            require_positive(&prefix, "storage.retention_secs", *retention_secs)?;
        }
        StorageOptions::JsonlEvents {
            dir,
            retention_days,
        } => {
            if dir.as_os_str().is_empty() {
                return Err(ValidationError::MissingField(format!("{}.storage.dir", prefix)));
            }
            require_positive(&prefix, "storage.retention_days", u64::from(*retention_days))?;
        }
    }

    Ok(())
}

fn require_positive(prefix: &str, field: &str, value: u64) -> ValidationResult<()> {
    if value == 0 {
        return Err(ValidationError::InvalidValue {
            field: format!("{}.{}", prefix, field),
            message: "Must be greater than 0".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(code: &str, bit: usize) -> ArchiveEntry {
        ArchiveEntry {
            code: code.to_string(),
            bit,
            disabled: false,
            cleanup_period_secs: 60,
            storage: StorageOptions::MemoryEvents {
                retention_secs: 3600,
            },
        }
    }

    fn config(archives: Vec<ArchiveEntry>) -> ArchiveConfig {
        ArchiveConfig {
            archives,
            ..Default::default()
        }
    }

    #[test]
    fn test_duplicate_bit_rejected() {
        let err = validate_config(&config(vec![entry("A", 3), entry("B", 3)])).unwrap_err();
        assert!(matches!(err, ValidationError::SemanticError(_)));
        assert!(err.to_string().contains("bit 3"));
    }

    #[test]
    fn test_disabled_entry_does_not_claim_bit() {
        let mut disabled = entry("A", 3);
        disabled.disabled = true;
        assert!(validate_config(&config(vec![disabled, entry("B", 3)])).is_ok());
    }

    #[test]
    fn test_duplicate_code_is_case_insensitive() {
        let err = validate_config(&config(vec![entry("Hour", 1), entry("hour", 2)])).unwrap_err();
        assert_eq!(err.code(), 63);
    }

    #[test]
    fn test_bit_out_of_range() {
        let err = validate_config(&config(vec![entry("A", MAX_ARCHIVE_COUNT)])).unwrap_err();
        match err {
            ValidationError::InvalidValue { field, .. } => assert_eq!(field, "archives[0].bit"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_zero_periods_rejected() {
        let mut e = entry("A", 0);
        e.cleanup_period_secs = 0;
        assert!(validate_config(&config(vec![e])).is_err());

        let mut e = entry("A", 0);
        e.storage = StorageOptions::MemoryTrend {
            retention_secs: 10,
            write_period_secs: 0,
        };
        let err = validate_config(&config(vec![e])).unwrap_err();
        assert!(err.to_string().contains("write_period_secs"));
    }

    #[test]
    fn test_version_mismatch() {
        let mut c = config(vec![entry("A", 0)]);
        c.schema_version = "0.9.0".to_string();
        assert_eq!(validate_config(&c).unwrap_err().code(), 66);
    }

    #[test]
    fn test_empty_code_missing() {
        let err = validate_config(&config(vec![entry("  ", 0)])).unwrap_err();
        assert!(matches!(err, ValidationError::MissingField(_)));
    }
}
