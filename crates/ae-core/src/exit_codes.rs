//! Exit codes for the ae-core CLI.
//!
//! Exit code ranges:
//! - 0-1: Operational outcomes (parse outcome from code, not output)
//! - 10-19: User/environment errors (recoverable by user action)
//! - 20-29: Internal errors

use ae_common::{Error, ErrorCategory};

/// Exit codes for ae-core operations.
///
/// These codes are a stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Clean = 0,

    /// The query ran but found nothing
    Empty = 1,

    /// Invalid arguments or feed contents
    ArgsError = 10,

    /// Archive configuration missing, invalid, or rejected at registration
    ConfigError = 11,

    /// Internal error (bug - please report)
    InternalError = 20,

    /// I/O error
    IoError = 21,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check if this exit code indicates success (codes 0-1).
    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean | ExitCode::Empty)
    }

    /// Check if this exit code is a user/environment error (codes 10-19).
    pub fn is_user_error(self) -> bool {
        (10..20).contains(&(self as i32))
    }

    /// Check if this exit code is an internal error (codes 20-29).
    pub fn is_internal_error(self) -> bool {
        (self as i32) >= 20
    }

    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Get the exit code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::Empty => "OK_EMPTY",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }

    /// Exit code for an engine error.
    pub fn for_error(err: &Error) -> ExitCode {
        match err.category() {
            ErrorCategory::Config | ErrorCategory::Registration => ExitCode::ConfigError,
            ErrorCategory::Io => ExitCode::IoError,
            ErrorCategory::Archive => ExitCode::IoError,
            ErrorCategory::Data => ExitCode::InternalError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges() {
        assert!(ExitCode::Clean.is_success());
        assert!(ExitCode::Empty.is_success());
        assert!(!ExitCode::Empty.is_error());
        assert!(ExitCode::ArgsError.is_user_error());
        assert!(ExitCode::ConfigError.is_user_error());
        assert!(ExitCode::IoError.is_internal_error());
        assert!(!ExitCode::ConfigError.is_internal_error());
    }

    #[test]
    fn test_display() {
        assert_eq!(ExitCode::ConfigError.to_string(), "ERR_CONFIG (11)");
        assert_eq!(i32::from(ExitCode::Empty), 1);
    }

    #[test]
    fn test_registration_errors_are_config_errors() {
        let err = Error::DuplicateArchiveBit {
            bit: 3,
            existing: "Hour".to_string(),
        };
        assert_eq!(ExitCode::for_error(&err), ExitCode::ConfigError);
        let err = Error::InvalidArchiveBit { bit: 40, max: 32 };
        assert_eq!(ExitCode::for_error(&err), ExitCode::ConfigError);
        let err = Error::Io(std::io::Error::other("disk"));
        assert_eq!(ExitCode::for_error(&err), ExitCode::IoError);
    }
}
