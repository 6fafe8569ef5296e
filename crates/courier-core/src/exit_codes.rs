//! Exit codes for the `courier` inspection CLI.
//!
//! Exit code ranges:
//! - 0: Success
//! - 10-19: User/environment errors (recoverable by user action)
//! - 20-29: Internal errors

use courier_common::{DeliveryError, ErrorCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success.
    Clean = 0,

    /// Invalid arguments.
    ArgsError = 10,

    /// Configuration missing or invalid.
    ConfigError = 11,

    /// Internal error.
    InternalError = 20,

    /// Storage I/O failed.
    IoError = 21,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Stable name for JSON output.
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }
}

impl From<&DeliveryError> for ExitCode {
    fn from(err: &DeliveryError) -> Self {
        match err.category() {
            ErrorCategory::Config => ExitCode::ConfigError,
            ErrorCategory::Storage | ErrorCategory::Serialization => ExitCode::IoError,
            ErrorCategory::Transport | ErrorCategory::Lifecycle => ExitCode::InternalError,
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
