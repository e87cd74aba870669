//! Exit code definitions for s3c
//!
//! Codes are stable so scripts feeding the shell from a pipe can tell
//! failure classes apart. They line up with `sc_core::Error::exit_code`.

use sc_core::{Error, TransferResult};

/// Exit codes for the s3c application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Operation completed successfully
    Success = 0,

    /// General/unspecified error, including failed transfer items
    GeneralError = 1,

    /// User input error: invalid arguments, malformed path, bad command
    UsageError = 2,

    /// Retryable network error: timeout, connection reset, throttling
    NetworkError = 3,

    /// Authentication or permission failure
    AuthError = 4,

    /// Resource not found: bucket, object or profile does not exist
    NotFound = 5,

    /// Conflict, partial move or busy engine
    Conflict = 6,

    /// Operation was cancelled
    Interrupted = 130,
}

impl ExitCode {
    /// Convert exit code to i32 for use with std::process::exit
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Create exit code from i32 value
    ///
    /// Returns None if the value doesn't correspond to a known exit code.
    pub const fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::GeneralError),
            2 => Some(Self::UsageError),
            3 => Some(Self::NetworkError),
            4 => Some(Self::AuthError),
            5 => Some(Self::NotFound),
            6 => Some(Self::Conflict),
            130 => Some(Self::Interrupted),
            _ => None,
        }
    }

    /// Exit code for a failed call
    pub fn for_error(error: &Error) -> Self {
        Self::from_i32(error.exit_code()).unwrap_or(Self::GeneralError)
    }

    /// Exit code summarizing a finished transfer
    pub fn for_result(result: &TransferResult) -> Self {
        if result.partial_failures().next().is_some() {
            Self::Conflict
        } else if result.failed > 0 {
            Self::GeneralError
        } else if result.cancelled {
            Self::Interrupted
        } else {
            Self::Success
        }
    }

    /// Get a human-readable description of the exit code
    pub const fn description(self) -> &'static str {
        match self {
            Self::Success => "Operation completed successfully",
            Self::GeneralError => "General error",
            Self::UsageError => "Invalid arguments or command",
            Self::NetworkError => "Network error (retryable)",
            Self::AuthError => "Authentication or permission failure",
            Self::NotFound => "Resource not found",
            Self::Conflict => "Conflict or partial failure",
            Self::Interrupted => "Operation interrupted",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.as_i32()
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_i32())
    }
}
