//! Error types for sc-core
//!
//! One error type covers the storage taxonomy (not found, access denied,
//! transient, conflict, partial failure, busy, cancelled) and the ambient
//! configuration/IO failures. `ErrorKind` is the cloneable classification
//! carried in per-item transfer outcomes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for sc-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for sc-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Bucket, object or local file does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Credentials were accepted but the operation is not permitted
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Network blip, throttling or call timeout (retryable)
    #[error("Transient error: {0}")]
    Transient(String),

    /// Destination already exists and the overwrite policy forbids replacing it
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Move copied the object but could not delete the source
    #[error("Partial failure: {0}")]
    PartialFailure(String),

    /// Another transfer is already running
    #[error("Busy: {0}")]
    Busy(String),

    /// Operation was cancelled before it started
    #[error("Cancelled")]
    Cancelled,

    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid path or command argument
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Command cannot run in the current state or with these arguments
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Object exceeds the size limit for viewing
    #[error("Object too large to view: {size} bytes (limit {limit})")]
    TooLarge { size: u64, limit: u64 },

    /// Storage profile not found
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    /// Storage profile already exists
    #[error("Profile already exists: {0}")]
    ProfileExists(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// General error
    #[error("{0}")]
    General(String),
}

/// Cloneable classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    AccessDenied,
    Transient,
    Conflict,
    PartialFailure,
    Busy,
    Cancelled,
    InvalidInput,
    Other,
}

impl ErrorKind {
    /// Short label for status lines
    pub const fn label(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::AccessDenied => "access denied",
            ErrorKind::Transient => "transient",
            ErrorKind::Conflict => "conflict",
            ErrorKind::PartialFailure => "partial",
            ErrorKind::Busy => "busy",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::Other => "error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) | Error::ProfileNotFound(_) => ErrorKind::NotFound,
            Error::AccessDenied(_) => ErrorKind::AccessDenied,
            Error::Transient(_) => ErrorKind::Transient,
            Error::Conflict(_) | Error::ProfileExists(_) => ErrorKind::Conflict,
            Error::PartialFailure(_) => ErrorKind::PartialFailure,
            Error::Busy(_) => ErrorKind::Busy,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::InvalidPath(_)
            | Error::InvalidUrl(_)
            | Error::Config(_)
            | Error::InvalidCommand(_)
            | Error::TooLarge { .. } => {
                ErrorKind::InvalidInput
            }
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorKind::NotFound,
                std::io::ErrorKind::PermissionDenied => ErrorKind::AccessDenied,
                std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::Interrupted
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted => ErrorKind::Transient,
                _ => ErrorKind::Other,
            },
            Error::TomlParse(_) | Error::TomlSerialize(_) | Error::Json(_) | Error::General(_) => {
                ErrorKind::Other
            }
        }
    }

    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Get the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::InvalidInput => 2,
            ErrorKind::Transient => 3,
            ErrorKind::AccessDenied => 4,
            ErrorKind::NotFound => 5,
            ErrorKind::Conflict | ErrorKind::PartialFailure | ErrorKind::Busy => 6,
            ErrorKind::Cancelled => 130,
            ErrorKind::Other => 1,
        }
    }
}
