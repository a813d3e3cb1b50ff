//! Mark store error types
//!
//! Error codes:
//! - MB_STORE_IO_ERROR (ERROR severity)
//! - MB_STORE_READ_FAILED (ERROR severity)
//! - MB_STORE_WRITE_FAILED (ERROR severity)
//! - MB_STORE_SCHEMA (ERROR severity)
//!
//! Every store error leaves the live collection untouched and is
//! recoverable by retrying after correcting the input.

use std::fmt;
use std::io;

/// Severity levels for store errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, process continues
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// Store-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    /// Disk I/O failure
    IoError,
    /// Collection read failed
    ReadFailed,
    /// Collection write failed
    WriteFailed,
    /// Malformed collection, missing required field or out-of-range value
    Schema,
}

impl StoreErrorCode {
    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        match self {
            StoreErrorCode::IoError => "MB_STORE_IO_ERROR",
            StoreErrorCode::ReadFailed => "MB_STORE_READ_FAILED",
            StoreErrorCode::WriteFailed => "MB_STORE_WRITE_FAILED",
            StoreErrorCode::Schema => "MB_STORE_SCHEMA",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        Severity::Error
    }
}

impl fmt::Display for StoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Store error with message and optional I/O source
#[derive(Debug)]
pub struct StoreError {
    code: StoreErrorCode,
    message: String,
    source: Option<io::Error>,
}

impl StoreError {
    /// Disk I/O failure
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: StoreErrorCode::IoError,
            message: message.into(),
            source: Some(source),
        }
    }

    /// Read failure with source
    pub fn read_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: StoreErrorCode::ReadFailed,
            message: message.into(),
            source: Some(source),
        }
    }

    /// Write failure with source
    pub fn write_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: StoreErrorCode::WriteFailed,
            message: message.into(),
            source: Some(source),
        }
    }

    /// Schema violation (no I/O source)
    pub fn schema(message: impl Into<String>) -> Self {
        Self {
            code: StoreErrorCode::Schema,
            message: message.into(),
            source: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> StoreErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_stable() {
        assert_eq!(StoreErrorCode::IoError.code(), "MB_STORE_IO_ERROR");
        assert_eq!(StoreErrorCode::ReadFailed.code(), "MB_STORE_READ_FAILED");
        assert_eq!(StoreErrorCode::WriteFailed.code(), "MB_STORE_WRITE_FAILED");
        assert_eq!(StoreErrorCode::Schema.code(), "MB_STORE_SCHEMA");
    }

    #[test]
    fn test_schema_error_has_no_source() {
        let err = StoreError::schema("mark 3 (s1/e1): score 18 exceeds maxScore 16");
        assert_eq!(err.code(), StoreErrorCode::Schema);
        assert!(std::error::Error::source(&err).is_none());
        assert!(format!("{}", err).contains("MB_STORE_SCHEMA"));
    }
}
