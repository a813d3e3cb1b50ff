//! Snapshot archive error types
//!
//! Error codes:
//! - MB_SNAPSHOT_FAILED (ERROR severity)
//! - MB_SNAPSHOT_IO (ERROR severity)
//! - MB_SNAPSHOT_MANIFEST (ERROR severity)
//! - MB_SNAPSHOT_CORRUPTION (ERROR severity)

use std::fmt;
use std::io;

/// Severity levels for snapshot errors
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

/// Snapshot-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotErrorCode {
    /// General capture/prune failure
    SnapshotFailed,
    /// I/O failure while reading or writing a snapshot
    SnapshotIo,
    /// Manifest generation, write or parse failure
    SnapshotManifest,
    /// Checksum mismatch between manifest and snapshot contents
    SnapshotCorruption,
}

impl SnapshotErrorCode {
    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        match self {
            SnapshotErrorCode::SnapshotFailed => "MB_SNAPSHOT_FAILED",
            SnapshotErrorCode::SnapshotIo => "MB_SNAPSHOT_IO",
            SnapshotErrorCode::SnapshotManifest => "MB_SNAPSHOT_MANIFEST",
            SnapshotErrorCode::SnapshotCorruption => "MB_SNAPSHOT_CORRUPTION",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        // A failed capture or load never touches the live store; no
        // snapshot failure requires process termination.
        Severity::Error
    }
}

impl fmt::Display for SnapshotErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Snapshot error with message context
#[derive(Debug)]
pub struct SnapshotError {
    code: SnapshotErrorCode,
    message: String,
    source: Option<io::Error>,
}

impl SnapshotError {
    /// General capture failure
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            code: SnapshotErrorCode::SnapshotFailed,
            message: message.into(),
            source: None,
        }
    }

    /// I/O failure with source
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: SnapshotErrorCode::SnapshotIo,
            message: message.into(),
            source: Some(source),
        }
    }

    /// I/O failure naming the path
    pub fn io_error_at_path(path: &std::path::Path, source: io::Error) -> Self {
        Self {
            code: SnapshotErrorCode::SnapshotIo,
            message: format!("I/O error at path: {}", path.display()),
            source: Some(source),
        }
    }

    /// Manifest failure
    pub fn manifest_error(message: impl Into<String>) -> Self {
        Self {
            code: SnapshotErrorCode::SnapshotManifest,
            message: message.into(),
            source: None,
        }
    }

    /// Manifest I/O failure with source
    pub fn manifest_io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: SnapshotErrorCode::SnapshotManifest,
            message: message.into(),
            source: Some(source),
        }
    }

    /// Checksum mismatch
    pub fn corruption(message: impl Into<String>) -> Self {
        Self {
            code: SnapshotErrorCode::SnapshotCorruption,
            message: message.into(),
            source: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> SnapshotErrorCode {
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

impl fmt::Display for SnapshotError {
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

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for snapshot operations
pub type SnapshotResult<T> = Result<T, SnapshotError>;
