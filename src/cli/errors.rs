//! CLI-specific error types

use std::fmt;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error
    IoError,
    /// An engine operation failed
    EngineFailed,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "MB_CLI_CONFIG_ERROR",
            Self::IoError => "MB_CLI_IO_ERROR",
            Self::EngineFailed => "MB_CLI_ENGINE_FAILED",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    /// Create a new CLI error
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, message)
    }

    /// I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, message)
    }

    /// Engine failure
    pub fn engine(message: impl Into<String>) -> Self {
        Self::new(CliErrorCode::EngineFailed, message)
    }

    /// The error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_leads_with_code() {
        let err = CliError::config("markbook.json not found");
        assert_eq!(
            err.to_string(),
            "[MB_CLI_CONFIG_ERROR] markbook.json not found"
        );
    }
}
