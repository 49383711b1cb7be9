//! CLI-specific error types
//!
//! Exit codes:
//! - 1: any failure, the next invocation may succeed
//! - 2: election conflict, operator action required

use std::fmt;
use std::io;

use crate::errors::{BootstrapError, BootstrapErrorKind};

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (stdout, state files)
    IoError,
    /// Reconciliation pass failed
    ReconcileFailed,
    /// More than one node claims a role
    ElectionConflict,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "DUALMASTER_CLI_CONFIG_ERROR",
            Self::IoError => "DUALMASTER_CLI_IO_ERROR",
            Self::ReconcileFailed => "DUALMASTER_CLI_RECONCILE_FAILED",
            Self::ElectionConflict => "DUALMASTER_CLI_ELECTION_CONFLICT",
        }
    }

    /// Process exit code
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ElectionConflict => 2,
            _ => 1,
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

    /// Config error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    /// I/O error
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    /// Get the error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        self.code.exit_code()
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<BootstrapError> for CliError {
    fn from(e: BootstrapError) -> Self {
        let code = match e.kind {
            BootstrapErrorKind::ElectionConflict => CliErrorCode::ElectionConflict,
            BootstrapErrorKind::ConfigurationError => CliErrorCode::ConfigError,
            _ => CliErrorCode::ReconcileFailed,
        };
        Self::new(code, e.to_string())
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
