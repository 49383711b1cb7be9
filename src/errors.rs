//! Bootstrap Error Types
//!
//! Failure taxonomy for a reconciliation pass:
//! - DirectoryUnavailable: transient, abort this pass, retry on next invocation
//! - ElectionConflict: fatal, requires operator intervention
//! - ReplicationAttachFailed: retry on next pass
//! - SecretUnavailable: transient ordering issue, retry
//!
//! A failure during a role claim never lets the completion marker be
//! published. The next pass starts from whatever state was durably reached.

use std::fmt;

use crate::replication::DatabaseError;

/// Bootstrap error type
#[derive(Debug, Clone)]
pub struct BootstrapError {
    /// Error kind
    pub kind: BootstrapErrorKind,
    /// Error message
    pub message: String,
}

/// Bootstrap error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapErrorKind {
    /// Peer directory could not be queried or written
    DirectoryUnavailable,

    /// More than one node claims the same role in one environment
    ElectionConflict,

    /// Attaching as a replica (or verifying the attach) failed
    ReplicationAttachFailed,

    /// A First record exists but its replication secret is not visible yet
    SecretUnavailable,

    /// Local database engine provisioning failed
    ProvisioningFailed,

    /// A database statement failed outside of an attach
    DatabaseError,

    /// Illegal election state transition attempted
    IllegalTransition,

    /// Invalid local node configuration
    ConfigurationError,
}

impl BootstrapErrorKind {
    /// Stable error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DirectoryUnavailable => "DUALMASTER_DIRECTORY_UNAVAILABLE",
            Self::ElectionConflict => "DUALMASTER_ELECTION_CONFLICT",
            Self::ReplicationAttachFailed => "DUALMASTER_REPLICATION_ATTACH_FAILED",
            Self::SecretUnavailable => "DUALMASTER_SECRET_UNAVAILABLE",
            Self::ProvisioningFailed => "DUALMASTER_PROVISIONING_FAILED",
            Self::DatabaseError => "DUALMASTER_DATABASE_ERROR",
            Self::IllegalTransition => "DUALMASTER_ILLEGAL_TRANSITION",
            Self::ConfigurationError => "DUALMASTER_CONFIGURATION_ERROR",
        }
    }

    /// Whether the next reconciliation pass may succeed without operator action.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            Self::ElectionConflict | Self::IllegalTransition | Self::ConfigurationError
        )
    }
}

impl BootstrapError {
    /// Create a new bootstrap error.
    pub fn new(kind: BootstrapErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a directory unavailable error.
    pub fn directory_unavailable(message: impl Into<String>) -> Self {
        Self::new(BootstrapErrorKind::DirectoryUnavailable, message)
    }

    /// Create an election conflict error.
    pub fn election_conflict(message: impl Into<String>) -> Self {
        Self::new(BootstrapErrorKind::ElectionConflict, message)
    }

    /// Create a replication attach failure.
    pub fn attach_failed(message: impl Into<String>) -> Self {
        Self::new(BootstrapErrorKind::ReplicationAttachFailed, message)
    }

    /// Create a secret unavailable error.
    pub fn secret_unavailable(message: impl Into<String>) -> Self {
        Self::new(BootstrapErrorKind::SecretUnavailable, message)
    }

    /// Create a provisioning failure.
    pub fn provisioning_failed(message: impl Into<String>) -> Self {
        Self::new(BootstrapErrorKind::ProvisioningFailed, message)
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(BootstrapErrorKind::DatabaseError, message)
    }

    /// Create an illegal transition error.
    pub fn illegal_transition(from: &str, to: &str) -> Self {
        Self::new(
            BootstrapErrorKind::IllegalTransition,
            format!("illegal election transition: {} → {}", from, to),
        )
    }

    /// Create a configuration error.
    pub fn configuration_error(message: impl Into<String>) -> Self {
        Self::new(BootstrapErrorKind::ConfigurationError, message)
    }

    /// Check whether this error is an election conflict.
    pub fn is_conflict(&self) -> bool {
        self.kind == BootstrapErrorKind::ElectionConflict
    }

    /// Whether the next pass may succeed without operator action.
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

impl fmt::Display for BootstrapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.message)
    }
}

impl std::error::Error for BootstrapError {}

impl From<DatabaseError> for BootstrapError {
    fn from(e: DatabaseError) -> Self {
        Self::database(e.to_string())
    }
}

/// Result type for bootstrap operations
pub type BootstrapResult<T> = Result<T, BootstrapError>;
