//! Database Executor Errors

use thiserror::Error;

/// Result type for database statements
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Failures reported by a database executor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatabaseError {
    /// The server could not be reached or refused the session
    #[error("cannot connect to {address}: {reason}")]
    Connection { address: String, reason: String },

    /// The server rejected the statement
    #[error("statement failed: {0}")]
    Statement(String),

    /// The server answered with output that could not be interpreted
    #[error("unparseable server output: {0}")]
    Parse(String),
}

impl DatabaseError {
    /// Create a connection error.
    pub fn connection(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Connection {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Whether the server was never reached.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}
