//! Database executor seam
//!
//! The core issues statements through [`DatabaseExecutor`] and never talks to
//! a database directly. Connection handling and timeouts belong to the
//! executor.

use std::collections::BTreeMap;
use std::fmt;

use super::errors::{DatabaseError, DatabaseResult};
use super::statement::Statement;

/// One result row, column name to textual value.
pub type Row = BTreeMap<String, String>;

/// Session credentials for a database instance.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Issues statements against local or remote database instances.
pub trait DatabaseExecutor: Send + Sync {
    /// Execute `statement` on the instance at `address`.
    fn execute(
        &self,
        address: &str,
        credentials: &Credentials,
        statement: &Statement,
    ) -> DatabaseResult<Vec<Row>>;
}

/// Replica thread state as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReplicaStatus {
    /// Whether a replication upstream is configured at all
    pub configured: bool,
    /// I/O thread state: `Yes`, `Connecting` or `No`
    pub io_state: String,
    /// SQL thread (applying events) running
    pub sql_running: bool,
    /// Last error reported by the I/O thread
    pub last_io_error: Option<String>,
}

impl ReplicaStatus {
    /// Interpret `SHOW SLAVE STATUS` rows.
    ///
    /// No rows means no upstream is configured. Both the legacy `Slave_*`
    /// and the newer `Replica_*` column names are accepted.
    pub fn from_rows(rows: &[Row]) -> DatabaseResult<Self> {
        let row = match rows.first() {
            Some(row) => row,
            None => return Ok(Self::default()),
        };

        let column = |legacy: &str, current: &str| -> Option<&String> {
            row.get(legacy).or_else(|| row.get(current))
        };
        let required = |legacy: &str, current: &str| -> DatabaseResult<String> {
            column(legacy, current).cloned().ok_or_else(|| {
                DatabaseError::Parse(format!("replica status has no {} column", legacy))
            })
        };

        let io_state = required("Slave_IO_Running", "Replica_IO_Running")?;
        let sql_running =
            required("Slave_SQL_Running", "Replica_SQL_Running")?.eq_ignore_ascii_case("yes");
        let last_io_error = row
            .get("Last_IO_Error")
            .filter(|e| !e.trim().is_empty())
            .cloned();

        Ok(Self {
            configured: true,
            io_state,
            sql_running,
            last_io_error,
        })
    }

    /// Whether replication is applying events from a healthy upstream link.
    ///
    /// The SQL thread must run and the I/O thread must be running or still
    /// connecting without a recorded error. An authentication failure shows
    /// up as `Connecting` plus a `Last_IO_Error`, and is not running.
    pub fn is_running(&self) -> bool {
        let io_alive = self.io_state.eq_ignore_ascii_case("yes")
            || self.io_state.eq_ignore_ascii_case("connecting");
        self.sql_running && io_alive && self.last_io_error.is_none()
    }
}
