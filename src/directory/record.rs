//! Node records published to the peer directory
//!
//! One record per cluster member, partitioned by environment. The core only
//! mutates the role marker, the replication secret, the log coordinates and
//! the publication timestamp, and only on the owning node's own record.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role marker carried by a node record.
///
/// Published strictly after the work the role requires has succeeded, so a
/// peer observing the marker may rely on that work being done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleMarker {
    /// Role not decided yet
    #[default]
    None,
    /// First master: owns the replication credential
    First,
    /// Second master: replicates from the first master
    Second,
}

impl RoleMarker {
    /// Marker name for logs and directory queries.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::First => "first",
            Self::Second => "second",
        }
    }

    /// Whether a role has been decided.
    pub fn is_assigned(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Auto-increment offset the database engine uses under this role.
    ///
    /// Two masters writing concurrently must never hand out the same
    /// auto-increment key, so each role takes one residue class modulo 2.
    pub fn auto_increment_offset(&self) -> Option<u8> {
        match self {
            Self::None => None,
            Self::First => Some(1),
            Self::Second => Some(2),
        }
    }
}

impl fmt::Display for RoleMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Binary log coordinates used to initialize replication from a node.
///
/// Full provisioning always starts a fresh log, so replicas attach at the
/// first log file and position 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogCoordinates {
    /// Binary log base name (e.g. `mysql-bin`)
    pub base_name: String,
    /// Numeric suffix of the log file
    pub file_index: u32,
    /// Byte offset within the log file
    pub position: u64,
}

impl LogCoordinates {
    /// Coordinates of a freshly provisioned server.
    pub fn initial(base_name: impl Into<String>) -> Self {
        Self {
            base_name: base_name.into(),
            file_index: 1,
            position: 0,
        }
    }

    /// Full log file name, e.g. `mysql-bin.000001`.
    pub fn log_file(&self) -> String {
        format!("{}.{:06}", self.base_name, self.file_index)
    }
}

/// A cluster member as seen through the peer directory.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Node identity, unique within an environment
    pub name: String,

    /// Partition key; every directory query is scoped to one environment
    pub environment: String,

    /// Network address used for replication connections
    pub address: String,

    /// Published role, `None` until the role is finalized
    #[serde(default)]
    pub role_marker: RoleMarker,

    /// Replication credential, present only on the First record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication_secret: Option<String>,

    /// Where a replica of this node starts reading
    pub log_coordinates: LogCoordinates,

    /// When the role marker was published
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl NodeRecord {
    /// Create an undecided record for a newly registered node.
    pub fn new(
        name: impl Into<String>,
        environment: impl Into<String>,
        address: impl Into<String>,
        log_base_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            environment: environment.into(),
            address: address.into(),
            role_marker: RoleMarker::None,
            replication_secret: None,
            log_coordinates: LogCoordinates::initial(log_base_name),
            published_at: None,
        }
    }

    /// Check if this record carries the First marker.
    pub fn is_first(&self) -> bool {
        self.role_marker == RoleMarker::First
    }

    /// Check if this record carries the Second marker.
    pub fn is_second(&self) -> bool {
        self.role_marker == RoleMarker::Second
    }

    /// Compare two records ignoring the publication timestamp.
    ///
    /// Republishing a record that differs only in its timestamp is a no-op.
    pub fn same_content(&self, other: &NodeRecord) -> bool {
        self.name == other.name
            && self.environment == other.environment
            && self.address == other.address
            && self.role_marker == other.role_marker
            && self.replication_secret == other.replication_secret
            && self.log_coordinates == other.log_coordinates
    }
}

impl fmt::Debug for NodeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRecord")
            .field("name", &self.name)
            .field("environment", &self.environment)
            .field("address", &self.address)
            .field("role_marker", &self.role_marker)
            .field(
                "replication_secret",
                &self.replication_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("log_coordinates", &self.log_coordinates)
            .field("published_at", &self.published_at)
            .finish()
    }
}
