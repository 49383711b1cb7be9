//! Bootstrap lifecycle events
//!
//! Every observable step of a reconciliation pass has one typed event.

use std::fmt;

use super::logger::Severity;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Pass lifecycle
    /// Reconciliation pass begins
    PassStart,
    /// Reconciliation pass finished without error
    PassComplete,
    /// Reconciliation pass aborted; retried on next invocation
    PassFailed,

    // Election
    /// Local role reloaded from the node's own published record
    RoleRestored,
    /// No First visible; claiming First
    ClaimFirst,
    /// Exactly one First visible; claiming Second
    ClaimSecond,
    /// More than one node claims a role (FATAL)
    ElectionConflict,

    // Provisioning and credentials
    /// Database engine provisioned with role tuning
    ServerProvisioned,
    /// New replication secret generated
    SecretGenerated,
    /// Replication secret copied from the First record
    SecretCopied,
    /// Existing replication secret reused
    SecretReused,
    /// Replication principal created and granted
    GrantCreated,

    // Replication links
    /// Replica attached and running
    ReplicaAttached,
    /// Attach or verification failed
    ReplicaAttachFailed,
    /// Reverse link already running; nothing to do
    ReplicaAlreadyRunning,
    /// Replica status could not be read; treated as not running
    ReplicaStatusUnknown,
    /// First holds its role but no Second is visible yet
    ReverseLinkPending,

    // Directory
    /// Role marker published
    MarkerPublished,
}

impl Event {
    /// Returns the event name
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::PassStart => "PASS_START",
            Event::PassComplete => "PASS_COMPLETE",
            Event::PassFailed => "PASS_FAILED",
            Event::RoleRestored => "ROLE_RESTORED",
            Event::ClaimFirst => "CLAIM_FIRST",
            Event::ClaimSecond => "CLAIM_SECOND",
            Event::ElectionConflict => "ELECTION_CONFLICT",
            Event::ServerProvisioned => "SERVER_PROVISIONED",
            Event::SecretGenerated => "SECRET_GENERATED",
            Event::SecretCopied => "SECRET_COPIED",
            Event::SecretReused => "SECRET_REUSED",
            Event::GrantCreated => "GRANT_CREATED",
            Event::ReplicaAttached => "REPLICA_ATTACHED",
            Event::ReplicaAttachFailed => "REPLICA_ATTACH_FAILED",
            Event::ReplicaAlreadyRunning => "REPLICA_ALREADY_RUNNING",
            Event::ReplicaStatusUnknown => "REPLICA_STATUS_UNKNOWN",
            Event::ReverseLinkPending => "REVERSE_LINK_PENDING",
            Event::MarkerPublished => "MARKER_PUBLISHED",
        }
    }

    /// Severity the event is logged at.
    pub fn severity(&self) -> Severity {
        match self {
            Event::ElectionConflict => Severity::Fatal,
            Event::PassFailed | Event::ReplicaAttachFailed => Severity::Error,
            Event::ReplicaStatusUnknown => Severity::Warn,
            _ => Severity::Info,
        }
    }

    /// Check if this event requires operator intervention
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
