//! Peer Directory
//!
//! A searchable registry of node records, used as the only coordination
//! substrate between cluster members. It is weakly consistent: a query may
//! miss a record that was already written. The protocol never relies on the
//! directory for mutual exclusion. It detects double claims instead of
//! preventing them.
//!
//! Contract:
//! - Queries are always scoped to one environment
//! - A query with zero matches is the normal "no peer yet" state, not an error
//! - An unreachable directory is `DirectoryUnavailable` and ends the pass
//! - Publishing is at-least-once; an identical republish is a no-op
//! - A node only ever writes its own record

mod file;
mod memory;
mod record;

pub use file::FileDirectory;
pub use memory::MemoryDirectory;
pub use record::{LogCoordinates, NodeRecord, RoleMarker};

use crate::errors::{BootstrapError, BootstrapResult};

/// Searchable registry of node records.
pub trait PeerDirectory: Send + Sync {
    /// All visible records in `environment` carrying `marker`.
    fn find_by_role_marker(
        &self,
        environment: &str,
        marker: RoleMarker,
    ) -> BootstrapResult<Vec<NodeRecord>>;

    /// The record stored under `name`, if visible.
    fn find_node(&self, environment: &str, name: &str) -> BootstrapResult<Option<NodeRecord>>;

    /// Write the owning node's record.
    fn publish(&self, record: &NodeRecord) -> BootstrapResult<()>;
}

/// What a publish should do given the currently stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PublishAction {
    /// Stored record already has this content
    Unchanged,
    /// Record must be written
    Write,
}

/// Decide whether `incoming` may replace `existing`.
///
/// A published role marker and a published secret are immutable for the
/// node's lifetime.
pub(crate) fn check_publish(
    existing: Option<&NodeRecord>,
    incoming: &NodeRecord,
) -> BootstrapResult<PublishAction> {
    let existing = match existing {
        Some(existing) => existing,
        None => return Ok(PublishAction::Write),
    };

    if existing.same_content(incoming) {
        return Ok(PublishAction::Unchanged);
    }

    if existing.role_marker.is_assigned() && existing.role_marker != incoming.role_marker {
        return Err(BootstrapError::configuration_error(format!(
            "node '{}' already published role '{}', refusing to publish '{}'",
            existing.name, existing.role_marker, incoming.role_marker
        )));
    }

    if existing.replication_secret.is_some()
        && existing.replication_secret != incoming.replication_secret
    {
        return Err(BootstrapError::configuration_error(format!(
            "node '{}' already published a replication secret",
            existing.name
        )));
    }

    Ok(PublishAction::Write)
}

/// Reject names that cannot safely key a record.
pub(crate) fn validate_key(kind: &str, value: &str) -> BootstrapResult<()> {
    let valid = !value.is_empty()
        && !value.starts_with('.')
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(BootstrapError::configuration_error(format!(
            "invalid {} '{}': use ASCII letters, digits, '-', '_' or '.'",
            kind, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> NodeRecord {
        NodeRecord::new("db1", "prod", "10.0.0.1", "mysql-bin")
    }

    #[test]
    fn test_first_publish_writes() {
        assert_eq!(check_publish(None, &record()).unwrap(), PublishAction::Write);
    }

    #[test]
    fn test_identical_publish_is_noop() {
        let r = record();
        assert_eq!(check_publish(Some(&r), &r).unwrap(), PublishAction::Unchanged);
    }

    #[test]
    fn test_undecided_record_can_take_role() {
        let existing = record();
        let mut incoming = record();
        incoming.role_marker = RoleMarker::First;
        incoming.replication_secret = Some("s".into());
        assert_eq!(
            check_publish(Some(&existing), &incoming).unwrap(),
            PublishAction::Write
        );
    }

    #[test]
    fn test_published_role_is_immutable() {
        let mut existing = record();
        existing.role_marker = RoleMarker::First;
        let mut incoming = record();
        incoming.role_marker = RoleMarker::Second;
        assert!(check_publish(Some(&existing), &incoming).is_err());
    }

    #[test]
    fn test_published_secret_is_immutable() {
        let mut existing = record();
        existing.role_marker = RoleMarker::First;
        existing.replication_secret = Some("a".into());
        let mut incoming = existing.clone();
        incoming.replication_secret = Some("b".into());
        assert!(check_publish(Some(&existing), &incoming).is_err());
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("node name", "db-1.prod_a").is_ok());
        assert!(validate_key("node name", "").is_err());
        assert!(validate_key("node name", "../etc").is_err());
        assert!(validate_key("node name", ".hidden").is_err());
        assert!(validate_key("node name", "a/b").is_err());
    }
}
