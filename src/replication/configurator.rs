//! Replication Configurator
//!
//! Issues the statements that create the replication principal and attach
//! one instance as a replica of another, then checks that the replica is
//! running.
//!
//! Non-responsibilities:
//! - Does not retry. A failed attach is reported and the next
//!   reconciliation pass attaches again.
//! - Does not decide roles or read the directory.

use std::sync::Arc;

use super::executor::{Credentials, DatabaseExecutor, ReplicaStatus};
use super::statement::{split_host_port, Statement, ANY_HOST};
use crate::errors::{BootstrapError, BootstrapResult};
use crate::observability::{log_event_with_fields, Event};

/// Default name of the replication principal.
pub const DEFAULT_REPLICATION_USER: &str = "repl";

/// Everything needed to point a replica at its upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachRequest {
    /// Instance being configured as a replica
    pub self_address: String,
    /// Upstream instance
    pub peer_address: String,
    /// Replication principal on the upstream
    pub user: String,
    /// Replication principal's password
    pub secret: String,
    /// Upstream log file to start from
    pub log_file: String,
    /// Offset within `log_file`
    pub log_position: u64,
}

/// Applies replication configuration through a [`DatabaseExecutor`].
pub struct ReplicationConfigurator {
    executor: Arc<dyn DatabaseExecutor>,
    /// Administrative credentials for the local instance
    admin: Credentials,
}

impl ReplicationConfigurator {
    /// Create a configurator issuing statements as `admin`.
    pub fn new(executor: Arc<dyn DatabaseExecutor>, admin: Credentials) -> Self {
        Self { executor, admin }
    }

    /// Create the replication principal with only the replication privilege,
    /// reachable from any host.
    ///
    /// Safe to repeat: an existing principal is kept and its password reset
    /// to `secret`, so a retried claim never leaves a principal keyed to a
    /// secret that was lost before publication.
    pub fn grant_replication_user(
        &self,
        self_address: &str,
        user: &str,
        secret: &str,
    ) -> BootstrapResult<()> {
        let statements = [
            Statement::CreateReplicationUser {
                user: user.to_string(),
                host: ANY_HOST.to_string(),
                password: secret.to_string(),
            },
            Statement::SetReplicationPassword {
                user: user.to_string(),
                host: ANY_HOST.to_string(),
                password: secret.to_string(),
            },
            Statement::GrantReplication {
                user: user.to_string(),
                host: ANY_HOST.to_string(),
            },
        ];

        for statement in &statements {
            self.executor
                .execute(self_address, &self.admin, statement)
                .map_err(|e| {
                    BootstrapError::database(format!(
                        "{} on {} failed: {}",
                        statement.name(),
                        self_address,
                        e
                    ))
                })?;
        }

        log_event_with_fields(
            Event::GrantCreated,
            &[("address", self_address), ("user", user)],
        );
        Ok(())
    }

    /// Point `self_address` at `peer_address`, start replication and verify
    /// the replica reports running.
    pub fn attach_as_replica(&self, request: &AttachRequest) -> BootstrapResult<()> {
        let (host, port) = split_host_port(&request.peer_address);
        let statements = [
            Statement::StopReplica,
            Statement::ChangeMaster {
                host,
                port,
                user: request.user.clone(),
                password: request.secret.clone(),
                log_file: request.log_file.clone(),
                log_position: request.log_position,
            },
            Statement::StartReplica,
        ];

        for statement in &statements {
            if let Err(e) = self
                .executor
                .execute(&request.self_address, &self.admin, statement)
            {
                return Err(self.attach_failed(
                    request,
                    format!("{} failed: {}", statement.name(), e),
                ));
            }
        }

        let status = self
            .replica_status(&request.self_address)
            .map_err(|e| self.attach_failed(request, e.message))?;

        if !status.is_running() {
            return Err(self.attach_failed(
                request,
                format!(
                    "replica not running after start (io={}, sql_running={}, last_io_error={})",
                    status.io_state,
                    status.sql_running,
                    status.last_io_error.as_deref().unwrap_or("none")
                ),
            ));
        }

        log_event_with_fields(
            Event::ReplicaAttached,
            &[
                ("address", request.self_address.as_str()),
                ("log_file", request.log_file.as_str()),
                ("upstream", request.peer_address.as_str()),
            ],
        );
        Ok(())
    }

    /// Whether the replica on `self_address` is applying events.
    ///
    /// Any failure to read the status, including an unreachable database,
    /// is reported as "not running". The caller may then attach against a
    /// database that is merely unreachable; that attach fails on its own.
    pub fn is_replica_running(&self, self_address: &str) -> bool {
        match self.replica_status(self_address) {
            Ok(status) => status.is_running(),
            Err(e) => {
                log_event_with_fields(
                    Event::ReplicaStatusUnknown,
                    &[("address", self_address), ("reason", e.message.as_str())],
                );
                false
            }
        }
    }

    /// Read replica thread state on `self_address`.
    pub fn replica_status(&self, self_address: &str) -> BootstrapResult<ReplicaStatus> {
        let rows = self
            .executor
            .execute(self_address, &self.admin, &Statement::ShowReplicaStatus)?;
        Ok(ReplicaStatus::from_rows(&rows)?)
    }

    fn attach_failed(&self, request: &AttachRequest, reason: String) -> BootstrapError {
        log_event_with_fields(
            Event::ReplicaAttachFailed,
            &[
                ("address", request.self_address.as_str()),
                ("reason", reason.as_str()),
                ("upstream", request.peer_address.as_str()),
            ],
        );
        BootstrapError::attach_failed(format!(
            "attaching {} to {}: {}",
            request.self_address, request.peer_address, reason
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BootstrapErrorKind;
    use crate::replication::SimulatedDatabase;

    fn setup() -> (Arc<SimulatedDatabase>, ReplicationConfigurator) {
        let db = Arc::new(SimulatedDatabase::new());
        let configurator =
            ReplicationConfigurator::new(db.clone(), Credentials::new("root", "rootpw"));
        (db, configurator)
    }

    fn request(secret: &str) -> AttachRequest {
        AttachRequest {
            self_address: "10.0.0.2".into(),
            peer_address: "10.0.0.1".into(),
            user: DEFAULT_REPLICATION_USER.into(),
            secret: secret.into(),
            log_file: "mysql-bin.000001".into(),
            log_position: 0,
        }
    }

    #[test]
    fn test_grant_creates_principal() {
        let (db, configurator) = setup();
        configurator
            .grant_replication_user("10.0.0.1", "repl", "s3cret")
            .unwrap();
        assert!(db.has_replication_user("10.0.0.1", "repl", "s3cret"));
    }

    #[test]
    fn test_grant_twice_is_tolerated() {
        let (db, configurator) = setup();
        configurator.grant_replication_user("10.0.0.1", "repl", "a").unwrap();
        configurator.grant_replication_user("10.0.0.1", "repl", "a").unwrap();
        assert!(db.has_replication_user("10.0.0.1", "repl", "a"));
    }

    #[test]
    fn test_attach_succeeds_with_matching_secret() {
        let (db, configurator) = setup();
        configurator.grant_replication_user("10.0.0.1", "repl", "s").unwrap();
        configurator.attach_as_replica(&request("s")).unwrap();

        assert!(configurator.is_replica_running("10.0.0.2"));
        assert_eq!(db.upstream_of("10.0.0.2").as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_attach_with_wrong_secret_fails() {
        let (_db, configurator) = setup();
        configurator.grant_replication_user("10.0.0.1", "repl", "right").unwrap();

        let err = configurator.attach_as_replica(&request("wrong")).unwrap_err();
        assert_eq!(err.kind, BootstrapErrorKind::ReplicationAttachFailed);
        assert!(!configurator.is_replica_running("10.0.0.2"));
    }

    #[test]
    fn test_attach_to_unreachable_self_fails() {
        let (db, configurator) = setup();
        db.set_reachable("10.0.0.2", false);
        let err = configurator.attach_as_replica(&request("s")).unwrap_err();
        assert_eq!(err.kind, BootstrapErrorKind::ReplicationAttachFailed);
    }

    #[test]
    fn test_unreachable_status_reads_as_not_running() {
        let (db, configurator) = setup();
        configurator.grant_replication_user("10.0.0.1", "repl", "s").unwrap();
        configurator.attach_as_replica(&request("s")).unwrap();

        db.set_reachable("10.0.0.2", false);
        assert!(!configurator.is_replica_running("10.0.0.2"));
    }

    #[test]
    fn test_status_check_issues_no_mutation() {
        let (db, configurator) = setup();
        configurator.is_replica_running("10.0.0.1");
        assert_eq!(db.mutation_count("10.0.0.1"), 0);
    }
}
