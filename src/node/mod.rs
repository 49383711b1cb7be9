//! Local Node
//!
//! The local node's private configuration: identity, environment, address,
//! database settings, and the role and secret this node has taken on. It
//! is passed explicitly to the reconciler as `&mut LocalNode`; there is no
//! process-wide node state.
//!
//! Every mutation increments `version`. Role and secret are write-once:
//! setting the same value again is a no-op, setting a different one is a
//! `ConfigurationError`.

mod store;

pub use store::{NodeState, NodeStateStore};

use std::fmt;

use crate::directory::{validate_key, LogCoordinates, NodeRecord, RoleMarker};
use crate::errors::{BootstrapError, BootstrapResult};
use crate::replication::{Credentials, DEFAULT_REPLICATION_USER};

/// Default binary log base name.
pub const DEFAULT_LOG_BASE_NAME: &str = "mysql-bin";

/// The node running this process.
#[derive(Clone)]
pub struct LocalNode {
    name: String,
    environment: String,
    address: String,
    log_base_name: String,
    replication_user: String,
    development_mode: bool,
    root_credentials: Credentials,
    role: Option<RoleMarker>,
    replication_secret: Option<String>,
    version: u64,
}

impl LocalNode {
    /// Create an undecided node with default database settings.
    pub fn new(
        name: impl Into<String>,
        environment: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            environment: environment.into(),
            address: address.into(),
            log_base_name: DEFAULT_LOG_BASE_NAME.to_string(),
            replication_user: DEFAULT_REPLICATION_USER.to_string(),
            development_mode: false,
            root_credentials: Credentials::new("root", ""),
            role: None,
            replication_secret: None,
            version: 0,
        }
    }

    pub fn with_log_base_name(mut self, log_base_name: impl Into<String>) -> Self {
        self.log_base_name = log_base_name.into();
        self
    }

    pub fn with_replication_user(mut self, user: impl Into<String>) -> Self {
        self.replication_user = user.into();
        self
    }

    pub fn with_development_mode(mut self, development_mode: bool) -> Self {
        self.development_mode = development_mode;
        self
    }

    pub fn with_root_credentials(mut self, credentials: Credentials) -> Self {
        self.root_credentials = credentials;
        self
    }

    /// Check identity fields before a pass touches anything.
    pub fn validate(&self) -> BootstrapResult<()> {
        validate_key("node name", &self.name)?;
        validate_key("environment", &self.environment)?;

        if self.address.trim().is_empty() {
            return Err(BootstrapError::configuration_error(
                "node address must not be empty",
            ));
        }
        if self.log_base_name.trim().is_empty() {
            return Err(BootstrapError::configuration_error(
                "log base name must not be empty",
            ));
        }
        if self.replication_user.trim().is_empty() {
            return Err(BootstrapError::configuration_error(
                "replication user must not be empty",
            ));
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn log_base_name(&self) -> &str {
        &self.log_base_name
    }

    pub fn replication_user(&self) -> &str {
        &self.replication_user
    }

    pub fn development_mode(&self) -> bool {
        self.development_mode
    }

    pub fn root_credentials(&self) -> &Credentials {
        &self.root_credentials
    }

    /// Role this node has finalized, if any.
    pub fn role(&self) -> Option<RoleMarker> {
        self.role
    }

    pub fn replication_secret(&self) -> Option<&str> {
        self.replication_secret.as_deref()
    }

    /// Mutation counter.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Coordinates a replica of this node starts from.
    pub fn log_coordinates(&self) -> LogCoordinates {
        LogCoordinates::initial(self.log_base_name.clone())
    }

    /// Record this node's role. Only called after the role marker has been
    /// published.
    pub fn set_role(&mut self, role: RoleMarker) -> BootstrapResult<()> {
        if !role.is_assigned() {
            return Err(BootstrapError::configuration_error(
                "cannot set an unassigned role",
            ));
        }
        match self.role {
            Some(current) if current == role => Ok(()),
            Some(current) => Err(BootstrapError::configuration_error(format!(
                "node '{}' already holds role '{}', refusing '{}'",
                self.name, current, role
            ))),
            None => {
                self.role = Some(role);
                self.version += 1;
                Ok(())
            }
        }
    }

    /// Record the replication secret this node uses.
    pub fn set_replication_secret(&mut self, secret: &str) -> BootstrapResult<()> {
        match &self.replication_secret {
            Some(current) if current == secret => Ok(()),
            Some(_) => Err(BootstrapError::configuration_error(format!(
                "node '{}' already holds a different replication secret",
                self.name
            ))),
            None => {
                self.replication_secret = Some(secret.to_string());
                self.version += 1;
                Ok(())
            }
        }
    }

    /// Take over the First's secret while no role is held.
    ///
    /// An unpublished secret left by a failed First claim is replaced. Once a
    /// role is held the secret is write-once.
    pub fn adopt_replication_secret(&mut self, secret: &str) -> BootstrapResult<()> {
        if self.role.is_some() {
            return self.set_replication_secret(secret);
        }
        if self.replication_secret.as_deref() != Some(secret) {
            self.replication_secret = Some(secret.to_string());
            self.version += 1;
        }
        Ok(())
    }

    /// The record to publish under `role`. Only a First record carries the
    /// secret.
    pub fn record_with_role(&self, role: RoleMarker, secret: Option<&str>) -> NodeRecord {
        let mut record = NodeRecord::new(
            self.name.clone(),
            self.environment.clone(),
            self.address.clone(),
            self.log_base_name.clone(),
        );
        record.role_marker = role;
        if role == RoleMarker::First {
            record.replication_secret = secret.map(str::to_string);
        }
        record
    }

    /// The record as currently known locally.
    pub fn to_record(&self) -> NodeRecord {
        self.record_with_role(
            self.role.unwrap_or_default(),
            self.replication_secret.as_deref(),
        )
    }

    /// Adopt role and secret from this node's own published record.
    ///
    /// Returns whether anything changed. A record disagreeing with what the
    /// node already holds is a `ConfigurationError`.
    pub fn restore_from(&mut self, record: &NodeRecord) -> BootstrapResult<bool> {
        if record.name != self.name || record.environment != self.environment {
            return Err(BootstrapError::configuration_error(format!(
                "record '{}/{}' does not belong to node '{}/{}'",
                record.environment, record.name, self.environment, self.name
            )));
        }

        let before = self.version;
        if record.role_marker.is_assigned() {
            self.set_role(record.role_marker)?;
        }
        if let Some(secret) = &record.replication_secret {
            self.set_replication_secret(secret)?;
        }
        Ok(self.version != before)
    }

    /// Snapshot of the durable part of the node.
    pub fn state(&self) -> NodeState {
        NodeState::new(
            &self.name,
            &self.environment,
            self.role,
            self.replication_secret.clone(),
            self.version,
        )
    }

    /// Adopt a previously saved state.
    pub fn restore_state(&mut self, state: &NodeState) -> BootstrapResult<()> {
        if state.name != self.name || state.environment != self.environment {
            return Err(BootstrapError::configuration_error(format!(
                "state file belongs to '{}/{}', not '{}/{}'",
                state.environment, state.name, self.environment, self.name
            )));
        }
        if let Some(role) = state.role {
            self.set_role(role)?;
        }
        if let Some(secret) = &state.replication_secret {
            self.set_replication_secret(secret)?;
        }
        self.version = self.version.max(state.version);
        Ok(())
    }
}

impl fmt::Debug for LocalNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalNode")
            .field("name", &self.name)
            .field("environment", &self.environment)
            .field("address", &self.address)
            .field("log_base_name", &self.log_base_name)
            .field("replication_user", &self.replication_user)
            .field("development_mode", &self.development_mode)
            .field("root_credentials", &self.root_credentials)
            .field("role", &self.role)
            .field(
                "replication_secret",
                &self.replication_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("version", &self.version)
            .finish()
    }
}
