//! Topology Reconciler
//!
//! Runs one reconciliation pass for the local node:
//! 1. Restore the node's role from its own published record
//! 2. Elect (or re-check) the role through the directory
//! 3. Carry out the claim, or maintain the held role
//!
//! Every pass starts over from the directory; published markers let
//! completed steps be skipped. A role marker is published only after
//! everything the role requires has succeeded, and the local node adopts
//! the role only after that publish succeeded. A pass that fails anywhere
//! before the publish leaves no role behind, and the next pass repeats the
//! claim.
//!
//! Non-responsibilities:
//! - No retries inside a pass
//! - No re-election and no promotion of a replacement Second

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::crash_point::{maybe_crash, points};
use crate::credentials::CredentialVault;
use crate::directory::{NodeRecord, PeerDirectory, RoleMarker};
use crate::election::{Election, ElectionState, RoleElector};
use crate::errors::{BootstrapError, BootstrapResult};
use crate::node::LocalNode;
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::provision::{PackageInstaller, ServerTuning};
use crate::replication::{AttachRequest, DatabaseExecutor, ReplicationConfigurator};

/// One effect of a pass, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PassAction {
    /// Role adopted from the node's own published record
    RoleRestored { role: RoleMarker },
    /// Database server installed and tuned for `role`
    ServerProvisioned { role: RoleMarker, server_id: u32 },
    /// Replication principal created on this node
    ReplicationUserGranted { user: String },
    /// This node now replicates from `upstream`
    ReplicaAttached { upstream: String },
    /// Reverse link already running, nothing done
    ReplicaAlreadyRunning,
    /// No Second published yet, reverse link deferred
    ReverseLinkPending,
    /// Role marker written to the directory
    MarkerPublished { role: RoleMarker },
}

/// Outcome of a successful pass.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub pass_id: Uuid,
    pub node: String,
    pub environment: String,
    pub state: ElectionState,
    pub actions: Vec<PassAction>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ReconcileReport {
    /// Whether the node holds a finalized role.
    pub fn is_complete(&self) -> bool {
        self.state.role().is_some()
    }

    /// Whether the pass changed anything outside the local node.
    pub fn changed_anything(&self) -> bool {
        self.actions.iter().any(|a| {
            !matches!(
                a,
                PassAction::RoleRestored { .. }
                    | PassAction::ReplicaAlreadyRunning
                    | PassAction::ReverseLinkPending
            )
        })
    }
}

/// Drives the bootstrap protocol for one node per call.
pub struct TopologyReconciler {
    directory: Arc<dyn PeerDirectory>,
    elector: RoleElector,
    vault: CredentialVault,
    executor: Arc<dyn DatabaseExecutor>,
    installer: Arc<dyn PackageInstaller>,
    metrics: Arc<MetricsRegistry>,
}

impl TopologyReconciler {
    pub fn new(
        directory: Arc<dyn PeerDirectory>,
        executor: Arc<dyn DatabaseExecutor>,
        installer: Arc<dyn PackageInstaller>,
        vault: CredentialVault,
    ) -> Self {
        Self {
            elector: RoleElector::new(directory.clone()),
            directory,
            vault,
            executor,
            installer,
            metrics: Arc::new(MetricsRegistry::new()),
        }
    }

    /// Share a metrics registry with other components.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// Run one reconciliation pass for `node`.
    pub fn reconcile(&self, node: &mut LocalNode) -> BootstrapResult<ReconcileReport> {
        node.validate()?;

        let pass_id = Uuid::new_v4();
        let pass = pass_id.to_string();
        let started_at = Utc::now();
        self.metrics.increment_passes_started();
        log_event_with_fields(
            Event::PassStart,
            &[
                ("environment", node.environment()),
                ("node", node.name()),
                ("pass_id", pass.as_str()),
            ],
        );

        let mut actions = Vec::new();
        match self.run_pass(node, &mut actions) {
            Ok(state) => {
                self.metrics.increment_passes_completed();
                let action_count = actions.len().to_string();
                log_event_with_fields(
                    Event::PassComplete,
                    &[
                        ("actions", action_count.as_str()),
                        ("node", node.name()),
                        ("pass_id", pass.as_str()),
                        ("state", state.state_name()),
                    ],
                );
                Ok(ReconcileReport {
                    pass_id,
                    node: node.name().to_string(),
                    environment: node.environment().to_string(),
                    state,
                    actions,
                    started_at,
                    finished_at: Utc::now(),
                })
            }
            Err(e) => {
                self.metrics.increment_passes_failed();
                log_event_with_fields(
                    Event::PassFailed,
                    &[
                        ("code", e.kind.code()),
                        ("error", e.message.as_str()),
                        ("node", node.name()),
                        ("pass_id", pass.as_str()),
                    ],
                );
                Err(e)
            }
        }
    }

    fn run_pass(
        &self,
        node: &mut LocalNode,
        actions: &mut Vec<PassAction>,
    ) -> BootstrapResult<ElectionState> {
        self.restore_role(node, actions)?;

        let state = ElectionState::resume(node.role());
        match self.elector.elect(node)? {
            Election::Conflict { role, claimants } => {
                let state = state.conflict(role, claimants)?;
                Err(self.report_conflict(node, &state))
            }
            Election::ClaimFirst => {
                let state = state.claim_first()?;
                match self.claim_first(node, actions) {
                    Ok(()) => state.confirm(),
                    Err(e) => {
                        state.abandon()?;
                        Err(e)
                    }
                }
            }
            Election::ClaimSecond { first } => {
                let state = state.claim_second(first.name.clone())?;
                match self.claim_second(node, &first, actions) {
                    Ok(()) => state.confirm(),
                    Err(e) => {
                        state.abandon()?;
                        Err(e)
                    }
                }
            }
            Election::HoldingFirst { second } => {
                self.ensure_reverse_link(node, second.as_ref(), actions)?;
                Ok(state)
            }
            Election::HoldingSecond { .. } => Ok(state),
        }
    }

    /// Adopt the role recorded under the node's own name, and make sure a
    /// held role is visible in the directory.
    fn restore_role(
        &self,
        node: &mut LocalNode,
        actions: &mut Vec<PassAction>,
    ) -> BootstrapResult<()> {
        let published = self.directory.find_node(node.environment(), node.name())?;

        if let Some(record) = &published {
            if node.restore_from(record)? && record.role_marker.is_assigned() {
                log_event_with_fields(
                    Event::RoleRestored,
                    &[("node", node.name()), ("role", record.role_marker.as_str())],
                );
                actions.push(PassAction::RoleRestored {
                    role: record.role_marker,
                });
            }
        }

        // Held locally but missing from the directory: publish again.
        if node.role().is_some() {
            let expected = node.to_record();
            let up_to_date = published
                .as_ref()
                .map_or(false, |record| record.same_content(&expected));
            if !up_to_date {
                self.publish_marker(&expected, actions)?;
            }
        }
        Ok(())
    }

    fn claim_first(&self, node: &mut LocalNode, actions: &mut Vec<PassAction>) -> BootstrapResult<()> {
        log_event_with_fields(
            Event::ClaimFirst,
            &[("environment", node.environment()), ("node", node.name())],
        );

        self.provision(node, RoleMarker::First, actions)?;
        maybe_crash(points::FIRST_AFTER_PROVISION);

        let secret = self.vault.create_or_get_replication_secret(node, None)?;
        node.set_replication_secret(&secret)?;
        maybe_crash(points::FIRST_AFTER_SECRET);

        self.configurator(node)
            .grant_replication_user(node.address(), node.replication_user(), &secret)?;
        self.metrics.increment_grants_created();
        actions.push(PassAction::ReplicationUserGranted {
            user: node.replication_user().to_string(),
        });
        maybe_crash(points::FIRST_AFTER_GRANT);

        maybe_crash(points::FIRST_BEFORE_PUBLISH);
        let record = node.record_with_role(RoleMarker::First, Some(&secret));
        self.publish_marker(&record, actions)?;
        maybe_crash(points::FIRST_AFTER_PUBLISH);

        node.set_role(RoleMarker::First)
    }

    fn claim_second(
        &self,
        node: &mut LocalNode,
        first: &NodeRecord,
        actions: &mut Vec<PassAction>,
    ) -> BootstrapResult<()> {
        log_event_with_fields(
            Event::ClaimSecond,
            &[
                ("environment", node.environment()),
                ("first", first.name.as_str()),
                ("node", node.name()),
            ],
        );

        ServerTuning::for_role(node, RoleMarker::Second)?.ensure_distinct_from(&first.address)?;

        let secret = self.vault.create_or_get_replication_secret(node, Some(first))?;
        node.adopt_replication_secret(&secret)?;
        maybe_crash(points::SECOND_AFTER_SECRET);

        self.provision(node, RoleMarker::Second, actions)?;

        maybe_crash(points::SECOND_BEFORE_ATTACH);
        self.attach(node, first, &secret, actions)?;

        maybe_crash(points::SECOND_BEFORE_PUBLISH);
        let record = node.record_with_role(RoleMarker::Second, None);
        self.publish_marker(&record, actions)?;
        maybe_crash(points::SECOND_AFTER_PUBLISH);

        node.set_role(RoleMarker::Second)
    }

    /// First master: replicate back from the Second once it exists.
    fn ensure_reverse_link(
        &self,
        node: &LocalNode,
        second: Option<&NodeRecord>,
        actions: &mut Vec<PassAction>,
    ) -> BootstrapResult<()> {
        let second = match second {
            Some(second) => second,
            None => {
                log_event_with_fields(Event::ReverseLinkPending, &[("node", node.name())]);
                actions.push(PassAction::ReverseLinkPending);
                return Ok(());
            }
        };

        if self.configurator(node).is_replica_running(node.address()) {
            log_event_with_fields(
                Event::ReplicaAlreadyRunning,
                &[("node", node.name()), ("upstream", second.name.as_str())],
            );
            actions.push(PassAction::ReplicaAlreadyRunning);
            return Ok(());
        }

        let secret = node.replication_secret().ok_or_else(|| {
            BootstrapError::secret_unavailable(format!(
                "first master '{}' holds no replication secret",
                node.name()
            ))
        })?;

        maybe_crash(points::REVERSE_BEFORE_ATTACH);
        self.attach(node, second, secret, actions)
    }

    fn attach(
        &self,
        node: &LocalNode,
        upstream: &NodeRecord,
        secret: &str,
        actions: &mut Vec<PassAction>,
    ) -> BootstrapResult<()> {
        let request = AttachRequest {
            self_address: node.address().to_string(),
            peer_address: upstream.address.clone(),
            user: node.replication_user().to_string(),
            secret: secret.to_string(),
            log_file: upstream.log_coordinates.log_file(),
            log_position: upstream.log_coordinates.position,
        };

        match self.configurator(node).attach_as_replica(&request) {
            Ok(()) => {
                self.metrics.increment_replicas_attached();
                actions.push(PassAction::ReplicaAttached {
                    upstream: upstream.name.clone(),
                });
                Ok(())
            }
            Err(e) => {
                self.metrics.increment_attach_failures();
                Err(e)
            }
        }
    }

    fn provision(
        &self,
        node: &LocalNode,
        role: RoleMarker,
        actions: &mut Vec<PassAction>,
    ) -> BootstrapResult<()> {
        let tuning = ServerTuning::for_role(node, role)?;
        self.installer.install_database_server(&tuning)?;
        actions.push(PassAction::ServerProvisioned {
            role,
            server_id: tuning.server_id,
        });
        Ok(())
    }

    fn publish_marker(
        &self,
        record: &NodeRecord,
        actions: &mut Vec<PassAction>,
    ) -> BootstrapResult<()> {
        self.directory.publish(record)?;
        self.metrics.increment_markers_published();
        log_event_with_fields(
            Event::MarkerPublished,
            &[
                ("environment", record.environment.as_str()),
                ("node", record.name.as_str()),
                ("role", record.role_marker.as_str()),
            ],
        );
        actions.push(PassAction::MarkerPublished {
            role: record.role_marker,
        });
        Ok(())
    }

    fn report_conflict(&self, node: &LocalNode, state: &ElectionState) -> BootstrapError {
        self.metrics.increment_election_conflicts();

        let (role, claimants) = match state {
            ElectionState::ElectionConflict { role, claimants } => (*role, claimants.join(",")),
            _ => (RoleMarker::None, String::new()),
        };
        log_event_with_fields(
            Event::ElectionConflict,
            &[
                ("claimants", claimants.as_str()),
                ("environment", node.environment()),
                ("node", node.name()),
                ("role", role.as_str()),
            ],
        );
        BootstrapError::election_conflict(format!(
            "more than one node claims role '{}' in environment '{}': {}",
            role,
            node.environment(),
            claimants
        ))
    }

    fn configurator(&self, node: &LocalNode) -> ReplicationConfigurator {
        ReplicationConfigurator::new(self.executor.clone(), node.root_credentials().clone())
    }
}
