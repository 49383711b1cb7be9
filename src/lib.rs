//! dualmaster - self-electing two-node master-master replication bootstrap
//!
//! Two database nodes that know nothing about each other at deploy time
//! agree on who is "first" and who is "second" through a shared, weakly
//! consistent peer directory, share one replication secret, and wire each
//! server as a replica of the other.
//!
//! Every run is a full reconciliation pass. Role markers are published only
//! after the work behind them succeeded, so repeated passes converge and a
//! double claim is detected and surfaced instead of silently resolved.

pub mod cli;
pub mod crash_point;
pub mod credentials;
pub mod directory;
pub mod election;
pub mod errors;
pub mod node;
pub mod observability;
pub mod provision;
pub mod reconciler;
pub mod replication;

pub use credentials::CredentialVault;
pub use directory::{NodeRecord, PeerDirectory, RoleMarker};
pub use election::{Election, ElectionState, RoleElector};
pub use errors::{BootstrapError, BootstrapErrorKind, BootstrapResult};
pub use node::LocalNode;
pub use reconciler::{PassAction, ReconcileReport, TopologyReconciler};
pub use replication::ReplicationConfigurator;
