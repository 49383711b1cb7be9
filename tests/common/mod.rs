//! Shared harness for protocol tests
//!
//! One in-memory directory and one simulated database fleet per cluster.
//! Passes run one at a time, which serializes directory access.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dualmaster::credentials::{CredentialVault, SecretGenerator};
use dualmaster::directory::MemoryDirectory;
use dualmaster::provision::NoopInstaller;
use dualmaster::replication::{SimulatedDatabase, Statement};
use dualmaster::{LocalNode, ReconcileReport, RoleMarker, TopologyReconciler};

pub const ENV: &str = "prod";

/// Hands out `secret-1`, `secret-2`, ... so every generated value is
/// recognizable.
#[derive(Debug, Default)]
pub struct CountingGenerator {
    issued: Arc<AtomicUsize>,
}

impl SecretGenerator for CountingGenerator {
    fn generate(&self) -> String {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        format!("secret-{}", n)
    }
}

pub struct Cluster {
    pub directory: Arc<MemoryDirectory>,
    pub db: Arc<SimulatedDatabase>,
    pub reconciler: TopologyReconciler,
    pub secrets_issued: Arc<AtomicUsize>,
}

impl Cluster {
    pub fn new() -> Self {
        let directory = Arc::new(MemoryDirectory::new());
        let db = Arc::new(SimulatedDatabase::new());
        let generator = CountingGenerator::default();
        let secrets_issued = generator.issued.clone();
        let reconciler = TopologyReconciler::new(
            directory.clone(),
            db.clone(),
            Arc::new(NoopInstaller),
            CredentialVault::new(Box::new(generator)),
        );
        Self {
            directory,
            db,
            reconciler,
            secrets_issued,
        }
    }

    pub fn pass(&self, node: &mut LocalNode) -> dualmaster::BootstrapResult<ReconcileReport> {
        self.reconciler.reconcile(node)
    }

    /// Attach statements that reached `address`.
    pub fn change_master_calls(&self, address: &str) -> Vec<Statement> {
        self.db
            .statements_for(address)
            .into_iter()
            .filter(|s| matches!(s, Statement::ChangeMaster { .. }))
            .collect()
    }

    pub fn secrets_issued(&self) -> usize {
        self.secrets_issued.load(Ordering::SeqCst)
    }
}

pub fn node(name: &str, address: &str) -> LocalNode {
    LocalNode::new(name, ENV, address)
}

/// Two fresh nodes: db1 at 10.0.0.1, db2 at 10.0.0.2.
pub fn pair() -> [LocalNode; 2] {
    [node("db1", "10.0.0.1"), node("db2", "10.0.0.2")]
}

/// Names of the nodes holding `role`.
pub fn holders(nodes: &[LocalNode], role: RoleMarker) -> Vec<String> {
    nodes
        .iter()
        .filter(|n| n.role() == Some(role))
        .map(|n| n.name().to_string())
        .collect()
}
