//! CLI command implementations
//!
//! - reconcile: one pass against the file directory and the local server
//! - status: the node's saved state and the pair as the directory shows it
//! - simulate: two in-process nodes against simulated servers
//!
//! Commands are one-shot. Repeated invocation (cron, a config-management
//! run) is what drives a node to completion.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::credentials::{CredentialVault, OsSecretGenerator};
use crate::directory::{FileDirectory, MemoryDirectory, NodeRecord, PeerDirectory, RoleMarker};
use crate::node::{LocalNode, NodeStateStore, DEFAULT_LOG_BASE_NAME};
use crate::observability::{Logger, MetricsRegistry, Severity};
use crate::provision::{CommandInstaller, NoopInstaller, PackageInstaller};
use crate::reconciler::{ReconcileReport, TopologyReconciler};
use crate::replication::{
    Credentials, DatabaseExecutor, MysqlClientExecutor, SimulatedDatabase,
    DEFAULT_REPLICATION_USER,
};

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::write_response;

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root of the shared peer directory (required)
    pub directory_root: String,

    /// Node name, unique within the environment (required)
    pub node_name: String,

    /// Environment the pair belongs to (required)
    pub environment: String,

    /// Address peers use to reach this node's server (required)
    pub address: String,

    /// Where the node's role and secret are kept between runs
    #[serde(default = "default_state_dir")]
    pub state_dir: String,

    /// Binary log base name (optional, default "mysql-bin")
    #[serde(default = "default_log_base_name")]
    pub log_base_name: String,

    /// Replication principal (optional, default "repl")
    #[serde(default = "default_replication_user")]
    pub replication_user: String,

    /// Use the fixed development secret instead of a random one
    #[serde(default)]
    pub development_mode: bool,

    /// Administrative user on the local server (optional, default "root")
    #[serde(default = "default_root_user")]
    pub root_user: String,

    /// Administrative password on the local server (optional, default empty)
    #[serde(default)]
    pub root_password: String,

    /// Path of the mysql client binary (optional, default "mysql")
    #[serde(default = "default_mysql_bin")]
    pub mysql_bin: String,

    /// Installer command run before the server is used; unset skips provisioning
    #[serde(default)]
    pub install_command: Option<Vec<String>>,
}

fn default_state_dir() -> String {
    "/var/lib/dualmaster".to_string()
}
fn default_log_base_name() -> String {
    DEFAULT_LOG_BASE_NAME.to_string()
}
fn default_replication_user() -> String {
    DEFAULT_REPLICATION_USER.to_string()
}
fn default_root_user() -> String {
    "root".to_string()
}
fn default_mysql_bin() -> String {
    "mysql".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config: {}", e)))?;

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> CliResult<()> {
        if self.directory_root.trim().is_empty() {
            return Err(CliError::config_error("directory_root must not be empty"));
        }
        if self.state_dir.trim().is_empty() {
            return Err(CliError::config_error("state_dir must not be empty"));
        }
        if self.mysql_bin.trim().is_empty() {
            return Err(CliError::config_error("mysql_bin must not be empty"));
        }
        if let Some(argv) = &self.install_command {
            if argv.is_empty() {
                return Err(CliError::config_error(
                    "install_command must name a program when set",
                ));
            }
        }

        self.to_local_node()
            .validate()
            .map_err(|e| CliError::config_error(format!("Node config error: {}", e.message)))
    }

    /// Undecided node built from this configuration.
    pub fn to_local_node(&self) -> LocalNode {
        LocalNode::new(&self.node_name, &self.environment, &self.address)
            .with_log_base_name(&self.log_base_name)
            .with_replication_user(&self.replication_user)
            .with_development_mode(self.development_mode)
            .with_root_credentials(Credentials::new(&self.root_user, &self.root_password))
    }

    pub fn state_store(&self) -> NodeStateStore {
        NodeStateStore::new(&self.state_dir)
    }

    fn installer(&self) -> CliResult<Arc<dyn PackageInstaller>> {
        match &self.install_command {
            Some(argv) => Ok(Arc::new(CommandInstaller::new(argv.clone())?)),
            None => Ok(Arc::new(NoopInstaller)),
        }
    }
}

/// Main CLI entry point
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    if cli.quiet {
        Logger::set_min_severity(Severity::Warn);
    }
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Reconcile { config } => reconcile(&config),
        Command::Status { config } => status(&config),
        Command::Simulate {
            environment,
            development,
        } => simulate(&environment, development),
    }
}

/// Run one reconciliation pass for the configured node
pub fn reconcile(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let executor = Arc::new(MysqlClientExecutor::new(&config.mysql_bin));

    let report = reconcile_node(&config, executor)?;
    write_response(serde_json::to_value(&report)?)
}

/// One pass with the node state loaded from and saved back to `state_dir`.
///
/// State is saved even when the pass fails: a First may already hold its
/// secret without having published its marker.
pub fn reconcile_node(
    config: &Config,
    executor: Arc<dyn DatabaseExecutor>,
) -> CliResult<ReconcileReport> {
    let mut node = config.to_local_node();
    let store = config.state_store();
    if let Some(state) = store.load(node.environment(), node.name())? {
        node.restore_state(&state)?;
    }

    let directory = Arc::new(FileDirectory::new(&config.directory_root));
    let reconciler = TopologyReconciler::new(
        directory,
        executor,
        config.installer()?,
        CredentialVault::default(),
    );

    let result = reconciler.reconcile(&mut node);
    let saved = store.save(&node.state());

    let report = result?;
    saved?;
    Ok(report)
}

/// Show the node's saved state and the pair as seen in the directory
pub fn status(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    write_response(status_value(&config)?)
}

fn status_value(config: &Config) -> CliResult<Value> {
    let saved = config
        .state_store()
        .load(&config.environment, &config.node_name)?;
    let directory = FileDirectory::new(&config.directory_root);

    let published = directory.find_node(&config.environment, &config.node_name)?;
    let firsts = directory.find_by_role_marker(&config.environment, RoleMarker::First)?;
    let seconds = directory.find_by_role_marker(&config.environment, RoleMarker::Second)?;

    Ok(json!({
        "node": config.node_name,
        "environment": config.environment,
        "local_role": saved.as_ref().and_then(|s| s.role),
        "holds_secret": saved.as_ref().map_or(false, |s| s.replication_secret.is_some()),
        "published_role": published.map(|r| r.role_marker),
        "first": firsts.iter().map(peer_summary).collect::<Vec<_>>(),
        "second": seconds.iter().map(peer_summary).collect::<Vec<_>>(),
        "conflict": firsts.len() > 1 || seconds.len() > 1,
    }))
}

/// Directory record without its secret.
fn peer_summary(record: &NodeRecord) -> Value {
    json!({
        "name": record.name,
        "address": record.address,
        "log_file": record.log_coordinates.log_file(),
        "published_at": record.published_at,
    })
}

/// Bootstrap a simulated pair and print every pass
pub fn simulate(environment: &str, development: bool) -> CliResult<()> {
    write_response(simulate_value(environment, development)?)
}

fn simulate_value(environment: &str, development: bool) -> CliResult<Value> {
    let directory = Arc::new(MemoryDirectory::new());
    let db = Arc::new(SimulatedDatabase::new());
    let metrics = Arc::new(MetricsRegistry::new());
    let reconciler = TopologyReconciler::new(
        directory,
        db.clone(),
        Arc::new(NoopInstaller),
        CredentialVault::new(Box::new(OsSecretGenerator)),
    )
    .with_metrics(metrics.clone());

    let mut nodes = [
        LocalNode::new("db1", environment, "10.0.0.1").with_development_mode(development),
        LocalNode::new("db2", environment, "10.0.0.2").with_development_mode(development),
    ];

    // First claims, Second joins, First closes the loop, then both settle.
    let schedule = [0usize, 1, 0, 0, 1];
    let mut passes = Vec::with_capacity(schedule.len());
    for index in schedule {
        let report = reconciler.reconcile(&mut nodes[index])?;
        passes.push(serde_json::to_value(&report)?);
    }

    let topology: Vec<Value> = nodes
        .iter()
        .map(|node| {
            json!({
                "node": node.name(),
                "role": node.role(),
                "upstream": db.upstream_of(node.address()),
                "replica_running": db.is_running(node.address()),
            })
        })
        .collect();

    Ok(json!({
        "passes": passes,
        "topology": topology,
        "metrics": metrics.snapshot(),
    }))
}
