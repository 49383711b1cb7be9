//! Simulated database instances
//!
//! An in-process [`DatabaseExecutor`] that models just enough of a MySQL
//! server to exercise the bootstrap protocol: users with passwords, the
//! replication grant, replica configuration and thread state. Starting a
//! replica authenticates against the upstream instance with the configured
//! principal, so a mismatched secret fails the same way a real server does.
//!
//! A successful start replays the upstream's principals into the replica,
//! mirroring replay of the upstream log from its first file.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::errors::{DatabaseError, DatabaseResult};
use super::executor::{Credentials, DatabaseExecutor, Row};
use super::statement::Statement;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Upstream {
    address: String,
    user: String,
    password: String,
    log_file: String,
    log_position: u64,
}

#[derive(Debug, Default, Clone)]
struct Instance {
    /// user -> password
    users: BTreeMap<String, String>,
    /// users holding the replication privilege
    grants: BTreeSet<String>,
    upstream: Option<Upstream>,
    io_running: bool,
    sql_running: bool,
    last_io_error: Option<String>,
}

/// One executed statement, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedStatement {
    pub address: String,
    pub statement: Statement,
}

#[derive(Debug, Default)]
struct SimulatedState {
    instances: BTreeMap<String, Instance>,
    unreachable: HashSet<String>,
    refuse_start: HashSet<String>,
    executed: Vec<ExecutedStatement>,
}

/// A set of simulated database instances keyed by address.
#[derive(Debug, Default)]
pub struct SimulatedDatabase {
    state: Mutex<SimulatedState>,
}

fn upstream_address(host: &str, port: Option<u16>) -> String {
    match port {
        Some(port) if host.contains(':') => format!("[{}]:{}", host, port),
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

impl SimulatedDatabase {
    /// Create an empty simulation. Instances come into existence on first
    /// contact.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SimulatedState> {
        // Plain data, safe to read after a panic elsewhere.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make an instance reachable or unreachable.
    pub fn set_reachable(&self, address: &str, reachable: bool) {
        let mut state = self.lock();
        if reachable {
            state.unreachable.remove(address);
        } else {
            state.unreachable.insert(address.to_string());
        }
    }

    /// Make `START SLAVE` on `address` leave the SQL thread stopped.
    pub fn refuse_replica_start(&self, address: &str, refuse: bool) {
        let mut state = self.lock();
        if refuse {
            state.refuse_start.insert(address.to_string());
        } else {
            state.refuse_start.remove(address);
        }
    }

    /// Stop the replica threads on `address`, as an operator would.
    pub fn stop_replica(&self, address: &str) {
        let mut state = self.lock();
        if let Some(instance) = state.instances.get_mut(address) {
            instance.io_running = false;
            instance.sql_running = false;
        }
    }

    /// Every statement that reached an instance.
    pub fn statements(&self) -> Vec<ExecutedStatement> {
        self.lock().executed.clone()
    }

    /// Statements that reached `address`.
    pub fn statements_for(&self, address: &str) -> Vec<Statement> {
        self.lock()
            .executed
            .iter()
            .filter(|e| e.address == address)
            .map(|e| e.statement.clone())
            .collect()
    }

    /// Mutating statements that reached `address`.
    pub fn mutation_count(&self, address: &str) -> usize {
        self.lock()
            .executed
            .iter()
            .filter(|e| e.address == address && e.statement.is_mutation())
            .count()
    }

    /// Mutating statements across all instances.
    pub fn total_mutations(&self) -> usize {
        self.lock()
            .executed
            .iter()
            .filter(|e| e.statement.is_mutation())
            .count()
    }

    /// Whether `address` has `user` with `password` and the replication grant.
    pub fn has_replication_user(&self, address: &str, user: &str, password: &str) -> bool {
        let state = self.lock();
        state.instances.get(address).map_or(false, |i| {
            i.users.get(user).map(String::as_str) == Some(password) && i.grants.contains(user)
        })
    }

    /// Upstream address configured on `address`.
    pub fn upstream_of(&self, address: &str) -> Option<String> {
        let state = self.lock();
        state
            .instances
            .get(address)
            .and_then(|i| i.upstream.as_ref())
            .map(|u| u.address.clone())
    }

    /// Log coordinates the replica on `address` started from.
    pub fn upstream_coordinates(&self, address: &str) -> Option<(String, u64)> {
        let state = self.lock();
        state
            .instances
            .get(address)
            .and_then(|i| i.upstream.as_ref())
            .map(|u| (u.log_file.clone(), u.log_position))
    }

    /// Whether both replica threads run on `address`.
    pub fn is_running(&self, address: &str) -> bool {
        let state = self.lock();
        state
            .instances
            .get(address)
            .map_or(false, |i| i.io_running && i.sql_running)
    }

    fn start_replica(state: &mut SimulatedState, address: &str) -> DatabaseResult<()> {
        let upstream = state
            .instances
            .get(address)
            .and_then(|i| i.upstream.clone())
            .ok_or_else(|| {
                DatabaseError::Statement(
                    "ERROR 1200: The server is not configured as slave".to_string(),
                )
            })?;

        if state.refuse_start.contains(address) {
            let instance = state.instances.entry(address.to_string()).or_default();
            instance.io_running = true;
            instance.sql_running = false;
            instance.last_io_error = None;
            return Ok(());
        }

        let link_error = if state.unreachable.contains(&upstream.address) {
            Some(format!(
                "error connecting to master '{}@{}'",
                upstream.user, upstream.address
            ))
        } else {
            match state.instances.get(&upstream.address) {
                Some(peer)
                    if peer.users.get(&upstream.user) == Some(&upstream.password)
                        && peer.grants.contains(&upstream.user) =>
                {
                    None
                }
                _ => Some(format!(
                    "Access denied for user '{}'@'{}'",
                    upstream.user, address
                )),
            }
        };

        let replayed = match (&link_error, state.instances.get(&upstream.address)) {
            (None, Some(peer)) => Some((peer.users.clone(), peer.grants.clone())),
            _ => None,
        };

        let instance = state.instances.entry(address.to_string()).or_default();
        instance.sql_running = true;
        match link_error {
            Some(error) => {
                instance.io_running = false;
                instance.last_io_error = Some(error);
            }
            None => {
                instance.io_running = true;
                instance.last_io_error = None;
            }
        }
        if let Some((users, grants)) = replayed {
            instance.users.extend(users);
            instance.grants.extend(grants);
        }
        Ok(())
    }

    fn status_rows(instance: Option<&Instance>) -> Vec<Row> {
        let instance = match instance {
            Some(i) => i,
            None => return Vec::new(),
        };
        let upstream = match &instance.upstream {
            Some(u) => u,
            None => return Vec::new(),
        };

        let yes_no = |b: bool| if b { "Yes" } else { "No" };
        let io_state = match (&instance.last_io_error, instance.io_running) {
            (Some(_), _) => "Connecting",
            (None, running) => yes_no(running),
        };

        let mut row = Row::new();
        row.insert("Master_Host".into(), upstream.address.clone());
        row.insert("Master_User".into(), upstream.user.clone());
        row.insert("Master_Log_File".into(), upstream.log_file.clone());
        row.insert("Slave_IO_Running".into(), io_state.to_string());
        row.insert(
            "Slave_SQL_Running".into(),
            yes_no(instance.sql_running).to_string(),
        );
        row.insert(
            "Last_IO_Error".into(),
            instance.last_io_error.clone().unwrap_or_default(),
        );
        vec![row]
    }
}

impl DatabaseExecutor for SimulatedDatabase {
    fn execute(
        &self,
        address: &str,
        _credentials: &Credentials,
        statement: &Statement,
    ) -> DatabaseResult<Vec<Row>> {
        let mut state = self.lock();
        if state.unreachable.contains(address) {
            return Err(DatabaseError::connection(
                address,
                "Can't connect to MySQL server (111)",
            ));
        }

        state.executed.push(ExecutedStatement {
            address: address.to_string(),
            statement: statement.clone(),
        });

        match statement {
            Statement::CreateReplicationUser { user, password, .. } => {
                let instance = state.instances.entry(address.to_string()).or_default();
                instance
                    .users
                    .entry(user.clone())
                    .or_insert_with(|| password.clone());
                Ok(Vec::new())
            }
            Statement::SetReplicationPassword { user, password, .. } => {
                let instance = state.instances.entry(address.to_string()).or_default();
                match instance.users.get_mut(user) {
                    Some(stored) => {
                        *stored = password.clone();
                        Ok(Vec::new())
                    }
                    None => Err(DatabaseError::Statement(format!(
                        "ERROR 1396: Operation ALTER USER failed for '{}'",
                        user
                    ))),
                }
            }
            Statement::GrantReplication { user, .. } => {
                let instance = state.instances.entry(address.to_string()).or_default();
                if !instance.users.contains_key(user) {
                    return Err(DatabaseError::Statement(format!(
                        "ERROR 1410: You are not allowed to create a user with GRANT ('{}')",
                        user
                    )));
                }
                instance.grants.insert(user.clone());
                Ok(Vec::new())
            }
            Statement::StopReplica => {
                let instance = state.instances.entry(address.to_string()).or_default();
                instance.io_running = false;
                instance.sql_running = false;
                Ok(Vec::new())
            }
            Statement::ChangeMaster {
                host,
                port,
                user,
                password,
                log_file,
                log_position,
            } => {
                let instance = state.instances.entry(address.to_string()).or_default();
                if instance.io_running || instance.sql_running {
                    return Err(DatabaseError::Statement(
                        "ERROR 1198: This operation cannot be performed with a running slave"
                            .to_string(),
                    ));
                }
                instance.upstream = Some(Upstream {
                    address: upstream_address(host, *port),
                    user: user.clone(),
                    password: password.clone(),
                    log_file: log_file.clone(),
                    log_position: *log_position,
                });
                instance.last_io_error = None;
                Ok(Vec::new())
            }
            Statement::StartReplica => {
                Self::start_replica(&mut state, address)?;
                Ok(Vec::new())
            }
            Statement::ShowReplicaStatus => Ok(Self::status_rows(state.instances.get(address))),
        }
    }
}
