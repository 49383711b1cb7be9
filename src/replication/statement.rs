//! Replication control statements
//!
//! The core only ever builds structured statements. Rendering to SQL text
//! happens here, with every string argument passed through
//! [`quote_literal`], so a password or host name can never change the
//! shape of a statement.

use std::fmt;

/// Host pattern for the replication principal: reachable from any host.
pub const ANY_HOST: &str = "%";

/// A statement issued against a database instance.
#[derive(Clone, PartialEq, Eq)]
pub enum Statement {
    /// Create the replication principal if it does not exist yet
    CreateReplicationUser {
        user: String,
        host: String,
        password: String,
    },

    /// Set the replication principal's password
    SetReplicationPassword {
        user: String,
        host: String,
        password: String,
    },

    /// Grant the replication privilege, and nothing else
    GrantReplication { user: String, host: String },

    /// Stop the replica threads
    StopReplica,

    /// Point replication at an upstream server
    ChangeMaster {
        host: String,
        port: Option<u16>,
        user: String,
        password: String,
        log_file: String,
        log_position: u64,
    },

    /// Start the replica threads
    StartReplica,

    /// Inspect replica thread state
    ShowReplicaStatus,
}

impl Statement {
    /// Short statement name for logs. Never includes arguments.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateReplicationUser { .. } => "CREATE_REPLICATION_USER",
            Self::SetReplicationPassword { .. } => "SET_REPLICATION_PASSWORD",
            Self::GrantReplication { .. } => "GRANT_REPLICATION",
            Self::StopReplica => "STOP_REPLICA",
            Self::ChangeMaster { .. } => "CHANGE_MASTER",
            Self::StartReplica => "START_REPLICA",
            Self::ShowReplicaStatus => "SHOW_REPLICA_STATUS",
        }
    }

    /// Whether executing the statement changes server state.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::ShowReplicaStatus)
    }

    /// Render as SQL text.
    pub fn render(&self) -> String {
        match self {
            Self::CreateReplicationUser {
                user,
                host,
                password,
            } => format!(
                "CREATE USER IF NOT EXISTS {}@{} IDENTIFIED BY {}",
                quote_literal(user),
                quote_literal(host),
                quote_literal(password)
            ),
            Self::SetReplicationPassword {
                user,
                host,
                password,
            } => format!(
                "ALTER USER {}@{} IDENTIFIED BY {}",
                quote_literal(user),
                quote_literal(host),
                quote_literal(password)
            ),
            Self::GrantReplication { user, host } => format!(
                "GRANT REPLICATION SLAVE ON *.* TO {}@{}",
                quote_literal(user),
                quote_literal(host)
            ),
            Self::StopReplica => "STOP SLAVE".to_string(),
            Self::ChangeMaster {
                host,
                port,
                user,
                password,
                log_file,
                log_position,
            } => {
                let mut sql = format!("CHANGE MASTER TO MASTER_HOST={}", quote_literal(host));
                if let Some(port) = port {
                    sql.push_str(&format!(", MASTER_PORT={}", port));
                }
                sql.push_str(&format!(
                    ", MASTER_USER={}, MASTER_PASSWORD={}, MASTER_LOG_FILE={}, MASTER_LOG_POS={}",
                    quote_literal(user),
                    quote_literal(password),
                    quote_literal(log_file),
                    log_position
                ));
                sql
            }
            Self::StartReplica => "START SLAVE".to_string(),
            Self::ShowReplicaStatus => "SHOW SLAVE STATUS".to_string(),
        }
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateReplicationUser { user, host, .. }
            | Self::SetReplicationPassword { user, host, .. } => f
                .debug_struct(self.name())
                .field("user", user)
                .field("host", host)
                .field("password", &"<redacted>")
                .finish(),
            Self::GrantReplication { user, host } => f
                .debug_struct(self.name())
                .field("user", user)
                .field("host", host)
                .finish(),
            Self::ChangeMaster {
                host,
                port,
                user,
                log_file,
                log_position,
                ..
            } => f
                .debug_struct(self.name())
                .field("host", host)
                .field("port", port)
                .field("user", user)
                .field("password", &"<redacted>")
                .field("log_file", log_file)
                .field("log_position", log_position)
                .finish(),
            _ => f.write_str(self.name()),
        }
    }
}

/// Quote a string as a single-quoted SQL literal.
pub fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x1a' => out.push_str("\\Z"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Split `host:port` into its parts. Bare hosts and IPv6 literals without
/// brackets are returned unchanged with no port.
pub fn split_host_port(address: &str) -> (String, Option<u16>) {
    if let Some(rest) = address.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail.strip_prefix(':').and_then(|p| p.parse().ok());
            return (host.to_string(), port);
        }
    }

    match address.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => match port.parse() {
            Ok(port) => (host.to_string(), Some(port)),
            Err(_) => (address.to_string(), None),
        },
        _ => (address.to_string(), None),
    }
}
