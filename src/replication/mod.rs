//! Replication Configuration
//!
//! Everything that touches a database instance:
//! - Structured statements and their SQL rendering
//! - The executor seam and its two implementations (the `mysql` client and
//!   an in-process simulation)
//! - The configurator that creates the replication principal and attaches
//!   replicas
//!
//! The core never builds SQL text itself and never reads the directory
//! from here.

mod configurator;
mod errors;
mod executor;
mod mysql_client;
mod simulated;
mod statement;

pub use configurator::{AttachRequest, ReplicationConfigurator, DEFAULT_REPLICATION_USER};
pub use errors::{DatabaseError, DatabaseResult};
pub use executor::{Credentials, DatabaseExecutor, ReplicaStatus, Row};
pub use mysql_client::{parse_batch_output, MysqlClientExecutor};
pub use simulated::{ExecutedStatement, SimulatedDatabase};
pub use statement::{quote_literal, split_host_port, Statement, ANY_HOST};
