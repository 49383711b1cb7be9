//! CLI module for dualmaster
//!
//! Provides command-line interface for:
//! - reconcile: Run one bootstrap pass for this node
//! - status: Show the node's role and the pair in the directory
//! - simulate: Bootstrap an in-process pair against simulated servers

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{reconcile, reconcile_node, run, run_command, simulate, status, Config};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::write_response;
