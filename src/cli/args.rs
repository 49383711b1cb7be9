//! CLI argument definitions using clap
//!
//! Commands:
//! - dualmaster reconcile --config <path>
//! - dualmaster status --config <path>
//! - dualmaster simulate [--environment <name>] [--development]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// dualmaster - self-electing two-node master-master replication bootstrap
#[derive(Parser, Debug)]
#[command(name = "dualmaster")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Only log warnings and errors
    #[arg(long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one reconciliation pass for this node
    Reconcile {
        /// Path to configuration file
        #[arg(long, default_value = "./dualmaster.json")]
        config: PathBuf,
    },

    /// Show this node's role and the pair as seen in the directory
    Status {
        /// Path to configuration file
        #[arg(long, default_value = "./dualmaster.json")]
        config: PathBuf,
    },

    /// Bootstrap two in-process nodes against simulated databases
    Simulate {
        /// Environment name for the simulated pair
        #[arg(long, default_value = "simulation")]
        environment: String,

        /// Use the fixed development replication secret
        #[arg(long)]
        development: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
