//! Command-line interface.

mod baseline;
mod commands;

pub use baseline::BaselineCommand;
pub use commands::run;

use clap::{Parser, Subcommand, ValueEnum};

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "modwatch",
    about = "Snapshot and change engine for programmable database objects",
    version
)]
pub struct Cli {
    /// Path to the settings file
    #[arg(long, default_value = "modwatch.toml", global = true)]
    pub config: String,

    /// Output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scheduler and queue worker until interrupted
    Serve,

    /// Run a scan now
    Scan {
        /// Tenant code or id; omit to scan every tenant
        #[arg(long)]
        tenant: Option<String>,

        /// Environment (development|staging|production); omit for all
        #[arg(long)]
        env: Option<String>,

        /// Ignore the tracked-object filter and scan everything
        #[arg(long)]
        all: bool,

        /// Recorded as the scan's initiator
        #[arg(long)]
        user: Option<String>,
    },

    /// Compare the latest snapshots of two targets
    Compare {
        /// Source tenant code or id
        #[arg(long)]
        source_tenant: String,

        /// Source environment
        #[arg(long)]
        source_env: String,

        /// Target tenant code or id
        #[arg(long)]
        target_tenant: String,

        /// Target environment
        #[arg(long)]
        target_env: String,

        /// Restrict to one object kind code (P|V|FN|TF|IF)
        #[arg(long)]
        kind: Option<String>,

        /// Refresh both targets with a Compare-trigger scan first
        #[arg(long)]
        refresh: bool,
    },

    /// Line diff between two snapshot definitions
    Diff {
        /// Source snapshot id
        snapshot_a: i64,

        /// Target snapshot id
        snapshot_b: i64,
    },

    /// Fetch one object's live definition straight from a target
    Fetch {
        /// Tenant code or id
        #[arg(long)]
        tenant: String,

        /// Environment
        #[arg(long)]
        env: String,

        /// Object full name (schema.name)
        name: String,
    },

    /// Manage frozen baselines
    Baseline {
        #[command(subcommand)]
        command: BaselineCommand,
    },

    /// Recent scan logs and their entries
    History {
        /// Number of scan logs to show
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },

    /// Recently detected changes
    Changes {
        /// Number of changes to show
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
}
