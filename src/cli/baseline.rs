//! Baseline subcommands.

use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum BaselineCommand {
    /// Freeze the latest snapshots of a target into a named baseline
    Create {
        /// Unique baseline name (case-insensitive)
        #[arg(long)]
        name: String,

        /// Source tenant code or id
        #[arg(long)]
        tenant: String,

        /// Source environment
        #[arg(long)]
        env: String,

        /// Optional description
        #[arg(long)]
        description: Option<String>,

        /// Recorded as the baseline's creator
        #[arg(long)]
        user: Option<String>,
    },

    /// List all baselines
    List,

    /// Show one baseline and its objects
    Show {
        /// Baseline id
        id: i64,
    },

    /// Delete a baseline and its content
    Delete {
        /// Baseline id
        id: i64,
    },

    /// Compare a baseline against the live state of its source target
    Compare {
        /// Baseline id
        id: i64,
    },

    /// Render the sync script that would restore a target to a baseline
    Script {
        /// Baseline id
        id: i64,
    },
}
