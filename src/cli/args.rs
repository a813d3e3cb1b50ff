//! CLI argument definitions using clap
//!
//! Commands:
//! - markbook init --config <path>
//! - markbook reconcile --config <path>
//! - markbook dedupe --config <path> --student <id> --exam <id>
//! - markbook validate --config <path>
//! - markbook resolve --config <path> <query>
//! - markbook snapshots --config <path>
//! - markbook export-discards --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// markbook - A strict, recoverable score-tracking engine
#[derive(Parser, Debug)]
#[command(name = "markbook")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize a data directory with empty collections
    Init {
        /// Path to configuration file
        #[arg(long, default_value = "./markbook.json")]
        config: PathBuf,
    },

    /// Recover marks lost between snapshots
    Reconcile {
        /// Path to configuration file
        #[arg(long, default_value = "./markbook.json")]
        config: PathBuf,
    },

    /// Deduplicate live marks for one (student, exam) key, or clean a
    /// student's legacy placement marks when no exam is given
    Dedupe {
        /// Path to configuration file
        #[arg(long, default_value = "./markbook.json")]
        config: PathBuf,

        /// Student id of the contested key
        #[arg(long)]
        student: String,

        /// Exam id of the contested key
        #[arg(long)]
        exam: Option<String>,
    },

    /// Audit the live collection against the roster
    Validate {
        /// Path to configuration file
        #[arg(long, default_value = "./markbook.json")]
        config: PathBuf,
    },

    /// Rank roster candidates for a free-text name
    Resolve {
        /// Path to configuration file
        #[arg(long, default_value = "./markbook.json")]
        config: PathBuf,

        /// The name to resolve
        query: String,
    },

    /// List archived snapshots, oldest first
    Snapshots {
        /// Path to configuration file
        #[arg(long, default_value = "./markbook.json")]
        config: PathBuf,
    },

    /// Export the discard set to a tar archive
    ExportDiscards {
        /// Path to configuration file
        #[arg(long, default_value = "./markbook.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
