//! CLI command definitions for the `fvisit` binary.
//!
//! Uses clap derive macros for argument parsing. Draft operations live under
//! `fvisit draft <action>`.

pub mod draft;
pub mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Inspect and operate the field-visit draft store.
#[derive(Parser)]
#[command(name = "fvisit", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all log output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for engine debug logs, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    /// Data directory holding fieldvisit.db and config.toml.
    #[arg(long, env = "FIELDVISIT_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage drafts (show, list, save, merge, attach, delete, sweep, replay, finalize).
    Draft {
        #[command(subcommand)]
        action: draft::DraftCommand,
    },

    /// Draft store status dashboard.
    Status,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}
