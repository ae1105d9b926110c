//! backup — one-way folder mirroring with per-category consent.
//!
//! # Usage
//!
//! ```text
//! backup sync [--config <path>] [--yes] [--dry-run] [--json] [--log-file <path>]
//! backup plan [--config <path>] [--json]
//! ```

mod commands;
mod logging;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{plan::PlanArgs, sync::SyncArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "backup",
    version,
    about = "Mirror a source folder into a backup folder",
    long_about = None,
)]
struct Cli {
    /// Also write debug logs to this file (rotated at 10 MiB).
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy new and modified entries, delete stale ones, asking first.
    Sync(SyncArgs),

    /// Print the actions a sync would take, without changing anything.
    Plan(PlanArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_file.as_deref())?;
    match cli.command {
        Commands::Sync(args) => args.run(),
        Commands::Plan(args) => args.run(),
    }
}
