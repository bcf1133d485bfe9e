//! repo-updater: keep a repository catalog in step with its origins.
//!
//! # Usage
//!
//! ```text
//! repo-updater init [--interval <secs>]
//! repo-updater sync [--json]
//! repo-updater diff [--json]
//! repo-updater status [--json]
//! repo-updater daemon start
//! ```

mod commands;
mod report;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonCommand, diff::DiffArgs, init::InitArgs, status::StatusArgs, sync::SyncArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "repo-updater",
    version,
    about = "Reconcile a repository catalog against its source inventories",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default config to ~/.repo-updater/config.yaml.
    Init(InitArgs),

    /// Run one reconciliation cycle and commit it.
    Sync(SyncArgs),

    /// Show what a cycle would change, without writing anything.
    Diff(DiffArgs),

    /// Show catalog counts per origin.
    Status(StatusArgs),

    /// Run the periodic reconciliation daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Sync(args) => args.run(),
        Commands::Diff(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
