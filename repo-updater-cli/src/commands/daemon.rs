//! `repo-updater daemon`: periodic reconciliation in the foreground.

use anyhow::{Context, Result};
use clap::Subcommand;

use repo_updater_daemon::start_blocking;

use super::home_dir;

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the scheduler in the foreground until ctrl-c.
    Start,
}

pub fn run(command: DaemonCommand) -> Result<()> {
    let home = home_dir()?;

    match command {
        DaemonCommand::Start => {
            start_blocking(&home).context("daemon exited with error")?;
        }
    }

    Ok(())
}
