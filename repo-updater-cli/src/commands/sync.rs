//! `repo-updater sync`: run one reconciliation cycle.

use anyhow::{Context, Result};
use clap::Args;

use super::{block_on, home_dir, load_reconciler};
use crate::report;

/// Arguments for `repo-updater sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let reconciler = load_reconciler(&home)?;
        if reconciler.sources().is_empty() {
            println!("No sources configured. Add them under `sources:` in ~/.repo-updater/config.yaml.");
            return Ok(());
        }

        let report = block_on(reconciler.sync())?.context("reconciliation cycle failed")?;
        report::print(&report, false, self.json)
    }
}
