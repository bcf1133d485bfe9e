//! `repo-updater diff`: dry-run a cycle (source, list and diff, no writes).

use anyhow::{Context, Result};
use clap::Args;

use super::{block_on, home_dir, load_reconciler};
use crate::report;

/// Arguments for `repo-updater diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl DiffArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let reconciler = load_reconciler(&home)?;

        let plan = block_on(reconciler.plan())?.context("failed to compute diff")?;
        report::print(&plan, true, self.json)
    }
}
