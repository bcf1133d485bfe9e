//! `repo-updater init [--interval <secs>]`

use anyhow::{Context, Result};
use clap::Args;

use repo_updater_core::config::{self, DEFAULT_INTERVAL_SECS};

use super::home_dir;

/// Write a default config (kept as-is if one already exists).
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Seconds between reconciliation cycles in daemon mode.
    #[arg(long, default_value_t = DEFAULT_INTERVAL_SECS)]
    pub interval: u64,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let existed = config::config_path_at(&home).exists();
        let config = config::init_at(&home, self.interval).context("failed to write config")?;

        let path = config::config_path_at(&home);
        if existed {
            println!("✓ Config already present at {}", path.display());
        } else {
            println!("✓ Wrote config to {}", path.display());
        }
        println!(
            "  interval: {}s | sources: {} | catalog: {}",
            config.interval_secs,
            config.sources.len(),
            config.catalog_path(&home).display()
        );
        Ok(())
    }
}
