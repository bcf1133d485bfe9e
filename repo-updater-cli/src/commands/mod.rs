pub mod daemon;
pub mod diff;
pub mod init;
pub mod status;
pub mod sync;

use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use repo_updater_core::{config, UpdaterConfig};
use repo_updater_sync::Reconciler;

pub(crate) fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

pub(crate) fn load_config(home: &Path) -> Result<UpdaterConfig> {
    config::load_at(home).context("failed to load config")
}

pub(crate) fn load_reconciler(home: &Path) -> Result<Reconciler> {
    let config = load_config(home)?;
    repo_updater_daemon::build_reconciler(home, &config).context("invalid source configuration")
}

/// Drive one async operation to completion on a single-threaded runtime.
pub(crate) fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    Ok(runtime.block_on(future))
}
