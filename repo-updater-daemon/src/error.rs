use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the scheduler and the daemon runtime.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(#[from] repo_updater_core::ConfigError),

    #[error("registry error: {0}")]
    Registry(#[from] repo_updater_sync::RegistryError),

    #[error("daemon runtime error: {0}")]
    Runtime(String),

    /// The shutdown signal fired; the scheduler loop has stopped.
    #[error("scheduler cancelled")]
    Cancelled,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
