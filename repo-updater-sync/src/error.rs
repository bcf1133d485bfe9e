//! Error types for repo-updater-sync.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use repo_updater_core::OriginName;

/// Why a single source could not produce its snapshot.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse inventory at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The origin answered but refused or failed the listing.
    #[error("origin unavailable: {0}")]
    Unavailable(String),

    /// The fetch task died before reporting (panic or cancellation).
    #[error("fetch task failed: {0}")]
    Task(String),
}

/// A [`FetchError`] attributed to the origin it came from.
#[derive(Debug, Error)]
#[error("{origin}: {source}")]
pub struct SourceError {
    pub origin: OriginName,
    #[source]
    pub source: FetchError,
}

/// Every per-origin failure of one sourcing round.
///
/// Non-fatal: the cycle continues with whatever the healthy sources returned.
#[derive(Debug, Default)]
pub struct SourceErrors(Vec<SourceError>);

impl SourceErrors {
    pub fn push(&mut self, err: SourceError) {
        self.0.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceError> {
        self.0.iter()
    }

    /// Origins that failed, sorted.
    pub fn origins(&self) -> Vec<OriginName> {
        let mut origins: Vec<OriginName> = self.0.iter().map(|e| e.origin.clone()).collect();
        origins.sort();
        origins.dedup();
        origins
    }
}

impl fmt::Display for SourceErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} source(s) failed", self.0.len())?;
        for err in &self.0 {
            write!(f, "; {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for SourceErrors {}

/// Errors from a catalog store or transaction.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("catalog JSON error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Backend-reported failure (also used for injected test failures).
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Source registration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("origin name is invalid: '{0}'")]
    InvalidOrigin(String),

    #[error("origin already registered: {0}")]
    DuplicateOrigin(OriginName),
}

/// All errors that abort a reconciliation cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to begin transaction: {0}")]
    Begin(#[source] StoreError),

    #[error("failed to list stored repositories: {0}")]
    List(#[source] StoreError),

    #[error("failed to upsert repositories: {0}")]
    Upsert(#[source] StoreError),

    #[error("failed to finalize transaction: {0}")]
    Finalize(#[source] StoreError),

    /// Raised after a successful commit; the writes stand.
    #[error("failed to publish diff: {0}")]
    Publish(String),
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
