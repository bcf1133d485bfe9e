//! JSON catalog store.
//!
//! Persists one [`Catalog`] document at a configured path. Writes use the
//! atomic `.tmp` + rename pattern so a crash never leaves a torn catalog.
//! A single async lock serializes access; a transaction holds it from
//! `transact` until `done`, so no other writer interleaves with a cycle.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use repo_updater_core::{OriginName, Repo};

use super::{Catalog, Store, Transactor, TxStore};
use crate::error::{io_err, StoreError, SyncError};

/// File-backed catalog.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    path: PathBuf,
    lock: Arc<AsyncMutex<()>>,
}

impl CatalogStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(AsyncMutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The whole catalog, every origin included.
    pub async fn load(&self) -> Result<Catalog, StoreError> {
        let _guard = self.lock.lock().await;
        load_at(&self.path).await
    }
}

#[async_trait]
impl Store for CatalogStore {
    async fn list_repos(&self, origins: &[OriginName]) -> Result<Vec<Repo>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(load_at(&self.path).await?.list(origins))
    }

    async fn upsert_repos(&self, repos: &[Repo]) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut catalog = load_at(&self.path).await?;
        catalog.upsert(repos);
        save_at(&self.path, &catalog).await
    }

    fn transactor(&self) -> Option<&dyn Transactor> {
        Some(self)
    }
}

#[async_trait]
impl Transactor for CatalogStore {
    async fn transact(&self) -> Result<Box<dyn TxStore>, StoreError> {
        let guard = Arc::clone(&self.lock).lock_owned().await;
        let staged = load_at(&self.path).await?;
        Ok(Box::new(CatalogTx {
            path: self.path.clone(),
            staged: Mutex::new(staged),
            _guard: guard,
        }))
    }
}

/// Staged copy of the catalog; persisted only by a successful `done`.
struct CatalogTx {
    path: PathBuf,
    staged: Mutex<Catalog>,
    _guard: OwnedMutexGuard<()>,
}

impl CatalogTx {
    fn staged(&self) -> std::sync::MutexGuard<'_, Catalog> {
        self.staged.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Store for CatalogTx {
    async fn list_repos(&self, origins: &[OriginName]) -> Result<Vec<Repo>, StoreError> {
        Ok(self.staged().list(origins))
    }

    async fn upsert_repos(&self, repos: &[Repo]) -> Result<(), StoreError> {
        self.staged().upsert(repos);
        Ok(())
    }
}

#[async_trait]
impl TxStore for CatalogTx {
    async fn done(self: Box<Self>, outcome: Result<(), &SyncError>) -> Result<(), StoreError> {
        let CatalogTx {
            path,
            staged,
            _guard,
        } = *self;
        match outcome {
            Ok(()) => {
                let catalog = staged.into_inner().unwrap_or_else(PoisonError::into_inner);
                save_at(&path, &catalog).await?;
                tracing::debug!(path = %path.display(), repos = catalog.repos.len(), "catalog committed");
            }
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "catalog transaction rolled back");
            }
        }
        Ok(())
    }
}

/// Load the catalog at `path`; a missing file is an empty catalog.
async fn load_at(path: &Path) -> Result<Catalog, StoreError> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Catalog::default()),
        Err(err) => return Err(io_err(path, err)),
    };
    serde_json::from_str(&contents).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Save atomically: write `<path>.tmp`, then rename over `<path>`.
async fn save_at(path: &Path, catalog: &Catalog) -> Result<(), StoreError> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| io_err(dir, e))?;
    }
    let json = serde_json::to_string_pretty(catalog).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json)
        .await
        .map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(io_err(path, e));
    }
    Ok(())
}
