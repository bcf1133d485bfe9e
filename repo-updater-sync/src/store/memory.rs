//! In-process catalog store with failure injection.
//!
//! Clones share state. Transactions take the catalog lock for their whole
//! lifetime and write to a staged copy that only replaces the live catalog
//! on a successful commit.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use repo_updater_core::{OriginName, Repo};

use super::{Catalog, Store, Transactor, TxStore};
use crate::error::{StoreError, SyncError};

/// Which store operation should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    /// Opening a transaction.
    Begin,
    /// Every listing.
    List,
    /// Every upsert, before anything is written.
    Upsert,
    /// An upsert, after writing its first `n` records.
    UpsertAfter(usize),
    /// Committing a transaction.
    Commit,
}

/// Memory-backed [`Store`].
#[derive(Debug, Clone)]
pub struct MemoryStore {
    catalog: Arc<AsyncMutex<Catalog>>,
    fail_on: Arc<Mutex<Option<FailOn>>>,
    list_calls: Arc<AtomicUsize>,
    transactional: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// An empty, transactional store.
    pub fn new() -> Self {
        Self {
            catalog: Arc::new(AsyncMutex::new(Catalog::default())),
            fail_on: Arc::new(Mutex::new(None)),
            list_calls: Arc::new(AtomicUsize::new(0)),
            transactional: true,
        }
    }

    /// A store without transactional capability; every upsert lands directly.
    pub fn non_transactional() -> Self {
        Self {
            transactional: false,
            ..Self::new()
        }
    }

    /// Seed the catalog. Ids are assigned as by an upsert.
    pub fn with_repos(self, repos: Vec<Repo>) -> Self {
        let mut catalog = Catalog::default();
        catalog.upsert(&repos);
        Self {
            catalog: Arc::new(AsyncMutex::new(catalog)),
            ..self
        }
    }

    /// Configure the store to fail on `fail_on`.
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.set_failure(Some(fail_on));
        self
    }

    pub fn set_failure(&self, fail_on: Option<FailOn>) {
        *self.fail_on.lock().unwrap_or_else(PoisonError::into_inner) = fail_on;
    }

    pub fn clear_failure(&self) {
        self.set_failure(None);
    }

    /// Current committed catalog.
    pub async fn snapshot(&self) -> Catalog {
        self.catalog.lock().await.clone()
    }

    /// Committed records, every origin included.
    pub async fn repos(&self) -> Vec<Repo> {
        self.catalog.lock().await.repos.clone()
    }

    /// Number of `list_repos` calls seen, transactional ones included.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn failure(&self) -> Option<FailOn> {
        *self.fail_on.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn injected(op: &str) -> StoreError {
    StoreError::Backend(format!("injected {op} failure"))
}

/// Apply `repos` to `catalog`, honouring upsert failure injection.
fn upsert_into(
    catalog: &mut Catalog,
    repos: &[Repo],
    fail_on: Option<FailOn>,
) -> Result<(), StoreError> {
    match fail_on {
        Some(FailOn::Upsert) => Err(injected("upsert")),
        Some(FailOn::UpsertAfter(n)) if n < repos.len() => {
            catalog.upsert(&repos[..n]);
            Err(injected("upsert"))
        }
        _ => {
            catalog.upsert(repos);
            Ok(())
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_repos(&self, origins: &[OriginName]) -> Result<Vec<Repo>, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.failure() == Some(FailOn::List) {
            return Err(injected("list"));
        }
        Ok(self.catalog.lock().await.list(origins))
    }

    async fn upsert_repos(&self, repos: &[Repo]) -> Result<(), StoreError> {
        let fail_on = self.failure();
        let mut catalog = self.catalog.lock().await;
        upsert_into(&mut catalog, repos, fail_on)
    }

    fn transactor(&self) -> Option<&dyn Transactor> {
        if self.transactional {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl Transactor for MemoryStore {
    async fn transact(&self) -> Result<Box<dyn TxStore>, StoreError> {
        if self.failure() == Some(FailOn::Begin) {
            return Err(injected("begin"));
        }
        let live = Arc::clone(&self.catalog).lock_owned().await;
        let staged = live.clone();
        Ok(Box::new(MemoryTx {
            live,
            staged: Mutex::new(staged),
            store: self.clone(),
        }))
    }
}

struct MemoryTx {
    live: OwnedMutexGuard<Catalog>,
    staged: Mutex<Catalog>,
    store: MemoryStore,
}

impl MemoryTx {
    fn staged(&self) -> std::sync::MutexGuard<'_, Catalog> {
        self.staged.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Store for MemoryTx {
    async fn list_repos(&self, origins: &[OriginName]) -> Result<Vec<Repo>, StoreError> {
        self.store.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.store.failure() == Some(FailOn::List) {
            return Err(injected("list"));
        }
        Ok(self.staged().list(origins))
    }

    async fn upsert_repos(&self, repos: &[Repo]) -> Result<(), StoreError> {
        let fail_on = self.store.failure();
        upsert_into(&mut self.staged(), repos, fail_on)
    }
}

#[async_trait]
impl TxStore for MemoryTx {
    async fn done(self: Box<Self>, outcome: Result<(), &SyncError>) -> Result<(), StoreError> {
        let MemoryTx {
            mut live,
            staged,
            store,
        } = *self;
        if let Err(err) = outcome {
            tracing::debug!(error = %err, "memory transaction rolled back");
            return Ok(());
        }
        if store.failure() == Some(FailOn::Commit) {
            return Err(injected("commit"));
        }
        *live = staged.into_inner().unwrap_or_else(PoisonError::into_inner);
        Ok(())
    }
}
