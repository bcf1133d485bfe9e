//! Catalog persistence contracts and reference implementations.
//!
//! # Contracts
//! - [`Store::list_repos`] returns exactly the records whose origin is in the
//!   given scope (tombstoned ones included). An empty scope lists nothing.
//! - [`Store::upsert_repos`] inserts or replaces by `(name, origin)` and is
//!   idempotent.
//! - A store that can scope work atomically exposes [`Transactor`] through
//!   [`Store::transactor`]. The [`TxStore`] it hands out must be finalized
//!   with [`TxStore::done`]; dropping it unfinalized discards its writes.
//!
//! # Implementations
//! - [`CatalogStore`]: JSON document on disk, atomic `.tmp` + rename saves.
//! - [`MemoryStore`]: in-process, with failure injection for tests.

mod catalog;
mod memory;

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use repo_updater_core::{OriginName, Repo, RepoKey};

use crate::error::{StoreError, SyncError};

pub use catalog::CatalogStore;
pub use memory::{FailOn, MemoryStore};

/// The persisted repository catalog.
#[async_trait]
pub trait Store: Send + Sync {
    async fn list_repos(&self, origins: &[OriginName]) -> Result<Vec<Repo>, StoreError>;

    async fn upsert_repos(&self, repos: &[Repo]) -> Result<(), StoreError>;

    /// Transactional capability, if this store has one.
    fn transactor(&self) -> Option<&dyn Transactor> {
        None
    }
}

/// Opens all-or-nothing scopes over a [`Store`].
#[async_trait]
pub trait Transactor: Send + Sync {
    async fn transact(&self) -> Result<Box<dyn TxStore>, StoreError>;
}

/// A [`Store`] view whose writes become visible only on commit.
#[async_trait]
pub trait TxStore: Store {
    /// Commit iff `outcome` is `Ok`, roll back otherwise. Consumes the
    /// transaction, so it can only be finalized once.
    async fn done(self: Box<Self>, outcome: Result<(), &SyncError>) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Catalog document
// ---------------------------------------------------------------------------

/// In-memory catalog shared by both reference stores.
///
/// Serialized as `{ "next_id": n, "repos": [...] }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default = "first_id")]
    pub next_id: u64,
    #[serde(default)]
    pub repos: Vec<Repo>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            next_id: first_id(),
            repos: Vec::new(),
        }
    }
}

fn first_id() -> u64 {
    1
}

impl Catalog {
    /// Records belonging to any of `origins`, in catalog order.
    pub fn list(&self, origins: &[OriginName]) -> Vec<Repo> {
        self.repos
            .iter()
            .filter(|repo| origins.contains(&repo.origin))
            .cloned()
            .collect()
    }

    /// Insert or replace each record by key. New records always get the
    /// next id, whatever id they arrived with; replaced records keep the id
    /// already on file.
    pub fn upsert<'a>(&mut self, repos: impl IntoIterator<Item = &'a Repo>) {
        let mut index: HashMap<RepoKey, usize> = self
            .repos
            .iter()
            .enumerate()
            .map(|(pos, repo)| (repo.key(), pos))
            .collect();

        for repo in repos {
            let mut repo = repo.clone();
            match index.get(&repo.key()) {
                Some(&pos) => {
                    repo.id = self.repos[pos].id;
                    self.repos[pos] = repo;
                }
                None => {
                    repo.id = self.next_id;
                    self.next_id = self.next_id.saturating_add(1);
                    index.insert(repo.key(), self.repos.len());
                    self.repos.push(repo);
                }
            }
        }
    }

    /// Active / tombstoned counts per origin, sorted by origin.
    pub fn origin_counts(&self) -> Vec<(OriginName, usize, usize)> {
        let mut counts: BTreeMap<OriginName, (usize, usize)> = BTreeMap::new();
        for repo in &self.repos {
            let entry = counts.entry(repo.origin.clone()).or_default();
            if repo.is_deleted() {
                entry.1 += 1;
            } else {
                entry.0 += 1;
            }
        }
        counts
            .into_iter()
            .map(|(origin, (active, deleted))| (origin, active, deleted))
            .collect()
    }
}
