//! # repo-updater-sync
//!
//! Reconciliation of the repository catalog against its sources.
//!
//! Build a [`SourceRegistry`], pick a [`Store`], and call
//! [`Reconciler::sync`] once per cycle. [`Reconciler::plan`] computes the
//! same diff without writing anything.

pub mod aggregate;
pub mod error;
pub mod publish;
pub mod reconciler;
pub mod source;
pub mod store;

pub use aggregate::{source_repos, Sourced};
pub use error::{FetchError, RegistryError, SourceError, SourceErrors, StoreError, SyncError};
pub use publish::DiffPublisher;
pub use reconciler::{diff_snapshots, Reconciler, ReconcilerOptions, SyncReport};
pub use source::{FileSource, Source, SourceRegistry, StaticSource};
pub use store::{Catalog, CatalogStore, FailOn, MemoryStore, Store, Transactor, TxStore};
