//! One reconciliation cycle.
//!
//! ```text
//! SOURCE ─▶ [begin tx] ─▶ LIST (scoped) ─▶ DIFF ─▶ STAMP ─▶ PERSIST ─▶ [done tx] ─▶ PUBLISH
//! ```
//!
//! Source failures degrade coverage but never abort the cycle. Every other
//! error aborts it, and when the store is transactional the transaction is
//! rolled back so none of the cycle's writes become visible. The diff is
//! published only after a successful commit.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use repo_updater_core::config::DEFAULT_MAX_CONCURRENT_FETCHES;
use repo_updater_core::{Diff, OriginName, Repo, SourceFailurePolicy, UpdaterConfig};

use crate::aggregate::{source_repos, Sourced};
use crate::error::{SourceErrors, SyncError};
use crate::publish::DiffPublisher;
use crate::source::SourceRegistry;
use crate::store::Store;

/// Wall clock used to stamp a cycle. Read once per cycle.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Tunables taken from the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerOptions {
    pub max_concurrent_fetches: usize,
    pub on_source_failure: SourceFailurePolicy,
}

impl Default for ReconcilerOptions {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            on_source_failure: SourceFailurePolicy::default(),
        }
    }
}

impl From<&UpdaterConfig> for ReconcilerOptions {
    fn from(config: &UpdaterConfig) -> Self {
        Self {
            max_concurrent_fetches: config.max_concurrent_fetches,
            on_source_failure: config.on_source_failure,
        }
    }
}

/// Outcome of one cycle (or one dry run).
#[derive(Debug, Serialize)]
pub struct SyncReport {
    pub diff: Diff<Repo>,
    /// Repositories reported by the sources that answered.
    pub sourced: usize,
    #[serde(skip)]
    pub source_errors: SourceErrors,
    /// The single `now` every stamp of this cycle carries.
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl SyncReport {
    pub fn failed_origins(&self) -> Vec<OriginName> {
        self.source_errors.origins()
    }
}

/// Reconciles one store against one fixed set of sources.
pub struct Reconciler {
    sources: SourceRegistry,
    store: Arc<dyn Store>,
    publisher: Option<DiffPublisher>,
    options: ReconcilerOptions,
    clock: Clock,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("sources", &self.sources)
            .field("publisher", &self.publisher)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(sources: SourceRegistry, store: Arc<dyn Store>) -> Self {
        Self {
            sources,
            store,
            publisher: None,
            options: ReconcilerOptions::default(),
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_publisher(mut self, publisher: DiffPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_options(mut self, options: ReconcilerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Run one full cycle.
    pub async fn sync(&self) -> Result<SyncReport, SyncError> {
        let started = Instant::now();
        let now = (self.clock)();

        let Sourced { repos, errors } = self.source().await;
        let sourced = repos.len();
        let scope = self.scope(&errors);

        let diff = match self.store.transactor() {
            Some(transactor) => {
                let tx = transactor.transact().await.map_err(SyncError::Begin)?;
                let outcome = apply(&*tx, &scope, repos, now).await;
                let finalized = tx.done(outcome.as_ref().map(|_| ())).await;
                match (outcome, finalized) {
                    (Ok(diff), Ok(())) => diff,
                    (Ok(_), Err(err)) => {
                        tracing::error!(error = %err, "commit failed; cycle discarded");
                        return Err(SyncError::Finalize(err));
                    }
                    (Err(err), Ok(())) => {
                        tracing::error!(error = %err, "cycle aborted; rolled back");
                        return Err(err);
                    }
                    (Err(err), Err(rollback)) => {
                        tracing::error!(error = %err, rollback = %rollback, "cycle aborted; rollback failed");
                        return Err(err);
                    }
                }
            }
            None => apply(&*self.store, &scope, repos, now)
                .await
                .inspect_err(|err| {
                    tracing::error!(error = %err, "cycle aborted; store is not transactional, earlier writes may stand");
                })?,
        };

        tracing::info!(
            added = diff.added.len(),
            modified = diff.modified.len(),
            deleted = diff.deleted.len(),
            unmodified = diff.unmodified.len(),
            sourced,
            failed_sources = errors.len(),
            "cycle committed",
        );

        if let Some(publisher) = &self.publisher {
            publisher.publish(diff.clone()).await?;
        }

        Ok(SyncReport {
            diff,
            sourced,
            source_errors: errors,
            started_at: now,
            duration_ms: elapsed_ms(started),
        })
    }

    /// Source, list and diff without stamping, writing or publishing.
    pub async fn plan(&self) -> Result<SyncReport, SyncError> {
        let started = Instant::now();
        let now = (self.clock)();

        let Sourced { repos, errors } = self.source().await;
        let sourced = repos.len();
        let scope = self.scope(&errors);

        let stored = self
            .store
            .list_repos(&scope)
            .await
            .map_err(SyncError::List)?;
        let diff = diff_snapshots(stored, repos);

        Ok(SyncReport {
            diff,
            sourced,
            source_errors: errors,
            started_at: now,
            duration_ms: elapsed_ms(started),
        })
    }

    async fn source(&self) -> Sourced {
        let sourced = source_repos(&self.sources, self.options.max_concurrent_fetches).await;
        if !sourced.errors.is_empty() {
            tracing::warn!(
                error = %sourced.errors,
                "sourcing degraded; continuing with partial snapshot",
            );
        }
        sourced
    }

    /// Origins whose stored repositories take part in this cycle.
    fn scope(&self, errors: &SourceErrors) -> Vec<OriginName> {
        let registered = self.sources.origin_names();
        match self.options.on_source_failure {
            SourceFailurePolicy::TreatAsAbsent => registered,
            SourceFailurePolicy::ProtectUnknown => {
                let failed = errors.origins();
                if !failed.is_empty() {
                    tracing::info!(protected = ?failed, "failed origins left out of this cycle");
                }
                registered
                    .into_iter()
                    .filter(|origin| !failed.contains(origin))
                    .collect()
            }
        }
    }
}

/// LIST, DIFF, STAMP and PERSIST against `store` (the live store or a
/// transaction).
async fn apply<S: Store + ?Sized>(
    store: &S,
    scope: &[OriginName],
    sourced: Vec<Repo>,
    now: DateTime<Utc>,
) -> Result<Diff<Repo>, SyncError> {
    let stored = store.list_repos(scope).await.map_err(SyncError::List)?;
    let mut diff = diff_snapshots(stored, sourced);
    stamp(&mut diff, now);

    let batch: Vec<Repo> = diff.upserts().cloned().collect();
    if !batch.is_empty() {
        store
            .upsert_repos(&batch)
            .await
            .map_err(SyncError::Upsert)?;
    }
    Ok(diff)
}

/// Classify the stored snapshot against the sourced one.
///
/// A tombstoned record that is sourced again is modified (it gets
/// resurrected). A tombstoned record that is still absent is unmodified,
/// so it is not tombstoned a second time.
pub fn diff_snapshots(stored: Vec<Repo>, sourced: Vec<Repo>) -> Diff<Repo> {
    let mut diff = Diff::new(stored, sourced, |before, after| {
        before.is_deleted() || before.authoritative_differs(after)
    });
    let (settled, deleted): (Vec<Repo>, Vec<Repo>) =
        diff.deleted.into_iter().partition(Repo::is_deleted);
    diff.deleted = deleted;
    diff.unmodified.extend(settled);
    diff
}

fn stamp(diff: &mut Diff<Repo>, now: DateTime<Utc>) {
    for repo in &mut diff.added {
        repo.id = 0;
        repo.created_at = Some(now);
        repo.updated_at = Some(now);
        repo.deleted_at = None;
    }
    for repo in &mut diff.modified {
        repo.updated_at = Some(now);
        repo.deleted_at = None;
    }
    for repo in &mut diff.deleted {
        repo.updated_at = Some(now);
        repo.deleted_at = Some(now);
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
