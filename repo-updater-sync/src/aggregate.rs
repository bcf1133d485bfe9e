//! Concurrent fan-out over every registered source.
//!
//! One task per source, at most `max_concurrent` fetching at once. Tasks
//! share nothing mutable and report over a channel sized to the number of
//! sources. A failed (or panicked) source contributes no repositories and
//! one entry in [`SourceErrors`]; it never aborts the others.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};

use repo_updater_core::{OriginName, Repo};

use crate::error::{FetchError, SourceError, SourceErrors};
use crate::source::SourceRegistry;

/// Combined snapshot of one sourcing round.
#[derive(Debug, Default)]
pub struct Sourced {
    /// Union of every successful source's repositories, in arrival order.
    pub repos: Vec<Repo>,
    pub errors: SourceErrors,
}

struct FetchOutcome {
    origin: OriginName,
    result: Result<Vec<Repo>, FetchError>,
}

/// Fetch every source in `registry` concurrently.
pub async fn source_repos(registry: &SourceRegistry, max_concurrent: usize) -> Sourced {
    let mut sourced = Sourced::default();
    if registry.is_empty() {
        return sourced;
    }

    let (tx, mut rx) = mpsc::channel::<FetchOutcome>(registry.len());
    let permits = Arc::new(Semaphore::new(max_concurrent.max(1)));

    let mut handles = Vec::with_capacity(registry.len());
    for (origin, source) in registry.iter() {
        let origin = origin.clone();
        let source = Arc::clone(source);
        let permits = Arc::clone(&permits);
        let tx = tx.clone();
        let task_origin = origin.clone();
        let handle = tokio::spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(_permit) => source.list_repos().await,
                Err(_) => Err(FetchError::Task("fetch pool closed".into())),
            };
            let _ = tx
                .send(FetchOutcome {
                    origin: task_origin,
                    result,
                })
                .await;
        });
        handles.push((origin, handle));
    }
    drop(tx);

    while let Some(outcome) = rx.recv().await {
        match outcome.result {
            Ok(repos) => {
                tracing::debug!(origin = %outcome.origin, count = repos.len(), "source fetched");
                sourced
                    .repos
                    .extend(repos.into_iter().map(|repo| claim(&outcome.origin, repo)));
            }
            Err(source) => {
                tracing::warn!(origin = %outcome.origin, error = %source, "source fetch failed");
                sourced.errors.push(SourceError {
                    origin: outcome.origin,
                    source,
                });
            }
        }
    }

    // A task that panicked dropped its sender without reporting.
    for (origin, handle) in handles {
        if let Err(err) = handle.await {
            tracing::error!(origin = %origin, error = %err, "source fetch task died");
            sourced.errors.push(SourceError {
                origin,
                source: FetchError::Task(err.to_string()),
            });
        }
    }

    sourced
}

/// The registering origin is authoritative for scope bounding.
fn claim(origin: &OriginName, mut repo: Repo) -> Repo {
    if repo.origin != *origin {
        tracing::warn!(
            origin = %origin,
            reported = %repo.origin,
            repo = %repo.name,
            "source reported a foreign origin; re-tagging",
        );
        repo.origin = origin.clone();
    }
    repo
}
