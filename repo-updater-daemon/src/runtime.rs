use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use repo_updater_core::{config, Diff, Repo, UpdaterConfig};
use repo_updater_sync::{publish, CatalogStore, Reconciler, ReconcilerOptions, SourceRegistry};

use crate::error::{io_err, DaemonError};
use crate::scheduler::Scheduler;

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the scheduler, the diff subscriber and the signal handler until
/// ctrl-c (or until one of them fails).
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    let config = config::load_at(&home)?;
    config.validate()?;

    let (publisher, diffs) = publish::channel_from_config(&config.publish);
    let reconciler = build_reconciler(&home, &config)?.with_publisher(publisher);
    let scheduler = Arc::new(Scheduler::new(Arc::new(reconciler), config.interval()));

    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let scheduler_handle = {
        let shutdown = shutdown_tx.clone();
        let scheduler = Arc::clone(&scheduler);
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = match scheduler.run(shutdown_rx).await {
                Err(DaemonError::Cancelled) => Ok(()),
                other => other,
            };
            let _ = shutdown.send(());
            result
        })
    };

    let subscriber_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = diff_subscriber_task(diffs, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Runtime(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (scheduler_result, subscriber_result, signal_result) =
        tokio::join!(scheduler_handle, subscriber_handle, signal_handle);

    handle_join("scheduler", scheduler_result)?;
    handle_join("diff_subscriber", subscriber_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

/// Wire a reconciler from config: one file source per configured origin,
/// the JSON catalog as the store.
pub fn build_reconciler(home: &Path, config: &UpdaterConfig) -> Result<Reconciler, DaemonError> {
    let sources = SourceRegistry::from_config(config)?;
    let store = CatalogStore::open(config.catalog_path(home));
    Ok(Reconciler::new(sources, Arc::new(store)).with_options(ReconcilerOptions::from(config)))
}

/// Live consumer of the diff stream, so a `block` publisher never stalls.
async fn diff_subscriber_task(
    mut diffs: mpsc::Receiver<Diff<Repo>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_diff = diffs.recv() => {
                let Some(diff) = maybe_diff else { break };
                if diff.is_empty() {
                    tracing::debug!(unmodified = diff.unmodified.len(), "catalog unchanged");
                    continue;
                }
                tracing::info!(
                    added = diff.added.len(),
                    modified = diff.modified.len(),
                    deleted = diff.deleted.len(),
                    "catalog changed",
                );
                for repo in diff.upserts() {
                    tracing::debug!(repo = %repo.key(), deleted = repo.is_deleted(), "repo written");
                }
            }
        }
    }
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Runtime(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

/// Install the `RUST_LOG`-driven fmt subscriber (default `info`). Idempotent.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use repo_updater_core::{OriginName, SourceConfig};
    use tempfile::TempDir;

    #[tokio::test]
    async fn build_reconciler_wires_file_sources_and_catalog() {
        let home = TempDir::new().expect("home");
        let export = home.path().join("github.json");
        fs::write(&export, r#"[{"name":"tokio","language":"Rust"}]"#).expect("write export");

        let config = UpdaterConfig {
            sources: vec![SourceConfig {
                origin: OriginName::from("github"),
                path: export,
            }],
            ..UpdaterConfig::default()
        };
        let reconciler = build_reconciler(home.path(), &config).expect("reconciler");
        let report = reconciler.sync().await.expect("sync");

        assert_eq!(report.diff.added.len(), 1);
        let catalog = CatalogStore::open(config.catalog_path(home.path()))
            .load()
            .await
            .expect("catalog");
        assert_eq!(catalog.repos[0].origin, OriginName::from("github"));
    }

    #[test]
    fn duplicate_configured_origin_is_rejected() {
        let home = TempDir::new().expect("home");
        let source = SourceConfig {
            origin: OriginName::from("github"),
            path: home.path().join("github.json"),
        };
        let config = UpdaterConfig {
            sources: vec![source.clone(), source],
            ..UpdaterConfig::default()
        };
        assert!(matches!(
            build_reconciler(home.path(), &config),
            Err(DaemonError::Registry(_))
        ));
    }

    #[tokio::test]
    async fn run_without_config_fails_fast() {
        let home = TempDir::new().expect("home");
        let err = run(home.path().to_path_buf()).await.unwrap_err();
        assert!(matches!(err, DaemonError::Config(_)));
    }

    #[tokio::test]
    async fn diff_subscriber_drains_until_shutdown() {
        let (publisher, rx) = publish::channel(1, repo_updater_core::OverflowPolicy::Block);
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(diff_subscriber_task(rx, shutdown_rx));

        for _ in 0..3 {
            publisher
                .publish(Diff {
                    added: vec![Repo::new("tokio", "github")],
                    ..Diff::default()
                })
                .await
                .expect("publish");
        }

        shutdown.send(()).expect("shutdown");
        handle.await.expect("join").expect("subscriber");
    }
}
