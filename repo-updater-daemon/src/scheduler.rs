//! Periodic reconciliation loop.
//!
//! Runs one cycle, waits `interval`, repeats. A failed cycle is logged and
//! the loop carries on. Shutdown is observed at the top of the loop and
//! during the wait; a cycle already in progress always runs to completion.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::TryRecvError};

use repo_updater_sync::Reconciler;

use crate::error::DaemonError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    Stopped,
}

const STOPPED: u8 = 0;
const RUNNING: u8 = 1;

#[derive(Debug)]
pub struct Scheduler {
    reconciler: Arc<Reconciler>,
    interval: Duration,
    state: AtomicU8,
    cycles: AtomicU64,
}

impl Scheduler {
    pub fn new(reconciler: Arc<Reconciler>, interval: Duration) -> Self {
        Self {
            reconciler,
            interval,
            state: AtomicU8::new(STOPPED),
            cycles: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> SchedulerState {
        match self.state.load(Ordering::SeqCst) {
            RUNNING => SchedulerState::Running,
            _ => SchedulerState::Stopped,
        }
    }

    /// Cycles attempted so far, failed ones included.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    /// Loop until `shutdown` fires (or its sender goes away).
    ///
    /// Always ends in [`DaemonError::Cancelled`].
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), DaemonError> {
        self.state.store(RUNNING, Ordering::SeqCst);
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            origins = self.reconciler.sources().len(),
            "scheduler started",
        );

        loop {
            if shutdown_requested(&mut shutdown) {
                break;
            }

            match self.reconciler.sync().await {
                Ok(report) => {
                    if !report.source_errors.is_empty() {
                        tracing::warn!(
                            failed = ?report.failed_origins(),
                            "cycle completed with partial source coverage",
                        );
                    }
                    tracing::debug!(duration_ms = report.duration_ms, "cycle finished");
                }
                Err(err) => tracing::error!(error = %err, "reconciliation cycle failed"),
            }
            self.cycles.fetch_add(1, Ordering::SeqCst);

            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        self.state.store(STOPPED, Ordering::SeqCst);
        tracing::info!(cycles = self.cycles(), "scheduler stopped");
        Err(DaemonError::Cancelled)
    }
}

/// A closed or lagged channel counts as a shutdown request.
fn shutdown_requested(shutdown: &mut broadcast::Receiver<()>) -> bool {
    !matches!(shutdown.try_recv(), Err(TryRecvError::Empty))
}
