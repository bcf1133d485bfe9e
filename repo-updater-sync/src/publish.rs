//! Diff hand-off to subscribers.
//!
//! One diff is published per committed cycle over a bounded channel. What
//! happens when the channel is full is the [`OverflowPolicy`]; a channel
//! with no receiver left is logged and otherwise ignored.

use tokio::sync::mpsc::{self, error::TrySendError};

use repo_updater_core::{Diff, OverflowPolicy, PublishConfig, Repo};

use crate::error::SyncError;

/// Sending half of the diff stream.
#[derive(Debug, Clone)]
pub struct DiffPublisher {
    tx: mpsc::Sender<Diff<Repo>>,
    overflow: OverflowPolicy,
}

/// A publisher and its subscriber end. `capacity` is clamped to at least 1.
pub fn channel(
    capacity: usize,
    overflow: OverflowPolicy,
) -> (DiffPublisher, mpsc::Receiver<Diff<Repo>>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (DiffPublisher { tx, overflow }, rx)
}

/// [`channel`] sized and configured from `publish:` in the config.
pub fn channel_from_config(config: &PublishConfig) -> (DiffPublisher, mpsc::Receiver<Diff<Repo>>) {
    channel(config.capacity, config.overflow)
}

impl DiffPublisher {
    pub fn overflow(&self) -> OverflowPolicy {
        self.overflow
    }

    pub async fn publish(&self, diff: Diff<Repo>) -> Result<(), SyncError> {
        let changes = diff.changes();
        match self.overflow {
            OverflowPolicy::Block => {
                if self.tx.send(diff).await.is_err() {
                    tracing::warn!(changes, "diff subscriber gone; diff dropped");
                }
                Ok(())
            }
            OverflowPolicy::DropNewest => match self.tx.try_send(diff) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(changes, "diff channel full; dropping newest diff");
                    Ok(())
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::warn!(changes, "diff subscriber gone; diff dropped");
                    Ok(())
                }
            },
            OverflowPolicy::Reject => match self.tx.try_send(diff) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => Err(SyncError::Publish(format!(
                    "diff channel full (capacity {})",
                    self.tx.max_capacity()
                ))),
                Err(TrySendError::Closed(_)) => {
                    tracing::warn!(changes, "diff subscriber gone; diff dropped");
                    Ok(())
                }
            },
        }
    }
}
