//! Pull path: remote snapshots merged into the local store
//!
//! One subscription per registered collection. Each subscription gets a
//! forwarder task that pushes snapshots into a single bounded queue; one
//! merge task drains the queue, so merges are applied one at a time in
//! arrival order.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::{SyncContext, SyncEvent, SyncStatus};
use crate::error::SyncResult;
use crate::retry::retry;
use crate::types::Collection;
use crate::version::is_newer_value;

/// Running subscriptions plus the merge task. Dropping the handle
/// cancels everything.
pub(crate) struct PullHandle {
    forwarders: Vec<JoinHandle<()>>,
    merger: JoinHandle<()>,
}

impl PullHandle {
    pub(crate) fn cancel(self) {
        // Drop aborts the tasks, which drops the subscriptions
        drop(self);
    }
}

impl Drop for PullHandle {
    fn drop(&mut self) {
        for task in &self.forwarders {
            task.abort();
        }
        self.merger.abort();
    }
}

impl SyncContext {
    /// Merge one remote snapshot of `collection`.
    ///
    /// A record is written when it is absent locally or its revision is
    /// newer than or equal to the stored one. Returns the number written.
    pub(crate) fn merge_remote(&self, collection: Collection, snapshot: &[Value]) -> SyncResult<usize> {
        let written = self.store.merge_snapshot(collection, snapshot, |incoming, stored| {
            stored.map_or(true, |existing| is_newer_value(incoming, existing))
        })?;

        self.touch_last_sync();
        if written.is_empty() {
            return Ok(0);
        }

        debug!(%collection, written = written.len(), "Merged remote snapshot");
        self.emit(SyncEvent::SnapshotMerged {
            collection,
            written: written.len(),
        });
        if collection == Collection::Settings {
            self.emit(SyncEvent::SettingsChanged);
        }
        Ok(written.len())
    }

    /// Fetch every registered collection once and merge it
    pub(crate) async fn pull_once(&self) -> SyncResult<usize> {
        let mut total = 0;
        for binding in self.registry.bindings() {
            let reference = binding.collection_ref();
            let snapshot = retry(&self.policy, || self.remote.get_all(&reference)).await?;
            total += self.merge_remote(binding.collection, &snapshot)?;
        }
        Ok(total)
    }

    /// Subscribe to every registered collection and start merging
    pub(crate) async fn start_pull(self: &Arc<Self>) -> SyncResult<PullHandle> {
        let (tx, mut rx) = mpsc::channel::<(Collection, Vec<Value>)>(self.inbound_capacity);

        let mut subscriptions = Vec::with_capacity(self.registry.len());
        for binding in self.registry.bindings() {
            let reference = binding.collection_ref();
            let subscription = retry(&self.policy, || self.remote.on_value(&reference)).await?;
            subscriptions.push((binding.collection, subscription));
        }

        let forwarders: Vec<JoinHandle<()>> = subscriptions
            .into_iter()
            .map(|(collection, mut subscription)| {
                let tx = tx.clone();
                tokio::spawn(async move {
                    while let Some(snapshot) = subscription.next_snapshot().await {
                        if tx.send((collection, snapshot)).await.is_err() {
                            break;
                        }
                    }
                    debug!(%collection, "Subscription closed");
                })
            })
            .collect();
        drop(tx);

        let ctx = self.clone();
        let merger = tokio::spawn(async move {
            while let Some((collection, snapshot)) = rx.recv().await {
                if let Err(e) = ctx.merge_remote(collection, &snapshot) {
                    error!(%collection, error = %e, "Failed to merge remote snapshot");
                    ctx.set_status(SyncStatus::Error(e.to_string()));
                }
            }
        });

        info!(collections = self.registry.len(), "Subscribed to remote changes");
        Ok(PullHandle { forwarders, merger })
    }
}
