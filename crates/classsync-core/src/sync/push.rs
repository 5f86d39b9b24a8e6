//! Push path: drain the outbox to the remote store

use std::collections::HashSet;

use tracing::{debug, error, info, warn};

use super::{DrainReport, SyncContext, SyncEvent, SyncStatus};
use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteError;
use crate::retry::retry;
use crate::storage::{Action, OutboxEntry};

impl SyncContext {
    /// Deliver every pending outbox entry, oldest first.
    ///
    /// Entries whose collection has no remote mapping, and entries whose
    /// remote call fails after retries, stay pending. Later entries for the
    /// same document are held back behind them so a document's changes
    /// never reach the remote out of order; other documents keep draining.
    /// Acknowledged entries are marked synced together at the end.
    /// Concurrent callers queue up behind each other.
    pub(crate) async fn drain(&self) -> SyncResult<DrainReport> {
        let _guard = self.push_lock.lock().await;

        if !self.connectivity.is_online() {
            debug!("Offline, leaving outbox untouched");
            let pending_after = self.refresh_pending()?;
            return Ok(DrainReport {
                pending_after,
                ..Default::default()
            });
        }

        let pending = self.outbox.pending()?;
        if pending.is_empty() {
            self.touch_last_sync();
            self.refresh_pending()?;
            return Ok(DrainReport::default());
        }

        info!(entries = pending.len(), "Draining outbox");
        self.set_status(SyncStatus::Syncing);

        let mut report = DrainReport::default();
        let mut delivered = Vec::with_capacity(pending.len());
        let mut blocked: HashSet<(&str, &str)> = HashSet::new();

        for entry in &pending {
            if !self.connectivity.is_online() {
                warn!(sequence = entry.sequence, "Went offline mid-drain, stopping");
                break;
            }

            let document = (entry.collection.as_str(), entry.document_id.as_str());
            if blocked.contains(&document) {
                debug!(
                    sequence = entry.sequence,
                    collection = %entry.collection,
                    document_id = %entry.document_id,
                    "Held back behind an undelivered entry"
                );
                report.deferred += 1;
                continue;
            }

            let Some(binding) = self.registry.resolve(&entry.collection) else {
                let err = SyncError::UnresolvedCollection {
                    collection: entry.collection.clone(),
                    sequence: entry.sequence,
                };
                error!(
                    sequence = entry.sequence,
                    collection = %entry.collection,
                    document_id = %entry.document_id,
                    "{err}"
                );
                self.emit(SyncEvent::UnresolvedCollection {
                    collection: entry.collection.clone(),
                    sequence: entry.sequence,
                });
                report.unresolved += 1;
                blocked.insert(document);
                continue;
            };

            let reference = binding.doc_ref(&entry.document_id);
            match self.deliver(entry, &reference).await {
                Ok(()) => {
                    debug!(sequence = entry.sequence, %reference, action = %entry.action, "Delivered");
                    delivered.push(entry.sequence);
                }
                Err(e) => {
                    warn!(
                        sequence = entry.sequence,
                        %reference,
                        error = %e,
                        "Delivery failed, entry stays pending"
                    );
                    self.emit(SyncEvent::DeliveryFailed {
                        sequence: entry.sequence,
                        collection: entry.collection.clone(),
                        document_id: entry.document_id.clone(),
                        error: e.to_string(),
                    });
                    report.failed += 1;
                    blocked.insert(document);
                }
            }
        }

        report.delivered = self.outbox.mark_synced(&delivered)?;
        report.pending_after = self.refresh_pending()?;

        if report.failed == 0 {
            self.touch_last_sync();
        }
        if report.delivered > 0 {
            self.emit(SyncEvent::EntriesDelivered {
                count: report.delivered,
                pending_after: report.pending_after,
            });
        }

        if report.is_clean() {
            self.set_status(self.resting_status());
        } else {
            self.set_status(SyncStatus::Error(format!(
                "{} entries undelivered",
                report.failed + report.unresolved + report.deferred
            )));
        }

        info!(
            delivered = report.delivered,
            failed = report.failed,
            unresolved = report.unresolved,
            deferred = report.deferred,
            pending = report.pending_after,
            "Drain finished"
        );
        Ok(report)
    }

    /// One entry's remote call, with retries. Payloads go out verbatim.
    async fn deliver(
        &self,
        entry: &OutboxEntry,
        reference: &crate::remote::RemoteRef,
    ) -> SyncResult<()> {
        match entry.action {
            Action::Delete => {
                retry(&self.policy, || self.remote.remove_data(reference)).await?;
            }
            Action::Create | Action::Update => {
                let value = entry.remote_value()?.ok_or_else(|| {
                    RemoteError::Rejected(format!("entry #{} has no payload", entry.sequence))
                })?;
                retry(&self.policy, || self.remote.set_data(reference, value.clone())).await?;
            }
        }
        Ok(())
    }
}
