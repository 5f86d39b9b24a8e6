//! One-time seed of an empty remote store from local data

use std::sync::atomic::Ordering;

use tracing::{info, warn};

use super::{SyncContext, SyncEvent, SyncStatus};
use crate::error::{SyncError, SyncResult};
use crate::retry::retry;
use crate::types::Collection;

impl SyncContext {
    pub(crate) fn bootstrap_done(&self) -> bool {
        self.bootstrap_done.load(Ordering::SeqCst)
    }

    /// Push the whole local store if the remote has no users yet.
    ///
    /// Runs at most once per engine session: after it completes, or after
    /// it finds remote users, later calls return `Ok(false)` immediately.
    /// A failed seed is not marked done and is attempted again on the next
    /// call. Returns whether a seed was performed.
    pub(crate) async fn bootstrap_if_needed(&self) -> SyncResult<bool> {
        if self.bootstrap_done() {
            return Ok(false);
        }
        let _guard = self.push_lock.lock().await;
        if self.bootstrap_done() {
            return Ok(false);
        }

        let Some(users) = self.registry.resolve(Collection::Users.as_str()) else {
            warn!("Users collection has no remote mapping, skipping bootstrap");
            self.bootstrap_done.store(true, Ordering::SeqCst);
            return Ok(false);
        };

        let users_ref = users.collection_ref();
        let remote_users = retry(&self.policy, || self.remote.get_all(&users_ref)).await?;
        if !remote_users.is_empty() {
            info!(users = remote_users.len(), "Remote already populated, no bootstrap");
            self.bootstrap_done.store(true, Ordering::SeqCst);
            return Ok(false);
        }

        info!("Remote has no users, seeding it from the local store");
        self.set_status(SyncStatus::Syncing);

        let mut records = 0;
        for binding in self.registry.bindings() {
            for value in self.store.all_values(binding.collection)? {
                let Some(id) = value.get("id").and_then(|v| v.as_str()).map(str::to_string) else {
                    continue;
                };
                let reference = binding.doc_ref(&id);
                let result = retry(&self.policy, || self.remote.set_data(&reference, value.clone())).await;
                if let Err(e) = result {
                    self.set_status(SyncStatus::Error(format!("bootstrap failed: {e}")));
                    return Err(SyncError::from(e));
                }
                records += 1;
            }
        }

        self.bootstrap_done.store(true, Ordering::SeqCst);
        self.touch_last_sync();
        self.set_status(self.resting_status());
        self.emit(SyncEvent::BootstrapCompleted { records });
        info!(records, "Bootstrap finished");
        Ok(true)
    }
}
