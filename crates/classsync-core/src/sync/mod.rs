//! Remote synchronization: push, pull and the bootstrap seed
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  SyncContext (shared by the engine and its background tasks)    │
//! │  ├── LocalStore + Outbox (redb)                                 │
//! │  ├── RemoteStore (async trait object)                           │
//! │  ├── CollectionRegistry (collection name -> remote path)        │
//! │  ├── push_lock: serializes drains and the bootstrap seed        │
//! │  └── event_tx: broadcast::Sender<SyncEvent>                     │
//! │                                                                 │
//! │  Push: outbox.pending() ─► retry(set_data/remove_data)          │
//! │        ─► mark_synced(batch)                                    │
//! │                                                                 │
//! │  Pull: on_value(collection) x N ─► forwarder tasks              │
//! │        ─► one mpsc queue ─► merge task ─► store.merge_snapshot  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Delivery is at-least-once. The remote is idempotent under same-id
//! overwrite and delete-of-absent, and the `synced` flag keeps a second
//! drain from re-sending entries the first one already delivered.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use crate::connectivity::ConnectivityMonitor;
use crate::error::SyncResult;
use crate::registry::CollectionRegistry;
use crate::remote::RemoteStore;
use crate::retry::RetryPolicy;
use crate::storage::{LocalStore, Outbox};
use crate::types::now_millis;

mod bootstrap;
pub mod events;
mod pull;
mod push;

pub use events::{DrainReport, SyncEvent, SyncStatus};
pub(crate) use pull::PullHandle;

/// Observable counters
#[derive(Debug, Default)]
struct SyncState {
    pending_count: usize,
    last_sync_at: Option<i64>,
    status: SyncStatus,
}

/// Everything the push and pull paths need, shared behind an `Arc`
pub(crate) struct SyncContext {
    pub(crate) store: LocalStore,
    pub(crate) outbox: Outbox,
    pub(crate) remote: Arc<dyn RemoteStore>,
    pub(crate) registry: CollectionRegistry,
    pub(crate) policy: RetryPolicy,
    pub(crate) connectivity: ConnectivityMonitor,
    inbound_capacity: usize,
    event_tx: broadcast::Sender<SyncEvent>,
    state: Mutex<SyncState>,
    push_lock: tokio::sync::Mutex<()>,
    bootstrap_done: AtomicBool,
}

impl SyncContext {
    pub(crate) fn new(
        store: LocalStore,
        remote: Arc<dyn RemoteStore>,
        registry: CollectionRegistry,
        policy: RetryPolicy,
        connectivity: ConnectivityMonitor,
        event_capacity: usize,
        inbound_capacity: usize,
    ) -> SyncResult<Self> {
        let (event_tx, _) = broadcast::channel(event_capacity.max(1));
        let outbox = store.outbox();
        let pending_count = outbox.pending_count()?;

        Ok(Self {
            store,
            outbox,
            remote,
            registry,
            policy,
            connectivity,
            inbound_capacity: inbound_capacity.max(1),
            event_tx,
            state: Mutex::new(SyncState {
                pending_count,
                ..Default::default()
            }),
            push_lock: tokio::sync::Mutex::new(()),
            bootstrap_done: AtomicBool::new(false),
        })
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    /// Broadcast an event; having no listeners is fine
    pub(crate) fn emit(&self, event: SyncEvent) {
        let _ = self.event_tx.send(event);
    }

    pub(crate) fn status(&self) -> SyncStatus {
        self.state.lock().status.clone()
    }

    /// Update the status, emitting `StatusChanged` only on an actual change
    pub(crate) fn set_status(&self, status: SyncStatus) {
        {
            let mut state = self.state.lock();
            if state.status == status {
                return;
            }
            state.status = status.clone();
        }
        debug!(%status, "Sync status changed");
        self.emit(SyncEvent::StatusChanged { status });
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.state.lock().pending_count
    }

    /// Recount unsynced outbox entries
    pub(crate) fn refresh_pending(&self) -> SyncResult<usize> {
        let count = self.outbox.pending_count()?;
        self.state.lock().pending_count = count;
        Ok(count)
    }

    pub(crate) fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        self.state
            .lock()
            .last_sync_at
            .and_then(DateTime::from_timestamp_millis)
    }

    pub(crate) fn touch_last_sync(&self) {
        self.state.lock().last_sync_at = Some(now_millis());
    }

    /// Status to fall back to when nothing is in flight
    pub(crate) fn resting_status(&self) -> SyncStatus {
        if self.connectivity.is_online() {
            SyncStatus::Idle
        } else {
            SyncStatus::Offline
        }
    }
}
