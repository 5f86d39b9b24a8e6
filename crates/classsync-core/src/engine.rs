//! Main SyncEngine - the primary entry point for classsync
//!
//! SyncEngine coordinates the local store, the outbox and a remote store:
//! - Every mutation is written locally and queued in one transaction
//! - Queued changes are pushed when online (immediately, or on reconnect)
//! - Remote changes stream back in and are merged by revision
//!
//! # Example
//!
//! ```ignore
//! use classsync_core::{CollectionRegistry, EngineConfig, SyncEngine, Todo};
//!
//! let engine = SyncEngine::open(
//!     "~/.classsync/classsync.redb",
//!     Arc::new(remote),
//!     CollectionRegistry::standard(),
//!     EngineConfig::default(),
//! )?;
//! engine.start().await;
//!
//! // Written locally right away, pushed in the background
//! let todo = engine.create(Todo::new("Return library books")).await?;
//!
//! // Platform reachability hook
//! engine.connectivity().set_online(false);
//! ```

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{SyncError, SyncResult};
use crate::registry::CollectionRegistry;
use crate::remote::RemoteStore;
use crate::storage::{Action, LocalStore, LocalWrite, Outbox, OutboxEntry, Query};
use crate::sync::{DrainReport, PullHandle, SyncContext, SyncEvent, SyncStatus};
use crate::types::{Collection, Entity, Record, Settings, SETTINGS_ID};
use crate::version::{touch, touch_record, with_version, with_version_record};

/// Main entry point for classsync
///
/// Owns all sync state; nothing lives in globals, so several engines can
/// run side by side (one per data directory).
pub struct SyncEngine {
    ctx: Arc<SyncContext>,
    config: EngineConfig,
    /// Connectivity watcher task while started
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Open the store at `db_path` and build an engine over it
    pub fn open(
        db_path: impl AsRef<Path>,
        remote: Arc<dyn RemoteStore>,
        registry: CollectionRegistry,
        config: EngineConfig,
    ) -> SyncResult<Self> {
        let store = LocalStore::open(db_path)?;
        Self::new(store, remote, registry, config)
    }

    /// Build an engine over an already-open store
    pub fn new(
        store: LocalStore,
        remote: Arc<dyn RemoteStore>,
        registry: CollectionRegistry,
        config: EngineConfig,
    ) -> SyncResult<Self> {
        for collection in Collection::ALL {
            if !registry.contains(collection) {
                warn!(%collection, "Collection has no remote mapping; its changes will stay queued");
            }
        }

        let ctx = SyncContext::new(
            store,
            remote,
            registry,
            config.retry_policy(),
            ConnectivityMonitor::default(),
            config.event_capacity,
            config.inbound_capacity,
        )?;

        info!(pending = ctx.pending_count(), "Sync engine ready");
        Ok(Self {
            ctx: Arc::new(ctx),
            config,
            watcher: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &LocalStore {
        &self.ctx.store
    }

    pub fn outbox(&self) -> &Outbox {
        &self.ctx.outbox
    }

    pub fn registry(&self) -> &CollectionRegistry {
        &self.ctx.registry
    }

    /// Online/offline switch fed by the platform
    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.ctx.connectivity
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    /// Start background sync.
    ///
    /// Watches connectivity: whenever the device is (or comes) online the
    /// outbox is drained, a pending bootstrap seed runs, and remote
    /// subscriptions are (re)opened. Going offline cancels the
    /// subscriptions. Returns `false` if already running.
    pub async fn start(&self) -> bool {
        let mut watcher = self.watcher.lock();
        if watcher.is_some() {
            debug!("Sync engine already running");
            return false;
        }

        info!("Starting sync engine");
        let ctx = self.ctx.clone();
        *watcher = Some(tokio::spawn(connectivity_task(ctx)));
        true
    }

    /// Stop background sync. In-flight deliveries are abandoned between
    /// records; undelivered entries stay queued. Returns `false` if not
    /// running.
    pub async fn stop(&self) -> bool {
        let task = self.watcher.lock().take();
        match task {
            Some(task) => {
                info!("Stopping sync engine");
                task.abort();
                let _ = task.await;
                self.ctx.set_status(self.ctx.resting_status());
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.watcher.lock().is_some()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Mutations
    // ═══════════════════════════════════════════════════════════════════════

    /// Create a record. Keeps a revision marker the caller already set.
    pub async fn create<E: Entity>(&self, entity: E) -> SyncResult<E> {
        let entity = with_version(entity);
        self.commit(vec![upsert(Action::Create, entity.clone().into_record())?])?;
        Ok(entity)
    }

    /// Update (or upsert) a record, advancing its revision marker
    pub async fn update<E: Entity>(&self, entity: E) -> SyncResult<E> {
        let entity = touch(entity);
        self.commit(vec![upsert(Action::Update, entity.clone().into_record())?])?;
        Ok(entity)
    }

    /// Delete a record by id. Returns whether it existed locally; the
    /// delete is queued either way.
    pub async fn delete<E: Entity>(&self, id: &str) -> SyncResult<bool> {
        self.delete_record(E::COLLECTION, id).await
    }

    /// Save many records of one type in a single local transaction.
    ///
    /// Each record gets its own outbox entry and is delivered
    /// independently, so the remote may briefly hold only part of the
    /// batch.
    pub async fn bulk_save<E: Entity>(&self, entities: Vec<E>) -> SyncResult<Vec<E>> {
        let mut writes = Vec::with_capacity(entities.len());
        let mut saved = Vec::with_capacity(entities.len());
        for entity in entities {
            let exists = self.ctx.store.get_value(E::COLLECTION, entity.id())?.is_some();
            let (action, entity) = if exists {
                (Action::Update, touch(entity))
            } else {
                (Action::Create, with_version(entity))
            };
            writes.push(upsert(action, entity.clone().into_record())?);
            saved.push(entity);
        }
        self.commit(writes)?;
        Ok(saved)
    }

    /// Save a record of any collection: create when absent locally,
    /// update otherwise
    pub async fn save_record(&self, record: Record) -> SyncResult<Record> {
        let exists = self
            .ctx
            .store
            .get_value(record.collection(), record.id())?
            .is_some();
        let (action, record) = if exists {
            (Action::Update, touch_record(record))
        } else {
            (Action::Create, with_version_record(record))
        };
        self.commit(vec![upsert(action, record.clone())?])?;
        if record.collection() == Collection::Settings {
            self.ctx.emit(SyncEvent::SettingsChanged);
        }
        Ok(record)
    }

    /// Delete a record of any collection
    pub async fn delete_record(&self, collection: Collection, id: &str) -> SyncResult<bool> {
        if id.is_empty() {
            return Err(SyncError::InvalidOperation("empty document id".to_string()));
        }
        let existed = self.ctx.store.get_value(collection, id)?.is_some();
        self.commit(vec![LocalWrite::Delete {
            collection,
            id: id.to_string(),
        }])?;
        Ok(existed)
    }

    /// Replace the settings singleton and notify observers
    pub async fn update_settings(&self, mut settings: Settings) -> SyncResult<Settings> {
        settings.id = SETTINGS_ID.to_string();
        let exists = self.ctx.store.get_value(Collection::Settings, SETTINGS_ID)?.is_some();
        let action = if exists { Action::Update } else { Action::Create };
        let settings = touch(settings);
        self.commit(vec![upsert(action, settings.clone().into_record())?])?;
        self.ctx.emit(SyncEvent::SettingsChanged);
        Ok(settings)
    }

    /// Current settings, or the defaults if none were ever saved
    pub fn settings(&self) -> SyncResult<Settings> {
        Ok(self.ctx.store.get::<Settings>(SETTINGS_ID)?.unwrap_or_default())
    }

    /// Phase one: local write plus outbox append, atomically. Phase two
    /// (delivery) is kicked off in the background when allowed.
    fn commit(&self, writes: Vec<LocalWrite>) -> SyncResult<Vec<OutboxEntry>> {
        let entries = self.ctx.store.write_with_outbox(&writes)?;
        let pending = self.ctx.refresh_pending()?;
        debug!(entries = entries.len(), pending, "Committed local changes");
        self.propagate();
        Ok(entries)
    }

    fn propagate(&self) {
        if !self.config.push_on_write || !self.is_running() || !self.ctx.connectivity.is_online() {
            return;
        }
        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            if let Err(e) = ctx.drain().await {
                warn!(error = %e, "Background push failed");
            }
        });
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Reads
    // ═══════════════════════════════════════════════════════════════════════

    pub fn get<E: Entity>(&self, id: &str) -> SyncResult<Option<E>> {
        self.ctx.store.get(id)
    }

    pub fn all<E: Entity>(&self) -> SyncResult<Vec<E>> {
        self.ctx.store.all()
    }

    pub fn query<E: Entity>(&self, query: &Query) -> SyncResult<Vec<E>> {
        self.ctx.store.query(query)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Sync operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Drain the outbox now. Safe to call repeatedly and concurrently.
    pub async fn sync_pending_changes(&self) -> SyncResult<DrainReport> {
        self.ctx.drain().await
    }

    /// Merge a remote snapshot of `collection` into the local store.
    /// Returns the number of records written.
    pub fn apply_remote_snapshot(&self, collection: Collection, snapshot: &[Value]) -> SyncResult<usize> {
        self.ctx.merge_remote(collection, snapshot)
    }

    /// Fetch and merge every registered collection once
    pub async fn pull_once(&self) -> SyncResult<usize> {
        self.ctx.pull_once().await
    }

    /// Seed an empty remote from local data (at most once per engine)
    pub async fn bootstrap_if_needed(&self) -> SyncResult<bool> {
        self.ctx.bootstrap_if_needed().await
    }

    /// Remove delivered outbox entries
    pub fn purge_synced(&self) -> SyncResult<usize> {
        let purged = self.ctx.outbox.purge_synced()?;
        debug!(purged, "Purged synced outbox entries");
        Ok(purged)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Observability
    // ═══════════════════════════════════════════════════════════════════════

    /// Unsynced outbox entries as of the last enqueue or drain
    pub fn pending_count(&self) -> usize {
        self.ctx.pending_count()
    }

    /// Completion time of the last clean drain or merge
    pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        self.ctx.last_sync_at()
    }

    pub fn status(&self) -> SyncStatus {
        self.ctx.status()
    }

    /// Subscribe to sync events. Every subscriber sees every event.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.ctx.subscribe()
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        if let Some(task) = self.watcher.lock().take() {
            task.abort();
        }
    }
}

fn upsert(action: Action, record: Record) -> SyncResult<LocalWrite> {
    if record.id().is_empty() {
        return Err(SyncError::InvalidOperation(format!(
            "{} record has an empty id",
            record.collection()
        )));
    }
    Ok(LocalWrite::Upsert { action, record })
}

/// Follows connectivity for the engine's lifetime
async fn connectivity_task(ctx: Arc<SyncContext>) {
    let mut rx = ctx.connectivity.subscribe();
    let mut online = *rx.borrow_and_update();
    let mut pull = None;

    if online {
        pull = go_online(&ctx).await;
    } else {
        ctx.set_status(SyncStatus::Offline);
    }

    while rx.changed().await.is_ok() {
        let now_online = *rx.borrow_and_update();
        if now_online == online {
            continue;
        }
        online = now_online;
        ctx.emit(SyncEvent::ConnectivityChanged { online });

        if online {
            info!("Back online");
            pull = go_online(&ctx).await;
        } else {
            info!("Went offline, cancelling subscriptions");
            if let Some(handle) = pull.take() {
                handle.cancel();
            }
            ctx.set_status(SyncStatus::Offline);
        }
    }
}

/// Drain, seed if needed, then resubscribe (which reconciles via the
/// initial snapshots)
async fn go_online(ctx: &Arc<SyncContext>) -> Option<PullHandle> {
    if let Err(e) = ctx.drain().await {
        warn!(error = %e, "Drain on reconnect failed");
    }
    if let Err(e) = ctx.bootstrap_if_needed().await {
        warn!(error = %e, "Bootstrap failed, will retry on next reconnect");
    }
    match ctx.start_pull().await {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Could not subscribe to remote changes");
            ctx.set_status(SyncStatus::Error(e.to_string()));
            None
        }
    }
}
