//! End-to-end sync tests against the in-memory remote
//!
//! Each test builds a full SyncEngine over a temporary redb file and a
//! MemoryRemote that the test keeps a clone of, so it can inspect remote
//! state or play the part of another device.

use std::sync::Arc;
use std::time::Duration;

use classsync_core::{
    AttendanceRecord, AttendanceStatus, Collection, CollectionRegistry, EngineConfig,
    MemoryRemote, Role, RetryPolicy, Settings, SyncEngine, SyncEvent, SyncStatus, Todo, User,
};
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::broadcast;

fn test_config() -> EngineConfig {
    EngineConfig::default().with_retry(RetryPolicy::new(3, Duration::ZERO))
}

fn create_engine(dir: &TempDir, remote: &MemoryRemote, registry: CollectionRegistry) -> SyncEngine {
    SyncEngine::open(
        dir.path().join("classsync.redb"),
        Arc::new(remote.clone()),
        registry,
        test_config(),
    )
    .unwrap()
}

fn setup() -> (SyncEngine, MemoryRemote, TempDir) {
    let dir = TempDir::new().unwrap();
    let remote = MemoryRemote::new();
    let engine = create_engine(&dir, &remote, CollectionRegistry::standard());
    (engine, remote, dir)
}

/// Poll `condition` for up to two seconds
async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

fn drain_events(rx: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn todo(id: &str, updated_at: Option<i64>) -> Todo {
    let mut todo = Todo::new("HW1");
    todo.id = id.to_string();
    todo.updated_at = updated_at;
    todo
}

// ============================================================================
// Push Path
// ============================================================================

#[tokio::test]
async fn test_offline_create_delivered_on_reconnect() {
    let (engine, remote, _dir) = setup();
    engine.connectivity().set_online(false);
    engine.start().await;

    engine.create(todo("t1", Some(1000))).await.unwrap();
    assert_eq!(engine.pending_count(), 1);
    let pending = engine.outbox().pending().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].collection, "todos");
    assert_eq!(pending[0].document_id, "t1");
    assert!(remote.document("todos", "t1").is_none());

    engine.connectivity().set_online(true);
    assert!(wait_until(|| engine.pending_count() == 0).await);

    let delivered = remote.document("todos", "t1").unwrap();
    assert_eq!(delivered["updatedAt"], 1000);
    assert_eq!(delivered["title"], "HW1");
    assert!(engine.outbox().pending().unwrap().is_empty());

    engine.stop().await;
}

#[tokio::test]
async fn test_create_then_delete_offline_drains_in_order() {
    let (engine, remote, _dir) = setup();
    engine.connectivity().set_online(false);

    engine.create(todo("t1", Some(1000))).await.unwrap();
    assert!(engine.delete::<Todo>("t1").await.unwrap());
    assert_eq!(engine.pending_count(), 2);

    engine.connectivity().set_online(true);
    let report = engine.sync_pending_changes().await.unwrap();

    assert_eq!(report.delivered, 2);
    assert!(remote.document("todos", "t1").is_none());
    assert_eq!(remote.set_calls(), 1);
    assert_eq!(remote.remove_calls(), 1);
    assert!(engine.get::<Todo>("t1").unwrap().is_none());
}

/// A delete queued behind a create that could not be delivered must not
/// reach the remote first, or the retried create would bring the record back
#[tokio::test]
async fn test_failed_create_does_not_resurrect_deleted_record() {
    let (engine, remote, _dir) = setup();
    engine.create(todo("t1", Some(1000))).await.unwrap();
    assert!(engine.delete::<Todo>("t1").await.unwrap());

    remote.fail_next(3);
    let report = engine.sync_pending_changes().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.deferred, 1);
    assert_eq!(report.pending_after, 2);
    assert_eq!(remote.remove_calls(), 0);

    let report = engine.sync_pending_changes().await.unwrap();
    assert_eq!(report.delivered, 2);
    assert!(report.is_clean());
    assert!(remote.document("todos", "t1").is_none());
    assert!(engine.get::<Todo>("t1").unwrap().is_none());
}

#[tokio::test]
async fn test_many_entries_drain_completely() {
    let (engine, remote, _dir) = setup();
    for i in 0..25 {
        engine.create(todo(&format!("t{i:02}"), Some(i))).await.unwrap();
    }
    assert_eq!(engine.pending_count(), 25);

    let report = engine.sync_pending_changes().await.unwrap();
    assert_eq!(report.delivered, 25);
    assert_eq!(report.pending_after, 0);
    assert_eq!(remote.len("todos"), 25);
    assert_eq!(remote.document("todos", "t07").unwrap()["updatedAt"], 7);
    assert!(engine.last_sync_at().is_some());
}

#[tokio::test]
async fn test_second_drain_does_not_redeliver() {
    let (engine, remote, _dir) = setup();
    engine.create(todo("t1", Some(1))).await.unwrap();

    engine.sync_pending_changes().await.unwrap();
    let report = engine.sync_pending_changes().await.unwrap();

    assert_eq!(report.delivered, 0);
    assert_eq!(remote.set_calls(), 1);
}

#[tokio::test]
async fn test_concurrent_drains_deliver_once() {
    let (engine, remote, _dir) = setup();
    for i in 0..5 {
        engine.create(todo(&format!("t{i}"), Some(1))).await.unwrap();
    }

    let (a, b) = tokio::join!(engine.sync_pending_changes(), engine.sync_pending_changes());
    assert_eq!(a.unwrap().delivered + b.unwrap().delivered, 5);
    assert_eq!(remote.set_calls(), 5);
}

#[tokio::test]
async fn test_concurrent_mutations_each_get_an_entry() {
    let (engine, remote, _dir) = setup();
    let creates = (0..10).map(|i| engine.create(todo(&format!("c{i}"), Some(i))));
    let results = futures::future::join_all(creates).await;
    assert!(results.iter().all(Result::is_ok));

    let sequences: Vec<u64> = engine.outbox().pending().unwrap().iter().map(|e| e.sequence).collect();
    assert_eq!(sequences.len(), 10);
    assert!(sequences.windows(2).all(|w| w[0] < w[1]));

    engine.sync_pending_changes().await.unwrap();
    assert_eq!(remote.len("todos"), 10);
}

#[tokio::test]
async fn test_bulk_save_is_delivered_per_record() {
    let (engine, remote, _dir) = setup();
    let day: Vec<_> = ["s1", "s2", "s3"]
        .iter()
        .map(|s| AttendanceRecord::new(*s, "2026-10-16", AttendanceStatus::Present))
        .collect();

    let saved = engine.bulk_save(day).await.unwrap();
    assert_eq!(saved.len(), 3);
    assert_eq!(engine.pending_count(), 3);

    // First record exhausts its retries; the rest still go out
    remote.fail_next(3);
    let report = engine.sync_pending_changes().await.unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(remote.len("attendance"), 2);
    assert!(matches!(engine.status(), SyncStatus::Error(_)));

    let report = engine.sync_pending_changes().await.unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(remote.len("attendance"), 3);
    assert_eq!(engine.status(), SyncStatus::Idle);
}

#[tokio::test]
async fn test_unresolved_collection_is_never_dropped() {
    let dir = TempDir::new().unwrap();
    let remote = MemoryRemote::new();

    {
        let registry = CollectionRegistry::standard().without(Collection::Todos);
        let engine = create_engine(&dir, &remote, registry);
        let mut events = engine.subscribe();
        engine.create(todo("t1", Some(1))).await.unwrap();

        for _ in 0..2 {
            let report = engine.sync_pending_changes().await.unwrap();
            assert_eq!(report.unresolved, 1);
            assert_eq!(report.pending_after, 1);
        }
        assert!(remote.is_empty("todos"));
        let unresolved = drain_events(&mut events)
            .into_iter()
            .filter(|e| matches!(e, SyncEvent::UnresolvedCollection { .. }))
            .count();
        assert_eq!(unresolved, 2);
    }

    // Once the mapping exists the stalled entry goes out
    let engine = create_engine(&dir, &remote, CollectionRegistry::standard());
    assert_eq!(engine.pending_count(), 1);
    let report = engine.sync_pending_changes().await.unwrap();
    assert_eq!(report.delivered, 1);
    assert!(remote.document("todos", "t1").is_some());
}

#[tokio::test]
async fn test_pending_survives_restart() {
    let dir = TempDir::new().unwrap();
    let remote = MemoryRemote::new();

    {
        let engine = create_engine(&dir, &remote, CollectionRegistry::standard());
        engine.connectivity().set_online(false);
        engine.create(todo("t1", Some(1))).await.unwrap();
        engine.create(todo("t2", Some(1))).await.unwrap();
    }

    let engine = create_engine(&dir, &remote, CollectionRegistry::standard());
    assert_eq!(engine.pending_count(), 2);
    engine.sync_pending_changes().await.unwrap();
    assert_eq!(remote.len("todos"), 2);
}

// ============================================================================
// Retry
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried() {
    let dir = TempDir::new().unwrap();
    let remote = MemoryRemote::new();
    let engine = SyncEngine::open(
        dir.path().join("classsync.redb"),
        Arc::new(remote.clone()),
        CollectionRegistry::standard(),
        EngineConfig::default(),
    )
    .unwrap();
    engine.create(todo("t1", Some(1))).await.unwrap();

    remote.fail_next(2);
    let report = engine.sync_pending_changes().await.unwrap();

    assert_eq!(report.delivered, 1);
    assert_eq!(remote.set_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_keep_entry_pending() {
    let dir = TempDir::new().unwrap();
    let remote = MemoryRemote::new();
    let engine = SyncEngine::open(
        dir.path().join("classsync.redb"),
        Arc::new(remote.clone()),
        CollectionRegistry::standard(),
        EngineConfig::default(),
    )
    .unwrap();
    let mut events = engine.subscribe();
    engine.create(todo("t1", Some(1))).await.unwrap();

    remote.fail_next(3);
    let report = engine.sync_pending_changes().await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.pending_after, 1);
    assert_eq!(remote.set_calls(), 3);
    assert!(engine.last_sync_at().is_none());
    assert!(drain_events(&mut events)
        .iter()
        .any(|e| matches!(e, SyncEvent::DeliveryFailed { document_id, .. } if document_id == "t1")));
}

// ============================================================================
// Pull Path
// ============================================================================

#[tokio::test]
async fn test_newer_remote_record_replaces_local() {
    let (engine, _remote, _dir) = setup();
    let mut user = User::new("Old name", "u1@school.edu", Role::Student);
    user.id = "u1".to_string();
    user.updated_at = Some(1500);
    engine.store().put(&user).unwrap();

    let written = engine
        .apply_remote_snapshot(
            Collection::Users,
            &[json!({"id": "u1", "name": "New name", "email": "u1@school.edu", "updatedAt": 2000})],
        )
        .unwrap();

    assert_eq!(written, 1);
    let merged: User = engine.get("u1").unwrap().unwrap();
    assert_eq!(merged.updated_at, Some(2000));
    assert_eq!(merged.name, "New name");
}

#[tokio::test]
async fn test_older_remote_record_is_ignored() {
    let (engine, _remote, _dir) = setup();
    let mut user = User::new("Local", "u1@school.edu", Role::Student);
    user.id = "u1".to_string();
    user.updated_at = Some(2000);
    engine.store().put(&user).unwrap();

    engine
        .apply_remote_snapshot(
            Collection::Users,
            &[json!({"id": "u1", "name": "Remote", "email": "u1@school.edu", "updatedAt": 1500})],
        )
        .unwrap();

    let kept: User = engine.get("u1").unwrap().unwrap();
    assert_eq!(kept.updated_at, Some(2000));
    assert_eq!(kept.name, "Local");
}

/// A local delete still waiting in the outbox wins over a snapshot taken
/// before the delete reached the remote
#[tokio::test]
async fn test_snapshot_does_not_undo_queued_delete() {
    let (engine, remote, _dir) = setup();
    engine.create(todo("t1", Some(1000))).await.unwrap();
    engine.sync_pending_changes().await.unwrap();
    assert!(remote.document("todos", "t1").is_some());

    assert!(engine.delete::<Todo>("t1").await.unwrap());
    let written = engine
        .apply_remote_snapshot(Collection::Todos, &remote.snapshot("todos"))
        .unwrap();
    assert_eq!(written, 0);
    assert!(engine.get::<Todo>("t1").unwrap().is_none());

    let report = engine.sync_pending_changes().await.unwrap();
    assert_eq!(report.delivered, 1);
    assert!(remote.document("todos", "t1").is_none());
    assert!(engine.get::<Todo>("t1").unwrap().is_none());
}

#[tokio::test]
async fn test_same_snapshot_twice_is_noop() {
    let (engine, _remote, _dir) = setup();
    let snapshot = vec![
        json!({"id": "t1", "title": "A", "updatedAt": 10}),
        json!({"id": "t2", "title": "B", "updatedAt": 20}),
    ];

    assert_eq!(engine.apply_remote_snapshot(Collection::Todos, &snapshot).unwrap(), 2);
    let after_first = engine.store().all_values(Collection::Todos).unwrap();
    assert_eq!(engine.apply_remote_snapshot(Collection::Todos, &snapshot).unwrap(), 0);
    assert_eq!(engine.store().all_values(Collection::Todos).unwrap(), after_first);
}

#[tokio::test]
async fn test_remote_changes_stream_in_while_running() {
    let (engine, remote, _dir) = setup();
    engine.start().await;
    assert!(wait_until(|| remote.watcher_count("todos") == 1).await);

    remote.insert_direct("todos", json!({"id": "r1", "title": "From tablet", "updatedAt": 5}));
    assert!(wait_until(|| engine.get::<Todo>("r1").unwrap().is_some()).await);

    engine.stop().await;
}

#[tokio::test]
async fn test_going_offline_cancels_subscriptions() {
    let (engine, remote, _dir) = setup();
    engine.start().await;
    assert!(wait_until(|| remote.watcher_count("users") == 1).await);

    engine.connectivity().set_online(false);
    assert!(wait_until(|| remote.watcher_count("users") == 0).await);
    assert!(wait_until(|| engine.status() == SyncStatus::Offline).await);

    // Reconnecting resubscribes and reconciles what was missed
    remote.insert_direct("todos", json!({"id": "m1", "title": "Missed", "updatedAt": 3}));
    engine.connectivity().set_online(true);
    assert!(wait_until(|| engine.get::<Todo>("m1").unwrap().is_some()).await);
    assert!(wait_until(|| remote.watcher_count("users") == 1).await);

    engine.stop().await;
}

#[tokio::test]
async fn test_pull_once_reconciles_every_collection() {
    let (engine, remote, _dir) = setup();
    remote.insert_direct("users", json!({"id": "u1", "name": "A", "email": "a@x", "updatedAt": 1}));
    remote.insert_direct("schedule", json!({
        "id": "mon-1", "title": "Math", "day": "monday",
        "startTime": "08:00", "endTime": "08:45", "updatedAt": 1
    }));

    assert_eq!(engine.pull_once().await.unwrap(), 2);
    assert!(engine.get::<User>("u1").unwrap().is_some());
}

// ============================================================================
// Settings Signal
// ============================================================================

#[tokio::test]
async fn test_local_settings_update_signals_once() {
    let (engine, remote, _dir) = setup();
    engine.start().await;
    assert!(wait_until(|| remote.watcher_count("settings") == 1).await);
    let mut events = engine.subscribe();

    let mut settings = Settings::default();
    settings.class_name = "10A2".to_string();
    engine.update_settings(settings).await.unwrap();

    // Wait for the push and its echo back through the subscription
    assert!(wait_until(|| remote.document("settings", "app-settings").is_some()).await);
    assert!(wait_until(|| engine.pending_count() == 0).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let signals = drain_events(&mut events)
        .into_iter()
        .filter(|e| *e == SyncEvent::SettingsChanged)
        .count();
    assert_eq!(signals, 1);

    engine.stop().await;
}

#[tokio::test]
async fn test_remote_settings_merge_signals_once() {
    let (engine, remote, _dir) = setup();
    engine.start().await;
    assert!(wait_until(|| remote.watcher_count("settings") == 1).await);
    let mut events = engine.subscribe();

    remote.insert_direct(
        "settings",
        json!({"id": "app-settings", "className": "11B", "theme": "dark", "updatedAt": 77}),
    );
    assert!(wait_until(|| engine.settings().unwrap().class_name == "11B").await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let signals = drain_events(&mut events)
        .into_iter()
        .filter(|e| *e == SyncEvent::SettingsChanged)
        .count();
    assert_eq!(signals, 1);
    assert_eq!(engine.settings().unwrap().theme, "dark");

    engine.stop().await;
}

// ============================================================================
// Bootstrap Seed
// ============================================================================

#[tokio::test]
async fn test_bootstrap_seeds_empty_remote_once_per_session() {
    let (engine, remote, _dir) = setup();
    let mut teacher = User::new("Ms. Hoa", "hoa@school.edu", Role::Teacher);
    teacher.id = "u1".to_string();
    engine.store().put(&teacher).unwrap();
    engine.store().put(&todo("t1", Some(1))).unwrap();
    let mut events = engine.subscribe();

    engine.start().await;
    assert!(wait_until(|| remote.document("todos", "t1").is_some()).await);
    assert!(remote.document("users", "u1").is_some());

    // Reconnect must not seed again
    engine.connectivity().set_online(false);
    assert!(wait_until(|| engine.status() == SyncStatus::Offline).await);
    engine.connectivity().set_online(true);
    assert!(wait_until(|| remote.watcher_count("users") == 1).await);

    let completed = drain_events(&mut events)
        .into_iter()
        .filter(|e| matches!(e, SyncEvent::BootstrapCompleted { .. }))
        .count();
    assert_eq!(completed, 1);
    assert!(!engine.bootstrap_if_needed().await.unwrap());

    engine.stop().await;
}

#[tokio::test]
async fn test_bootstrap_skipped_when_remote_has_users() {
    let (engine, remote, _dir) = setup();
    remote.insert_direct("users", json!({"id": "u9", "name": "Admin", "email": "admin@x"}));
    engine.store().put(&todo("local-only", Some(1))).unwrap();

    assert!(!engine.bootstrap_if_needed().await.unwrap());
    assert!(remote.document("todos", "local-only").is_none());
}
