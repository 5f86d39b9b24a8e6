//! In-process remote store

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::trace;

use super::{CollectionRef, RemoteError, RemoteRef, RemoteResult, RemoteStore, RemoteSubscription};

#[derive(Default)]
struct MemoryState {
    collections: HashMap<String, BTreeMap<String, Value>>,
    watchers: HashMap<String, Vec<mpsc::UnboundedSender<Vec<Value>>>>,
    offline: bool,
    fail_next: usize,
    set_calls: usize,
    remove_calls: usize,
}

impl MemoryState {
    /// Consume one injected failure, or fail if switched offline
    fn check_available(&mut self) -> RemoteResult<()> {
        if self.offline {
            return Err(RemoteError::Unavailable("remote is offline".to_string()));
        }
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(RemoteError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }

    fn snapshot(&self, path: &str) -> Vec<Value> {
        self.collections
            .get(path)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }

    fn notify(&mut self, path: &str) {
        let snapshot = self.snapshot(path);
        if let Some(watchers) = self.watchers.get_mut(path) {
            watchers.retain(|tx| tx.send(snapshot.clone()).is_ok());
            trace!(path, watchers = watchers.len(), "Notified watchers");
        }
    }
}

/// Remote store held entirely in memory.
///
/// Clones share the same state, so one clone can be handed to an engine
/// while a test keeps another to inspect or perturb it.
#[derive(Clone, Default)]
pub struct MemoryRemote {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch the store on or off. While off, every operation fails with
    /// [`RemoteError::Unavailable`].
    pub fn set_online(&self, online: bool) {
        self.state.lock().offline = !online;
    }

    pub fn is_online(&self) -> bool {
        !self.state.lock().offline
    }

    /// Make the next `count` operations fail with a transient error
    pub fn fail_next(&self, count: usize) {
        self.state.lock().fail_next = count;
    }

    /// Read one document without going through the contract
    pub fn document(&self, collection: &str, id: &str) -> Option<Value> {
        self.state
            .lock()
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id).cloned())
    }

    /// Current documents of a collection, ordered by id
    pub fn snapshot(&self, collection: &str) -> Vec<Value> {
        self.state.lock().snapshot(collection)
    }

    pub fn len(&self, collection: &str) -> usize {
        self.state
            .lock()
            .collections
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Write a document as another client would, notifying subscribers.
    /// The document must carry a string `id`.
    pub fn insert_direct(&self, collection: &str, value: Value) {
        let Some(id) = value.get("id").and_then(Value::as_str).map(str::to_string) else {
            return;
        };
        let mut state = self.state.lock();
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id, value);
        state.notify(collection);
    }

    /// Number of `set_data` calls that reached the store
    pub fn set_calls(&self) -> usize {
        self.state.lock().set_calls
    }

    /// Number of `remove_data` calls that reached the store
    pub fn remove_calls(&self) -> usize {
        self.state.lock().remove_calls
    }

    /// Live subscriptions on a collection
    pub fn watcher_count(&self, collection: &str) -> usize {
        let mut state = self.state.lock();
        match state.watchers.get_mut(collection) {
            Some(watchers) => {
                watchers.retain(|tx| !tx.is_closed());
                watchers.len()
            }
            None => 0,
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn set_data(&self, reference: &RemoteRef, value: Value) -> RemoteResult<()> {
        let mut state = self.state.lock();
        state.set_calls += 1;
        state.check_available()?;
        state
            .collections
            .entry(reference.collection.clone())
            .or_default()
            .insert(reference.id.clone(), value);
        state.notify(&reference.collection);
        Ok(())
    }

    async fn remove_data(&self, reference: &RemoteRef) -> RemoteResult<()> {
        let mut state = self.state.lock();
        state.remove_calls += 1;
        state.check_available()?;
        let removed = state
            .collections
            .get_mut(&reference.collection)
            .and_then(|docs| docs.remove(&reference.id))
            .is_some();
        if removed {
            state.notify(&reference.collection);
        }
        Ok(())
    }

    async fn get_all(&self, collection: &CollectionRef) -> RemoteResult<Vec<Value>> {
        let mut state = self.state.lock();
        state.check_available()?;
        Ok(state.snapshot(&collection.path))
    }

    async fn on_value(&self, collection: &CollectionRef) -> RemoteResult<RemoteSubscription> {
        let mut state = self.state.lock();
        state.check_available()?;
        let (tx, rx) = mpsc::unbounded_channel();
        // Initial snapshot; the receiver is still alive here
        let _ = tx.send(state.snapshot(&collection.path));
        state
            .watchers
            .entry(collection.path.clone())
            .or_default()
            .push(tx);
        Ok(RemoteSubscription::new(collection.clone(), rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_remove() {
        let remote = MemoryRemote::new();
        let reference = RemoteRef::new("todos", "t1");

        remote
            .set_data(&reference, json!({"id": "t1", "updatedAt": 1000}))
            .await
            .unwrap();
        assert_eq!(remote.document("todos", "t1").unwrap()["updatedAt"], 1000);

        let all = remote.get_all(&CollectionRef::new("todos")).await.unwrap();
        assert_eq!(all.len(), 1);

        remote.remove_data(&reference).await.unwrap();
        assert!(remote.document("todos", "t1").is_none());

        // Removing an absent document is fine
        remote.remove_data(&reference).await.unwrap();
    }

    #[tokio::test]
    async fn test_offline_fails_every_operation() {
        let remote = MemoryRemote::new();
        remote.set_online(false);

        let result = remote
            .set_data(&RemoteRef::new("todos", "t1"), json!({"id": "t1"}))
            .await;
        assert!(matches!(result, Err(RemoteError::Unavailable(_))));
        assert!(remote.get_all(&CollectionRef::new("todos")).await.is_err());
        assert!(remote.on_value(&CollectionRef::new("todos")).await.is_err());
    }

    #[tokio::test]
    async fn test_fail_next_is_consumed() {
        let remote = MemoryRemote::new();
        remote.fail_next(2);
        let reference = RemoteRef::new("todos", "t1");

        assert!(remote.set_data(&reference, json!({"id": "t1"})).await.is_err());
        assert!(remote.set_data(&reference, json!({"id": "t1"})).await.is_err());
        assert!(remote.set_data(&reference, json!({"id": "t1"})).await.is_ok());
        assert_eq!(remote.set_calls(), 3);
    }

    #[tokio::test]
    async fn test_subscription_gets_initial_and_change_snapshots() {
        let remote = MemoryRemote::new();
        remote.insert_direct("users", json!({"id": "u1"}));

        let mut sub = remote.on_value(&CollectionRef::new("users")).await.unwrap();
        assert_eq!(sub.next_snapshot().await.unwrap().len(), 1);

        remote.insert_direct("users", json!({"id": "u2"}));
        assert_eq!(sub.next_snapshot().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_subscription_is_pruned() {
        let remote = MemoryRemote::new();
        let sub = remote.on_value(&CollectionRef::new("users")).await.unwrap();
        assert_eq!(remote.watcher_count("users"), 1);

        sub.cancel();
        assert_eq!(remote.watcher_count("users"), 0);
    }
}
