//! Remote realtime store contract
//!
//! The engine depends only on four operations: full overwrite of one
//! document, removal of one document, reading a whole collection, and a
//! subscription that yields the full collection snapshot on every change.
//! Transport and wire format belong to the implementation.
//!
//! ## Implementations
//!
//! - [`MemoryRemote`]: in-process store with an online switch and failure
//!   injection. Used by tests and when embedding two engines in one process.
//! - [`DirRemote`]: one JSON file per document under a directory. Used by
//!   the CLI, so several data directories can share one "remote".

mod dir;
mod memory;

pub use dir::DirRemote;
pub use memory::MemoryRemote;

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors reported by a remote store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Transport failure; worth retrying
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    /// The store refused the operation
    #[error("remote rejected operation: {0}")]
    Rejected(String),

    /// The store was shut down
    #[error("remote closed")]
    Closed,
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Address of one document in the remote store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteRef {
    pub collection: String,
    pub id: String,
}

impl RemoteRef {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// `collection/id`
    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.id)
    }
}

impl fmt::Display for RemoteRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Address of a whole collection in the remote store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionRef {
    pub path: String,
}

impl CollectionRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Long-lived change feed for one collection.
///
/// Yields the full collection snapshot (never a diff): once on subscribe,
/// then after every change. Dropping or [`cancel`](Self::cancel)ing the
/// subscription detaches it from the store.
pub struct RemoteSubscription {
    collection: CollectionRef,
    rx: mpsc::UnboundedReceiver<Vec<Value>>,
}

impl RemoteSubscription {
    /// Build a subscription around a snapshot channel fed by the store
    pub fn new(collection: CollectionRef, rx: mpsc::UnboundedReceiver<Vec<Value>>) -> Self {
        Self { collection, rx }
    }

    pub fn collection(&self) -> &CollectionRef {
        &self.collection
    }

    /// Wait for the next snapshot. `None` once the store or the
    /// subscription is closed.
    pub async fn next_snapshot(&mut self) -> Option<Vec<Value>> {
        self.rx.recv().await
    }

    /// Stop receiving. Snapshots already buffered are discarded.
    pub fn cancel(mut self) {
        self.rx.close();
    }
}

impl fmt::Debug for RemoteSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSubscription")
            .field("collection", &self.collection)
            .finish()
    }
}

/// The four-operation contract the sync engine needs from a remote store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Full overwrite of one document
    async fn set_data(&self, reference: &RemoteRef, value: Value) -> RemoteResult<()>;

    /// Remove one document. Removing an absent document succeeds.
    async fn remove_data(&self, reference: &RemoteRef) -> RemoteResult<()>;

    /// Every document currently in the collection
    async fn get_all(&self, collection: &CollectionRef) -> RemoteResult<Vec<Value>>;

    /// Subscribe to full-snapshot notifications for the collection
    async fn on_value(&self, collection: &CollectionRef) -> RemoteResult<RemoteSubscription>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_ref_path() {
        let reference = RemoteRef::new("todos", "t1");
        assert_eq!(reference.path(), "todos/t1");
        assert_eq!(reference.to_string(), "todos/t1");
    }

    #[tokio::test]
    async fn test_subscription_yields_then_closes() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut sub = RemoteSubscription::new(CollectionRef::new("todos"), rx);

        tx.send(vec![serde_json::json!({"id": "t1"})]).unwrap();
        drop(tx);

        let snapshot = sub.next_snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(sub.next_snapshot().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_closes_sender_side() {
        let (tx, rx) = mpsc::unbounded_channel::<Vec<Value>>();
        let sub = RemoteSubscription::new(CollectionRef::new("todos"), rx);
        sub.cancel();
        assert!(tx.send(Vec::new()).is_err());
    }
}
