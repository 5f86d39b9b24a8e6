//! Directory-backed remote store
//!
//! Layout: `<root>/<collection>/<id>.json`, one pretty-printed document per
//! file. Change notifications only reach subscribers in the same process;
//! other processes see changes on their next `get_all` or subscribe.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{CollectionRef, RemoteError, RemoteRef, RemoteResult, RemoteStore, RemoteSubscription};

type Watchers = HashMap<String, Vec<mpsc::UnboundedSender<Vec<Value>>>>;

#[derive(Clone)]
pub struct DirRemote {
    root: PathBuf,
    watchers: Arc<Mutex<Watchers>>,
}

impl DirRemote {
    /// Use `root` as the remote store, creating it if needed
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            watchers: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, path: &str) -> RemoteResult<PathBuf> {
        check_segment(path)?;
        Ok(self.root.join(path))
    }

    fn document_path(&self, reference: &RemoteRef) -> RemoteResult<PathBuf> {
        check_segment(&reference.id)?;
        Ok(self
            .collection_dir(&reference.collection)?
            .join(format!("{}.json", reference.id)))
    }

    fn read_collection(&self, path: &str) -> RemoteResult<Vec<Value>> {
        let dir = self.collection_dir(path)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)
            .map_err(unavailable)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();

        let mut documents = Vec::with_capacity(files.len());
        for file in files {
            let bytes = std::fs::read(&file).map_err(unavailable)?;
            match serde_json::from_slice(&bytes) {
                Ok(value) => documents.push(value),
                Err(e) => warn!(file = %file.display(), error = %e, "Skipping unreadable document"),
            }
        }
        Ok(documents)
    }

    fn notify(&self, path: &str) {
        let mut watchers = self.watchers.lock();
        let Some(list) = watchers.get_mut(path) else {
            return;
        };
        match self.read_collection(path) {
            Ok(snapshot) => list.retain(|tx| tx.send(snapshot.clone()).is_ok()),
            Err(e) => warn!(path, error = %e, "Could not read collection for notification"),
        }
    }
}

/// Reject names that would escape the collection directory
fn check_segment(segment: &str) -> RemoteResult<()> {
    if segment.is_empty()
        || segment.contains(['/', '\\'])
        || segment == "."
        || segment == ".."
    {
        return Err(RemoteError::Rejected(format!("invalid path segment '{segment}'")));
    }
    Ok(())
}

fn unavailable(err: std::io::Error) -> RemoteError {
    RemoteError::Unavailable(err.to_string())
}

#[async_trait]
impl RemoteStore for DirRemote {
    async fn set_data(&self, reference: &RemoteRef, value: Value) -> RemoteResult<()> {
        let path = self.document_path(reference)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(unavailable)?;
        }
        let bytes = serde_json::to_vec_pretty(&value)
            .map_err(|e| RemoteError::Rejected(e.to_string()))?;

        // Write-then-rename so readers never see a torn document
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes).map_err(unavailable)?;
        std::fs::rename(&tmp, &path).map_err(unavailable)?;

        debug!(%reference, "Wrote remote document");
        self.notify(&reference.collection);
        Ok(())
    }

    async fn remove_data(&self, reference: &RemoteRef) -> RemoteResult<()> {
        let path = self.document_path(reference)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(%reference, "Removed remote document");
                self.notify(&reference.collection);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(unavailable(e)),
        }
    }

    async fn get_all(&self, collection: &CollectionRef) -> RemoteResult<Vec<Value>> {
        self.read_collection(&collection.path)
    }

    async fn on_value(&self, collection: &CollectionRef) -> RemoteResult<RemoteSubscription> {
        let snapshot = self.read_collection(&collection.path)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(snapshot);
        self.watchers
            .lock()
            .entry(collection.path.clone())
            .or_default()
            .push(tx);
        Ok(RemoteSubscription::new(collection.clone(), rx))
    }
}
