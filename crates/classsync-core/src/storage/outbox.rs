//! Durable outbox of pending local mutations
//!
//! Every local create, update and delete appends one entry in the same
//! transaction as the record write. The push path drains unsynced
//! entries in sequence order and marks each one synced only after the
//! remote acknowledged it.
//!
//! Sequence numbers come from a persisted counter, so they are strictly
//! increasing for the lifetime of the store and never reused after a
//! purge.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SyncError, SyncResult};
use crate::types::{now_millis, Collection, Record};

/// Entries keyed by sequence (value: entry JSON)
pub(crate) const OUTBOX_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("outbox");

/// Outbox bookkeeping (the next sequence number to hand out)
pub(crate) const OUTBOX_META_TABLE: TableDefinition<&str, u64> =
    TableDefinition::new("outbox_meta");

const NEXT_SEQUENCE_KEY: &str = "next_sequence";

/// Kind of local mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Create => write!(f, "create"),
            Action::Update => write!(f, "update"),
            Action::Delete => write!(f, "delete"),
        }
    }
}

/// One pending (or delivered) mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEntry {
    pub sequence: u64,
    pub action: Action,
    /// Collection name as written; resolved against the registry at push time
    pub collection: String,
    pub document_id: String,
    /// Full record for create/update, absent for delete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
    pub enqueued_at: i64,
    pub synced: bool,
}

impl OutboxEntry {
    /// Decode the payload record, if any
    pub fn payload(&self) -> SyncResult<Option<Record>> {
        self.payload
            .clone()
            .map(serde_json::from_value)
            .transpose()
            .map_err(Into::into)
    }

    /// Bare entity JSON as it should appear on the remote
    pub(crate) fn remote_value(&self) -> SyncResult<Option<Value>> {
        match self.payload()? {
            Some(record) => Ok(Some(record.to_value()?)),
            None => Ok(None),
        }
    }
}

fn validate(
    action: Action,
    collection: &str,
    document_id: &str,
    payload: Option<&Record>,
) -> SyncResult<()> {
    if document_id.is_empty() {
        return Err(SyncError::InvalidOperation(
            "outbox entry needs a document id".to_string(),
        ));
    }
    match (action, payload) {
        (Action::Delete, Some(_)) => Err(SyncError::InvalidOperation(
            "delete entries carry no payload".to_string(),
        )),
        (Action::Delete, None) => Ok(()),
        (_, None) => Err(SyncError::InvalidOperation(format!(
            "{action} entry for {collection}/{document_id} has no payload"
        ))),
        (_, Some(record)) => {
            if record.collection().as_str() != collection || record.id() != document_id {
                return Err(SyncError::InvalidOperation(format!(
                    "payload {}/{} does not match entry {collection}/{document_id}",
                    record.collection(),
                    record.id()
                )));
            }
            Ok(())
        }
    }
}

/// Append an entry inside an open write transaction
pub(crate) fn append(
    txn: &WriteTransaction,
    action: Action,
    collection: &str,
    document_id: &str,
    payload: Option<&Record>,
) -> SyncResult<OutboxEntry> {
    validate(action, collection, document_id, payload)?;

    let sequence = {
        let mut meta = txn.open_table(OUTBOX_META_TABLE)?;
        let next = meta.get(NEXT_SEQUENCE_KEY)?.map(|v| v.value()).unwrap_or(1);
        meta.insert(NEXT_SEQUENCE_KEY, next + 1)?;
        next
    };

    let entry = OutboxEntry {
        sequence,
        action,
        collection: collection.to_string(),
        document_id: document_id.to_string(),
        payload: payload.map(serde_json::to_value).transpose()?,
        enqueued_at: now_millis(),
        synced: false,
    };

    let mut table = txn.open_table(OUTBOX_TABLE)?;
    let bytes = serde_json::to_vec(&entry)?;
    table.insert(sequence, bytes.as_slice())?;
    Ok(entry)
}

/// Document ids of `collection` that still have an unsynced entry, read
/// inside an open write transaction
pub(crate) fn pending_ids(txn: &WriteTransaction, collection: &str) -> SyncResult<HashSet<String>> {
    let table = txn.open_table(OUTBOX_TABLE)?;
    let mut ids = HashSet::new();
    for item in table.iter()? {
        let (_, value) = item?;
        let entry: OutboxEntry = serde_json::from_slice(value.value())?;
        if !entry.synced && entry.collection == collection {
            ids.insert(entry.document_id);
        }
    }
    Ok(ids)
}

/// Handle to the outbox tables of a [`LocalStore`](super::LocalStore)
#[derive(Clone)]
pub struct Outbox {
    db: Arc<RwLock<Database>>,
}

impl Outbox {
    pub(crate) fn new(db: Arc<RwLock<Database>>) -> Self {
        Self { db }
    }

    /// Append one entry in its own transaction
    pub fn enqueue(
        &self,
        action: Action,
        collection: Collection,
        document_id: &str,
        payload: Option<Record>,
    ) -> SyncResult<OutboxEntry> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        let entry = append(
            &write_txn,
            action,
            collection.as_str(),
            document_id,
            payload.as_ref(),
        )?;
        write_txn.commit()?;
        Ok(entry)
    }

    /// Every entry, synced or not, in sequence order
    pub fn entries(&self) -> SyncResult<Vec<OutboxEntry>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(OUTBOX_TABLE)?;

        let mut entries = Vec::new();
        for item in table.iter()? {
            let (_, value) = item?;
            entries.push(serde_json::from_slice(value.value())?);
        }
        Ok(entries)
    }

    /// Unsynced entries, oldest first
    pub fn pending(&self) -> SyncResult<Vec<OutboxEntry>> {
        Ok(self.entries()?.into_iter().filter(|e| !e.synced).collect())
    }

    pub fn pending_count(&self) -> SyncResult<usize> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(OUTBOX_TABLE)?;

        let mut count = 0;
        for item in table.iter()? {
            let (_, value) = item?;
            let entry: OutboxEntry = serde_json::from_slice(value.value())?;
            if !entry.synced {
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn get(&self, sequence: u64) -> SyncResult<Option<OutboxEntry>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(OUTBOX_TABLE)?;

        match table.get(sequence)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Flag entries as delivered. Returns how many changed state.
    pub fn mark_synced(&self, sequences: &[u64]) -> SyncResult<usize> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        let mut changed = 0;
        {
            let mut table = write_txn.open_table(OUTBOX_TABLE)?;
            for &sequence in sequences {
                let stored: Option<OutboxEntry> = match table.get(sequence)? {
                    Some(value) => Some(serde_json::from_slice(value.value())?),
                    None => None,
                };
                if let Some(mut entry) = stored.filter(|e| !e.synced) {
                    entry.synced = true;
                    let bytes = serde_json::to_vec(&entry)?;
                    table.insert(sequence, bytes.as_slice())?;
                    changed += 1;
                }
            }
        }
        write_txn.commit()?;
        Ok(changed)
    }

    /// Delete delivered entries. Returns how many were removed.
    pub fn purge_synced(&self) -> SyncResult<usize> {
        let synced: Vec<u64> = self
            .entries()?
            .into_iter()
            .filter(|e| e.synced)
            .map(|e| e.sequence)
            .collect();

        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(OUTBOX_TABLE)?;
            for sequence in &synced {
                table.remove(*sequence)?;
            }
        }
        write_txn.commit()?;
        Ok(synced.len())
    }
}
