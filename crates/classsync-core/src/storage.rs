//! Local store using redb.
//!
//! Layout, all in one database file:
//! - one table per collection (key: document id, value: entity JSON)
//! - one secondary index table per collection (see [`index`])
//! - the outbox and its sequence counter (see [`Outbox`])
//! - the session slot holding the logged-in user
//!
//! Every public write is a single redb write transaction, so a `put`,
//! `bulk_put` or `delete` is atomic as a unit and concurrent writers are
//! serialized by the database. Nothing here touches the outbox or the
//! remote store unless the caller asks for it explicitly.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::types::{Collection, Entity, Record};

mod index;
mod outbox;
mod query;
mod session;

pub use index::IndexValue;
pub use outbox::{Action, Outbox, OutboxEntry};
pub use query::{Filter, Order, Query};

use outbox::{pending_ids, OUTBOX_META_TABLE, OUTBOX_TABLE};
use session::SESSION_TABLE;

fn records_table(collection: Collection) -> TableDefinition<'static, &'static str, &'static [u8]> {
    TableDefinition::new(collection.table_name())
}

fn index_table(collection: Collection) -> TableDefinition<'static, &'static str, ()> {
    TableDefinition::new(collection.index_table_name())
}

/// One local change to apply together with its outbox entry
#[derive(Debug, Clone)]
pub(crate) enum LocalWrite {
    Upsert { action: Action, record: Record },
    Delete { collection: Collection, id: String },
}

/// Durable on-device store, one table per collection
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<RwLock<Database>>,
    path: PathBuf,
}

impl LocalStore {
    /// Open (or create) the store at `path`.
    ///
    /// Fails with [`SyncError::StoreUnavailable`] if the backend cannot be
    /// created. There is no in-memory fallback.
    pub fn open(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SyncError::StoreUnavailable(format!("{}: {}", parent.display(), e))
            })?;
        }

        let db = Database::create(path)
            .map_err(|e| SyncError::StoreUnavailable(format!("{}: {}", path.display(), e)))?;

        let write_txn = db.begin_write()?;
        {
            for collection in Collection::ALL {
                let _ = write_txn.open_table(records_table(collection))?;
                let _ = write_txn.open_table(index_table(collection))?;
            }
            let _ = write_txn.open_table(OUTBOX_TABLE)?;
            let _ = write_txn.open_table(OUTBOX_META_TABLE)?;
            let _ = write_txn.open_table(SESSION_TABLE)?;
        }
        write_txn.commit()?;

        debug!(path = %path.display(), "Opened local store");

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Shared database handle, for components that keep their own tables
    pub(crate) fn db_handle(&self) -> Arc<RwLock<Database>> {
        self.db.clone()
    }

    /// Outbox sharing this store's database
    pub fn outbox(&self) -> Outbox {
        Outbox::new(self.db_handle())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Raw record operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Load one record. Returns `None` if absent.
    pub fn get_value(&self, collection: Collection, id: &str) -> SyncResult<Option<Value>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(records_table(collection))?;

        match table.get(id)? {
            Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
            None => Ok(None),
        }
    }

    /// Upsert one record, replacing any stored version wholesale
    pub fn put_value(&self, collection: Collection, value: &Value) -> SyncResult<()> {
        self.bulk_put_values(collection, std::slice::from_ref(value))
    }

    /// Upsert many records in one transaction
    pub fn bulk_put_values(&self, collection: Collection, values: &[Value]) -> SyncResult<()> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        for value in values {
            let id = id_of(value)?;
            write_record(&write_txn, collection, id, Some(value))?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Delete one record. Returns whether it existed.
    pub fn delete(&self, collection: Collection, id: &str) -> SyncResult<bool> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        let existed = write_record(&write_txn, collection, id, None)?;
        write_txn.commit()?;
        Ok(existed)
    }

    /// Every record in the collection, ordered by id
    pub fn all_values(&self, collection: Collection) -> SyncResult<Vec<Value>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(records_table(collection))?;

        let mut values = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            values.push(serde_json::from_slice(value.value())?);
        }
        Ok(values)
    }

    pub fn count(&self, collection: Collection) -> SyncResult<usize> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(records_table(collection))?;
        let mut count = 0;
        for entry in table.iter()? {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    /// Run an indexed query.
    ///
    /// Filters are answered from the index table and intersected. Without
    /// filters every record is a candidate. Ordering and limit apply last.
    pub fn query_values(&self, collection: Collection, query: &Query) -> SyncResult<Vec<Value>> {
        query.validate(collection)?;

        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let records = read_txn.open_table(records_table(collection))?;

        let mut values = if query.filters.is_empty() {
            let mut all = Vec::new();
            for entry in records.iter()? {
                let (_, value) = entry?;
                all.push(serde_json::from_slice::<Value>(value.value())?);
            }
            all
        } else {
            let index = read_txn.open_table(index_table(collection))?;
            let mut candidates: Option<Vec<String>> = None;

            for filter in &query.filters {
                let (lower, upper) = match filter {
                    Filter::Eq { field, value } => index::eq_bounds(field, value),
                    Filter::Range { field, from, to } => {
                        index::range_bounds(field, from.as_ref(), to.as_ref())
                    }
                };

                let mut ids = Vec::new();
                for entry in index.range(lower.as_str()..upper.as_str())? {
                    let (key, _) = entry?;
                    if let Some(id) = index::id_from_key(key.value()) {
                        ids.push(id.to_string());
                    }
                }

                candidates = Some(match candidates {
                    None => ids,
                    Some(previous) => previous.into_iter().filter(|id| ids.contains(id)).collect(),
                });
            }

            let mut ids = candidates.unwrap_or_default();
            ids.sort();
            ids.dedup();

            let mut found = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(value) = records.get(id.as_str())? {
                    found.push(serde_json::from_slice::<Value>(value.value())?);
                }
            }
            found
        };

        if let Some((field, order)) = &query.order_by {
            values.sort_by(|a, b| {
                let ordering = index::compare_by_field(a, b, field);
                match order {
                    Order::Ascending => ordering,
                    Order::Descending => ordering.reverse(),
                }
            });
        }

        if let Some(limit) = query.limit {
            values.truncate(limit);
        }

        Ok(values)
    }

    /// Apply a remote snapshot in one transaction.
    ///
    /// Each incoming record is written when `should_replace(incoming,
    /// stored)` holds and the content actually differs. Records with an
    /// unsynced outbox entry are left alone: the local change has not
    /// reached the remote yet and will overwrite it when it does. Returns
    /// the ids that were written.
    pub fn merge_snapshot<F>(
        &self,
        collection: Collection,
        incoming: &[Value],
        should_replace: F,
    ) -> SyncResult<Vec<String>>
    where
        F: Fn(&Value, Option<&Value>) -> bool,
    {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        let pending = pending_ids(&write_txn, collection.as_str())?;
        let mut written = Vec::new();

        for value in incoming {
            let Ok(id) = id_of(value) else {
                warn!(%collection, "Skipping remote record without id");
                continue;
            };
            if pending.contains(id) {
                debug!(%collection, id, "Local change still queued, keeping local copy");
                continue;
            }

            let stored = read_record(&write_txn, collection, id)?;
            if stored.as_ref() == Some(value) {
                continue;
            }
            if should_replace(value, stored.as_ref()) {
                write_record(&write_txn, collection, id, Some(value))?;
                written.push(id.to_string());
            }
        }

        write_txn.commit()?;
        Ok(written)
    }

    /// Apply local writes and append their outbox entries in one
    /// transaction. This is the local half of every mutation: once it
    /// returns, the change survives a crash and will eventually be pushed.
    pub(crate) fn write_with_outbox(&self, writes: &[LocalWrite]) -> SyncResult<Vec<OutboxEntry>> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        let mut entries = Vec::with_capacity(writes.len());

        for write in writes {
            let entry = match write {
                LocalWrite::Upsert { action, record } => {
                    let value = record.to_value()?;
                    write_record(&write_txn, record.collection(), record.id(), Some(&value))?;
                    outbox::append(
                        &write_txn,
                        *action,
                        record.collection().as_str(),
                        record.id(),
                        Some(record),
                    )?
                }
                LocalWrite::Delete { collection, id } => {
                    write_record(&write_txn, *collection, id, None)?;
                    outbox::append(&write_txn, Action::Delete, collection.as_str(), id, None)?
                }
            };
            entries.push(entry);
        }

        write_txn.commit()?;
        Ok(entries)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Typed operations
    // ═══════════════════════════════════════════════════════════════════════

    pub fn get<E: Entity>(&self, id: &str) -> SyncResult<Option<E>> {
        self.get_value(E::COLLECTION, id)?
            .map(serde_json::from_value)
            .transpose()
            .map_err(Into::into)
    }

    pub fn put<E: Entity>(&self, entity: &E) -> SyncResult<()> {
        self.put_value(E::COLLECTION, &serde_json::to_value(entity)?)
    }

    pub fn bulk_put<E: Entity>(&self, entities: &[E]) -> SyncResult<()> {
        let values = entities
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        self.bulk_put_values(E::COLLECTION, &values)
    }

    pub fn put_record(&self, record: &Record) -> SyncResult<()> {
        self.put_value(record.collection(), &record.to_value()?)
    }

    pub fn remove<E: Entity>(&self, id: &str) -> SyncResult<bool> {
        self.delete(E::COLLECTION, id)
    }

    pub fn all<E: Entity>(&self) -> SyncResult<Vec<E>> {
        decode_all(self.all_values(E::COLLECTION)?)
    }

    pub fn query<E: Entity>(&self, query: &Query) -> SyncResult<Vec<E>> {
        decode_all(self.query_values(E::COLLECTION, query)?)
    }
}

fn decode_all<E: Entity>(values: Vec<Value>) -> SyncResult<Vec<E>> {
    values
        .into_iter()
        .map(|v| serde_json::from_value(v).map_err(Into::into))
        .collect()
}

fn id_of(value: &Value) -> SyncResult<&str> {
    value
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| SyncError::InvalidOperation("record has no string id".to_string()))
}

fn read_record(txn: &WriteTransaction, collection: Collection, id: &str) -> SyncResult<Option<Value>> {
    let table = txn.open_table(records_table(collection))?;
    let stored = match table.get(id)? {
        Some(bytes) => Some(serde_json::from_slice(bytes.value())?),
        None => None,
    };
    Ok(stored)
}

/// Write (`Some`) or delete (`None`) one record and keep its index in step.
/// Returns whether a previous version existed.
fn write_record(
    txn: &WriteTransaction,
    collection: Collection,
    id: &str,
    value: Option<&Value>,
) -> SyncResult<bool> {
    let old = read_record(txn, collection, id)?;
    {
        let mut records = txn.open_table(records_table(collection))?;
        match value {
            Some(value) => {
                let bytes = serde_json::to_vec(value)?;
                records.insert(id, bytes.as_slice())?;
            }
            None => {
                records.remove(id)?;
            }
        }
    }
    let mut index = txn.open_table(index_table(collection))?;
    index::reindex(&mut index, collection, id, old.as_ref(), value)?;
    Ok(old.is_some())
}
