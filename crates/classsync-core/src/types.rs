//! Core types for classsync
//!
//! Every synced record belongs to a [`Collection`] and implements
//! [`Entity`]. The [`Record`] tagged union carries any entity together
//! with its collection, which is what the outbox stores.

pub mod collection;
pub mod entities;
pub mod record;

pub use collection::Collection;
pub use entities::{
    Announcement, AttendanceRecord, AttendanceStatus, JournalEntry, Priority, Role, ScheduleItem,
    Settings, Todo, Transaction, TransactionKind, User, SETTINGS_ID,
};
pub use record::Record;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A domain record that can pass through the sync engine.
///
/// Identifiers are unique within the entity's collection. The revision
/// marker (`updatedAt`, Unix ms) is absent until the record has been
/// version-stamped.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection this entity type lives in
    const COLLECTION: Collection;

    /// Collection-scoped identifier
    fn id(&self) -> &str;

    /// Revision marker, if stamped
    fn updated_at(&self) -> Option<i64>;

    /// Overwrite the revision marker
    fn set_updated_at(&mut self, updated_at: i64);

    /// Wrap into the tagged union
    fn into_record(self) -> Record;

    /// Unwrap from the tagged union; `None` when the variant belongs to
    /// another collection
    fn from_record(record: Record) -> Option<Self>;
}

/// Generate a new collection-scoped identifier (time-sortable ULID)
pub fn new_id() -> String {
    ulid::Ulid::new().to_string().to_lowercase()
}

/// Current wall-clock time in Unix milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
