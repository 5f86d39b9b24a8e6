//! Tagged union over every entity type

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entities::*;
use super::{Collection, Entity};
use crate::error::SyncResult;

/// Any entity, tagged with its collection name.
///
/// Serialized as `{"collection": "todos", "data": {...}}`, which is the
/// form stored in outbox payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "collection", content = "data", rename_all = "lowercase")]
pub enum Record {
    Users(User),
    Todos(Todo),
    Transactions(Transaction),
    Attendance(AttendanceRecord),
    Announcements(Announcement),
    Schedule(ScheduleItem),
    Journals(JournalEntry),
    Settings(Settings),
}

macro_rules! each_variant {
    ($self:expr, $entity:ident => $body:expr) => {
        match $self {
            Record::Users($entity) => $body,
            Record::Todos($entity) => $body,
            Record::Transactions($entity) => $body,
            Record::Attendance($entity) => $body,
            Record::Announcements($entity) => $body,
            Record::Schedule($entity) => $body,
            Record::Journals($entity) => $body,
            Record::Settings($entity) => $body,
        }
    };
}

impl Record {
    pub fn collection(&self) -> Collection {
        match self {
            Record::Users(_) => Collection::Users,
            Record::Todos(_) => Collection::Todos,
            Record::Transactions(_) => Collection::Transactions,
            Record::Attendance(_) => Collection::Attendance,
            Record::Announcements(_) => Collection::Announcements,
            Record::Schedule(_) => Collection::Schedule,
            Record::Journals(_) => Collection::Journals,
            Record::Settings(_) => Collection::Settings,
        }
    }

    pub fn id(&self) -> &str {
        each_variant!(self, e => e.id())
    }

    pub fn updated_at(&self) -> Option<i64> {
        each_variant!(self, e => e.updated_at())
    }

    pub fn set_updated_at(&mut self, updated_at: i64) {
        each_variant!(self, e => e.set_updated_at(updated_at))
    }

    /// The bare entity JSON, as written to the local table or remote store
    pub fn to_value(&self) -> SyncResult<Value> {
        Ok(each_variant!(self, e => serde_json::to_value(e)?))
    }

    /// Parse bare entity JSON belonging to `collection`
    pub fn from_value(collection: Collection, value: Value) -> SyncResult<Record> {
        Ok(match collection {
            Collection::Users => Record::Users(serde_json::from_value(value)?),
            Collection::Todos => Record::Todos(serde_json::from_value(value)?),
            Collection::Transactions => Record::Transactions(serde_json::from_value(value)?),
            Collection::Attendance => Record::Attendance(serde_json::from_value(value)?),
            Collection::Announcements => Record::Announcements(serde_json::from_value(value)?),
            Collection::Schedule => Record::Schedule(serde_json::from_value(value)?),
            Collection::Journals => Record::Journals(serde_json::from_value(value)?),
            Collection::Settings => Record::Settings(serde_json::from_value(value)?),
        })
    }
}
