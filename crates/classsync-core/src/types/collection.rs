//! Collection names and their local layout

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// A named group of records, one local table each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Users,
    Todos,
    Transactions,
    Attendance,
    Announcements,
    Schedule,
    Journals,
    Settings,
}

impl Collection {
    /// Every collection, in bootstrap order (users first).
    pub const ALL: [Collection; 8] = [
        Collection::Users,
        Collection::Todos,
        Collection::Transactions,
        Collection::Attendance,
        Collection::Announcements,
        Collection::Schedule,
        Collection::Journals,
        Collection::Settings,
    ];

    /// Wire and display name
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Todos => "todos",
            Collection::Transactions => "transactions",
            Collection::Attendance => "attendance",
            Collection::Announcements => "announcements",
            Collection::Schedule => "schedule",
            Collection::Journals => "journals",
            Collection::Settings => "settings",
        }
    }

    /// redb table holding the records
    pub(crate) fn table_name(&self) -> &'static str {
        match self {
            Collection::Users => "col_users",
            Collection::Todos => "col_todos",
            Collection::Transactions => "col_transactions",
            Collection::Attendance => "col_attendance",
            Collection::Announcements => "col_announcements",
            Collection::Schedule => "col_schedule",
            Collection::Journals => "col_journals",
            Collection::Settings => "col_settings",
        }
    }

    /// redb table holding the secondary index entries
    pub(crate) fn index_table_name(&self) -> &'static str {
        match self {
            Collection::Users => "idx_users",
            Collection::Todos => "idx_todos",
            Collection::Transactions => "idx_transactions",
            Collection::Attendance => "idx_attendance",
            Collection::Announcements => "idx_announcements",
            Collection::Schedule => "idx_schedule",
            Collection::Journals => "idx_journals",
            Collection::Settings => "idx_settings",
        }
    }

    /// Fields with a secondary index (wire names)
    pub fn indexes(&self) -> &'static [&'static str] {
        match self {
            Collection::Users => &["email", "role"],
            Collection::Todos => &["userId", "completed", "dueDate"],
            Collection::Transactions => &["date", "kind", "category"],
            Collection::Attendance => &["date", "studentId", "status"],
            Collection::Announcements => &["createdAt", "priority"],
            Collection::Schedule => &["day"],
            Collection::Journals => &["date", "authorId"],
            Collection::Settings => &[],
        }
    }

    pub fn is_indexed(&self, field: &str) -> bool {
        self.indexes().contains(&field)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| SyncError::UnknownCollection(s.to_string()))
    }
}
