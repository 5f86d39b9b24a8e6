//! Class-management records
//!
//! Field names are camelCase on the wire so records written by other
//! clients of the same remote store deserialize unchanged.

use serde::{Deserialize, Serialize};

use super::{new_id, now_millis, Collection, Entity, Record};

/// Fixed identifier of the settings singleton
pub const SETTINGS_ID: &str = "app-settings";

macro_rules! impl_entity {
    ($ty:ident, $variant:ident) => {
        impl Entity for $ty {
            const COLLECTION: Collection = Collection::$variant;

            fn id(&self) -> &str {
                &self.id
            }

            fn updated_at(&self) -> Option<i64> {
                self.updated_at
            }

            fn set_updated_at(&mut self, updated_at: i64) {
                self.updated_at = Some(updated_at);
            }

            fn into_record(self) -> Record {
                Record::$variant(self)
            }

            fn from_record(record: Record) -> Option<Self> {
                match record {
                    Record::$variant(entity) => Some(entity),
                    _ => None,
                }
            }
        }
    };
}

/// Role of a class member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Monitor,
    #[default]
    Student,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Teacher => write!(f, "teacher"),
            Role::Monitor => write!(f, "monitor"),
            Role::Student => write!(f, "student"),
        }
    }
}

/// A class member account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            email: email.into(),
            role,
            avatar: None,
            updated_at: None,
        }
    }
}

/// A to-do item (homework, chores, reminders)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
    /// `YYYY-MM-DD`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl Todo {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            title: title.into(),
            description: None,
            completed: false,
            due_date: None,
            user_id: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

/// A class fund movement. Amounts are in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub kind: TransactionKind,
    pub amount: i64,
    pub category: String,
    #[serde(default)]
    pub description: String,
    /// `YYYY-MM-DD`
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

/// One student's attendance on one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub student_id: String,
    /// `YYYY-MM-DD`
    pub date: String,
    pub status: AttendanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl AttendanceRecord {
    /// Attendance ids are derived from date and student so re-marking a
    /// day overwrites instead of duplicating.
    pub fn new(student_id: impl Into<String>, date: impl Into<String>, status: AttendanceStatus) -> Self {
        let student_id = student_id.into();
        let date = date.into();
        Self {
            id: format!("{date}_{student_id}"),
            student_id,
            date,
            status,
            note: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author_id: String,
    #[serde(default)]
    pub priority: Priority,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl Announcement {
    pub fn new(title: impl Into<String>, content: impl Into<String>, author_id: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            title: title.into(),
            content: content.into(),
            author_id: author_id.into(),
            priority: Priority::Normal,
            created_at: now_millis(),
            updated_at: None,
        }
    }
}

/// A recurring timetable slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleItem {
    pub id: String,
    pub title: String,
    /// Lowercase weekday name
    pub day: String,
    /// `HH:MM`
    pub start_time: String,
    pub end_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

/// Class journal / diary entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub id: String,
    pub title: String,
    pub content: String,
    /// `YYYY-MM-DD`
    pub date: String,
    pub author_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

/// Application settings singleton, always stored under [`SETTINGS_ID`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub id: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school_year: Option<String>,
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

fn default_theme() -> String {
    "system".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            id: SETTINGS_ID.to_string(),
            class_name: String::new(),
            school_year: None,
            theme: default_theme(),
            language: default_language(),
            notifications_enabled: true,
            updated_at: None,
        }
    }
}

impl_entity!(User, Users);
impl_entity!(Todo, Todos);
impl_entity!(Transaction, Transactions);
impl_entity!(AttendanceRecord, Attendance);
impl_entity!(Announcement, Announcements);
impl_entity!(ScheduleItem, Schedule);
impl_entity!(JournalEntry, Journals);
impl_entity!(Settings, Settings);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_todo_wire_format_is_camel_case() {
        let mut todo = Todo::new("HW1");
        todo.due_date = Some("2026-10-20".to_string());
        todo.updated_at = Some(1000);

        let value = serde_json::to_value(&todo).unwrap();
        assert_eq!(value["dueDate"], "2026-10-20");
        assert_eq!(value["updatedAt"], 1000);
        assert!(value.get("description").is_none());
    }

    #[test]
    fn test_missing_revision_deserializes_as_none() {
        let todo: Todo = serde_json::from_value(json!({"id": "t1", "title": "HW1"})).unwrap();
        assert_eq!(todo.updated_at, None);
        assert!(!todo.completed);
    }

    #[test]
    fn test_attendance_id_is_deterministic() {
        let a = AttendanceRecord::new("s1", "2026-10-16", AttendanceStatus::Present);
        let b = AttendanceRecord::new("s1", "2026-10-16", AttendanceStatus::Late);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_settings_defaults() {
        let settings: Settings = serde_json::from_value(json!({"id": SETTINGS_ID})).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_record_conversion_rejects_other_variant() {
        let record = Todo::new("x").into_record();
        assert!(User::from_record(record.clone()).is_none());
        assert!(Todo::from_record(record).is_some());
    }
}
