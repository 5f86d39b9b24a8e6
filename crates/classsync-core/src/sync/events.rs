//! Sync event types and status tracking
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  SyncStatus: engine-wide sync state                             │
//! │  ├── Idle: nothing in flight                                    │
//! │  ├── Offline: mutations accumulate in the outbox                │
//! │  ├── Syncing: a drain or bootstrap is running                   │
//! │  └── Error: last drain left entries undelivered                 │
//! │                                                                 │
//! │  SyncEvent: notifications for observers                         │
//! │  ├── SettingsChanged: settings converged (local or remote)      │
//! │  ├── EntriesDelivered / DeliveryFailed: push path results       │
//! │  ├── UnresolvedCollection: outbox entry has no remote mapping   │
//! │  ├── SnapshotMerged: pull path wrote records                    │
//! │  └── ConnectivityChanged / BootstrapCompleted / StatusChanged   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use crate::types::Collection;

/// Status of synchronization
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncStatus {
    /// Nothing in flight
    #[default]
    Idle,
    /// Device is offline; changes wait in the outbox
    Offline,
    /// Pushing pending changes or seeding the remote
    Syncing,
    /// The last drain did not deliver everything
    Error(String),
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Idle => write!(f, "Idle"),
            SyncStatus::Offline => write!(f, "Offline"),
            SyncStatus::Syncing => write!(f, "Syncing"),
            SyncStatus::Error(msg) => write!(f, "Error: {}", msg),
        }
    }
}

/// Events emitted by the sync engine
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Settings changed, either by a local update or a remote merge.
    /// Fired exactly once per such change.
    SettingsChanged,
    /// A drain delivered entries to the remote
    EntriesDelivered {
        /// Entries acknowledged in this drain
        count: usize,
        /// Entries still pending afterwards
        pending_after: usize,
    },
    /// An entry exhausted its retries; it stays pending
    DeliveryFailed {
        sequence: u64,
        collection: String,
        document_id: String,
        error: String,
    },
    /// An entry names a collection with no remote mapping; it stays pending
    UnresolvedCollection { collection: String, sequence: u64 },
    /// A remote snapshot wrote records locally
    SnapshotMerged {
        collection: Collection,
        /// Number of records written
        written: usize,
    },
    /// The device went online or offline
    ConnectivityChanged { online: bool },
    /// The one-time seed of an empty remote finished
    BootstrapCompleted {
        /// Records pushed
        records: usize,
    },
    /// Sync status changed
    StatusChanged { status: SyncStatus },
}

/// Result of one drain of the outbox
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Entries acknowledged by the remote and marked synced
    pub delivered: usize,
    /// Entries whose remote call failed after retries
    pub failed: usize,
    /// Entries skipped because their collection has no remote mapping
    pub unresolved: usize,
    /// Entries held back because an earlier entry for the same document
    /// was not delivered
    pub deferred: usize,
    /// Entries still pending after the drain
    pub pending_after: usize,
}

impl DrainReport {
    /// Every pending entry was delivered
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.unresolved == 0 && self.deferred == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_status_default() {
        assert_eq!(SyncStatus::default(), SyncStatus::Idle);
    }

    #[test]
    fn test_sync_status_display() {
        assert_eq!(format!("{}", SyncStatus::Offline), "Offline");
        assert_eq!(
            format!("{}", SyncStatus::Error("2 entries undelivered".to_string())),
            "Error: 2 entries undelivered"
        );
    }

    #[test]
    fn test_drain_report_clean() {
        let report = DrainReport {
            delivered: 3,
            ..Default::default()
        };
        assert!(report.is_clean());
        assert!(!DrainReport {
            unresolved: 1,
            ..report
        }
        .is_clean());
    }
}
