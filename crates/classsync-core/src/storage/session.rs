//! Session slot: the user logged in on this device

use redb::TableDefinition;

use super::LocalStore;
use crate::error::SyncResult;
use crate::types::User;

/// Session table (key: slot name, value: serialized User)
pub(crate) const SESSION_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("session");

const CURRENT_USER_KEY: &str = "current_user";

impl LocalStore {
    // ═══════════════════════════════════════════════════════════════════════
    // Session Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Remember `user` as the logged-in user, replacing any previous one
    pub fn save_session_user(&self, user: &User) -> SyncResult<()> {
        let db = self.db_handle();
        let db_guard = db.read();
        let write_txn = db_guard.begin_write()?;
        {
            let mut table = write_txn.open_table(SESSION_TABLE)?;
            let serialized = serde_json::to_vec(user)?;
            table.insert(CURRENT_USER_KEY, serialized.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// The logged-in user, if any
    pub fn load_session_user(&self) -> SyncResult<Option<User>> {
        let db = self.db_handle();
        let db_guard = db.read();
        let read_txn = db_guard.begin_read()?;
        let table = read_txn.open_table(SESSION_TABLE)?;

        if let Some(data) = table.get(CURRENT_USER_KEY)? {
            Ok(Some(serde_json::from_slice(data.value())?))
        } else {
            Ok(None)
        }
    }

    /// Forget the logged-in user. Returns whether one was set.
    pub fn clear_session(&self) -> SyncResult<bool> {
        let db = self.db_handle();
        let db_guard = db.read();
        let write_txn = db_guard.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(SESSION_TABLE)?;
            let removed = table.remove(CURRENT_USER_KEY)?.is_some();
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }
}
