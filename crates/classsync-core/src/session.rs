//! Logged-in user session
//!
//! The session slot holds the authenticated user's full record on this
//! device. The sync engine never reads it; profile edits go through the
//! normal mutation path and are synced like any other user record.

use tracing::info;

use crate::engine::SyncEngine;
use crate::error::{SyncError, SyncResult};
use crate::storage::Query;
use crate::types::User;

impl SyncEngine {
    /// Log in as the local user with `email`
    pub fn login(&self, email: &str) -> SyncResult<User> {
        let user = self
            .query::<User>(&Query::new().eq("email", email).limit(1))?
            .into_iter()
            .next()
            .ok_or_else(|| SyncError::NotFound(format!("user with email {email}")))?;

        self.store().save_session_user(&user)?;
        info!(user_id = %user.id, "Logged in");
        Ok(user)
    }

    /// Clear the session. Returns whether someone was logged in.
    pub fn logout(&self) -> SyncResult<bool> {
        let was_logged_in = self.store().clear_session()?;
        if was_logged_in {
            info!("Logged out");
        }
        Ok(was_logged_in)
    }

    pub fn current_user(&self) -> SyncResult<Option<User>> {
        self.store().load_session_user()
    }

    /// Save changes to the logged-in user's own record and refresh the
    /// session slot
    pub async fn update_profile(&self, user: User) -> SyncResult<User> {
        let current = self.current_user()?.ok_or(SyncError::NotLoggedIn)?;
        if current.id != user.id {
            return Err(SyncError::InvalidOperation(
                "can only update the logged-in user's profile".to_string(),
            ));
        }

        let user = self.update(user).await?;
        self.store().save_session_user(&user)?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::registry::CollectionRegistry;
    use crate::remote::MemoryRemote;
    use crate::types::Role;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn create_test_engine() -> (SyncEngine, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let engine = SyncEngine::open(
            temp_dir.path().join("classsync.redb"),
            Arc::new(MemoryRemote::new()),
            CollectionRegistry::standard(),
            EngineConfig::default(),
        )
        .unwrap();
        (engine, temp_dir)
    }

    #[tokio::test]
    async fn test_login_by_email() {
        let (engine, _temp) = create_test_engine();
        let user = engine
            .create(User::new("Lan", "lan@school.edu", Role::Teacher))
            .await
            .unwrap();

        assert_eq!(engine.login("lan@school.edu").unwrap(), user);
        assert_eq!(engine.current_user().unwrap(), Some(user));
    }

    #[tokio::test]
    async fn test_login_unknown_email() {
        let (engine, _temp) = create_test_engine();
        assert!(matches!(
            engine.login("nobody@school.edu"),
            Err(SyncError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_profile_requires_login() {
        let (engine, _temp) = create_test_engine();
        let user = User::new("Lan", "lan@school.edu", Role::Teacher);
        assert!(matches!(
            engine.update_profile(user).await,
            Err(SyncError::NotLoggedIn)
        ));
    }

    #[tokio::test]
    async fn test_update_profile_refreshes_session_and_queues() {
        let (engine, _temp) = create_test_engine();
        let user = engine
            .create(User::new("Lan", "lan@school.edu", Role::Teacher))
            .await
            .unwrap();
        engine.login("lan@school.edu").unwrap();

        let mut edited = user.clone();
        edited.avatar = Some("lan.png".to_string());
        engine.update_profile(edited).await.unwrap();

        let current = engine.current_user().unwrap().unwrap();
        assert_eq!(current.avatar.as_deref(), Some("lan.png"));
        assert_eq!(engine.pending_count(), 2);

        assert!(engine.logout().unwrap());
        assert!(engine.current_user().unwrap().is_none());
    }
}
