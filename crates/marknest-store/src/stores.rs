//! Entity store interfaces.
//!
//! Callers depend on the narrowest trait they need; [`DataStore`] composes
//! all of them and is what [`Database`](crate::Database) provides.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{Session, SystemStats, User, Workspace};

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Store `user` together with its default workspace in one transaction.
    ///
    /// The returned user carries its generated id, creation time and a
    /// last-workspace pointer to the new workspace.
    async fn create_user(&self, user: User) -> Result<User, StoreError>;

    async fn get_user_by_id(&self, id: i64) -> Result<User, StoreError>;

    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError>;

    async fn get_all_users(&self) -> Result<Vec<User>, StoreError>;

    async fn update_user(&self, user: &User) -> Result<(), StoreError>;

    /// Delete the user and every workspace it owns.
    async fn delete_user(&self, id: i64) -> Result<(), StoreError>;

    /// Point the user at its workspace named `workspace_name`.
    async fn update_last_workspace(
        &self,
        user_id: i64,
        workspace_name: &str,
    ) -> Result<(), StoreError>;

    async fn get_last_workspace_name(&self, user_id: i64) -> Result<String, StoreError>;

    async fn count_admin_users(&self) -> Result<i64, StoreError>;
}

#[async_trait]
pub trait WorkspaceReader: Send + Sync {
    async fn get_workspace_by_id(&self, id: i64) -> Result<Workspace, StoreError>;

    async fn get_workspace_by_name(
        &self,
        user_id: i64,
        name: &str,
    ) -> Result<Workspace, StoreError>;

    async fn get_workspaces_by_user_id(&self, user_id: i64) -> Result<Vec<Workspace>, StoreError>;

    async fn get_all_workspaces(&self) -> Result<Vec<Workspace>, StoreError>;

    /// Path of the file last opened in the workspace, if any.
    async fn get_last_opened_file(&self, workspace_id: i64) -> Result<Option<String>, StoreError>;
}

#[async_trait]
pub trait WorkspaceWriter: Send + Sync {
    async fn create_workspace(&self, workspace: Workspace) -> Result<Workspace, StoreError>;

    async fn update_workspace(&self, workspace: &Workspace) -> Result<(), StoreError>;

    /// Delete the workspace and clear any last-workspace pointer to it.
    async fn delete_workspace(&self, id: i64) -> Result<(), StoreError>;

    async fn update_last_opened_file(
        &self,
        workspace_id: i64,
        path: Option<&str>,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: Session) -> Result<Session, StoreError>;

    /// Look up an unexpired session by its refresh token.
    async fn get_session_by_refresh_token(&self, token: &str) -> Result<Session, StoreError>;

    /// Look up an unexpired session by id.
    async fn get_session_by_id(&self, id: &str) -> Result<Session, StoreError>;

    async fn delete_session(&self, id: &str) -> Result<(), StoreError>;

    /// Delete every session expired at call time; returns how many were removed.
    async fn clean_expired_sessions(&self) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait SystemStore: Send + Sync {
    /// The JWT signing secret, generated and persisted on first call.
    async fn ensure_jwt_secret(&self) -> Result<String, StoreError>;

    async fn get_system_setting(&self, key: &str) -> Result<String, StoreError>;

    async fn set_system_setting(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Three independent counts; not a consistent snapshot.
    async fn get_system_stats(&self) -> Result<SystemStats, StoreError>;
}

/// Every store interface in one bound.
pub trait DataStore: UserStore + WorkspaceReader + WorkspaceWriter + SessionStore + SystemStore {}

impl<T> DataStore for T where
    T: UserStore + WorkspaceReader + WorkspaceWriter + SessionStore + SystemStore
{
}
