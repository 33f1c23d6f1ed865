//! Session queries.

use async_trait::async_trait;
use marknest_core::db::unix_timestamp;
use tracing::{debug, info};

use crate::db::{self, Database};
use crate::error::{ResultExt, StoreError};
use crate::models::Session;
use crate::query::Query;
use crate::record::Record;
use crate::scan::scan_one;
use crate::stores::SessionStore;

impl Database {
    /// `SELECT *` over sessions that have not expired yet.
    fn live_sessions(&self, column: &str, value: &str) -> Query {
        let mut query = self.query();
        query
            .select(&["*"])
            .from(Session::TABLE)
            .where_(&format!("{column} = "))
            .placeholder(value)
            .where_("expires_at > ")
            .placeholder(unix_timestamp());
        query
    }
}

#[async_trait]
impl SessionStore for Database {
    async fn create_session(&self, session: Session) -> Result<Session, StoreError> {
        let mut query = self.query();
        query
            .insert_struct(&session, Session::TABLE, self.secrets())?
            .returning(&["*"]);

        let row = db::fetch_one(self.pool(), query)
            .await
            .context(format!("create_session for user {}", session.user_id))?;
        let created: Session = scan_one(&row, self.secrets())?;

        debug!(
            parent: self.span(),
            session_id = %created.id,
            user_id = created.user_id,
            "Created session"
        );
        Ok(created)
    }

    async fn get_session_by_refresh_token(&self, token: &str) -> Result<Session, StoreError> {
        let query = self.live_sessions("refresh_token", token);
        let row = db::fetch_optional(self.pool(), query)
            .await
            .context("get_session_by_refresh_token")?
            .ok_or_else(|| StoreError::NotFound("Session for refresh token".to_string()))?;
        scan_one(&row, self.secrets())
    }

    async fn get_session_by_id(&self, id: &str) -> Result<Session, StoreError> {
        let query = self.live_sessions("id", id);
        let row = db::fetch_optional(self.pool(), query)
            .await
            .context(format!("get_session_by_id {id}"))?
            .ok_or_else(|| StoreError::NotFound(format!("Session {id}")))?;
        scan_one(&row, self.secrets())
    }

    async fn delete_session(&self, id: &str) -> Result<(), StoreError> {
        let mut query = self.query();
        query
            .delete(Session::TABLE)
            .where_("id = ")
            .placeholder(id);

        let affected = db::execute(self.pool(), query)
            .await
            .context(format!("delete_session {id}"))?;
        if affected == 0 {
            return Err(StoreError::NotFound(format!("Session {id}")));
        }
        Ok(())
    }

    async fn clean_expired_sessions(&self) -> Result<u64, StoreError> {
        let mut query = self.query();
        query
            .delete(Session::TABLE)
            .where_("expires_at <= ")
            .placeholder(unix_timestamp());

        let removed = db::execute(self.pool(), query)
            .await
            .context("clean_expired_sessions")?;
        if removed > 0 {
            info!(parent: self.span(), removed, "Cleaned expired sessions");
        }
        Ok(removed)
    }
}
