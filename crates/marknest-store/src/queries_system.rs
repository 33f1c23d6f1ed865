//! System settings and statistics.

use async_trait::async_trait;
use marknest_core::db::unix_timestamp;
use marknest_crypto::generate_secret;
use sqlx::Row;
use tracing::info;

use crate::db::{self, Database};
use crate::error::{ResultExt, StoreError};
use crate::models::{JWT_SECRET_KEY, Session, SystemSetting, SystemStats, User, Workspace};
use crate::query::Query;
use crate::record::Record;
use crate::stores::SystemStore;

/// Length in bytes of a generated JWT secret before hex encoding.
const JWT_SECRET_BYTES: usize = 32;

/// Window for counting a user as active.
const ACTIVE_USER_DAYS: u32 = 30;

impl Database {
    /// Insert-or-update statement for one setting. `overwrite` picks between
    /// replacing an existing value and keeping it.
    fn upsert_setting(&self, key: &str, value: &str, overwrite: bool) -> Result<Query, StoreError> {
        let setting = SystemSetting {
            key: key.to_string(),
            value: value.to_string(),
            updated_at: unix_timestamp(),
        };

        let mut query = self.query();
        query.insert_struct(&setting, SystemSetting::TABLE, self.secrets())?;
        if overwrite {
            query.push(
                " ON CONFLICT (key) DO UPDATE SET value = excluded.value, \
                 updated_at = excluded.updated_at",
            );
        } else {
            query.push(" ON CONFLICT (key) DO NOTHING");
        }
        Ok(query)
    }

    async fn count(&self, query: Query, operation: &str) -> Result<i64, StoreError> {
        let row = db::fetch_one(self.pool(), query)
            .await
            .context(operation)?;
        row.try_get::<i64, _>("count").context(operation)
    }
}

#[async_trait]
impl SystemStore for Database {
    async fn ensure_jwt_secret(&self) -> Result<String, StoreError> {
        match self.get_system_setting(JWT_SECRET_KEY).await {
            Ok(secret) => return Ok(secret),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.context("ensure_jwt_secret")),
        }

        let secret = generate_secret(JWT_SECRET_BYTES);
        let insert = self.upsert_setting(JWT_SECRET_KEY, &secret, false)?;
        let inserted = db::execute(self.pool(), insert)
            .await
            .context("ensure_jwt_secret")?;
        if inserted > 0 {
            info!(parent: self.span(), "Generated JWT secret");
        }

        // A concurrent caller may have won the insert; the stored value is authoritative.
        self.get_system_setting(JWT_SECRET_KEY)
            .await
            .map_err(|e| e.context("ensure_jwt_secret"))
    }

    async fn get_system_setting(&self, key: &str) -> Result<String, StoreError> {
        let mut query = self.query();
        query
            .select(&["value"])
            .from(SystemSetting::TABLE)
            .where_("key = ")
            .placeholder(key);

        let row = db::fetch_optional(self.pool(), query)
            .await
            .context(format!("get_system_setting {key}"))?
            .ok_or_else(|| StoreError::NotFound(format!("System setting {key}")))?;
        row.try_get::<String, _>("value")
            .context(format!("get_system_setting {key}"))
    }

    async fn set_system_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let query = self.upsert_setting(key, value, true)?;
        db::execute(self.pool(), query)
            .await
            .context(format!("set_system_setting {key}"))?;
        Ok(())
    }

    async fn get_system_stats(&self) -> Result<SystemStats, StoreError> {
        let mut users = self.query();
        users.select(&["COUNT(*) AS count"]).from(User::TABLE);
        let total_users = self.count(users, "get_system_stats users").await?;

        let mut workspaces = self.query();
        workspaces.select(&["COUNT(*) AS count"]).from(Workspace::TABLE);
        let total_workspaces = self.count(workspaces, "get_system_stats workspaces").await?;

        let mut active = self.query();
        let since = active.time_since(ACTIVE_USER_DAYS);
        active
            .select(&["COUNT(DISTINCT user_id) AS count"])
            .from(Session::TABLE)
            .where_(&format!("created_at > {since}"));
        let active_users = self.count(active, "get_system_stats active users").await?;

        Ok(SystemStats {
            total_users,
            total_workspaces,
            active_users,
        })
    }
}
