//! User queries.

use async_trait::async_trait;
use sqlx::Row;
use tracing::{debug, info};

use crate::db::{self, Database, Tx};
use crate::error::{ResultExt, StoreError};
use crate::models::{DEFAULT_WORKSPACE_NAME, Role, User, Workspace};
use crate::record::Record;
use crate::scan::{scan_many, scan_one};
use crate::stores::UserStore;

impl Database {
    async fn insert_user(&self, tx: &mut Tx, user: &User) -> Result<User, StoreError> {
        let mut query = self.query();
        query
            .insert_struct(user, User::TABLE, self.secrets())?
            .returning(&["*"]);
        let row = db::fetch_one(&mut **tx, query).await?;
        scan_one(&row, self.secrets())
    }

    async fn set_last_workspace_id(
        &self,
        tx: &mut Tx,
        user_id: i64,
        workspace_id: i64,
    ) -> Result<(), StoreError> {
        let mut query = self.query();
        query
            .update(User::TABLE)
            .set("last_workspace_id")
            .placeholder(workspace_id)
            .where_("id = ")
            .placeholder(user_id);
        if db::execute(&mut **tx, query).await? == 0 {
            return Err(StoreError::NotFound(format!("User {user_id}")));
        }
        Ok(())
    }

    async fn create_user_tx(&self, tx: &mut Tx, user: &User) -> Result<User, StoreError> {
        let mut created = self.insert_user(tx, user).await?;

        let workspace = self
            .insert_workspace(&mut **tx, &Workspace::new(created.id, DEFAULT_WORKSPACE_NAME))
            .await
            .map_err(|e| e.context(format!("create default workspace for user {}", created.id)))?;

        self.set_last_workspace_id(tx, created.id, workspace.id)
            .await?;
        created.last_workspace_id = Some(workspace.id);
        Ok(created)
    }

    /// Returns the number of user rows removed.
    async fn delete_user_tx(&self, tx: &mut Tx, id: i64) -> Result<u64, StoreError> {
        let mut workspaces = self.query();
        workspaces
            .delete(Workspace::TABLE)
            .where_("user_id = ")
            .placeholder(id);
        db::execute(&mut **tx, workspaces).await?;

        let mut user = self.query();
        user.delete(User::TABLE).where_("id = ").placeholder(id);
        Ok(db::execute(&mut **tx, user).await?)
    }

    async fn update_last_workspace_tx(
        &self,
        tx: &mut Tx,
        user_id: i64,
        workspace_name: &str,
    ) -> Result<(), StoreError> {
        let mut lookup = self.query();
        lookup
            .select(&["id"])
            .from(Workspace::TABLE)
            .where_("user_id = ")
            .placeholder(user_id)
            .where_("name = ")
            .placeholder(workspace_name);
        let row = db::fetch_optional(&mut **tx, lookup)
            .await?
            .ok_or_else(|| {
                StoreError::NotFound(format!("Workspace {workspace_name:?} of user {user_id}"))
            })?;
        let workspace_id: i64 = row.try_get("id")?;

        self.set_last_workspace_id(tx, user_id, workspace_id).await
    }
}

#[async_trait]
impl UserStore for Database {
    async fn create_user(&self, user: User) -> Result<User, StoreError> {
        let mut tx = self.begin().await?;
        let result = self.create_user_tx(&mut tx, &user).await;
        let created = self
            .finish_tx(tx, &format!("create_user {}", user.email), result)
            .await?;

        info!(
            parent: self.span(),
            user_id = created.id,
            role = %created.role,
            "Created user"
        );
        Ok(created)
    }

    async fn get_user_by_id(&self, id: i64) -> Result<User, StoreError> {
        let mut query = self.query();
        query.select(&["*"]).from(User::TABLE).where_("id = ").placeholder(id);

        let row = db::fetch_optional(self.pool(), query)
            .await
            .context(format!("get_user_by_id {id}"))?
            .ok_or_else(|| StoreError::NotFound(format!("User {id}")))?;
        scan_one(&row, self.secrets())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        let mut query = self.query();
        query
            .select(&["*"])
            .from(User::TABLE)
            .where_("email = ")
            .placeholder(email);

        let row = db::fetch_optional(self.pool(), query)
            .await
            .context(format!("get_user_by_email {email}"))?
            .ok_or_else(|| StoreError::NotFound(format!("User with email {email}")))?;
        scan_one(&row, self.secrets())
    }

    async fn get_all_users(&self) -> Result<Vec<User>, StoreError> {
        let mut query = self.query();
        query.select(&["*"]).from(User::TABLE).order_by(&["id"]);

        let rows = db::fetch_all(self.pool(), query)
            .await
            .context("get_all_users")?;
        scan_many(&rows, self.secrets())
    }

    async fn update_user(&self, user: &User) -> Result<(), StoreError> {
        let mut query = self.query();
        query.update_struct(user, User::TABLE, &["id"], vec![user.id.into()], self.secrets())?;

        let affected = db::execute(self.pool(), query)
            .await
            .context(format!("update_user {}", user.id))?;
        if affected == 0 {
            return Err(StoreError::NotFound(format!("User {}", user.id)));
        }
        debug!(parent: self.span(), user_id = user.id, "Updated user");
        Ok(())
    }

    async fn delete_user(&self, id: i64) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;
        let result = self.delete_user_tx(&mut tx, id).await;
        let deleted = self
            .finish_tx(tx, &format!("delete_user {id}"), result)
            .await?;

        if deleted == 0 {
            return Err(StoreError::NotFound(format!("User {id}")));
        }
        info!(parent: self.span(), user_id = id, "Deleted user");
        Ok(())
    }

    async fn update_last_workspace(
        &self,
        user_id: i64,
        workspace_name: &str,
    ) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;
        let result = self
            .update_last_workspace_tx(&mut tx, user_id, workspace_name)
            .await;
        self.finish_tx(tx, &format!("update_last_workspace {user_id}"), result)
            .await
    }

    async fn get_last_workspace_name(&self, user_id: i64) -> Result<String, StoreError> {
        let mut query = self.query();
        query
            .select(&["w.name"])
            .from("users u")
            .join(
                crate::query::JoinKind::Inner,
                "workspaces w",
                "w.id = u.last_workspace_id",
            )
            .where_("u.id = ")
            .placeholder(user_id);

        let row = db::fetch_optional(self.pool(), query)
            .await
            .context(format!("get_last_workspace_name {user_id}"))?
            .ok_or_else(|| StoreError::NotFound(format!("Last workspace of user {user_id}")))?;
        row.try_get::<String, _>("name")
            .context(format!("get_last_workspace_name {user_id}"))
    }

    async fn count_admin_users(&self) -> Result<i64, StoreError> {
        let mut query = self.query();
        query
            .select(&["COUNT(*) AS count"])
            .from(User::TABLE)
            .where_("role = ")
            .placeholder(Role::Admin.as_str());

        let row = db::fetch_one(self.pool(), query)
            .await
            .context("count_admin_users")?;
        row.try_get::<i64, _>("count").context("count_admin_users")
    }
}
