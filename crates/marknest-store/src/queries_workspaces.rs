//! Workspace queries.

use async_trait::async_trait;
use sqlx::{Any, Executor, Row};
use tracing::{debug, info};

use crate::db::{self, Database, Tx};
use crate::error::{ResultExt, StoreError};
use crate::models::{User, Workspace};
use crate::record::Record;
use crate::scan::{scan_many, scan_one};
use crate::stores::{WorkspaceReader, WorkspaceWriter};

impl Database {
    /// Validate and insert `workspace`, returning the stored row.
    pub(crate) async fn insert_workspace<'c, E>(
        &self,
        executor: E,
        workspace: &Workspace,
    ) -> Result<Workspace, StoreError>
    where
        E: Executor<'c, Database = Any>,
    {
        workspace.validate()?;
        let mut workspace = workspace.clone();
        workspace.clear_git_when_disabled();

        let mut query = self.query();
        query
            .insert_struct(&workspace, Workspace::TABLE, self.secrets())?
            .returning(&["*"]);
        let row = db::fetch_one(executor, query).await?;
        scan_one(&row, self.secrets())
    }

    /// Returns the number of workspace rows removed.
    async fn delete_workspace_tx(&self, tx: &mut Tx, id: i64) -> Result<u64, StoreError> {
        let mut pointers = self.query();
        pointers
            .update(User::TABLE)
            .set("last_workspace_id")
            .placeholder(None::<i64>)
            .where_("last_workspace_id = ")
            .placeholder(id);
        db::execute(&mut **tx, pointers).await?;

        let mut workspace = self.query();
        workspace
            .delete(Workspace::TABLE)
            .where_("id = ")
            .placeholder(id);
        Ok(db::execute(&mut **tx, workspace).await?)
    }
}

#[async_trait]
impl WorkspaceReader for Database {
    async fn get_workspace_by_id(&self, id: i64) -> Result<Workspace, StoreError> {
        let mut query = self.query();
        query
            .select(&["*"])
            .from(Workspace::TABLE)
            .where_("id = ")
            .placeholder(id);

        let row = db::fetch_optional(self.pool(), query)
            .await
            .context(format!("get_workspace_by_id {id}"))?
            .ok_or_else(|| StoreError::NotFound(format!("Workspace {id}")))?;
        scan_one(&row, self.secrets())
    }

    async fn get_workspace_by_name(
        &self,
        user_id: i64,
        name: &str,
    ) -> Result<Workspace, StoreError> {
        let mut query = self.query();
        query
            .select(&["*"])
            .from(Workspace::TABLE)
            .where_("user_id = ")
            .placeholder(user_id)
            .where_("name = ")
            .placeholder(name);

        let row = db::fetch_optional(self.pool(), query)
            .await
            .context(format!("get_workspace_by_name {user_id}"))?
            .ok_or_else(|| {
                StoreError::NotFound(format!("Workspace {name:?} of user {user_id}"))
            })?;
        scan_one(&row, self.secrets())
    }

    async fn get_workspaces_by_user_id(&self, user_id: i64) -> Result<Vec<Workspace>, StoreError> {
        let mut query = self.query();
        query
            .select(&["*"])
            .from(Workspace::TABLE)
            .where_("user_id = ")
            .placeholder(user_id)
            .order_by(&["id"]);

        let rows = db::fetch_all(self.pool(), query)
            .await
            .context(format!("get_workspaces_by_user_id {user_id}"))?;
        scan_many(&rows, self.secrets())
    }

    async fn get_all_workspaces(&self) -> Result<Vec<Workspace>, StoreError> {
        let mut query = self.query();
        query
            .select(&["*"])
            .from(Workspace::TABLE)
            .order_by(&["user_id", "id"]);

        let rows = db::fetch_all(self.pool(), query)
            .await
            .context("get_all_workspaces")?;
        scan_many(&rows, self.secrets())
    }

    async fn get_last_opened_file(&self, workspace_id: i64) -> Result<Option<String>, StoreError> {
        let mut query = self.query();
        query
            .select(&["last_opened_file_path"])
            .from(Workspace::TABLE)
            .where_("id = ")
            .placeholder(workspace_id);

        let row = db::fetch_optional(self.pool(), query)
            .await
            .context(format!("get_last_opened_file {workspace_id}"))?
            .ok_or_else(|| StoreError::NotFound(format!("Workspace {workspace_id}")))?;
        row.try_get::<Option<String>, _>("last_opened_file_path")
            .context(format!("get_last_opened_file {workspace_id}"))
    }
}

#[async_trait]
impl WorkspaceWriter for Database {
    async fn create_workspace(&self, workspace: Workspace) -> Result<Workspace, StoreError> {
        let created = self
            .insert_workspace(self.pool(), &workspace)
            .await
            .map_err(|e| {
                e.context(format!(
                    "create_workspace {:?} for user {}",
                    workspace.name, workspace.user_id
                ))
            })?;

        info!(
            parent: self.span(),
            workspace_id = created.id,
            user_id = created.user_id,
            git = created.git_enabled,
            "Created workspace"
        );
        Ok(created)
    }

    async fn update_workspace(&self, workspace: &Workspace) -> Result<(), StoreError> {
        workspace.validate()?;
        let mut normalized = workspace.clone();
        normalized.clear_git_when_disabled();

        let mut query = self.query();
        query.update_struct(
            &normalized,
            Workspace::TABLE,
            &["id", "user_id"],
            vec![workspace.id.into(), workspace.user_id.into()],
            self.secrets(),
        )?;

        let affected = db::execute(self.pool(), query)
            .await
            .context(format!("update_workspace {}", workspace.id))?;
        if affected == 0 {
            return Err(StoreError::NotFound(format!(
                "Workspace {} of user {}",
                workspace.id, workspace.user_id
            )));
        }
        debug!(parent: self.span(), workspace_id = workspace.id, "Updated workspace");
        Ok(())
    }

    async fn delete_workspace(&self, id: i64) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;
        let result = self.delete_workspace_tx(&mut tx, id).await;
        let deleted = self
            .finish_tx(tx, &format!("delete_workspace {id}"), result)
            .await?;

        if deleted == 0 {
            return Err(StoreError::NotFound(format!("Workspace {id}")));
        }
        info!(parent: self.span(), workspace_id = id, "Deleted workspace");
        Ok(())
    }

    async fn update_last_opened_file(
        &self,
        workspace_id: i64,
        path: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut query = self.query();
        query
            .update(Workspace::TABLE)
            .set("last_opened_file_path")
            .placeholder(path.map(str::to_string))
            .where_("id = ")
            .placeholder(workspace_id);

        let affected = db::execute(self.pool(), query)
            .await
            .context(format!("update_last_opened_file {workspace_id}"))?;
        if affected == 0 {
            return Err(StoreError::NotFound(format!("Workspace {workspace_id}")));
        }
        Ok(())
    }
}
