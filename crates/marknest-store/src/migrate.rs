//! Versioned schema migrations embedded in the binary.
//!
//! Scripts live under `migrations/<dialect>/NNNN_description.sql`. Each
//! pending script runs in its own transaction together with the row that
//! records its version, so a failure leaves the schema at the last version
//! that committed.

use std::borrow::Cow;
use std::collections::HashSet;

use include_dir::{Dir, include_dir};
use marknest_core::db::unix_timestamp;
use sqlx::{AnyPool, Row};
use tracing::{Span, debug, info};

use crate::db;
use crate::error::{ResultExt, StoreError};
use crate::query::{Dialect, Query};

static MIGRATIONS: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/migrations");

const CREATE_MIGRATIONS_TABLE: &str = "CREATE TABLE IF NOT EXISTS migrations (\
     version BIGINT PRIMARY KEY, \
     applied_at BIGINT NOT NULL)";

/// One schema change script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub sql: Cow<'static, str>,
}

impl Migration {
    pub fn new(version: i64, name: impl Into<String>, sql: impl Into<Cow<'static, str>>) -> Self {
        Self {
            version,
            name: name.into(),
            sql: sql.into(),
        }
    }

    /// Build from a `NNNN_description.sql` file name.
    pub fn from_file_name(
        file_name: &str,
        sql: impl Into<Cow<'static, str>>,
    ) -> Result<Self, StoreError> {
        let stem = file_name
            .strip_suffix(".sql")
            .ok_or_else(|| StoreError::Migration(format!("{file_name}: not a .sql file")))?;
        let (prefix, name) = stem.split_once('_').unwrap_or((stem, ""));
        let version = prefix.parse::<i64>().map_err(|_| {
            StoreError::Migration(format!("{file_name}: missing numeric version prefix"))
        })?;
        Ok(Self::new(version, name, sql))
    }
}

/// Applies a fixed, ordered set of migrations to one database.
#[derive(Debug)]
pub struct Migrator {
    dialect: Dialect,
    migrations: Vec<Migration>,
    span: Span,
}

impl Migrator {
    /// Sort `migrations` by version, rejecting duplicates.
    pub fn new(
        dialect: Dialect,
        mut migrations: Vec<Migration>,
        span: Span,
    ) -> Result<Self, StoreError> {
        migrations.sort_by_key(|m| m.version);
        if let Some(pair) = migrations.windows(2).find(|w| w[0].version == w[1].version) {
            return Err(StoreError::Migration(format!(
                "duplicate migration version {}",
                pair[0].version
            )));
        }
        Ok(Self {
            dialect,
            migrations,
            span,
        })
    }

    /// The scripts bundled for `dialect`.
    pub fn embedded(dialect: Dialect, span: Span) -> Result<Self, StoreError> {
        let dir = MIGRATIONS.get_dir(dialect.name()).ok_or_else(|| {
            StoreError::Migration(format!("no embedded migrations for {dialect}"))
        })?;

        let mut migrations = Vec::new();
        for file in dir.files() {
            let Some(file_name) = file.path().file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !file_name.ends_with(".sql") {
                continue;
            }
            let sql = file.contents_utf8().ok_or_else(|| {
                StoreError::Migration(format!("{file_name}: script is not valid UTF-8"))
            })?;
            migrations.push(Migration::from_file_name(file_name, sql)?);
        }

        Self::new(dialect, migrations, span)
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Highest version this migrator knows about.
    pub fn latest_version(&self) -> Option<i64> {
        self.migrations.last().map(|m| m.version)
    }

    async fn ensure_table(&self, pool: &AnyPool) -> Result<(), StoreError> {
        sqlx::raw_sql(CREATE_MIGRATIONS_TABLE)
            .execute(pool)
            .await
            .map_err(|e| StoreError::Migration(format!("create migrations table: {e}")))?;
        Ok(())
    }

    /// Versions recorded in the migrations table, ascending.
    pub async fn applied_versions(&self, pool: &AnyPool) -> Result<Vec<i64>, StoreError> {
        self.ensure_table(pool).await?;

        let mut query = Query::new(self.dialect);
        query
            .select(&["version"])
            .from("migrations")
            .order_by(&["version"]);
        let rows = db::fetch_all(pool, query)
            .await
            .context("applied_versions")?;

        rows.iter()
            .map(|row| row.try_get::<i64, _>("version"))
            .collect::<Result<Vec<_>, _>>()
            .context("applied_versions")
    }

    /// Apply every pending migration in ascending order.
    ///
    /// Returns the versions applied by this call; a second run returns an
    /// empty list.
    pub async fn run(&self, pool: &AnyPool) -> Result<Vec<i64>, StoreError> {
        let applied: HashSet<i64> = self.applied_versions(pool).await?.into_iter().collect();
        let mut newly_applied = Vec::new();

        for migration in &self.migrations {
            if applied.contains(&migration.version) {
                debug!(
                    parent: &self.span,
                    version = migration.version,
                    "Migration already applied"
                );
                continue;
            }
            self.apply(pool, migration).await?;
            info!(
                parent: &self.span,
                version = migration.version,
                name = %migration.name,
                "Applied migration"
            );
            newly_applied.push(migration.version);
        }

        Ok(newly_applied)
    }

    async fn apply(&self, pool: &AnyPool, migration: &Migration) -> Result<(), StoreError> {
        let label = format!("{:04}_{}", migration.version, migration.name);
        let failed = |e: sqlx::Error| StoreError::Migration(format!("{label}: {e}"));

        let mut tx = pool.begin().await.map_err(failed)?;

        sqlx::raw_sql(&migration.sql)
            .execute(&mut *tx)
            .await
            .map_err(failed)?;

        let mut record = Query::new(self.dialect);
        record
            .insert("migrations", &["version", "applied_at"])
            .values(2)
            .add_args([migration.version, unix_timestamp()]);
        db::execute(&mut *tx, record).await.map_err(failed)?;

        tx.commit().await.map_err(failed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use sqlx::any::AnyPoolOptions;

    use super::*;

    async fn pool() -> AnyPool {
        sqlx::any::install_default_drivers();
        AnyPoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    async fn table_exists(pool: &AnyPool, name: &str) -> bool {
        sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(name)
            .fetch_optional(pool)
            .await
            .unwrap()
            .is_some()
    }

    #[test]
    fn parses_versioned_file_names() {
        let m = Migration::from_file_name("0002_workspace_git_commit_identity.sql", "").unwrap();
        assert_eq!(m.version, 2);
        assert_eq!(m.name, "workspace_git_commit_identity");

        assert!(Migration::from_file_name("initial.sql", "").is_err());
        assert!(Migration::from_file_name("0001_initial.txt", "").is_err());
    }

    #[test]
    fn embedded_sets_are_ordered_and_parallel() {
        let lite = Migrator::embedded(Dialect::Sqlite, Span::none()).unwrap();
        let pg = Migrator::embedded(Dialect::Postgres, Span::none()).unwrap();

        let versions = |m: &Migrator| m.migrations().iter().map(|m| m.version).collect::<Vec<_>>();
        assert!(versions(&lite).windows(2).all(|w| w[0] < w[1]));
        assert_eq!(versions(&lite), versions(&pg));
        assert_eq!(lite.latest_version(), Some(2));
    }

    #[test]
    fn duplicate_versions_are_rejected() {
        let result = Migrator::new(
            Dialect::Sqlite,
            vec![Migration::new(1, "a", "SELECT 1"), Migration::new(1, "b", "SELECT 1")],
            Span::none(),
        );
        assert!(matches!(result, Err(StoreError::Migration(_))));
    }

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let pool = pool().await;
        let migrator = Migrator::embedded(Dialect::Sqlite, Span::none()).unwrap();

        let first = migrator.run(&pool).await.unwrap();
        assert_eq!(first, vec![1, 2]);
        let after_first = migrator.applied_versions(&pool).await.unwrap();

        let second = migrator.run(&pool).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(migrator.applied_versions(&pool).await.unwrap(), after_first);

        for table in ["users", "workspaces", "sessions", "system_settings"] {
            assert!(table_exists(&pool, table).await, "missing table {table}");
        }
    }

    #[tokio::test]
    async fn applies_out_of_order_input_in_ascending_order() {
        let pool = pool().await;
        let migrator = Migrator::new(
            Dialect::Sqlite,
            vec![
                Migration::new(2, "add_column", "ALTER TABLE notes ADD COLUMN body TEXT"),
                Migration::new(1, "create", "CREATE TABLE notes (id INTEGER PRIMARY KEY)"),
            ],
            Span::none(),
        )
        .unwrap();

        assert_eq!(migrator.run(&pool).await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn failing_script_stops_at_last_good_version() {
        let pool = pool().await;
        let migrator = Migrator::new(
            Dialect::Sqlite,
            vec![
                Migration::new(1, "first", "CREATE TABLE first (id INTEGER PRIMARY KEY)"),
                Migration::new(
                    2,
                    "broken",
                    "CREATE TABLE second (id INTEGER PRIMARY KEY); INSERT INTO missing VALUES (1);",
                ),
                Migration::new(3, "third", "CREATE TABLE third (id INTEGER PRIMARY KEY)"),
            ],
            Span::none(),
        )
        .unwrap();

        let err = migrator.run(&pool).await.unwrap_err();
        assert!(matches!(&err, StoreError::Migration(m) if m.starts_with("0002_broken")));

        assert_eq!(migrator.applied_versions(&pool).await.unwrap(), vec![1]);
        assert!(table_exists(&pool, "first").await);
        assert!(!table_exists(&pool, "second").await);
        assert!(!table_exists(&pool, "third").await);
    }
}
