//! Database handle shared by every entity store.

use std::sync::Arc;

use marknest_core::config::DatabaseConfig;
use marknest_core::db::redact_url;
use marknest_crypto::Secrets;
use sqlx::any::{AnyArguments, AnyPoolOptions, AnyRow};
use sqlx::{Any, AnyPool, Executor, Transaction};
use tracing::{Span, info, warn};

use crate::error::StoreError;
use crate::migrate::Migrator;
use crate::query::{Dialect, Query};
use crate::value::{Value, ValueKind};

/// An open transaction on the shared pool.
pub type Tx = Transaction<'static, Any>;

type AnyQuery<'q> = sqlx::query::Query<'q, Any, AnyArguments<'q>>;

/// Pooled connection to either a SQLite or a Postgres database.
///
/// Cloning is cheap; clones share the pool, the secrets collaborator and the
/// logging span.
#[derive(Clone)]
pub struct Database {
    pool: AnyPool,
    dialect: Dialect,
    secrets: Arc<dyn Secrets>,
    span: Span,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("dialect", &self.dialect)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Connect using `config` and bring the schema up to date.
    ///
    /// Log events are emitted as children of `span`.
    pub async fn open(
        config: &DatabaseConfig,
        secrets: Arc<dyn Secrets>,
        span: Span,
    ) -> Result<Self, StoreError> {
        sqlx::any::install_default_drivers();
        let dialect = Dialect::from_url(&config.url)?;
        marknest_core::db::ensure_parent_dir(&config.url)?;

        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| {
                StoreError::Connection(format!("{}: {e}", redact_url(&config.url)))
            })?;

        info!(
            parent: &span,
            %dialect,
            url = %redact_url(&config.url),
            "Database opened"
        );

        let db = Self {
            pool,
            dialect,
            secrets,
            span,
        };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Private in-memory SQLite database with the schema applied.
    pub async fn open_in_memory(secrets: Arc<dyn Secrets>) -> Result<Self, StoreError> {
        sqlx::any::install_default_drivers();

        // A single connection that is never recycled keeps the database alive.
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let db = Self {
            pool,
            dialect: Dialect::Sqlite,
            secrets,
            span: Span::current(),
        };
        db.run_migrations().await?;

        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let applied = Migrator::embedded(self.dialect, self.span.clone())?
            .run(&self.pool)
            .await?;

        info!(parent: &self.span, applied = applied.len(), "Database migrations complete");
        Ok(())
    }

    /// A fresh statement builder for this database's dialect.
    pub const fn query(&self) -> Query {
        Query::new(self.dialect)
    }

    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn secrets(&self) -> &dyn Secrets {
        self.secrets.as_ref()
    }

    pub(crate) const fn span(&self) -> &Span {
        &self.span
    }

    pub async fn begin(&self) -> Result<Tx, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| StoreError::from(e).context("begin transaction"))
    }

    /// Commit on success; roll back and wrap the error otherwise.
    pub(crate) async fn finish_tx<T>(
        &self,
        tx: Tx,
        operation: &str,
        result: Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        match result {
            Ok(value) => {
                tx.commit()
                    .await
                    .map_err(|e| StoreError::transaction(operation, e.into()))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(parent: &self.span, operation, error = %rollback, "Rollback failed");
                }
                warn!(parent: &self.span, operation, error = %err, "Transaction rolled back");
                Err(StoreError::transaction(operation, err))
            }
        }
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn bind_args(sql: &str, args: Vec<Value>) -> AnyQuery<'_> {
    let mut query = sqlx::query(sql);
    for arg in args {
        query = match arg {
            Value::Null(ValueKind::Bool) => query.bind(None::<bool>),
            Value::Null(ValueKind::Int) => query.bind(None::<i64>),
            Value::Null(ValueKind::Float) => query.bind(None::<f64>),
            Value::Null(ValueKind::Text) => query.bind(None::<String>),
            Value::Null(ValueKind::Bytes) => query.bind(None::<Vec<u8>>),
            Value::Bool(b) => query.bind(b),
            Value::Int(i) => query.bind(i),
            Value::Float(f) => query.bind(f),
            Value::Text(s) => query.bind(s),
            Value::Bytes(b) => query.bind(b),
        };
    }
    query
}

/// Run a statement and report the number of affected rows.
pub(crate) async fn execute<'c, E>(executor: E, query: Query) -> Result<u64, sqlx::Error>
where
    E: Executor<'c, Database = Any>,
{
    let (sql, args) = query.into_parts();
    let result = bind_args(&sql, args).execute(executor).await?;
    Ok(result.rows_affected())
}

/// Fetch exactly one row; zero rows is `RowNotFound`.
pub(crate) async fn fetch_one<'c, E>(executor: E, query: Query) -> Result<AnyRow, sqlx::Error>
where
    E: Executor<'c, Database = Any>,
{
    let (sql, args) = query.into_parts();
    bind_args(&sql, args).fetch_one(executor).await
}

pub(crate) async fn fetch_optional<'c, E>(
    executor: E,
    query: Query,
) -> Result<Option<AnyRow>, sqlx::Error>
where
    E: Executor<'c, Database = Any>,
{
    let (sql, args) = query.into_parts();
    bind_args(&sql, args).fetch_optional(executor).await
}

pub(crate) async fn fetch_all<'c, E>(executor: E, query: Query) -> Result<Vec<AnyRow>, sqlx::Error>
where
    E: Executor<'c, Database = Any>,
{
    let (sql, args) = query.into_parts();
    bind_args(&sql, args).fetch_all(executor).await
}
