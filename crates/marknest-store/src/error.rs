//! Error types for the Marknest store.

use marknest_crypto::CryptoError;

/// Errors returned by every store operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Secrets error: {0}")]
    Secrets(String),

    #[error("Transaction {operation} rolled back: {source}")]
    Transaction {
        operation: String,
        #[source]
        source: Box<StoreError>,
    },
}

impl StoreError {
    /// Wrap a failure that aborted a multi-statement workflow.
    pub fn transaction(operation: &str, source: Self) -> Self {
        Self::Transaction {
            operation: operation.to_string(),
            source: Box::new(source),
        }
    }

    /// Prefix the message with the operation (and identifiers) that failed.
    ///
    /// The error kind is preserved so callers can still match on it.
    #[must_use]
    pub fn context(self, operation: impl std::fmt::Display) -> Self {
        match self {
            Self::Connection(m) => Self::Connection(format!("{operation}: {m}")),
            Self::Migration(m) => Self::Migration(format!("{operation}: {m}")),
            Self::Query(m) => Self::Query(format!("{operation}: {m}")),
            Self::NotFound(m) => Self::NotFound(format!("{operation}: {m}")),
            Self::InvalidInput(m) => Self::InvalidInput(format!("{operation}: {m}")),
            Self::Constraint(m) => Self::Constraint(format!("{operation}: {m}")),
            Self::Secrets(m) => Self::Secrets(format!("{operation}: {m}")),
            tx @ Self::Transaction { .. } => tx,
        }
    }

    /// The innermost error, looking through transaction wrappers.
    pub fn root(&self) -> &Self {
        match self {
            Self::Transaction { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Self::NotFound(_))
    }

    pub fn is_constraint(&self) -> bool {
        matches!(self.root(), Self::Constraint(_))
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self.root(), Self::InvalidInput(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => Self::NotFound(e.to_string()),
            sqlx::Error::Database(db)
                if db.is_unique_violation()
                    || db.is_foreign_key_violation()
                    || db.is_check_violation()
                    || matches!(db.kind(), sqlx::error::ErrorKind::NotNullViolation) =>
            {
                Self::Constraint(db.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Connection(e.to_string())
            }
            _ => Self::Query(e.to_string()),
        }
    }
}

impl From<CryptoError> for StoreError {
    fn from(e: CryptoError) -> Self {
        Self::Secrets(e.to_string())
    }
}

impl From<marknest_core::Error> for StoreError {
    fn from(e: marknest_core::Error) -> Self {
        Self::Connection(e.to_string())
    }
}

/// Attach operation context to a fallible store call.
pub(crate) trait ResultExt<T> {
    fn context(self, operation: impl std::fmt::Display) -> Result<T, StoreError>;
}

impl<T, E: Into<StoreError>> ResultExt<T> for Result<T, E> {
    fn context(self, operation: impl std::fmt::Display) -> Result<T, StoreError> {
        self.map_err(|e| e.into().context(operation))
    }
}
