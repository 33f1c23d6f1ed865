//! Marknest data-access layer.
//!
//! - Dialect-portable statement builder (`?` for SQLite, `$N` for Postgres)
//! - Declarative record descriptors with skip/omit-empty/default/encrypted flags
//! - Row scanning with NULL-safe text and decrypt-on-read
//! - User, workspace, session and system stores behind small traits
//! - Embedded, versioned schema migrations

mod assemble;
pub mod db;
pub mod error;
pub mod migrate;
pub mod models;
pub mod query;
mod queries_sessions;
mod queries_system;
mod queries_users;
mod queries_workspaces;
pub mod record;
pub mod scan;
pub mod stores;
pub mod value;

#[cfg(test)]
mod tests;

pub use db::Database;
pub use error::StoreError;
pub use migrate::{Migration, Migrator};
pub use models::{Role, Session, SystemSetting, SystemStats, User, Workspace};
pub use query::{Dialect, JoinKind, Query};
pub use record::{Field, FieldDef, FieldFlags, Record, extract_fields};
pub use scan::{scan_into, scan_many, scan_one};
pub use stores::{
    DataStore, SessionStore, SystemStore, UserStore, WorkspaceReader, WorkspaceWriter,
};
pub use value::{ColumnType, Value, ValueKind};
