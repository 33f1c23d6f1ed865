//! Data models for Marknest storage.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use marknest_core::db::unix_timestamp;
use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::any::AnyRow;

use crate::error::StoreError;
use crate::impl_record;
use crate::value::{ColumnType, Value, ValueKind};

/// Name of the workspace created alongside every user.
pub const DEFAULT_WORKSPACE_NAME: &str = "Main";

pub const DEFAULT_THEME: &str = "light";

pub const DEFAULT_COMMIT_MSG_TEMPLATE: &str = "${action} ${filename}";

/// System setting key holding the JWT signing secret.
pub const JWT_SECRET_KEY: &str = "jwt_secret";

/// Access level of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Editor,
    Viewer,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Editor => "editor",
            Self::Viewer => "viewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Role {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "editor" => Ok(Self::Editor),
            "viewer" => Ok(Self::Viewer),
            other => Err(StoreError::InvalidInput(format!("unknown role {other:?}"))),
        }
    }
}

impl ColumnType for Role {
    const KIND: ValueKind = ValueKind::Text;

    fn to_value(&self) -> Value {
        Value::Text(self.as_str().to_string())
    }

    fn from_value(value: Value) -> Result<Self, StoreError> {
        match value {
            Value::Text(s) => s.parse(),
            other => Err(StoreError::InvalidInput(format!(
                "expected role text, got {other:?}"
            ))),
        }
    }

    fn decode(row: &AnyRow, column: &str) -> Result<Self, sqlx::Error> {
        let raw: String = row.try_get(column)?;
        raw.parse().map_err(|e: StoreError| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub display_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: i64,
    pub last_workspace_id: Option<i64>,
}

impl_record!(User => "users" {
    id: i64 [default],
    email: String,
    display_name: String,
    password_hash: String,
    role: Role,
    created_at: i64 [default],
    last_workspace_id: Option<i64> [omit_empty],
});

impl User {
    /// A user that has not been stored yet.
    pub fn new(
        email: impl Into<String>,
        display_name: impl Into<String>,
        password_hash: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            email: email.into(),
            display_name: display_name.into(),
            password_hash: password_hash.into(),
            role,
            ..Self::default()
        }
    }
}

/// A user's workspace with its editor and git settings.
///
/// `git_token` always holds plaintext here; it is sealed on write and opened
/// on read by the secrets collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub created_at: i64,
    pub last_opened_file_path: Option<String>,
    pub theme: String,
    pub auto_save: bool,
    pub show_hidden_files: bool,
    pub git_enabled: bool,
    pub git_url: String,
    pub git_user: String,
    #[serde(skip_serializing)]
    pub git_token: String,
    pub git_auto_commit: bool,
    pub git_commit_msg_template: String,
    pub git_commit_name: String,
    pub git_commit_email: String,
}

impl_record!(Workspace => "workspaces" {
    id: i64 [default],
    user_id: i64,
    name: String,
    created_at: i64 [default],
    last_opened_file_path: Option<String>,
    theme: String,
    auto_save: bool,
    show_hidden_files: bool,
    git_enabled: bool,
    git_url: String,
    git_user: String,
    git_token: String [encrypted],
    git_auto_commit: bool,
    git_commit_msg_template: String,
    git_commit_name: String,
    git_commit_email: String,
});

impl Default for Workspace {
    fn default() -> Self {
        Self {
            id: 0,
            user_id: 0,
            name: String::new(),
            created_at: 0,
            last_opened_file_path: None,
            theme: DEFAULT_THEME.to_string(),
            auto_save: false,
            show_hidden_files: false,
            git_enabled: false,
            git_url: String::new(),
            git_user: String::new(),
            git_token: String::new(),
            git_auto_commit: false,
            git_commit_msg_template: DEFAULT_COMMIT_MSG_TEMPLATE.to_string(),
            git_commit_name: String::new(),
            git_commit_email: String::new(),
        }
    }
}

impl Workspace {
    /// A workspace with baseline settings and git disabled.
    pub fn new(user_id: i64, name: impl Into<String>) -> Self {
        Self {
            user_id,
            name: name.into(),
            ..Self::default()
        }
    }

    /// Check the settings before they are written.
    ///
    /// Git sync needs a remote and an author identity.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.name.trim().is_empty() {
            return Err(StoreError::InvalidInput(
                "workspace name must not be empty".to_string(),
            ));
        }
        if self.git_enabled {
            let missing: Vec<&str> = [
                ("git_url", &self.git_url),
                ("git_commit_name", &self.git_commit_name),
                ("git_commit_email", &self.git_commit_email),
            ]
            .into_iter()
            .filter(|(_, v)| v.trim().is_empty())
            .map(|(k, _)| k)
            .collect();
            if !missing.is_empty() {
                return Err(StoreError::InvalidInput(format!(
                    "git is enabled for workspace {:?} but {} missing",
                    self.name,
                    missing.join(", ")
                )));
            }
        }
        Ok(())
    }

    /// Drop every git setting when git is disabled.
    pub fn clear_git_when_disabled(&mut self) {
        if self.git_enabled {
            return;
        }
        self.git_url.clear();
        self.git_user.clear();
        self.git_token.clear();
        self.git_auto_commit = false;
        self.git_commit_msg_template = DEFAULT_COMMIT_MSG_TEMPLATE.to_string();
        self.git_commit_name.clear();
        self.git_commit_email.clear();
    }
}

/// A refresh-token session. Only visible to lookups until `expires_at`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: i64,
    pub refresh_token: String,
    pub expires_at: i64,
    pub created_at: i64,
}

impl_record!(Session => "sessions" {
    id: String,
    user_id: i64,
    refresh_token: String,
    expires_at: i64,
    created_at: i64 [default],
});

impl Session {
    /// A session with a random id expiring `ttl` from now.
    pub fn new(user_id: i64, refresh_token: impl Into<String>, ttl: Duration) -> Self {
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            refresh_token: refresh_token.into(),
            expires_at: unix_timestamp().saturating_add(ttl),
            created_at: 0,
        }
    }

    pub const fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemSetting {
    pub key: String,
    pub value: String,
    pub updated_at: i64,
}

impl_record!(SystemSetting => "system_settings" {
    key: String,
    value: String,
    updated_at: i64,
});

/// Installation-wide counters for the admin dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStats {
    pub total_users: i64,
    pub total_workspaces: i64,
    /// Users with a session created in the last 30 days.
    pub active_users: i64,
}
