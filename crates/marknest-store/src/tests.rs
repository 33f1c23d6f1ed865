//! Store tests against in-memory and file-backed SQLite.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use marknest_core::config::DatabaseConfig;
use marknest_core::db::{sqlite_url_for, unix_timestamp};
use marknest_crypto::{KEY_SIZE, SecretBox, generate_secret};
use sqlx::Row;
use tracing::Span;

use crate::db::Database;
use crate::error::StoreError;
use crate::migrate::Migrator;
use crate::models::{Role, Session, User, Workspace};
use crate::stores::{
    DataStore, SessionStore, SystemStore, UserStore, WorkspaceReader, WorkspaceWriter,
};

async fn test_db() -> Database {
    let secrets = Arc::new(SecretBox::generate().unwrap());
    Database::open_in_memory(secrets).await.unwrap()
}

async fn alice(db: &Database) -> User {
    db.create_user(User::new("alice@example.com", "Alice", "hash-a", Role::Admin))
        .await
        .unwrap()
}

fn git_workspace(user_id: i64, name: &str) -> Workspace {
    let mut ws = Workspace::new(user_id, name);
    ws.git_enabled = true;
    ws.git_url = "https://example.com/notes.git".to_string();
    ws.git_user = "alice".to_string();
    ws.git_token = "ghp_plaintext_token".to_string();
    ws.git_commit_name = "Alice".to_string();
    ws.git_commit_email = "alice@example.com".to_string();
    ws
}

async fn raw_git_token(db: &Database, workspace_id: i64) -> Option<String> {
    sqlx::query("SELECT git_token FROM workspaces WHERE id = ?")
        .bind(workspace_id)
        .fetch_one(db.pool())
        .await
        .unwrap()
        .try_get("git_token")
        .unwrap()
}

// === User tests ===

#[tokio::test]
async fn create_user_adds_default_workspace() {
    let db = test_db().await;
    let user = alice(&db).await;

    assert!(user.id > 0);
    assert!(user.created_at > 0);
    assert_eq!(user.role, Role::Admin);

    let workspaces = db.get_workspaces_by_user_id(user.id).await.unwrap();
    assert_eq!(workspaces.len(), 1);
    assert_eq!(workspaces[0].name, "Main");
    assert_eq!(workspaces[0].theme, "light");
    assert_eq!(user.last_workspace_id, Some(workspaces[0].id));

    let stored = db.get_user_by_id(user.id).await.unwrap();
    assert_eq!(stored, user);
    assert_eq!(db.get_last_workspace_name(user.id).await.unwrap(), "Main");
}

#[tokio::test]
async fn get_user_by_email() {
    let db = test_db().await;
    let user = alice(&db).await;

    let found = db.get_user_by_email("alice@example.com").await.unwrap();
    assert_eq!(found.id, user.id);

    let err = db.get_user_by_email("bob@example.com").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("bob@example.com"));
}

#[tokio::test]
async fn null_display_name_reads_as_empty() {
    let db = test_db().await;
    sqlx::query("INSERT INTO users (email, password_hash, role) VALUES ('raw@example.com', 'h', 'viewer')")
        .execute(db.pool())
        .await
        .unwrap();

    let user = db.get_user_by_email("raw@example.com").await.unwrap();
    assert_eq!(user.display_name, "");
    assert_eq!(user.role, Role::Viewer);
    assert!(user.last_workspace_id.is_none());
}

#[tokio::test]
async fn duplicate_email_rolls_back_as_constraint() {
    let db = test_db().await;
    alice(&db).await;

    let err = db
        .create_user(User::new("alice@example.com", "Other", "hash", Role::Editor))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Transaction { .. }));
    assert!(err.is_constraint());

    assert_eq!(db.get_all_users().await.unwrap().len(), 1);
    assert_eq!(db.get_all_workspaces().await.unwrap().len(), 1);
}

#[tokio::test]
async fn failed_workspace_creation_leaves_no_user() {
    let db = test_db().await;
    sqlx::raw_sql(
        "CREATE TRIGGER reject_workspaces BEFORE INSERT ON workspaces \
         BEGIN SELECT RAISE(ABORT, 'workspace creation disabled'); END;",
    )
    .execute(db.pool())
    .await
    .unwrap();

    let err = db
        .create_user(User::new("carol@example.com", "Carol", "hash", Role::Editor))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Transaction { .. }));
    assert!(err.to_string().contains("create_user carol@example.com"));

    let lookup = db.get_user_by_email("carol@example.com").await.unwrap_err();
    assert!(lookup.is_not_found());
    assert!(db.get_all_users().await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_user_cascades_to_workspaces_and_sessions() {
    let db = test_db().await;
    let user = alice(&db).await;
    let extra = db
        .create_workspace(Workspace::new(user.id, "Journal"))
        .await
        .unwrap();
    let session = db
        .create_session(Session::new(user.id, "refresh-a", Duration::from_secs(3600)))
        .await
        .unwrap();
    let default_id = user.last_workspace_id.unwrap();

    db.delete_user(user.id).await.unwrap();

    for id in [default_id, extra.id] {
        assert!(db.get_workspace_by_id(id).await.unwrap_err().is_not_found());
    }
    assert!(db.get_user_by_id(user.id).await.unwrap_err().is_not_found());
    assert!(db
        .get_user_by_email("alice@example.com")
        .await
        .unwrap_err()
        .is_not_found());
    assert!(db.get_session_by_id(&session.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn delete_missing_user_is_not_found() {
    let db = test_db().await;
    let err = db.delete_user(404).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!matches!(err, StoreError::Transaction { .. }));
}

#[tokio::test]
async fn update_user_changes_fields() {
    let db = test_db().await;
    let mut user = alice(&db).await;

    user.display_name = "Alice Liddell".to_string();
    user.role = Role::Viewer;
    db.update_user(&user).await.unwrap();

    let stored = db.get_user_by_id(user.id).await.unwrap();
    assert_eq!(stored.display_name, "Alice Liddell");
    assert_eq!(stored.role, Role::Viewer);
    assert_eq!(stored.last_workspace_id, user.last_workspace_id);
}

#[tokio::test]
async fn update_missing_user_is_not_found() {
    let db = test_db().await;
    let mut ghost = User::new("ghost@example.com", "Ghost", "hash", Role::Viewer);
    ghost.id = 99;
    assert!(db.update_user(&ghost).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn update_last_workspace_by_name() {
    let db = test_db().await;
    let user = alice(&db).await;
    let journal = db
        .create_workspace(Workspace::new(user.id, "Journal"))
        .await
        .unwrap();

    db.update_last_workspace(user.id, "Journal").await.unwrap();
    let stored = db.get_user_by_id(user.id).await.unwrap();
    assert_eq!(stored.last_workspace_id, Some(journal.id));
    assert_eq!(db.get_last_workspace_name(user.id).await.unwrap(), "Journal");
}

#[tokio::test]
async fn unknown_workspace_name_keeps_pointer() {
    let db = test_db().await;
    let user = alice(&db).await;

    let err = db
        .update_last_workspace(user.id, "Nowhere")
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let stored = db.get_user_by_id(user.id).await.unwrap();
    assert_eq!(stored.last_workspace_id, user.last_workspace_id);
}

#[tokio::test]
async fn count_admin_users() {
    let db = test_db().await;
    alice(&db).await;
    db.create_user(User::new("bob@example.com", "Bob", "hash", Role::Editor))
        .await
        .unwrap();
    db.create_user(User::new("root@example.com", "Root", "hash", Role::Admin))
        .await
        .unwrap();

    assert_eq!(db.count_admin_users().await.unwrap(), 2);
}

// === Workspace tests ===

#[tokio::test]
async fn workspace_flags_are_stored_as_integers() {
    let db = test_db().await;
    let user = alice(&db).await;

    let mut ws = git_workspace(user.id, "Flags");
    ws.auto_save = true;
    ws.show_hidden_files = true;
    ws.git_auto_commit = true;
    let created = db.create_workspace(ws).await.unwrap();
    assert!(created.auto_save);
    assert!(created.show_hidden_files);
    assert!(created.git_enabled);
    assert!(created.git_auto_commit);

    let row = sqlx::query(
        "SELECT auto_save + show_hidden_files + git_enabled + git_auto_commit AS flags \
         FROM workspaces WHERE id = ?",
    )
    .bind(created.id)
    .fetch_one(db.pool())
    .await
    .unwrap();
    assert_eq!(row.get::<i64, _>("flags"), 4);

    let main = db.get_workspace_by_name(user.id, "Main").await.unwrap();
    assert!(!main.auto_save);
    assert!(!main.git_enabled);
}

#[tokio::test]
async fn git_token_is_encrypted_at_rest() {
    let db = test_db().await;
    let user = alice(&db).await;

    let created = db
        .create_workspace(git_workspace(user.id, "Synced"))
        .await
        .unwrap();
    assert_eq!(created.git_token, "ghp_plaintext_token");

    let raw = raw_git_token(&db, created.id).await.unwrap();
    assert_ne!(raw, "ghp_plaintext_token");
    assert!(!raw.is_empty());

    let read = db.get_workspace_by_id(created.id).await.unwrap();
    assert_eq!(read.git_token, "ghp_plaintext_token");
    assert_eq!(read.git_commit_email, "alice@example.com");
}

#[tokio::test]
async fn update_workspace_reencrypts_token() {
    let db = test_db().await;
    let user = alice(&db).await;
    let mut ws = db
        .create_workspace(git_workspace(user.id, "Synced"))
        .await
        .unwrap();

    ws.git_token = "ghp_rotated".to_string();
    ws.theme = "dark".to_string();
    db.update_workspace(&ws).await.unwrap();

    assert_ne!(raw_git_token(&db, ws.id).await.unwrap(), "ghp_rotated");
    let read = db.get_workspace_by_name(user.id, "Synced").await.unwrap();
    assert_eq!(read.git_token, "ghp_rotated");
    assert_eq!(read.theme, "dark");
}

#[tokio::test]
async fn git_enabled_workspace_requires_identity() {
    let db = test_db().await;
    let user = alice(&db).await;
    let mut ws = git_workspace(user.id, "Broken");
    ws.git_commit_email.clear();

    let err = db.create_workspace(ws).await.unwrap_err();
    assert!(err.is_invalid_input());
    assert!(db.get_workspace_by_name(user.id, "Broken").await.is_err());
}

#[tokio::test]
async fn disabling_git_clears_settings() {
    let db = test_db().await;
    let user = alice(&db).await;
    let mut ws = db
        .create_workspace(git_workspace(user.id, "Synced"))
        .await
        .unwrap();

    ws.git_enabled = false;
    db.update_workspace(&ws).await.unwrap();

    let read = db.get_workspace_by_id(ws.id).await.unwrap();
    assert!(!read.git_enabled);
    assert!(read.git_url.is_empty());
    assert!(read.git_token.is_empty());
    assert_eq!(raw_git_token(&db, ws.id).await.as_deref(), Some(""));
}

#[tokio::test]
async fn duplicate_workspace_name_is_constraint() {
    let db = test_db().await;
    let user = alice(&db).await;
    let err = db
        .create_workspace(Workspace::new(user.id, "Main"))
        .await
        .unwrap_err();
    assert!(err.is_constraint());
}

#[tokio::test]
async fn delete_workspace_clears_last_workspace_pointer() {
    let db = test_db().await;
    let user = alice(&db).await;
    let default_id = user.last_workspace_id.unwrap();

    db.delete_workspace(default_id).await.unwrap();

    let stored = db.get_user_by_id(user.id).await.unwrap();
    assert!(stored.last_workspace_id.is_none());
    assert!(db.get_last_workspace_name(user.id).await.unwrap_err().is_not_found());
    assert!(db.delete_workspace(default_id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn last_opened_file_round_trip() {
    let db = test_db().await;
    let user = alice(&db).await;
    let ws_id = user.last_workspace_id.unwrap();

    assert_eq!(db.get_last_opened_file(ws_id).await.unwrap(), None);

    db.update_last_opened_file(ws_id, Some("notes/todo.md"))
        .await
        .unwrap();
    assert_eq!(
        db.get_last_opened_file(ws_id).await.unwrap().as_deref(),
        Some("notes/todo.md")
    );

    db.update_last_opened_file(ws_id, None).await.unwrap();
    assert_eq!(db.get_last_opened_file(ws_id).await.unwrap(), None);

    assert!(db
        .update_last_opened_file(9999, Some("x.md"))
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn workspace_readers_list_by_owner() {
    let db = test_db().await;
    let a = alice(&db).await;
    let b = db
        .create_user(User::new("bob@example.com", "Bob", "hash", Role::Editor))
        .await
        .unwrap();
    db.create_workspace(Workspace::new(a.id, "Journal"))
        .await
        .unwrap();

    let reader: &dyn WorkspaceReader = &db;
    assert_eq!(reader.get_workspaces_by_user_id(a.id).await.unwrap().len(), 2);
    assert_eq!(reader.get_workspaces_by_user_id(b.id).await.unwrap().len(), 1);
    assert_eq!(reader.get_all_workspaces().await.unwrap().len(), 3);
}

// === Session tests ===

#[tokio::test]
async fn session_lookup_by_token_and_id() {
    let db = test_db().await;
    let user = alice(&db).await;
    let session = db
        .create_session(Session::new(user.id, "refresh-1", Duration::from_secs(3600)))
        .await
        .unwrap();
    assert!(session.created_at > 0);

    let by_token = db.get_session_by_refresh_token("refresh-1").await.unwrap();
    assert_eq!(by_token.id, session.id);
    let by_id = db.get_session_by_id(&session.id).await.unwrap();
    assert_eq!(by_id.refresh_token, "refresh-1");

    db.delete_session(&session.id).await.unwrap();
    assert!(db
        .get_session_by_refresh_token("refresh-1")
        .await
        .unwrap_err()
        .is_not_found());
    assert!(db.delete_session(&session.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn expired_sessions_are_invisible_until_cleaned() {
    let db = test_db().await;
    let user = alice(&db).await;
    let now = unix_timestamp();

    let mut expired = Session::new(user.id, "old", Duration::ZERO);
    expired.expires_at = now - 10;
    let expired = db.create_session(expired).await.unwrap();
    let live = db
        .create_session(Session::new(user.id, "fresh", Duration::from_secs(3600)))
        .await
        .unwrap();

    assert!(db.get_session_by_refresh_token("old").await.is_err());
    assert!(db.get_session_by_id(&expired.id).await.is_err());

    let mut boundary = Session::new(user.id, "edge", Duration::ZERO);
    boundary.expires_at = now;
    let boundary = db.create_session(boundary).await.unwrap();
    assert!(db
        .get_session_by_refresh_token("edge")
        .await
        .unwrap_err()
        .is_not_found());
    assert!(db.get_session_by_id(&boundary.id).await.is_err());

    let remaining: i64 = sqlx::query("SELECT COUNT(*) AS count FROM sessions")
        .fetch_one(db.pool())
        .await
        .unwrap()
        .get("count");
    assert_eq!(remaining, 3, "expired rows stay until a sweep");

    assert_eq!(db.clean_expired_sessions().await.unwrap(), 2);
    assert_eq!(db.clean_expired_sessions().await.unwrap(), 0);

    let still_live = db.get_session_by_refresh_token("fresh").await.unwrap();
    assert_eq!(still_live.id, live.id);
}

// === System tests ===

#[tokio::test]
async fn jwt_secret_is_created_once() {
    let db = test_db().await;

    let first = db.ensure_jwt_secret().await.unwrap();
    assert_eq!(first.len(), 64);
    assert!(first.chars().all(|c| c.is_ascii_hexdigit()));

    let second = db.ensure_jwt_secret().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(db.get_system_setting("jwt_secret").await.unwrap(), first);
}

#[tokio::test]
async fn system_settings_upsert() {
    let db = test_db().await;
    assert!(db.get_system_setting("motd").await.unwrap_err().is_not_found());

    db.set_system_setting("motd", "hello").await.unwrap();
    db.set_system_setting("motd", "goodbye").await.unwrap();
    assert_eq!(db.get_system_setting("motd").await.unwrap(), "goodbye");
}

#[tokio::test]
async fn system_stats_counts() {
    let db = test_db().await;
    let a = alice(&db).await;
    let b = db
        .create_user(User::new("bob@example.com", "Bob", "hash", Role::Editor))
        .await
        .unwrap();
    db.create_workspace(Workspace::new(a.id, "Journal"))
        .await
        .unwrap();
    for token in ["a1", "a2"] {
        db.create_session(Session::new(a.id, token, Duration::from_secs(60)))
            .await
            .unwrap();
    }
    sqlx::query("INSERT INTO sessions (id, user_id, refresh_token, expires_at, created_at) VALUES ('stale', ?, 'b1', ?, ?)")
        .bind(b.id)
        .bind(unix_timestamp() + 60)
        .bind(unix_timestamp() - 40 * 24 * 60 * 60)
        .execute(db.pool())
        .await
        .unwrap();

    let stats = db.get_system_stats().await.unwrap();
    assert_eq!(stats.total_users, 2);
    assert_eq!(stats.total_workspaces, 3);
    assert_eq!(stats.active_users, 1);
}

#[tokio::test]
async fn database_is_usable_as_data_store_object() {
    let store: Arc<dyn DataStore> = Arc::new(test_db().await);
    let user = store
        .create_user(User::new("dyn@example.com", "Dyn", "hash", Role::Viewer))
        .await
        .unwrap();
    assert_eq!(store.get_workspaces_by_user_id(user.id).await.unwrap().len(), 1);
    assert_eq!(store.get_system_stats().await.unwrap().total_users, 1);
}

// === Persistence tests ===

#[tokio::test]
async fn file_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig {
        url: sqlite_url_for(&dir.path().join("nested").join("marknest.db")),
        max_connections: 2,
    };
    let key = generate_secret(KEY_SIZE);

    let ws_id = {
        let db = Database::open(
            &config,
            Arc::new(SecretBox::from_hex(&key).unwrap()),
            Span::none(),
        )
        .await
        .unwrap();
        let user = alice(&db).await;
        let ws = db
            .create_workspace(git_workspace(user.id, "Synced"))
            .await
            .unwrap();
        db.close().await;
        ws.id
    };

    let db = Database::open(
        &config,
        Arc::new(SecretBox::from_hex(&key).unwrap()),
        Span::none(),
    )
    .await
    .unwrap();

    let migrator = Migrator::embedded(db.dialect(), Span::none()).unwrap();
    assert_eq!(migrator.applied_versions(db.pool()).await.unwrap(), vec![1, 2]);
    assert!(migrator.run(db.pool()).await.unwrap().is_empty());

    let ws = db.get_workspace_by_id(ws_id).await.unwrap();
    assert_eq!(ws.git_token, "ghp_plaintext_token");
}

#[tokio::test]
async fn unsupported_url_is_a_connection_error() {
    let config = DatabaseConfig {
        url: "mysql://localhost/marknest".to_string(),
        max_connections: 1,
    };
    let err = Database::open(
        &config,
        Arc::new(SecretBox::generate().unwrap()),
        Span::none(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, StoreError::Connection(_)));
}
