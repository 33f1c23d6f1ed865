//! Admin subcommands.
//!
//! User-facing output uses writeln! to the supplied writer (this is a CLI
//! binary, not debug output).

use std::io::Write;

use anyhow::{Context, bail};
use clap::Subcommand;
use marknest_store::{
    Database, Migrator, Role, SessionStore, SystemStore, User, UserStore, WorkspaceReader,
};
use tracing::info;

use crate::password::{MIN_PASSWORD_LEN, hash_password};

/// Admin subcommand actions.
#[derive(Subcommand, Debug)]
pub enum AdminAction {
    /// Apply pending schema migrations and report the schema version
    Migrate,
    /// Create a user together with its default workspace
    CreateUser {
        /// Login email (unique)
        #[arg(long)]
        email: String,
        /// Display name
        #[arg(long, default_value = "")]
        name: String,
        /// Initial password
        #[arg(long, env = "MARKNEST_NEW_USER_PASSWORD", hide_env_values = true)]
        password: String,
        /// Role: admin, editor (default), viewer
        #[arg(long, default_value = "editor", value_parser = parse_role)]
        role: Role,
    },
    /// Delete a user and all of its workspaces
    DeleteUser {
        /// User ID
        #[arg(long)]
        id: i64,
    },
    /// List all users
    ListUsers,
    /// Delete expired sessions
    ReapSessions {
        /// Keep running and sweep on the configured interval
        #[arg(long)]
        watch: bool,
    },
    /// Show user, workspace and active-user counts
    Stats,
    /// Make sure the JWT signing secret exists
    JwtSecret {
        /// Print the secret itself
        #[arg(long)]
        show: bool,
    },
    /// Print a new random encryption key (no database access)
    GenerateKey,
}

fn parse_role(s: &str) -> Result<Role, String> {
    s.parse()
        .map_err(|_| format!("Invalid role '{s}': must be 'admin', 'editor', or 'viewer'"))
}

/// Execute a subcommand that needs the database.
pub async fn run(db: &Database, action: AdminAction, out: &mut impl Write) -> anyhow::Result<()> {
    match action {
        AdminAction::Migrate => {
            let migrator = Migrator::embedded(db.dialect(), tracing::Span::current())?;
            let applied = migrator.run(db.pool()).await?;
            let versions = migrator.applied_versions(db.pool()).await?;
            writeln!(
                out,
                "Schema at version {} ({} applied now, {} total)",
                versions.last().copied().unwrap_or(0),
                applied.len(),
                versions.len()
            )?;
        }
        AdminAction::CreateUser {
            email,
            name,
            password,
            role,
        } => {
            if password.chars().count() < MIN_PASSWORD_LEN {
                bail!("Password must be at least {MIN_PASSWORD_LEN} characters");
            }
            let hash = hash_password(&password)
                .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;
            let user = db
                .create_user(User::new(email, name, hash, role))
                .await
                .context("Failed to create user")?;
            let workspace = db.get_last_workspace_name(user.id).await?;
            writeln!(
                out,
                "Created user {} <{}> ({}) with workspace {workspace:?}",
                user.id, user.email, user.role
            )?;
        }
        AdminAction::DeleteUser { id } => {
            let user = db.get_user_by_id(id).await?;
            if user.role == Role::Admin && db.count_admin_users().await? <= 1 {
                bail!("Refusing to delete the last admin user {id}");
            }
            let workspaces = db.get_workspaces_by_user_id(id).await?.len();
            db.delete_user(id).await?;
            writeln!(out, "User {id} deleted.")?;
            writeln!(out, "  Workspaces removed: {workspaces}")?;
        }
        AdminAction::ListUsers => {
            let users = db.get_all_users().await?;
            if users.is_empty() {
                writeln!(out, "No users found.")?;
            } else {
                writeln!(out, "{:<6}  {:<32}  {:<8}  NAME", "ID", "EMAIL", "ROLE")?;
                for user in &users {
                    writeln!(
                        out,
                        "{:<6}  {:<32}  {:<8}  {}",
                        user.id, user.email, user.role, user.display_name
                    )?;
                }
                writeln!(out, "\n{} user(s)", users.len())?;
            }
        }
        AdminAction::ReapSessions { .. } => {
            let removed = reap_once(db).await?;
            writeln!(out, "Removed {removed} expired session(s).")?;
        }
        AdminAction::Stats => {
            let stats = db.get_system_stats().await?;
            writeln!(out, "Users:        {}", stats.total_users)?;
            writeln!(out, "Workspaces:   {}", stats.total_workspaces)?;
            writeln!(out, "Active (30d): {}", stats.active_users)?;
        }
        AdminAction::JwtSecret { show } => {
            let secret = db.ensure_jwt_secret().await?;
            if show {
                writeln!(out, "{secret}")?;
            } else {
                writeln!(out, "JWT secret present ({} hex characters).", secret.len())?;
            }
        }
        AdminAction::GenerateKey => write_new_key(out)?,
    }
    Ok(())
}

/// Print a fresh hex-encoded master key for `MARKNEST_ENCRYPTION_KEY`.
pub fn write_new_key(out: &mut impl Write) -> std::io::Result<()> {
    writeln!(
        out,
        "{}",
        marknest_crypto::generate_secret(marknest_crypto::KEY_SIZE)
    )
}

/// One expired-session sweep.
pub async fn reap_once(db: &Database) -> anyhow::Result<u64> {
    let removed = db.clean_expired_sessions().await?;
    info!(removed, "Session sweep completed");
    Ok(removed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;

    use marknest_crypto::SecretBox;

    use super::*;
    use crate::password::verify_password;

    async fn db() -> Database {
        Database::open_in_memory(Arc::new(SecretBox::generate().unwrap()))
            .await
            .unwrap()
    }

    async fn run_to_string(db: &Database, action: AdminAction) -> anyhow::Result<String> {
        let mut out = Vec::new();
        run(db, action, &mut out).await?;
        Ok(String::from_utf8(out).unwrap())
    }

    fn create(email: &str, role: Role) -> AdminAction {
        AdminAction::CreateUser {
            email: email.to_string(),
            name: "Someone".to_string(),
            password: "long enough".to_string(),
            role,
        }
    }

    #[tokio::test]
    async fn create_user_hashes_password() {
        let db = db().await;
        let out = run_to_string(&db, create("admin@example.com", Role::Admin))
            .await
            .unwrap();
        assert!(out.contains("<admin@example.com> (admin) with workspace \"Main\""));

        let user = db.get_user_by_email("admin@example.com").await.unwrap();
        assert_ne!(user.password_hash, "long enough");
        assert!(verify_password("long enough", &user.password_hash).unwrap());
    }

    #[tokio::test]
    async fn short_password_is_rejected() {
        let db = db().await;
        let action = AdminAction::CreateUser {
            email: "a@example.com".to_string(),
            name: String::new(),
            password: "short".to_string(),
            role: Role::Editor,
        };
        assert!(run_to_string(&db, action).await.is_err());
        assert!(db.get_all_users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn last_admin_cannot_be_deleted() {
        let db = db().await;
        run_to_string(&db, create("admin@example.com", Role::Admin))
            .await
            .unwrap();
        let admin = db.get_user_by_email("admin@example.com").await.unwrap();

        let err = run_to_string(&db, AdminAction::DeleteUser { id: admin.id })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("last admin"));

        run_to_string(&db, create("editor@example.com", Role::Editor))
            .await
            .unwrap();
        let editor = db.get_user_by_email("editor@example.com").await.unwrap();
        let out = run_to_string(&db, AdminAction::DeleteUser { id: editor.id })
            .await
            .unwrap();
        assert!(out.contains("Workspaces removed: 1"));
    }

    #[tokio::test]
    async fn list_users_and_stats() {
        let db = db().await;
        assert!(run_to_string(&db, AdminAction::ListUsers)
            .await
            .unwrap()
            .contains("No users found."));

        run_to_string(&db, create("a@example.com", Role::Viewer))
            .await
            .unwrap();
        let list = run_to_string(&db, AdminAction::ListUsers).await.unwrap();
        assert!(list.contains("a@example.com"));
        assert!(list.contains("1 user(s)"));

        let stats = run_to_string(&db, AdminAction::Stats).await.unwrap();
        assert!(stats.contains("Users:        1"));
        assert!(stats.contains("Workspaces:   1"));
    }

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let db = db().await;
        let out = run_to_string(&db, AdminAction::Migrate).await.unwrap();
        assert!(out.contains("(0 applied now, 2 total)"));
    }

    #[tokio::test]
    async fn jwt_secret_is_hidden_by_default() {
        let db = db().await;
        let hidden = run_to_string(&db, AdminAction::JwtSecret { show: false })
            .await
            .unwrap();
        let shown = run_to_string(&db, AdminAction::JwtSecret { show: true })
            .await
            .unwrap();
        assert!(hidden.contains("64 hex characters"));
        assert!(!hidden.contains(shown.trim()));
    }

    #[test]
    fn generated_key_opens_a_secret_box() {
        let mut out = Vec::new();
        write_new_key(&mut out).unwrap();
        let key = String::from_utf8(out).unwrap();
        assert!(SecretBox::from_hex(key.trim()).is_ok());
    }

    #[test]
    fn role_parser_names_the_choices() {
        assert_eq!(parse_role("viewer"), Ok(Role::Viewer));
        assert!(parse_role("root").unwrap_err().contains("'admin', 'editor', or 'viewer'"));
    }
}
