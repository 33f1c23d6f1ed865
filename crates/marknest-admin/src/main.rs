//! Marknest admin CLI
//!
//! Operates directly on the Marknest database: schema migrations, user
//! management, session sweeps and installation stats.

mod commands;
mod password;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, info_span, warn};

use marknest_core::config::load_config;
use marknest_core::db::redact_url;
use marknest_core::tracing_init::{default_filter, init_tracing};
use marknest_crypto::SecretBox;
use marknest_store::Database;

use crate::commands::AdminAction;

#[derive(Parser, Debug)]
#[command(name = "marknest-admin")]
#[command(version, about = "Marknest administration - migrations, users, sessions")]
struct Args {
    /// Database URL (sqlite://path?mode=rwc or postgres://...).
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Hex-encoded 32-byte key used to encrypt sensitive columns.
    #[arg(long, global = true, env = "MARKNEST_ENCRYPTION_KEY", hide_env_values = true)]
    encryption_key: Option<String>,

    /// Directory whose .marknest/settings.json overrides the global config.
    #[arg(long, global = true)]
    project_dir: Option<PathBuf>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    action: AdminAction,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.project_dir.as_deref())?;
    if let Some(url) = args.database_url {
        config.database.url = url;
    }
    if let Some(key) = args.encryption_key {
        config.secrets.encryption_key = Some(key);
    }

    init_tracing(
        &default_filter("marknest_admin", &config.logging.level),
        args.log_json || config.logging.json,
    );

    if matches!(args.action, AdminAction::GenerateKey) {
        commands::write_new_key(&mut io::stdout())?;
        return Ok(());
    }

    let key = config.secrets.encryption_key.as_deref().context(
        "No encryption key configured (set MARKNEST_ENCRYPTION_KEY or run generate-key)",
    )?;
    let secrets = Arc::new(SecretBox::from_hex(key).context("Invalid encryption key")?);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        database = %redact_url(&config.database.url),
        "Starting marknest-admin"
    );

    let db = Database::open(&config.database, secrets, info_span!("store")).await?;

    match args.action {
        AdminAction::ReapSessions { watch: true } => {
            let interval = Duration::from_secs(config.admin.session_reap_interval_secs.max(1));
            watch_sessions(&db, interval).await;
        }
        action => commands::run(&db, action, &mut io::stdout()).await?,
    }

    db.close().await;
    Ok(())
}

/// Sweep expired sessions on `interval` until interrupted.
async fn watch_sessions(db: &Database, interval: Duration) {
    info!(interval_secs = interval.as_secs(), "Watching for expired sessions");
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = commands::reap_once(db).await {
                    warn!(error = %e, "Session sweep failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }
}
