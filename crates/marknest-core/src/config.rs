//! Configuration resolution for Marknest.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/marknest/settings.json)
//! 3. Project config (.marknest/settings.json)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Complete Marknest configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

/// Database connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `sqlite:` or `postgres:` URL.
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: 5,
        }
    }
}

/// Secrets collaborator configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecretsConfig {
    /// Hex-encoded 32-byte master key used to encrypt sensitive columns.
    pub encryption_key: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Admin tooling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Interval between expired-session sweeps when running in watch mode.
    pub session_reap_interval_secs: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            session_reap_interval_secs: 60 * 60, // 1 hour
        }
    }
}

/// One settings file. Every field is optional so a file only overrides what
/// it names.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    database: DatabaseOverlay,
    secrets: SecretsConfig,
    logging: LoggingOverlay,
    admin: AdminOverlay,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct DatabaseOverlay {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct LoggingOverlay {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct AdminOverlay {
    session_reap_interval_secs: Option<u64>,
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    // Load global config
    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            let global = load_config_file(&global_path)?;
            merge_config(&mut config, global);
        }
    }

    // Load project config
    if let Some(dir) = project_dir {
        let project_path = dir.join(".marknest").join("settings.json");
        if project_path.exists() {
            let project = load_config_file(&project_path)?;
            merge_config(&mut config, project);
        }
    }

    // Apply environment overrides
    apply_env_overrides(&mut config);

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("settings.json"))
}

/// Get the default SQLite database path.
pub fn database_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("marknest.db"))
}

fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".marknest"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/marknest"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("marknest"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

fn default_database_url() -> String {
    database_path().map_or_else(
        || "sqlite://marknest.db?mode=rwc".to_string(),
        |p| crate::db::sqlite_url_for(&p),
    )
}

fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: ConfigFile) {
    if let Some(url) = overlay.database.url {
        base.database.url = url;
    }
    if let Some(n) = overlay.database.max_connections {
        base.database.max_connections = n;
    }

    if overlay.secrets.encryption_key.is_some() {
        base.secrets.encryption_key = overlay.secrets.encryption_key;
    }

    if let Some(level) = overlay.logging.level {
        base.logging.level = level;
    }
    if let Some(json) = overlay.logging.json {
        base.logging.json = json;
    }

    if let Some(secs) = overlay.admin.session_reap_interval_secs {
        base.admin.session_reap_interval_secs = secs;
    }
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(val) = std::env::var("MARKNEST_DATABASE_URL") {
        config.database.url = val;
    }
    if let Ok(val) = std::env::var("MARKNEST_DB_MAX_CONNECTIONS") {
        if let Ok(n) = val.parse() {
            config.database.max_connections = n;
        }
    }
    if let Ok(val) = std::env::var("MARKNEST_ENCRYPTION_KEY") {
        config.secrets.encryption_key = Some(val);
    }
    if let Ok(val) = std::env::var("MARKNEST_LOG_LEVEL") {
        config.logging.level = val;
    }
}
