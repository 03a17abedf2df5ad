//! # CLI Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     CATALOG_DB_PATH=/srv/catalog/catalog.db                            │
//! │     CATALOG_DB_MAX_CONNECTIONS=8                                       │
//! │     CATALOG_SYNC_BATCH_SIZE=250                                        │
//! │     CATALOG_ACTOR=ops-7:sales                                          │
//! │                                                                         │
//! │  2. TOML Config File (--config, or the platform config dir)            │
//! │     ~/.config/catalog/catalog.toml (Linux)                             │
//! │     ~/Library/Application Support/com.warehouse.catalog/catalog.toml   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/srv/catalog/catalog.db"
//! max_connections = 5
//! connect_timeout_secs = 30
//!
//! [sync]
//! batch_size = 100
//!
//! [audit]
//! actor_id = "ops-7"
//! actor_role = "SALES"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use catalog_core::{Actor, Role, DEFAULT_SYNC_BATCH, MAX_PAGE_SIZE};
use catalog_db::DbConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CliError, CliResult};

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Defaults to `catalog.db` in the platform data dir.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Pool acquire timeout, also the SQLite busy timeout.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("com", "warehouse", "catalog")
        .map(|dirs| dirs.data_dir().join("catalog.db"))
        .unwrap_or_else(|| PathBuf::from("catalog.db"))
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            run_migrations: true,
        }
    }
}

impl From<&DatabaseSettings> for DbConfig {
    fn from(settings: &DatabaseSettings) -> Self {
        DbConfig::new(&settings.path)
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .run_migrations(settings.run_migrations)
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Variants per `sync pending` page.
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
}

fn default_batch_size() -> i64 {
    DEFAULT_SYNC_BATCH
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            batch_size: default_batch_size(),
        }
    }
}

// =============================================================================
// Audit Settings
// =============================================================================

/// Who the audit trail attributes CLI mutations to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSettings {
    #[serde(default = "default_actor_id")]
    pub actor_id: String,

    #[serde(default = "default_actor_role")]
    pub actor_role: Role,
}

fn default_actor_id() -> String {
    "system".to_string()
}

fn default_actor_role() -> Role {
    Role::Admin
}

impl Default for AuditSettings {
    fn default() -> Self {
        AuditSettings {
            actor_id: default_actor_id(),
            actor_role: default_actor_role(),
        }
    }
}

// =============================================================================
// Catalog Config
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub audit: AuditSettings,
}

impl CatalogConfig {
    /// Loads configuration: defaults → file → environment → validation.
    ///
    /// An explicit `config_path` that does not exist is an error; a missing
    /// file at the default location is not.
    pub fn load(config_path: Option<&Path>) -> CliResult<Self> {
        let mut config = match config_path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                Some(path) => {
                    debug!(?path, "Config file not found, using defaults");
                    Self::default()
                }
                None => Self::default(),
            },
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> CliResult<Self> {
        info!(?path, "Loading catalog config from file");
        let contents = std::fs::read_to_string(path).map_err(|source| CliError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&contents)?)
    }

    /// Applies `CATALOG_*` overrides read through `lookup`.
    fn apply_overrides<F>(&mut self, lookup: F) -> CliResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("CATALOG_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(max) = lookup("CATALOG_DB_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(max) => self.database.max_connections = max,
                Err(_) => warn!(value = %max, "Ignoring non-numeric CATALOG_DB_MAX_CONNECTIONS"),
            }
        }

        if let Some(size) = lookup("CATALOG_SYNC_BATCH_SIZE") {
            match size.parse::<i64>() {
                Ok(size) => self.sync.batch_size = size,
                Err(_) => warn!(value = %size, "Ignoring non-numeric CATALOG_SYNC_BATCH_SIZE"),
            }
        }

        // "user" or "user:role"
        if let Some(actor) = lookup("CATALOG_ACTOR") {
            let (id, role) = match actor.split_once(':') {
                Some((id, role)) => (id, Some(role)),
                None => (actor.as_str(), None),
            };
            self.audit.actor_id = id.trim().to_string();
            if let Some(role) = role {
                self.audit.actor_role = role.parse()?;
            }
        }

        Ok(())
    }

    pub fn validate(&self) -> CliResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(CliError::InvalidConfig("database.path must not be empty".into()));
        }
        if self.database.max_connections == 0 {
            return Err(CliError::InvalidConfig("database.max_connections must be at least 1".into()));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(CliError::InvalidConfig(format!(
                "database.min_connections ({}) exceeds max_connections ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.sync.batch_size) {
            return Err(CliError::InvalidConfig(format!(
                "sync.batch_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        if self.audit.actor_id.trim().is_empty() {
            return Err(CliError::InvalidConfig("audit.actor_id must not be empty".into()));
        }
        Ok(())
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "warehouse", "catalog")
            .map(|dirs| dirs.config_dir().join("catalog.toml"))
    }

    pub fn actor(&self) -> Actor {
        Actor::new(self.audit.actor_id.clone(), self.audit.actor_role)
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig::from(&self.database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = CatalogConfig::default();
        assert_eq!(config.sync.batch_size, DEFAULT_SYNC_BATCH);
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.actor(), Actor::system());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: CatalogConfig = toml::from_str(
            r#"
            [database]
            path = "/srv/catalog/catalog.db"

            [audit]
            actor_id = "ops-7"
            actor_role = "SALES"
            "#,
        )
        .unwrap();

        assert_eq!(config.database.path, PathBuf::from("/srv/catalog/catalog.db"));
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.sync.batch_size, DEFAULT_SYNC_BATCH);
        assert_eq!(config.actor(), Actor::new("ops-7", Role::Sales));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = CatalogConfig::default();
        config
            .apply_overrides(env(&[
                ("CATALOG_DB_PATH", "/tmp/other.db"),
                ("CATALOG_DB_MAX_CONNECTIONS", "8"),
                ("CATALOG_SYNC_BATCH_SIZE", "nope"),
                ("CATALOG_ACTOR", "picker-2:warehouse"),
            ]))
            .unwrap();

        assert_eq!(config.database.path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.database.max_connections, 8);
        assert_eq!(config.sync.batch_size, DEFAULT_SYNC_BATCH);
        assert_eq!(config.actor(), Actor::new("picker-2", Role::Warehouse));

        let err = config.apply_overrides(env(&[("CATALOG_ACTOR", "x:janitor")]));
        assert!(err.is_err());
    }

    #[test]
    fn test_config_validation() {
        let mut config = CatalogConfig::default();

        config.sync.batch_size = 0;
        assert!(config.validate().is_err());
        config.sync.batch_size = 50;

        config.database.min_connections = 9;
        assert!(config.validate().is_err());
        config.database.min_connections = 1;

        config.audit.actor_id = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_db_config_conversion() {
        let mut config = CatalogConfig::default();
        config.database.max_connections = 3;
        config.database.run_migrations = false;

        let db = config.db_config();
        assert_eq!(db.max_connections, 3);
        assert!(!db.run_migrations);
        assert_eq!(db.database_path, config.database.path);
    }

    #[test]
    fn test_toml_serialization() {
        let toml_str = toml::to_string_pretty(&CatalogConfig::default()).unwrap();
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[sync]"));
        assert!(toml_str.contains("[audit]"));
    }
}
