//! Configuration for the migration manager.
//!
//! [`MigrationConfig::load`] reads the `[migrations]` section of
//! `config/config.toml` and lets `SCHEMA_STEWARD`-prefixed environment
//! variables override it (`__` separates nested keys).

use ::config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::migration::version_store::DEFAULT_SCHEMA_VERSION_TABLE;

const ENV_PREFIX: &str = "SCHEMA_STEWARD";
const DEFAULT_CONFIG_FILE: &str = "config/config.toml";

/// `SCHEMA_STEWARD_MIGRATIONS__TABLE_PREFIX` sets `migrations.table_prefix`
fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX).prefix_separator("_").separator("__")
}

/// Advisory lock key used when none is configured ("schemavs" in ASCII)
pub const DEFAULT_LOCK_KEY: i64 = 0x7363_6865_6d61_7673;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MigrationConfig {
    /// Directory scanned (recursively) for migration files
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,
    /// File extension of migration files, without the dot
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Prefix placed before table names, handed to every change script
    #[serde(default)]
    pub table_prefix: String,
    /// Name of the table holding the schema version (before prefixing)
    #[serde(default = "default_schema_version_table")]
    pub schema_version_table: String,
    /// Connection string used by the startup helper
    #[serde(default)]
    pub database_url: Option<String>,
    /// Key of the advisory lock held while migrating
    #[serde(default = "default_lock_key")]
    pub lock_key: i64,
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("./scripts/migrations")
}

fn default_extension() -> String {
    "rs".to_string()
}

fn default_schema_version_table() -> String {
    DEFAULT_SCHEMA_VERSION_TABLE.to_string()
}

fn default_lock_key() -> i64 {
    DEFAULT_LOCK_KEY
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: default_migrations_dir(),
            extension: default_extension(),
            table_prefix: String::new(),
            schema_version_table: default_schema_version_table(),
            database_url: None,
            lock_key: default_lock_key(),
        }
    }
}

impl MigrationConfig {
    /// Config pointing at a migrations directory, everything else default
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// `<table_prefix><schema_version_table>`
    pub fn prefixed_schema_version_table_name(&self) -> String {
        format!("{}{}", self.table_prefix, self.schema_version_table)
    }

    /// Load from `config/config.toml`, falling back to env vars.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from a specific TOML file (optional), then env vars.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let builder = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(env_source());

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // The file exists but could not be parsed or read; retry with env only
                if path.exists() {
                    log::warn!(
                        "Failed to load config file {}, falling back to env. Error: {}",
                        path.display(),
                        err
                    );
                }
                Config::builder()
                    .add_source(env_source())
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {}, then env-only error: {}",
                            err, env_err
                        ))
                    })?
            }
        };

        match settings.get::<MigrationConfig>("migrations") {
            Ok(config) => Ok(config),
            // Every field has a default, so a missing section is fine
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(ConfigError::Message(format!(
                "Migration configuration could not be loaded from file or environment: {}",
                e
            ))),
        }
    }
}
