//! Migration-specific error types

use crate::migration::registry::MigrationDirection;
use std::path::PathBuf;
use thiserror::Error;

/// Migration-specific errors
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A readable migrations tree could not be walked
    #[error("Failed to read migrations directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Two migration files carry the same version number
    #[error(
        "Duplicate migration version {version}: '{first}' and '{second}'\n\
         Suggestion: Renumber one of the files so every version is unique"
    )]
    DuplicateVersion {
        version: i64,
        first: PathBuf,
        second: PathBuf,
    },

    /// The configured migration file extension cannot form a file name pattern
    #[error("Invalid migration file extension '{extension}': {reason}")]
    InvalidExtension { extension: String, reason: String },

    /// A migration file uses version 0, which means "nothing applied"
    #[error("Migration file '{0}' uses version 0, which is reserved for the empty schema")]
    ReservedVersion(PathBuf),

    /// The requested version token could not be understood
    #[error("Version {input} is not a valid version choice")]
    InvalidVersion { input: String },

    /// Step-based requests need at least one step
    #[error("Invalid step count {0}: at least one step is required")]
    InvalidSteps(u32),

    /// A migration file names a change script nobody registered
    #[error(
        "Could not find change script '{identifier}' for migration file '{path}'\n\
         Suggestion: Register it in the ChangeRegistry before running migrations"
    )]
    UnknownChange { identifier: String, path: PathBuf },

    /// A change script identifier was registered twice
    #[error("Change script '{0}' is already registered")]
    AlreadyRegistered(String),

    /// A change script's `up()` or `down()` failed
    #[error("Migration '{identifier}' (version {version}) failed during {direction}: {source}")]
    ExecutionFailed {
        version: i64,
        identifier: String,
        direction: MigrationDirection,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// Reading or writing the schema version record failed
    #[error("Schema version storage error: {0}")]
    Storage(String),

    /// The schema version table name is not a plain SQL identifier
    #[error("Invalid schema version table name '{0}'")]
    InvalidTableName(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    /// Database execution error
    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    Database(#[from] crate::executor::ExecutorError),

    /// Connection could not be established
    #[cfg(feature = "postgres")]
    #[error("Connection error: {0}")]
    Connection(#[from] crate::connection::ConnectionError),

    /// The migration advisory lock could not be taken or released
    #[error(
        "Migration lock error: {0}\n\
         Another process may be running migrations against the same database"
    )]
    Lock(String),
}
