//! Schema migrations driven by numbered change scripts
//!
//! This module provides:
//! - Migration file discovery (`<version>-<Identifier>.<ext>`, recursive)
//! - A registry mapping identifiers to change scripts
//! - The persisted schema version marker and its storage backends
//! - Version token resolution (`next`, `prev`, `+N`, `-N`, `zero`, numbers)
//! - The `Migrator` that applies or reverts scripts one step at a time
//!
//! # Example
//!
//! ```rust
//! use schema_steward::config::MigrationConfig;
//! use schema_steward::migration::{ChangeRegistry, ChangeScript, MemoryBackend, Migrator, ResultCode};
//!
//! struct CreateUsers {
//!     table: String,
//! }
//!
//! impl ChangeScript for CreateUsers {
//!     fn up(&mut self) -> anyhow::Result<()> {
//!         println!("CREATE TABLE {} (id BIGSERIAL PRIMARY KEY)", self.table);
//!         Ok(())
//!     }
//!
//!     fn down(&mut self) -> anyhow::Result<()> {
//!         println!("DROP TABLE {}", self.table);
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = tempfile::tempdir()?;
//! std::fs::write(dir.path().join("10-CreateUsers.rs"), "")?;
//!
//! let mut registry = ChangeRegistry::new();
//! registry.register("CreateUsers", |_db: (), prefix| CreateUsers { table: format!("{prefix}users") })?;
//!
//! let config = MigrationConfig::new(dir.path()).with_table_prefix("app_");
//! let mut migrator = Migrator::new(&config, (), registry, MemoryBackend::new());
//!
//! assert_eq!(migrator.update_to(None)?, ResultCode::Ok);
//! assert_eq!(migrator.current_schema_version()?, 10);
//! assert_eq!(migrator.update_to(None)?, ResultCode::AtCurrentVersion);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod file;
pub mod migrator;
pub mod registry;
pub mod resolver;
pub mod status;
pub mod version_store;

#[cfg(feature = "postgres")]
pub mod lock;
#[cfg(feature = "postgres")]
pub mod startup;
#[cfg(feature = "postgres")]
pub mod state_table;

pub use error::MigrationError;
pub use file::{parse_filename, FileIndex, MigrationFile};
pub use migrator::Migrator;
pub use registry::{ChangeRegistry, ChangeScript, MigrationDirection};
pub use resolver::{VersionResolver, VersionToken};
pub use status::{MigrationStatus, ResultCode};
pub use version_store::{MemoryBackend, SchemaVersionStore, VersionBackend, DEFAULT_SCHEMA_VERSION_TABLE};

#[cfg(feature = "postgres")]
pub use lock::AdvisoryLockGuard;
#[cfg(feature = "postgres")]
pub use startup::{connect_from_config, migrate_on_startup};
#[cfg(feature = "postgres")]
pub use state_table::PostgresBackend;
