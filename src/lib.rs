//! # Schema Steward
//!
//! Versioned schema migrations for PostgreSQL on the `may` coroutine runtime.
//!
//! Migration files named `<version>-<Identifier>.rs` are discovered under a
//! directory tree, matched to change scripts registered in a
//! [`migration::ChangeRegistry`], and applied or reverted one step at a time.
//! The current version lives in a single-row `<prefix>schema_version` table.
//!
//! See [`migration`] for an end-to-end example.

pub mod config;
pub mod migration;

#[cfg(feature = "postgres")]
pub mod connection;
#[cfg(feature = "postgres")]
pub mod executor;

pub use crate::config::MigrationConfig;
pub use migration::{ChangeRegistry, ChangeScript, MigrationError, Migrator, ResultCode};

#[cfg(feature = "postgres")]
pub use connection::connect;
#[cfg(feature = "postgres")]
pub use executor::{PostgresExecutor, SqlExecutor};
