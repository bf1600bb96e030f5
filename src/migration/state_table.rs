//! Schema version table management on PostgreSQL

use crate::executor::{ExecutorError, SqlExecutor};
use crate::migration::{MigrationError, VersionBackend};
use once_cell::sync::Lazy;
use regex::Regex;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("identifier pattern is valid"));

/// Check that a table name can be interpolated into SQL unquoted
///
/// # Errors
///
/// Returns `MigrationError::InvalidTableName` for anything other than a plain
/// identifier of at most 63 characters.
pub fn validate_table_name(table: &str) -> Result<(), MigrationError> {
    if IDENTIFIER.is_match(table) {
        Ok(())
    } else {
        Err(MigrationError::InvalidTableName(table.to_string()))
    }
}

/// `CREATE TABLE` statement for the schema version table
pub fn create_version_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n    version BIGINT NOT NULL,\n    PRIMARY KEY (version)\n)"
    )
}

/// Seeds version 0 unless a row is already present
pub fn seed_version_sql(table: &str) -> String {
    format!("INSERT INTO {table} (version) SELECT 0 WHERE NOT EXISTS (SELECT 1 FROM {table})")
}

/// [`VersionBackend`] storing the version in a one-row PostgreSQL table
///
/// The table lives in the connection's `current_schema()`. Names are unquoted
/// in SQL, so PostgreSQL folds them to lower case.
#[derive(Debug, Clone)]
pub struct PostgresBackend<E> {
    executor: E,
}

impl<E: SqlExecutor> PostgresBackend<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    fn table_exists(&self, table: &str) -> Result<bool, MigrationError> {
        let row = self.executor.query_opt(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = lower($1))",
            &[&table],
        )?;
        match row {
            Some(row) => Ok(row.try_get::<_, bool>(0).map_err(ExecutorError::from)?),
            None => Ok(false),
        }
    }
}

impl<E: SqlExecutor> VersionBackend for PostgresBackend<E> {
    fn ensure_connected(&mut self) -> Result<(), MigrationError> {
        self.executor.query_opt("SELECT 1", &[])?;
        Ok(())
    }

    fn read_version(&mut self, table: &str) -> Result<Option<i64>, MigrationError> {
        validate_table_name(table)?;
        if !self.table_exists(table)? {
            return Ok(None);
        }

        let row = self
            .executor
            .query_opt(&format!("SELECT version FROM {table} LIMIT 1"), &[])?;
        match row {
            Some(row) => Ok(Some(row.try_get::<_, i64>(0).map_err(ExecutorError::from)?)),
            // An empty table is reseeded by create_version_table
            None => Ok(None),
        }
    }

    fn create_version_table(&mut self, table: &str) -> Result<(), MigrationError> {
        validate_table_name(table)?;
        self.executor.execute(&create_version_table_sql(table), &[])?;
        self.executor.execute(&seed_version_sql(table), &[])?;
        Ok(())
    }

    fn write_version(&mut self, table: &str, version: i64) -> Result<(), MigrationError> {
        validate_table_name(table)?;
        let updated = self
            .executor
            .execute(&format!("UPDATE {table} SET version = $1"), &[&version])?;
        if updated == 0 {
            return Err(MigrationError::Storage(format!(
                "schema version table {table} has no row to update"
            )));
        }
        Ok(())
    }
}
