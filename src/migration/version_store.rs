//! Persistent schema version marker

use crate::migration::MigrationError;
use std::collections::HashMap;

/// Default name of the table holding the schema version
pub const DEFAULT_SCHEMA_VERSION_TABLE: &str = "schema_version";

/// Storage capability behind [`SchemaVersionStore`]
///
/// Implementations only move a single integer in and out of a named record;
/// caching and first-use bootstrap live in the store.
pub trait VersionBackend {
    /// Lightweight handshake confirming the connection is live
    ///
    /// The store calls this before its first read and tries once more if it
    /// fails, so a dropped idle connection is not mistaken for a missing
    /// table. Implementations should not retry themselves.
    fn ensure_connected(&mut self) -> Result<(), MigrationError>;

    /// Read the stored version, or `None` if the record does not exist yet
    fn read_version(&mut self, table: &str) -> Result<Option<i64>, MigrationError>;

    /// Create the record holding version 0. Must be idempotent.
    fn create_version_table(&mut self, table: &str) -> Result<(), MigrationError>;

    /// Overwrite the stored version
    fn write_version(&mut self, table: &str, version: i64) -> Result<(), MigrationError>;
}

impl<B: VersionBackend + ?Sized> VersionBackend for Box<B> {
    fn ensure_connected(&mut self) -> Result<(), MigrationError> {
        (**self).ensure_connected()
    }

    fn read_version(&mut self, table: &str) -> Result<Option<i64>, MigrationError> {
        (**self).read_version(table)
    }

    fn create_version_table(&mut self, table: &str) -> Result<(), MigrationError> {
        (**self).create_version_table(table)
    }

    fn write_version(&mut self, table: &str, version: i64) -> Result<(), MigrationError> {
        (**self).write_version(table, version)
    }
}

/// Reads and writes the current schema version
///
/// The first read handshakes the connection and, if the version record is
/// missing, creates it at version 0. The last known value is cached and
/// replaced on every write.
#[derive(Debug)]
pub struct SchemaVersionStore<B> {
    backend: B,
    table_name: String,
    cached: Option<i64>,
    bootstrapped: bool,
}

impl<B: VersionBackend> SchemaVersionStore<B> {
    /// Create a store for `<table_prefix><table>`
    pub fn new(backend: B, table_prefix: &str, table: &str) -> Self {
        Self {
            backend,
            table_name: format!("{table_prefix}{table}"),
            cached: None,
            bootstrapped: false,
        }
    }

    /// The prefixed name of the version table
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Current schema version, bootstrapping the record on first use
    ///
    /// # Errors
    ///
    /// Propagates any backend error other than "record absent".
    pub fn current_version(&mut self) -> Result<i64, MigrationError> {
        if let Some(version) = self.cached {
            return Ok(version);
        }

        self.handshake()?;
        let version = match self.backend.read_version(&self.table_name)? {
            Some(version) => version,
            None if !self.bootstrapped => {
                log::debug!("Creating schema version table {} at version 0", self.table_name);
                self.backend.create_version_table(&self.table_name)?;
                self.bootstrapped = true;
                0
            }
            None => {
                return Err(MigrationError::Storage(format!(
                    "schema version table {} disappeared after it was created",
                    self.table_name
                )))
            }
        };

        self.cached = Some(version);
        Ok(version)
    }

    /// Connectivity handshake, retried once
    fn handshake(&mut self) -> Result<(), MigrationError> {
        if let Err(e) = self.backend.ensure_connected() {
            log::warn!("Connectivity check failed ({}); retrying once", e);
            self.backend.ensure_connected()?;
        }
        Ok(())
    }

    /// Persist a new schema version
    ///
    /// # Errors
    ///
    /// Propagates backend write failures; the cache is left untouched then.
    pub fn set_version(&mut self, version: i64) -> Result<(), MigrationError> {
        self.backend.write_version(&self.table_name, version)?;
        self.cached = Some(version);
        log::debug!("Schema version in {} set to {}", self.table_name, version);
        Ok(())
    }

    /// Drop the cached value so the next read goes to storage
    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }
}

/// In-memory [`VersionBackend`]
///
/// Useful for dry runs and tests. Every write is appended to a history so the
/// order of persisted versions can be inspected afterwards.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    tables: HashMap<String, i64>,
    history: Vec<i64>,
    creates: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing version record
    pub fn with_version(table: impl Into<String>, version: i64) -> Self {
        let mut backend = Self::default();
        backend.tables.insert(table.into(), version);
        backend
    }

    /// Stored value for a table, without going through a store
    pub fn stored(&self, table: &str) -> Option<i64> {
        self.tables.get(table).copied()
    }

    /// Every version written, in order
    pub fn history(&self) -> &[i64] {
        &self.history
    }

    /// How many times a version table was created
    pub fn creates(&self) -> usize {
        self.creates
    }

    /// Forget a table, as if someone dropped it
    pub fn drop_table(&mut self, table: &str) {
        self.tables.remove(table);
    }
}

impl VersionBackend for MemoryBackend {
    fn ensure_connected(&mut self) -> Result<(), MigrationError> {
        Ok(())
    }

    fn read_version(&mut self, table: &str) -> Result<Option<i64>, MigrationError> {
        Ok(self.tables.get(table).copied())
    }

    fn create_version_table(&mut self, table: &str) -> Result<(), MigrationError> {
        if !self.tables.contains_key(table) {
            self.tables.insert(table.to_string(), 0);
            self.creates += 1;
        }
        Ok(())
    }

    fn write_version(&mut self, table: &str, version: i64) -> Result<(), MigrationError> {
        match self.tables.get_mut(table) {
            Some(stored) => {
                *stored = version;
                self.history.push(version);
                Ok(())
            }
            None => Err(MigrationError::Storage(format!(
                "schema version table {table} does not exist"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Backend whose reads fail, to check error propagation
    struct Broken;

    impl VersionBackend for Broken {
        fn ensure_connected(&mut self) -> Result<(), MigrationError> {
            Ok(())
        }

        fn read_version(&mut self, _table: &str) -> Result<Option<i64>, MigrationError> {
            Err(MigrationError::Storage("permission denied".to_string()))
        }

        fn create_version_table(&mut self, _table: &str) -> Result<(), MigrationError> {
            panic!("must not bootstrap after a read failure");
        }

        fn write_version(&mut self, _table: &str, _version: i64) -> Result<(), MigrationError> {
            Err(MigrationError::Storage("permission denied".to_string()))
        }
    }

    /// Backend whose first `failures` handshakes fail
    struct FlakyHandshake {
        inner: MemoryBackend,
        failures: usize,
        handshakes: usize,
    }

    impl VersionBackend for FlakyHandshake {
        fn ensure_connected(&mut self) -> Result<(), MigrationError> {
            self.handshakes += 1;
            if self.handshakes <= self.failures {
                return Err(MigrationError::Storage("connection reset".to_string()));
            }
            Ok(())
        }

        fn read_version(&mut self, table: &str) -> Result<Option<i64>, MigrationError> {
            self.inner.read_version(table)
        }

        fn create_version_table(&mut self, table: &str) -> Result<(), MigrationError> {
            self.inner.create_version_table(table)
        }

        fn write_version(&mut self, table: &str, version: i64) -> Result<(), MigrationError> {
            self.inner.write_version(table, version)
        }
    }

    fn flaky(failures: usize) -> FlakyHandshake {
        FlakyHandshake {
            inner: MemoryBackend::with_version("schema_version", 12),
            failures,
            handshakes: 0,
        }
    }

    #[test]
    fn test_handshake_retried_once() {
        let mut store = SchemaVersionStore::new(flaky(1), "", DEFAULT_SCHEMA_VERSION_TABLE);
        assert_eq!(store.current_version().unwrap(), 12);
        assert_eq!(store.backend().handshakes, 2);
        assert_eq!(store.backend().inner.creates(), 0);
    }

    #[test]
    fn test_handshake_failing_twice_propagates() {
        let mut store = SchemaVersionStore::new(flaky(2), "", DEFAULT_SCHEMA_VERSION_TABLE);
        assert!(matches!(store.current_version(), Err(MigrationError::Storage(_))));
        assert_eq!(store.backend().handshakes, 2);
        assert_eq!(store.backend().inner.creates(), 0);
    }

    #[test]
    fn test_bootstraps_missing_table_to_zero() {
        let mut store = SchemaVersionStore::new(MemoryBackend::new(), "", DEFAULT_SCHEMA_VERSION_TABLE);
        assert_eq!(store.current_version().unwrap(), 0);
        assert_eq!(store.backend().stored("schema_version"), Some(0));
        assert_eq!(store.backend().creates(), 1);
        assert!(store.backend().history().is_empty());
    }

    #[test]
    fn test_reads_existing_version() {
        let backend = MemoryBackend::with_version("schema_version", 42);
        let mut store = SchemaVersionStore::new(backend, "", DEFAULT_SCHEMA_VERSION_TABLE);
        assert_eq!(store.current_version().unwrap(), 42);
        assert_eq!(store.backend().creates(), 0);
    }

    #[test]
    fn test_prefix_applies_to_reads_and_writes() {
        let mut store = SchemaVersionStore::new(MemoryBackend::new(), "app_", DEFAULT_SCHEMA_VERSION_TABLE);
        assert_eq!(store.table_name(), "app_schema_version");

        store.current_version().unwrap();
        store.set_version(7).unwrap();
        assert_eq!(store.backend().stored("app_schema_version"), Some(7));
        assert_eq!(store.backend().stored("schema_version"), None);
    }

    #[test]
    fn test_set_version_is_visible_immediately() {
        let mut store = SchemaVersionStore::new(MemoryBackend::new(), "", DEFAULT_SCHEMA_VERSION_TABLE);
        store.current_version().unwrap();
        store.set_version(10).unwrap();
        assert_eq!(store.current_version().unwrap(), 10);
        store.set_version(20).unwrap();
        assert_eq!(store.current_version().unwrap(), 20);

        store.invalidate();
        assert_eq!(store.current_version().unwrap(), 20);
        assert_eq!(store.backend().history(), &[10, 20]);
    }

    #[test]
    fn test_bootstrap_happens_once() {
        let mut store = SchemaVersionStore::new(MemoryBackend::new(), "", DEFAULT_SCHEMA_VERSION_TABLE);
        store.current_version().unwrap();

        store.backend_mut().drop_table("schema_version");
        store.invalidate();
        let err = store.current_version().unwrap_err();
        assert!(matches!(err, MigrationError::Storage(_)));
        assert_eq!(store.backend().creates(), 1);
    }

    #[test]
    fn test_storage_errors_propagate() {
        let mut store = SchemaVersionStore::new(Broken, "", DEFAULT_SCHEMA_VERSION_TABLE);
        assert!(matches!(store.current_version(), Err(MigrationError::Storage(_))));
        assert!(matches!(store.set_version(1), Err(MigrationError::Storage(_))));
    }
}
