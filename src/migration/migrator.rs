//! Migrator - Core migration execution engine

use crate::config::MigrationConfig;
use crate::migration::{
    ChangeRegistry, FileIndex, MigrationDirection, MigrationError, MigrationFile, MigrationStatus,
    ResultCode, SchemaVersionStore, VersionBackend, VersionResolver, VersionToken,
};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Core migration execution engine
///
/// The `Migrator` discovers migration files, resolves the requested target,
/// runs change scripts one at a time and persists the schema version after
/// every step. It keeps no state between calls beyond the version cache in
/// its [`SchemaVersionStore`].
///
/// `D` is the database handle given to change scripts (cloned per script),
/// `B` the storage behind the version marker.
///
/// # Concurrency
///
/// Two migrators running against the same database at once will race on the
/// version marker. Callers must serialise runs, e.g. by holding
/// [`crate::migration::AdvisoryLockGuard`] for the duration of the call.
#[derive(Debug)]
pub struct Migrator<D, B> {
    migrations_dir: PathBuf,
    extension: String,
    table_prefix: String,
    db: D,
    registry: ChangeRegistry<D>,
    store: SchemaVersionStore<B>,
}

impl<D: Clone, B: VersionBackend> Migrator<D, B> {
    /// Create a new Migrator
    ///
    /// # Arguments
    ///
    /// * `config` - Migrations directory, extension, table prefix and version table name
    /// * `db` - Database handle passed to every change script
    /// * `registry` - Change scripts, keyed by the identifier in their file names
    /// * `backend` - Storage for the schema version marker
    pub fn new(config: &MigrationConfig, db: D, registry: ChangeRegistry<D>, backend: B) -> Self {
        Self {
            migrations_dir: config.migrations_dir.clone(),
            extension: config.extension.clone(),
            table_prefix: config.table_prefix.clone(),
            store: SchemaVersionStore::new(backend, &config.table_prefix, &config.schema_version_table),
            db,
            registry,
        }
    }

    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    pub fn table_prefix(&self) -> &str {
        &self.table_prefix
    }

    /// The schema version table name, including the table prefix
    pub fn prefixed_schema_version_table_name(&self) -> &str {
        self.store.table_name()
    }

    pub fn store(&self) -> &SchemaVersionStore<B> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SchemaVersionStore<B> {
        &mut self.store
    }

    pub fn registry(&self) -> &ChangeRegistry<D> {
        &self.registry
    }

    /// Scan the migrations directory
    ///
    /// # Errors
    ///
    /// Returns discovery errors such as duplicate versions. A missing
    /// directory is not an error and yields an empty index.
    pub fn file_index(&self) -> Result<FileIndex, MigrationError> {
        FileIndex::scan(&self.migrations_dir, &self.extension)
    }

    /// Current schema version, creating the version table on first use
    pub fn current_schema_version(&mut self) -> Result<i64, MigrationError> {
        self.store.current_version()
    }

    /// Where the schema stands relative to the files on disk
    pub fn status(&mut self) -> Result<MigrationStatus, MigrationError> {
        let index = self.file_index()?;
        let current_version = self.store.current_version()?;
        let real_current_version = index.floor(current_version);
        let latest_version = index.latest();
        let target = VersionResolver::new(&index).resolve(VersionToken::Latest, current_version);
        let pending = if target > current_version {
            index.pending(current_version, target).into_iter().cloned().collect()
        } else {
            Vec::new()
        };

        Ok(MigrationStatus {
            current_version,
            real_current_version,
            latest_version,
            pending,
        })
    }

    /// Migrate to the version named by `token`
    ///
    /// `None` means "the latest version on disk". Tokens are validated before
    /// anything is written; see [`VersionToken`] for the accepted forms.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::InvalidVersion` for malformed tokens, and
    /// any load, execution or storage error raised while migrating.
    pub fn update_to(&mut self, token: Option<&str>) -> Result<ResultCode, MigrationError> {
        let token = VersionToken::parse(token)?;
        let index = self.file_index()?;
        let current = self.store.current_version()?;

        if token == VersionToken::Latest && index.is_empty() {
            log::info!("No migration files found in {}", self.migrations_dir.display());
            return Ok(ResultCode::NoMigrationsFound);
        }

        let target = VersionResolver::new(&index).resolve(token, current);
        self.run(&index, current, target)
    }

    /// Migrate to an explicit version number
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::InvalidVersion` for negative targets, and
    /// any load, execution or storage error raised while migrating.
    pub fn update_to_version(&mut self, target: i64) -> Result<ResultCode, MigrationError> {
        if target < 0 {
            return Err(MigrationError::InvalidVersion {
                input: target.to_string(),
            });
        }
        let index = self.file_index()?;
        let current = self.store.current_version()?;
        self.run(&index, current, target)
    }

    /// Apply the next `steps` migrations
    ///
    /// Returns `ResultCode::AtMaximumVersion` without touching storage when
    /// nothing is left to apply.
    pub fn increment_version(&mut self, steps: u32) -> Result<ResultCode, MigrationError> {
        self.step(MigrationDirection::Up, steps)
    }

    /// Revert the last `steps` migrations
    ///
    /// Returns `ResultCode::AtMinimumVersion` without touching storage when
    /// nothing is left to revert.
    pub fn decrement_version(&mut self, steps: u32) -> Result<ResultCode, MigrationError> {
        self.step(MigrationDirection::Down, steps)
    }

    fn step(&mut self, direction: MigrationDirection, steps: u32) -> Result<ResultCode, MigrationError> {
        if steps == 0 {
            return Err(MigrationError::InvalidSteps(steps));
        }
        let index = self.file_index()?;
        let current = self.store.current_version()?;

        let token = match direction {
            MigrationDirection::Up => {
                if index.latest().map_or(true, |latest| latest <= current) {
                    return Ok(ResultCode::AtMaximumVersion);
                }
                VersionToken::Forward(steps)
            }
            MigrationDirection::Down => {
                if index.floor(current) == 0 {
                    return Ok(ResultCode::AtMinimumVersion);
                }
                VersionToken::Backward(steps)
            }
        };

        let target = VersionResolver::new(&index).resolve(token, current);
        self.run(&index, current, target)
    }

    fn run(&mut self, index: &FileIndex, current: i64, target: i64) -> Result<ResultCode, MigrationError> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("schema_steward.update_to", current, target).entered();

        if current == target {
            log::debug!("Schema already at version {}", current);
            return Ok(ResultCode::AtCurrentVersion);
        }

        let direction = if target > current {
            MigrationDirection::Up
        } else {
            MigrationDirection::Down
        };

        let plan = index.pending(current, target);
        if plan.is_empty() {
            log::info!(
                "No migration files found to migrate from {} to {}",
                current,
                target
            );
            return Ok(ResultCode::NoMigrationsFound);
        }

        log::debug!(
            "Migrating {} from {} to {} through {} file(s)",
            direction,
            current,
            target,
            plan.len()
        );

        let mut landed = current;
        for file in plan {
            landed = self.apply(file, direction)?;
        }

        if direction == MigrationDirection::Down {
            let real = index.floor(landed);
            if real != landed {
                log::warn!(
                    "Version {} has no migration file; recording nearest existing version {}",
                    landed,
                    real
                );
                self.store.set_version(real)?;
            }
        }

        Ok(ResultCode::Ok)
    }

    /// Run one change script and persist the version it leaves behind
    fn apply(&mut self, file: &MigrationFile, direction: MigrationDirection) -> Result<i64, MigrationError> {
        let start = Instant::now();
        let mut script = self
            .registry
            .instantiate(file, self.db.clone(), &self.table_prefix)?;

        let outcome = match direction {
            MigrationDirection::Up => script.up(),
            MigrationDirection::Down => script.down(),
        };
        outcome.map_err(|e| MigrationError::ExecutionFailed {
            version: file.version,
            identifier: file.identifier.clone(),
            direction,
            source: e.into(),
        })?;

        // Once version N is reverted the schema is logically at N - 1
        let version = match direction {
            MigrationDirection::Up => file.version,
            MigrationDirection::Down => file.version - 1,
        };
        self.store.set_version(version)?;

        log::info!(
            "Migrated {} {} ({}) in {}ms; schema version is now {}",
            direction,
            file.version,
            file.identifier,
            start.elapsed().as_millis(),
            version
        );
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::{ChangeScript, MemoryBackend};
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Recording {
        name: String,
        journal: Journal,
    }

    impl ChangeScript for Recording {
        fn up(&mut self) -> anyhow::Result<()> {
            self.journal.lock().unwrap().push(format!("up {}", self.name));
            Ok(())
        }

        fn down(&mut self) -> anyhow::Result<()> {
            self.journal.lock().unwrap().push(format!("down {}", self.name));
            Ok(())
        }
    }

    fn setup(versions: &[i64]) -> (TempDir, Migrator<Journal, MemoryBackend>, Journal) {
        let temp_dir = TempDir::new().unwrap();
        let mut registry = ChangeRegistry::new();
        for v in versions {
            let name = format!("Change{v}");
            fs::write(temp_dir.path().join(format!("{v}-{name}.rs")), "").unwrap();
            registry
                .register(name.clone(), move |journal, _prefix| Recording {
                    name: name.clone(),
                    journal,
                })
                .unwrap();
        }

        let journal = Journal::default();
        let config = MigrationConfig::new(temp_dir.path());
        let migrator = Migrator::new(&config, journal.clone(), registry, MemoryBackend::new());
        (temp_dir, migrator, journal)
    }

    #[test]
    fn test_update_to_current_version_is_noop() {
        let (_dir, mut migrator, journal) = setup(&[5, 12, 20]);
        assert_eq!(migrator.update_to_version(0).unwrap(), ResultCode::AtCurrentVersion);
        assert!(journal.lock().unwrap().is_empty());
        assert!(migrator.store().backend().history().is_empty());
    }

    #[test]
    fn test_up_persists_each_step() {
        let (_dir, mut migrator, journal) = setup(&[5, 12, 20]);
        assert_eq!(migrator.update_to(None).unwrap(), ResultCode::Ok);
        assert_eq!(migrator.store().backend().history(), &[5, 12, 20]);
        assert_eq!(
            *journal.lock().unwrap(),
            vec!["up Change5", "up Change12", "up Change20"]
        );
    }

    #[test]
    fn test_down_persists_one_below_each_reverted_version() {
        let (_dir, mut migrator, journal) = setup(&[5, 12, 20]);
        migrator.update_to(None).unwrap();
        journal.lock().unwrap().clear();

        assert_eq!(migrator.update_to(Some("zero")).unwrap(), ResultCode::Ok);
        assert_eq!(migrator.store().backend().history(), &[5, 12, 20, 19, 11, 4, 0]);
        assert_eq!(
            *journal.lock().unwrap(),
            vec!["down Change20", "down Change12", "down Change5"]
        );
        assert_eq!(migrator.current_schema_version().unwrap(), 0);
    }

    #[test]
    fn test_target_between_versions() {
        let (_dir, mut migrator, _journal) = setup(&[5, 12, 20]);
        assert_eq!(migrator.update_to(Some("15")).unwrap(), ResultCode::Ok);
        assert_eq!(migrator.current_schema_version().unwrap(), 12);

        migrator.update_to(None).unwrap();
        assert_eq!(migrator.update_to_version(15).unwrap(), ResultCode::Ok);
        assert_eq!(migrator.current_schema_version().unwrap(), 12);
    }

    #[test]
    fn test_no_migrations_between_versions() {
        let (_dir, mut migrator, _journal) = setup(&[5, 12, 20]);
        migrator.update_to(None).unwrap();
        assert_eq!(migrator.update_to_version(30).unwrap(), ResultCode::NoMigrationsFound);
        assert_eq!(migrator.current_schema_version().unwrap(), 20);
    }

    #[test]
    fn test_negative_target_is_rejected() {
        let (_dir, mut migrator, _journal) = setup(&[5]);
        assert!(matches!(
            migrator.update_to_version(-1),
            Err(MigrationError::InvalidVersion { .. })
        ));
    }

    #[test]
    fn test_zero_steps_rejected() {
        let (_dir, mut migrator, _journal) = setup(&[5]);
        assert!(matches!(migrator.increment_version(0), Err(MigrationError::InvalidSteps(0))));
        assert!(matches!(migrator.decrement_version(0), Err(MigrationError::InvalidSteps(0))));
    }

    #[test]
    fn test_status_reports_pending() {
        let (_dir, mut migrator, _journal) = setup(&[5, 12, 20]);
        migrator.update_to(Some("5")).unwrap();

        let status = migrator.status().unwrap();
        assert_eq!(status.current_version, 5);
        assert_eq!(status.latest_version, Some(20));
        assert_eq!(status.next_pending_version(), Some(12));
        assert_eq!(status.pending.len(), 2);
        assert!(!status.has_drifted());
    }
}
