//! In-process migration execution helpers

use crate::config::MigrationConfig;
use crate::connection::{connect, ConnectionError};
use crate::executor::{PostgresExecutor, SqlExecutor};
use crate::migration::{AdvisoryLockGuard, ChangeRegistry, MigrationError, Migrator, PostgresBackend, ResultCode};

/// Connect using `config.database_url`
///
/// # Errors
///
/// Returns `MigrationError::Connection` if no URL is configured or the
/// connection fails.
pub fn connect_from_config(config: &MigrationConfig) -> Result<PostgresExecutor, MigrationError> {
    let url = config.database_url.as_deref().ok_or(ConnectionError::MissingUrl)?;
    Ok(PostgresExecutor::new(connect(url)?))
}

/// Bring the schema up to the latest version on application startup
///
/// Holds the advisory lock for `config.lock_key` on `executor` for the whole
/// run, so when several instances start together one migrates and the others
/// wait, then find nothing left to do. The version table is read and written
/// through the same connection.
///
/// Fails fast: if a change script fails, the error is returned and the
/// version table records the last step that succeeded.
///
/// # Example
///
/// ```rust,no_run
/// use schema_steward::config::MigrationConfig;
/// use schema_steward::migration::{connect_from_config, migrate_on_startup, ChangeRegistry};
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = MigrationConfig::load()?;
///     let executor = connect_from_config(&config)?;
///
///     let registry = ChangeRegistry::new();
///     // registry.register("CreateUsers", |db, prefix| CreateUsers::new(db, prefix))?;
///
///     let result = migrate_on_startup(&config, &executor, executor.clone(), registry)?;
///     println!("migrations: {result}");
///     Ok(())
/// }
/// ```
pub fn migrate_on_startup<E, D>(
    config: &MigrationConfig,
    executor: &E,
    db: D,
    registry: ChangeRegistry<D>,
) -> Result<ResultCode, MigrationError>
where
    E: SqlExecutor,
    D: Clone,
{
    let lock = AdvisoryLockGuard::acquire(executor, config.lock_key)?;

    let mut migrator = Migrator::new(config, db, registry, PostgresBackend::new(executor));
    let result = migrator.update_to(None)?;

    match result {
        ResultCode::Ok => log::info!(
            "Schema migrated to version {} on startup",
            migrator.current_schema_version()?
        ),
        other => log::debug!("No migrations applied on startup ({})", other),
    }

    lock.release()?;
    Ok(result)
}
