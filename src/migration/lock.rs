//! Session-level advisory locking around migration runs

use crate::executor::SqlExecutor;
use crate::migration::MigrationError;
use std::time::Instant;

/// Lock guard that releases a PostgreSQL advisory lock when dropped
///
/// `pg_advisory_lock` blocks until every other session has released the same
/// key, so at most one process migrates a database at a time. The lock is
/// tied to the session, so the guard must use the same connection for the
/// whole run.
pub struct AdvisoryLockGuard<E: SqlExecutor> {
    executor: E,
    key: i64,
    released: bool,
}

impl<E: SqlExecutor> AdvisoryLockGuard<E> {
    /// Block until the advisory lock for `key` is held
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Lock` if the lock query fails.
    pub fn acquire(executor: E, key: i64) -> Result<Self, MigrationError> {
        let start = Instant::now();
        log::debug!("Waiting for migration lock {}", key);

        executor
            .execute("SELECT pg_advisory_lock($1)", &[&key])
            .map_err(|e| MigrationError::Lock(format!("failed to acquire advisory lock {key}: {e}")))?;

        log::debug!("Acquired migration lock {} after {}ms", key, start.elapsed().as_millis());
        Ok(Self {
            executor,
            key,
            released: false,
        })
    }

    pub fn key(&self) -> i64 {
        self.key
    }

    /// The connection holding the lock
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Release the lock now and report failures, instead of on drop
    pub fn release(mut self) -> Result<(), MigrationError> {
        self.released = true;
        self.unlock()
    }

    fn unlock(&self) -> Result<(), MigrationError> {
        self.executor
            .execute("SELECT pg_advisory_unlock($1)", &[&self.key])
            .map(|_| log::debug!("Released migration lock {}", self.key))
            .map_err(|e| MigrationError::Lock(format!("failed to release advisory lock {}: {e}", self.key)))
    }
}

impl<E: SqlExecutor> Drop for AdvisoryLockGuard<E> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // Errors cannot be propagated from drop; the session ending frees the lock anyway
        if let Err(e) = self.unlock() {
            log::warn!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::testing::Recorder;

    #[test]
    fn test_lock_released_on_drop() {
        let recorder = Recorder::new();
        {
            let guard = AdvisoryLockGuard::acquire(recorder.clone(), 42).unwrap();
            assert_eq!(guard.key(), 42);
        }
        assert_eq!(
            recorder.statements(),
            vec!["SELECT pg_advisory_lock($1)", "SELECT pg_advisory_unlock($1)"]
        );
    }

    #[test]
    fn test_explicit_release_unlocks_once() {
        let recorder = Recorder::new();
        let guard = AdvisoryLockGuard::acquire(&recorder, 7).unwrap();
        guard.release().unwrap();
        assert_eq!(recorder.statements().len(), 2);
    }

    #[test]
    fn test_acquire_failure_is_lock_error() {
        let recorder = Recorder::new().failing_on("SELECT pg_advisory_lock");
        let err = AdvisoryLockGuard::acquire(&recorder, 7).err().unwrap();
        assert!(matches!(err, MigrationError::Lock(_)));
        // Nothing was held, so nothing is unlocked
        assert_eq!(recorder.statements(), vec!["SELECT pg_advisory_lock($1)"]);
    }
}
