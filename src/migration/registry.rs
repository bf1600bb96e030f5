//! Change script contract and the registry that maps identifiers to factories

use crate::migration::{MigrationError, MigrationFile};
use std::collections::HashMap;
use std::fmt;

/// Trait that all change scripts must implement
///
/// A change script is built from a database handle and the table-name prefix
/// (see [`ChangeRegistry::register`]) and then asked to apply or revert
/// itself. Failure is signalled by returning an error.
pub trait ChangeScript {
    /// Apply the change (forward migration)
    fn up(&mut self) -> anyhow::Result<()>;

    /// Revert the change made in `up()`
    fn down(&mut self) -> anyhow::Result<()>;
}

type ChangeFactory<D> = Box<dyn Fn(D, &str) -> Box<dyn ChangeScript> + Send + Sync>;

/// Direction for migration execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationDirection {
    /// Apply the migration (up)
    Up,
    /// Rollback the migration (down)
    Down,
}

impl fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationDirection::Up => write!(f, "up"),
            MigrationDirection::Down => write!(f, "down"),
        }
    }
}

/// Registry of change scripts, keyed by the identifier used in file names
///
/// `D` is the database handle type handed to each script. The registry is
/// built by the caller at startup; there is no process-wide instance.
///
/// # Example
///
/// ```rust
/// use schema_steward::migration::{ChangeRegistry, ChangeScript};
///
/// struct CreateUsers {
///     table: String,
/// }
///
/// impl ChangeScript for CreateUsers {
///     fn up(&mut self) -> anyhow::Result<()> {
///         println!("CREATE TABLE {}", self.table);
///         Ok(())
///     }
///
///     fn down(&mut self) -> anyhow::Result<()> {
///         println!("DROP TABLE {}", self.table);
///         Ok(())
///     }
/// }
///
/// let mut registry: ChangeRegistry<()> = ChangeRegistry::new();
/// registry
///     .register("CreateUsers", |_db, prefix| CreateUsers { table: format!("{prefix}users") })
///     .unwrap();
/// assert!(registry.contains("CreateUsers"));
/// ```
pub struct ChangeRegistry<D> {
    factories: HashMap<String, ChangeFactory<D>>,
}

impl<D> ChangeRegistry<D> {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory for the change script named `identifier`
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::AlreadyRegistered` if the identifier is taken.
    pub fn register<F, C>(&mut self, identifier: impl Into<String>, factory: F) -> Result<(), MigrationError>
    where
        D: 'static,
        F: Fn(D, &str) -> C + Send + Sync + 'static,
        C: ChangeScript + 'static,
    {
        let identifier = identifier.into();
        if self.factories.contains_key(&identifier) {
            return Err(MigrationError::AlreadyRegistered(identifier));
        }

        let factory: ChangeFactory<D> =
            Box::new(move |db: D, prefix: &str| -> Box<dyn ChangeScript> { Box::new(factory(db, prefix)) });
        self.factories.insert(identifier, factory);
        Ok(())
    }

    /// Remove a registration, returning whether it existed
    pub fn unregister(&mut self, identifier: &str) -> bool {
        self.factories.remove(identifier).is_some()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.factories.contains_key(identifier)
    }

    /// All registered identifiers, sorted
    pub fn identifiers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Build the change script for a migration file
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::UnknownChange` naming the identifier and path
    /// when nothing is registered under the file's identifier.
    pub fn instantiate(
        &self,
        file: &MigrationFile,
        db: D,
        table_prefix: &str,
    ) -> Result<Box<dyn ChangeScript>, MigrationError> {
        let factory = self
            .factories
            .get(&file.identifier)
            .ok_or_else(|| MigrationError::UnknownChange {
                identifier: file.identifier.clone(),
                path: file.path.clone(),
            })?;
        Ok(factory(db, table_prefix))
    }
}

impl<D> Default for ChangeRegistry<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> fmt::Debug for ChangeRegistry<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeRegistry")
            .field("identifiers", &self.identifiers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    type Journal = Arc<Mutex<Vec<String>>>;

    /// Simple test change script that records what ran
    struct Recording {
        name: &'static str,
        journal: Journal,
        prefix: String,
    }

    impl ChangeScript for Recording {
        fn up(&mut self) -> anyhow::Result<()> {
            self.journal.lock().unwrap().push(format!("up:{}:{}", self.prefix, self.name));
            Ok(())
        }

        fn down(&mut self) -> anyhow::Result<()> {
            self.journal.lock().unwrap().push(format!("down:{}:{}", self.prefix, self.name));
            Ok(())
        }
    }

    fn registry() -> ChangeRegistry<Journal> {
        let mut registry = ChangeRegistry::new();
        registry
            .register("CreateUsers", |journal, prefix| Recording {
                name: "CreateUsers",
                journal,
                prefix: prefix.to_string(),
            })
            .unwrap();
        registry
    }

    #[test]
    fn test_register_and_instantiate() {
        let registry = registry();
        let journal = Journal::default();
        let file = MigrationFile::new(10, "CreateUsers", "10-CreateUsers.rs");

        let mut script = registry.instantiate(&file, journal.clone(), "app_").unwrap();
        script.up().unwrap();
        script.down().unwrap();

        assert_eq!(
            *journal.lock().unwrap(),
            vec!["up:app_:CreateUsers".to_string(), "down:app_:CreateUsers".to_string()]
        );
    }

    #[test]
    fn test_register_duplicate_returns_already_registered() {
        let mut registry = registry();
        let err = registry
            .register("CreateUsers", |journal, _prefix| Recording {
                name: "Other",
                journal,
                prefix: String::new(),
            })
            .unwrap_err();
        assert!(matches!(err, MigrationError::AlreadyRegistered(ref id) if id == "CreateUsers"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_after_unregister() {
        let mut registry = registry();
        assert!(registry.unregister("CreateUsers"));
        assert!(!registry.unregister("CreateUsers"));
        assert!(registry.is_empty());

        registry
            .register("CreateUsers", |journal, prefix| Recording {
                name: "CreateUsers",
                journal,
                prefix: prefix.to_string(),
            })
            .unwrap();
        assert!(registry.contains("CreateUsers"));
    }

    #[test]
    fn test_instantiate_unknown_identifier() {
        let registry = registry();
        let file = MigrationFile::new(20, "AddEmailIndex", "sub/20-AddEmailIndex.rs");

        let err = registry
            .instantiate(&file, Journal::default(), "")
            .err()
            .expect("unknown identifier must fail");
        match err {
            MigrationError::UnknownChange { identifier, path } => {
                assert_eq!(identifier, "AddEmailIndex");
                assert_eq!(path, std::path::PathBuf::from("sub/20-AddEmailIndex.rs"));
            }
            other => panic!("expected UnknownChange, got {other:?}"),
        }
    }

    #[test]
    fn test_identifiers_sorted() {
        let mut registry = registry();
        registry
            .register("AddEmailIndex", |journal, prefix| Recording {
                name: "AddEmailIndex",
                journal,
                prefix: prefix.to_string(),
            })
            .unwrap();
        assert_eq!(registry.identifiers(), vec!["AddEmailIndex", "CreateUsers"]);
    }

    #[test]
    fn test_direction_display() {
        assert_eq!(MigrationDirection::Up.to_string(), "up");
        assert_eq!(MigrationDirection::Down.to_string(), "down");
    }
}
