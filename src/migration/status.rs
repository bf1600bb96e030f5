//! Migration outcomes and status reporting

use crate::migration::MigrationFile;
use std::fmt;

/// Outcome of a single migration request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    /// At least one change script ran
    Ok,
    /// The schema is already at the requested version
    AtCurrentVersion,
    /// No migration file lies between the current and requested versions
    NoMigrationsFound,
    /// Nothing left to apply
    AtMaximumVersion,
    /// Nothing left to revert
    AtMinimumVersion,
}

impl ResultCode {
    /// Stable machine-readable name
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultCode::Ok => "RESULT_OK",
            ResultCode::AtCurrentVersion => "RESULT_AT_CURRENT_VERSION",
            ResultCode::NoMigrationsFound => "RESULT_NO_MIGRATIONS_FOUND",
            ResultCode::AtMaximumVersion => "RESULT_AT_MAXIMUM_VERSION",
            ResultCode::AtMinimumVersion => "RESULT_AT_MINIMUM_VERSION",
        }
    }

    /// Whether any schema change was made
    pub fn is_changed(&self) -> bool {
        matches!(self, ResultCode::Ok)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of where the schema stands relative to the files on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Version recorded in the schema version table
    pub current_version: i64,

    /// Nearest version at or below `current_version` that still has a file
    pub real_current_version: i64,

    /// Highest version on disk, if any
    pub latest_version: Option<i64>,

    /// Files that `update_to(None)` would apply, in order
    pub pending: Vec<MigrationFile>,
}

impl MigrationStatus {
    /// Check if all migrations are applied
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }

    /// Whether the recorded version points at a file that no longer exists
    pub fn has_drifted(&self) -> bool {
        self.current_version != self.real_current_version
    }

    /// Get the next pending migration version
    pub fn next_pending_version(&self) -> Option<i64> {
        self.pending.first().map(|m| m.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_code_names() {
        assert_eq!(ResultCode::Ok.to_string(), "RESULT_OK");
        assert_eq!(ResultCode::AtCurrentVersion.as_str(), "RESULT_AT_CURRENT_VERSION");
        assert_eq!(ResultCode::NoMigrationsFound.as_str(), "RESULT_NO_MIGRATIONS_FOUND");
        assert!(ResultCode::Ok.is_changed());
        assert!(!ResultCode::AtMaximumVersion.is_changed());
    }

    #[test]
    fn test_status_helpers() {
        let status = MigrationStatus {
            current_version: 15,
            real_current_version: 12,
            latest_version: Some(20),
            pending: vec![MigrationFile::new(20, "AddEmailIndex", "20-AddEmailIndex.rs")],
        };
        assert!(!status.is_up_to_date());
        assert!(status.has_drifted());
        assert_eq!(status.next_pending_version(), Some(20));
    }
}
