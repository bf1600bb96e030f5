//! Migration file discovery and parsing

use crate::migration::MigrationError;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Represents a discovered migration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// Migration version, parsed from the leading digits of the file name
    pub version: i64,

    /// Name of the change script to instantiate for this file
    pub identifier: String,

    /// Path of the file relative to the scanned root
    pub path: PathBuf,
}

impl MigrationFile {
    /// Create a new MigrationFile
    pub fn new(version: i64, identifier: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            version,
            identifier: identifier.into(),
            path: path.into(),
        }
    }
}

/// Build the file name pattern `^([0-9]+)-(.+)\.<ext>$` for an extension.
fn filename_pattern(extension: &str) -> Result<Regex, MigrationError> {
    let invalid = |reason: String| MigrationError::InvalidExtension {
        extension: extension.to_string(),
        reason,
    };
    let trimmed = extension.trim_start_matches('.');
    if trimmed.is_empty() {
        return Err(invalid("extension is empty".to_string()));
    }
    if trimmed.contains(['/', '\\']) {
        return Err(invalid("extension contains a path separator".to_string()));
    }
    Regex::new(&format!(r"^([0-9]+)-(.+)\.(?i:{})$", regex::escape(trimmed))).map_err(|e| invalid(e.to_string()))
}

/// Parse a migration file name into `(version, identifier)`
///
/// Returns `None` for names that do not follow `<digits>-<name>.<ext>` or whose
/// digits do not fit in an `i64`.
///
/// # Example
/// - `20-AddEmailIndex.rs` → version: 20, identifier: "AddEmailIndex"
pub fn parse_filename(filename: &str, extension: &str) -> Option<(i64, String)> {
    let re = filename_pattern(extension).ok()?;
    parse_with(&re, filename)
}

fn parse_with(re: &Regex, filename: &str) -> Option<(i64, String)> {
    let caps = re.captures(filename)?;
    let version = caps.get(1)?.as_str().parse::<i64>().ok()?;
    let identifier = caps.get(2)?.as_str().to_string();
    Some((version, identifier))
}

/// Version-keyed index of every migration file under a root directory
///
/// The index itself is only a mapping; ordered views are produced on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileIndex {
    files: BTreeMap<i64, MigrationFile>,
}

impl FileIndex {
    /// Scan `root` recursively for files named `<digits>-<identifier>.<extension>`
    ///
    /// A missing or unreadable root yields an empty index. Unreadable
    /// subdirectories are skipped.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::DuplicateVersion` if two files share a version,
    /// `MigrationError::ReservedVersion` for a file numbered 0, and
    /// `MigrationError::Io` if a directory entry fails mid-listing.
    pub fn scan(root: &Path, extension: &str) -> Result<Self, MigrationError> {
        let re = filename_pattern(extension)?;
        let mut index = FileIndex::default();

        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) => {
                log::debug!(
                    "Migrations directory {} is not readable ({}); treating as empty",
                    root.display(),
                    e
                );
                return Ok(index);
            }
        };

        index.scan_entries(root, Path::new(""), entries, &re)?;
        log::debug!(
            "Indexed {} migration file(s) under {}",
            index.len(),
            root.display()
        );
        Ok(index)
    }

    fn scan_dir(&mut self, root: &Path, relative: &Path, re: &Regex) -> Result<(), MigrationError> {
        let dir = root.join(relative);
        match fs::read_dir(&dir) {
            Ok(entries) => self.scan_entries(root, relative, entries, re),
            Err(e) => {
                log::warn!("Skipping unreadable directory {}: {}", dir.display(), e);
                Ok(())
            }
        }
    }

    fn scan_entries(
        &mut self,
        root: &Path,
        relative: &Path,
        entries: fs::ReadDir,
        re: &Regex,
    ) -> Result<(), MigrationError> {
        let io_err = |source: io::Error| MigrationError::Io {
            path: root.join(relative),
            source,
        };

        // Sort for a deterministic walk; read_dir order is unspecified.
        let mut entries = entries.collect::<Result<Vec<_>, _>>().map_err(io_err)?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let file_type = entry.file_type().map_err(io_err)?;
            let name = entry.file_name();
            let child = relative.join(&name);

            if file_type.is_dir() {
                self.scan_dir(root, &child, re)?;
                continue;
            }

            let Some(filename) = name.to_str() else {
                continue;
            };
            if let Some((version, identifier)) = parse_with(re, filename) {
                self.insert(MigrationFile::new(version, identifier, child))?;
            }
        }

        Ok(())
    }

    /// Add a file to the index, rejecting duplicate and reserved versions
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::DuplicateVersion` or `MigrationError::ReservedVersion`.
    pub fn insert(&mut self, file: MigrationFile) -> Result<(), MigrationError> {
        if file.version == 0 {
            return Err(MigrationError::ReservedVersion(file.path));
        }
        if let Some(existing) = self.files.get(&file.version) {
            return Err(MigrationError::DuplicateVersion {
                version: file.version,
                first: existing.path.clone(),
                second: file.path,
            });
        }
        self.files.insert(file.version, file);
        Ok(())
    }

    /// Look up the file for a version
    pub fn get(&self, version: i64) -> Option<&MigrationFile> {
        self.files.get(&version)
    }

    pub fn contains(&self, version: i64) -> bool {
        self.files.contains_key(&version)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Lowest indexed version
    pub fn first(&self) -> Option<i64> {
        self.files.keys().next().copied()
    }

    /// Highest indexed version
    pub fn latest(&self) -> Option<i64> {
        self.files.keys().next_back().copied()
    }

    /// All versions, ascending
    pub fn versions(&self) -> Vec<i64> {
        self.files.keys().copied().collect()
    }

    /// Files in "up" order
    pub fn ascending(&self) -> impl Iterator<Item = &MigrationFile> + '_ {
        self.files.values()
    }

    /// Files in "down" order
    pub fn descending(&self) -> impl Iterator<Item = &MigrationFile> + '_ {
        self.files.values().rev()
    }

    /// Nearest indexed version at or below `version`, or 0 if there is none
    ///
    /// This is the "real" current version when the recorded one points at a
    /// file that has since been deleted or renumbered.
    pub fn floor(&self, version: i64) -> i64 {
        if version <= 0 {
            return 0;
        }
        self.files
            .range(..=version)
            .next_back()
            .map_or(0, |(v, _)| *v)
    }

    /// Files needed to move from `current` to `target`
    ///
    /// Selects versions in `(min, max]`, ascending when moving up and
    /// descending when moving down.
    pub fn pending(&self, current: i64, target: i64) -> Vec<&MigrationFile> {
        let (low, high) = if target >= current {
            (current, target)
        } else {
            (target, current)
        };
        if low >= high {
            return Vec::new();
        }

        let range = self
            .files
            .range((std::ops::Bound::Excluded(low), std::ops::Bound::Included(high)))
            .map(|(_, file)| file);

        if target > current {
            range.collect()
        } else {
            range.rev().collect()
        }
    }
}
