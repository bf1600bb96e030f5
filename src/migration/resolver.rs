//! Translation of user-supplied version tokens into concrete versions
//!
//! Accepted tokens (case-insensitive):
//!
//! | Token            | Meaning                                        |
//! |------------------|------------------------------------------------|
//! | *(absent/empty)* | latest version on disk                         |
//! | `42`             | exactly version 42                             |
//! | `zero`           | version 0, i.e. revert everything              |
//! | `next`, `+N`     | N migrations forward from the real current one |
//! | `prev`, `-N`     | N migrations backward                          |
//! | `minusN`         | same as `-N`, for shells that eat a leading `-`|

use crate::migration::{FileIndex, MigrationError};
use std::fmt;
use std::str::FromStr;

/// A requested target version, before resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionToken {
    /// Highest known version
    Latest,
    /// An explicit version number
    Exact(i64),
    /// Version 0
    Zero,
    /// N steps forward through the indexed files
    Forward(u32),
    /// N steps backward through the indexed files
    Backward(u32),
}

impl VersionToken {
    /// Parse an optional token; `None` means [`VersionToken::Latest`]
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::InvalidVersion` naming the original input.
    pub fn parse(input: Option<&str>) -> Result<Self, MigrationError> {
        match input {
            None => Ok(VersionToken::Latest),
            Some(s) => s.parse(),
        }
    }
}

impl FromStr for VersionToken {
    type Err = MigrationError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || MigrationError::InvalidVersion {
            input: input.to_string(),
        };
        let token = input.trim().to_ascii_lowercase();

        if token.is_empty() {
            return Ok(VersionToken::Latest);
        }
        if is_digits(&token) {
            return token.parse::<i64>().map(VersionToken::Exact).map_err(|_| invalid());
        }

        match token.as_str() {
            "zero" => Ok(VersionToken::Zero),
            "next" => Ok(VersionToken::Forward(1)),
            "prev" => Ok(VersionToken::Backward(1)),
            _ => {
                if let Some(steps) = token.strip_prefix('+') {
                    parse_steps(steps).map(VersionToken::Forward).ok_or_else(invalid)
                } else if let Some(steps) = token.strip_prefix('-').or_else(|| token.strip_prefix("minus")) {
                    parse_steps(steps).map(VersionToken::Backward).ok_or_else(invalid)
                } else {
                    Err(invalid())
                }
            }
        }
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionToken::Latest => write!(f, "latest"),
            VersionToken::Exact(v) => write!(f, "{v}"),
            VersionToken::Zero => write!(f, "zero"),
            VersionToken::Forward(n) => write!(f, "+{n}"),
            VersionToken::Backward(n) => write!(f, "-{n}"),
        }
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Step counts are positive integers
fn parse_steps(s: &str) -> Option<u32> {
    if !is_digits(s) {
        return None;
    }
    s.parse::<u32>().ok().filter(|n| *n > 0)
}

/// Resolves tokens against the current version and the files on disk
#[derive(Debug, Clone, Copy)]
pub struct VersionResolver<'a> {
    index: &'a FileIndex,
}

impl<'a> VersionResolver<'a> {
    pub fn new(index: &'a FileIndex) -> Self {
        Self { index }
    }

    /// Nearest indexed version at or below `current`, or 0
    pub fn real_current_version(&self, current: i64) -> i64 {
        self.index.floor(current)
    }

    /// Turn a token into a concrete target version
    ///
    /// Step tokens move through the sequence `[0, v1, v2, ...]` starting from
    /// the real current version, clamping at both ends. `Latest` never goes
    /// below `current`, so migrations that were applied and later removed from
    /// disk are not reverted by accident.
    pub fn resolve(&self, token: VersionToken, current: i64) -> i64 {
        match token {
            VersionToken::Latest => self.index.latest().map_or(current, |latest| latest.max(current)),
            VersionToken::Zero => 0,
            VersionToken::Exact(version) => version,
            VersionToken::Forward(steps) => self.step(current, i64::from(steps)),
            VersionToken::Backward(steps) => self.step(current, -i64::from(steps)),
        }
    }

    /// Parse and resolve in one go
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::InvalidVersion` for malformed tokens.
    pub fn resolve_str(&self, input: Option<&str>, current: i64) -> Result<i64, MigrationError> {
        Ok(self.resolve(VersionToken::parse(input)?, current))
    }

    fn step(&self, current: i64, delta: i64) -> i64 {
        let mut sequence = Vec::with_capacity(self.index.len() + 1);
        sequence.push(0);
        sequence.extend(self.index.versions());

        let anchor = self.real_current_version(current);
        // The anchor is 0 or an indexed version, so it is always present.
        let position = sequence.binary_search(&anchor).unwrap_or(0) as i64;
        let last = sequence.len() as i64 - 1;
        let target = (position + delta).clamp(0, last);
        sequence[target as usize]
    }
}
