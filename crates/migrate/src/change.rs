//! Change identity and metadata
//!
//! A [`Change`] is one versioned migration unit. Its [`ChangeId`] is an
//! arbitrary-precision decimal: ids compare numerically, never as strings,
//! so `10` sorts after `9` and `1.0` equals `1`.

use bigdecimal::BigDecimal;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{MigrationError, MigrationResult};

/// Placeholder shown in place of the applied timestamp of a pending change
pub const PENDING_MARKER: &str = "   ...pending...   ";

/// Numeric version identifier of a change
#[derive(Debug, Clone)]
pub struct ChangeId {
    value: BigDecimal,
    text: String,
}

impl ChangeId {
    /// The decimal value used for ordering
    pub fn value(&self) -> &BigDecimal {
        &self.value
    }

    /// The id as written in the file name or changelog row
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl FromStr for ChangeId {
    type Err = MigrationError;

    fn from_str(s: &str) -> MigrationResult<Self> {
        let text = s.trim();
        let well_formed = text.chars().any(|c| c.is_ascii_digit())
            && text.chars().all(|c| c.is_ascii_digit() || c == '.')
            && text.matches('.').count() <= 1;
        if !well_formed {
            return Err(MigrationError::InvalidId {
                value: s.to_string(),
            });
        }

        let value = BigDecimal::from_str(text).map_err(|_| MigrationError::InvalidId {
            value: s.to_string(),
        })?;

        Ok(Self {
            value,
            text: text.to_string(),
        })
    }
}

impl From<u64> for ChangeId {
    fn from(id: u64) -> Self {
        Self {
            value: BigDecimal::from(id),
            text: id.to_string(),
        }
    }
}

impl PartialEq for ChangeId {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for ChangeId {}

impl PartialOrd for ChangeId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ChangeId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// One migration unit: id, description, and where it came from.
///
/// Equality and ordering only consider the id.
#[derive(Debug, Clone)]
pub struct Change {
    pub id: ChangeId,
    pub description: String,
    /// Script file backing this change, absent for registered and changelog-only changes
    pub filename: Option<String>,
    /// Set once the change is recorded in the changelog
    pub applied_timestamp: Option<String>,
}

impl Change {
    /// Create a pending change
    pub fn new(id: ChangeId, description: impl Into<String>) -> Self {
        Self {
            id,
            description: description.into(),
            filename: None,
            applied_timestamp: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_applied_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.applied_timestamp = Some(timestamp.into());
        self
    }

    /// Whether the change carries a changelog timestamp
    pub fn is_applied(&self) -> bool {
        self.applied_timestamp.is_some()
    }

    /// Name used when reporting this change: the file name if known, otherwise the description
    pub fn label(&self) -> &str {
        self.filename.as_deref().unwrap_or(&self.description)
    }
}

impl PartialEq for Change {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Change {}

impl PartialOrd for Change {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Change {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.id,
            self.applied_timestamp.as_deref().unwrap_or(PENDING_MARKER),
            self.description
        )
    }
}

/// Sort changes by id and reject duplicated ids.
pub(crate) fn sort_unique(mut changes: Vec<Change>) -> MigrationResult<Vec<Change>> {
    changes.sort();
    for pair in changes.windows(2) {
        if pair[0].id == pair[1].id {
            return Err(MigrationError::DuplicateId {
                id: pair[1].id.to_string(),
                first: pair[0].label().to_string(),
                second: pair[1].label().to_string(),
            });
        }
    }
    Ok(changes)
}
