use std::collections::BTreeMap;
use std::fmt;

use super::Migrator;
use crate::change::{Change, ChangeId, PENDING_MARKER};
use crate::error::MigrationResult;

const ID_WIDTH: usize = 14;
const RULE_WIDTH: usize = 80;

/// Every discovered change, applied ones carrying their changelog timestamp
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    pub changes: Vec<Change>,
}

impl StatusReport {
    pub fn applied_count(&self) -> usize {
        self.changes.iter().filter(|c| c.is_applied()).count()
    }

    pub fn pending_count(&self) -> usize {
        self.changes.len() - self.applied_count()
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<width$} {:<19} Description", "ID", "Applied At", width = ID_WIDTH)?;
        writeln!(f, "{}", "=".repeat(RULE_WIDTH))?;
        for change in &self.changes {
            writeln!(
                f,
                "{:<width$} {} {}",
                change.id.as_str(),
                change.applied_timestamp.as_deref().unwrap_or(PENDING_MARKER),
                change.description,
                width = ID_WIDTH
            )?;
        }
        writeln!(f)?;
        write!(
            f,
            "{} applied, {} pending",
            self.applied_count(),
            self.pending_count()
        )
    }
}

impl Migrator {
    /// Discovered changes merged with the changelog, ascending by id
    pub async fn status(&self) -> MigrationResult<StatusReport> {
        let mut applied: BTreeMap<ChangeId, Change> = self
            .applied_changes()
            .await?
            .into_iter()
            .map(|change| (change.id.clone(), change))
            .collect();

        let changes = self
            .source
            .list_changes()?
            .into_iter()
            .map(|change| match applied.remove(&change.id) {
                Some(recorded) => Change {
                    filename: change.filename,
                    ..recorded
                },
                None => change,
            })
            .collect();
        Ok(StatusReport { changes })
    }
}
