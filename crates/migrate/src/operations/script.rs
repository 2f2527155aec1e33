use std::io::Write;
use tracing::debug;

use super::Migrator;
use crate::change::{Change, ChangeId};
use crate::changelog::{delete_statement, insert_statement};
use crate::error::MigrationResult;

/// Changes covered by a generated script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptRange {
    /// `from < id <= to` ascending as forward scripts, or `to < id <= from`
    /// descending as undo scripts when `from > to`
    Between(ChangeId, ChangeId),
    /// Every change missing from the changelog, ascending
    Pending,
}

impl Migrator {
    /// Write the SQL that would perform `range` to `out`, without touching the database.
    ///
    /// Each change's script is followed by the changelog `INSERT` or `DELETE`
    /// that would record it. Returns the number of changes written.
    pub async fn script(
        &self,
        range: &ScriptRange,
        out: &mut (dyn Write + Send),
    ) -> MigrationResult<usize> {
        let (changes, undo) = match range {
            ScriptRange::Between(from, to) => {
                let undo = from > to;
                let mut changes: Vec<Change> = self
                    .source
                    .list_changes()?
                    .into_iter()
                    .filter(|change| {
                        if undo {
                            to < &change.id && &change.id <= from
                        } else {
                            from < &change.id && &change.id <= to
                        }
                    })
                    .collect();
                if undo {
                    changes.reverse();
                }
                (changes, undo)
            }
            ScriptRange::Pending => (self.pending_changes().await?, false),
        };

        for change in &changes {
            debug!("Generating script for {}", change.label());
            writeln!(out, "-- {}", change.label())?;
            let script = self.source.open_script(change, undo)?;
            out.write_all(script.as_bytes())?;
            if !script.is_empty() && !script.ends_with('\n') {
                writeln!(out)?;
            }

            let changelog_sql = if undo {
                delete_statement(&self.changelog_table, &change.id)
            } else {
                insert_statement(&self.changelog_table, change, &self.time_zone.now())
            };
            writeln!(out, "{}{}", changelog_sql, self.statement_terminator())?;
            writeln!(out)?;
        }
        out.flush()?;
        Ok(changes.len())
    }

    fn statement_terminator(&self) -> String {
        if self.options.full_line_delimiter {
            format!("\n{}", self.options.delimiter)
        } else {
            self.options.delimiter.clone()
        }
    }
}
