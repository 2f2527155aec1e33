//! Migration script reader
//!
//! A migration file holds both directions. Everything before the first
//! `--//` line mentioning `@UNDO` is the forward script; everything after is
//! the reverse script. Marker lines are rewritten to plain `-- ` comments so
//! they stay valid SQL when executed.

use crate::variables::VariableReplacer;

/// Prefix of a directive line
pub const DIRECTIVE_PREFIX: &str = "--//";

/// Tag that switches a directive line into the undo section
pub const UNDO_TAG: &str = "@UNDO";

const COMMENT_PREFIX: &str = "-- ";

/// Line separator appended after every line of a split script
#[cfg(windows)]
pub const LINE_SEPARATOR: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_SEPARATOR: &str = "\n";

/// Forward and reverse halves of a migration script
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationScript {
    pub forward: String,
    pub reverse: String,
}

impl MigrationScript {
    /// Split `text` into its forward and reverse sections.
    pub fn split(text: &str, line_separator: &str) -> Self {
        let mut script = MigrationScript::default();
        let mut in_undo = false;

        for line in text.lines() {
            let mut line = line.to_string();
            if line.trim_start().starts_with(DIRECTIVE_PREFIX) {
                if !in_undo && line.contains(UNDO_TAG) {
                    in_undo = true;
                }
                line = line.replacen(DIRECTIVE_PREFIX, COMMENT_PREFIX, 1);
            }

            let target = if in_undo {
                &mut script.reverse
            } else {
                &mut script.forward
            };
            target.push_str(&line);
            target.push_str(line_separator);
        }

        script
    }

    pub fn section(&self, undo: bool) -> &str {
        if undo {
            &self.reverse
        } else {
            &self.forward
        }
    }
}

/// Produces the executable text of a migration for one direction
#[derive(Debug, Clone)]
pub struct MigrationReader {
    line_separator: String,
    replacer: VariableReplacer,
}

impl MigrationReader {
    /// `replacer` should only carry variables with reserved settings already removed.
    pub fn new(replacer: VariableReplacer) -> Self {
        Self {
            line_separator: LINE_SEPARATOR.to_string(),
            replacer,
        }
    }

    pub fn with_line_separator(mut self, separator: impl Into<String>) -> Self {
        self.line_separator = separator.into();
        self
    }

    pub fn line_separator(&self) -> &str {
        &self.line_separator
    }

    /// Split `text`, pick the requested section and substitute variables.
    pub fn read(&self, text: &str, undo: bool) -> String {
        let script = MigrationScript::split(text, &self.line_separator);
        self.replacer.replace(script.section(undo))
    }
}

impl Default for MigrationReader {
    fn default() -> Self {
        Self::new(VariableReplacer::default())
    }
}
