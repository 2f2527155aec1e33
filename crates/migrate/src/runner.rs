//! Script runner
//!
//! Executes SQL text through a [`DatabaseSession`] honoring the delimiter,
//! commit and error settings of [`DatabaseOperationOptions`].

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::backends::DatabaseSession;
use crate::config::DatabaseOperationOptions;
use crate::error::{MigrationError, MigrationResult};

/// `-- @DELIMITER $$` style directive that changes the delimiter mid-script
static DELIMITER_DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*((--)|(//))?\s*(//)?\s*@DELIMITER\s+([^\s]+)")
        .expect("delimiter directive pattern is valid")
});

/// Outcome of running one script
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptReport {
    /// Statements executed successfully
    pub statements: usize,
    /// Statements that failed and were skipped because `stop_on_error` is off
    pub failures: usize,
}

/// Runs scripts with one set of options
#[derive(Debug, Clone, Copy)]
pub struct ScriptRunner<'a> {
    options: &'a DatabaseOperationOptions,
}

impl<'a> ScriptRunner<'a> {
    pub fn new(options: &'a DatabaseOperationOptions) -> Self {
        Self { options }
    }

    /// Execute `script` on `session`.
    ///
    /// Without auto-commit the whole script runs inside one transaction that
    /// is rolled back when a statement fails.
    pub async fn run(
        &self,
        session: &mut dyn DatabaseSession,
        script: &str,
    ) -> MigrationResult<ScriptReport> {
        let statements = if self.options.send_full_script {
            vec![script.to_string()]
        } else {
            self.split_statements(script)?
        };

        if self.options.auto_commit {
            return self.execute_all(session, &statements).await;
        }

        session.begin().await?;
        match self.execute_all(session, &statements).await {
            Ok(report) => {
                session.commit().await?;
                Ok(report)
            }
            Err(err) => {
                if let Err(rollback_err) = session.rollback().await {
                    warn!("Rollback failed after script error: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    async fn execute_all(
        &self,
        session: &mut dyn DatabaseSession,
        statements: &[String],
    ) -> MigrationResult<ScriptReport> {
        let mut report = ScriptReport::default();
        for statement in statements {
            let sql = if self.options.remove_crs {
                statement.replace("\r\n", "\n")
            } else {
                statement.clone()
            };
            if sql.trim().is_empty() {
                continue;
            }

            debug!("Executing: {}", sql.trim());
            match session.execute(&sql).await {
                Ok(_) => report.statements += 1,
                Err(err) if !self.options.stop_on_error && err.is_statement_failure() => {
                    warn!("Error executing: {} Cause: {}", sql.trim(), err);
                    report.failures += 1;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(report)
    }

    /// Split `script` into statements on the configured delimiter.
    ///
    /// Comment lines are dropped; a `@DELIMITER` comment switches the
    /// delimiter for the remaining lines.
    pub fn split_statements(&self, script: &str) -> MigrationResult<Vec<String>> {
        let mut delimiter = self.options.delimiter.clone();
        let mut statements = Vec::new();
        let mut command = String::new();

        for line in script.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with("--") || trimmed.starts_with("//") {
                if let Some(captures) = DELIMITER_DIRECTIVE.captures(trimmed) {
                    delimiter = captures[5].to_string();
                    debug!("Delimiter changed to {}", delimiter);
                }
            } else if self.ends_statement(trimmed, &delimiter) {
                let end = line.rfind(delimiter.as_str()).unwrap_or(line.len());
                command.push_str(&line[..end]);
                command.push('\n');
                if !command.trim().is_empty() {
                    statements.push(std::mem::take(&mut command));
                } else {
                    command.clear();
                }
            } else if !trimmed.is_empty() {
                command.push_str(line);
                command.push('\n');
            }
        }

        if !command.trim().is_empty() {
            return Err(MigrationError::UnterminatedStatement {
                delimiter,
                statement: command.trim().to_string(),
            });
        }
        Ok(statements)
    }

    fn ends_statement(&self, trimmed: &str, delimiter: &str) -> bool {
        if self.options.full_line_delimiter {
            trimmed == delimiter
        } else {
            trimmed.contains(delimiter)
        }
    }
}
