//! Error types for the migration engine
//!
//! Every fallible operation returns [`MigrationResult`]. Statement failures
//! reported by the database are kept apart from connectivity failures so the
//! script runner can skip the former when `stop_on_error` is disabled.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Error types for migration operations
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("IO error on '{}': {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Output error: {0}")]
    Output(#[from] std::io::Error),

    #[error("Invalid migration file '{file}': {message}")]
    Parse { file: String, message: String },

    #[error("Invalid change id '{value}': expected a decimal number")]
    InvalidId { value: String },

    #[error("Duplicate migration id {id} found in '{first}' and '{second}'")]
    DuplicateId {
        id: String,
        first: String,
        second: String,
    },

    #[error("Version {version} was not found among the available migrations")]
    UnknownVersion { version: String },

    #[error("Changelog does not exist: {message}")]
    ChangelogMissing { message: String },

    #[error("SQL error: {message}")]
    Sql { message: String },

    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Line missing end-of-line terminator ({delimiter}) => {statement}")]
    UnterminatedStatement { delimiter: String, statement: String },

    #[error("Hook '{hook}' failed: {message}")]
    Hook { hook: String, message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl MigrationError {
    /// Build an I/O error tagged with the path that failed
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MigrationError::Io {
            path: path.into(),
            source,
        }
    }

    /// Build a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        MigrationError::Configuration {
            message: message.into(),
        }
    }

    /// Whether this is a failure of one statement rather than of the connection.
    pub fn is_statement_failure(&self) -> bool {
        matches!(self, MigrationError::Sql { .. })
    }
}

impl From<sqlx::Error> for MigrationError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => MigrationError::Sql {
                message: db.to_string(),
            },
            sqlx::Error::RowNotFound
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::Decode(_)
            | sqlx::Error::ColumnDecode { .. } => MigrationError::Sql {
                message: err.to_string(),
            },
            other => MigrationError::Connection {
                message: other.to_string(),
            },
        }
    }
}

impl From<toml::de::Error> for MigrationError {
    fn from(err: toml::de::Error) -> Self {
        MigrationError::Configuration {
            message: format!("Invalid environment file: {}", err),
        }
    }
}
