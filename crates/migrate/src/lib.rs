//! # chronicle: versioned SQL schema migrations
//!
//! Tracks which numbered change scripts have been applied to a database and
//! moves the database forward or backward through them, keeping a changelog
//! table consistent with what actually ran.
//!
//! A change script holds both directions, separated by a `--//@UNDO` line:
//!
//! ```sql
//! CREATE TABLE ${schema}.people (id INT);
//!
//! --//@UNDO
//! DROP TABLE ${schema}.people;
//! ```
//!
//! The [`Migrator`] offers `bootstrap`, `up`, `down`, `pending`, `version`,
//! `status` and `script`, with optional [`MigrationHook`]s around each run
//! and each applied change.

pub mod backends;
pub mod change;
pub mod changelog;
pub mod config;
pub mod error;
pub mod hooks;
pub mod operations;
pub mod reader;
pub mod runner;
pub mod source;
pub mod variables;

#[cfg(test)]
mod testing;

pub use backends::{ConnectionProvider, DatabaseSession, SqlxConnectionProvider};
pub use change::{Change, ChangeId};
pub use changelog::{ChangelogStore, DatabaseChangelog};
pub use config::{DatabaseOperationOptions, Environment, SettingKey, TimeZoneSetting};
pub use error::{MigrationError, MigrationResult};
pub use hooks::{
    ConfiguredHook, HookContext, HookDirection, HookRegistry, HookScript, MigrationHook, NoOpHook,
    SqlHook,
};
pub use operations::{Migrator, OperationReport, ScriptRange, StatusReport};
pub use reader::{MigrationReader, MigrationScript};
pub use runner::{ScriptReport, ScriptRunner};
pub use source::{FileMigrationSource, MigrationRegistry, MigrationSource, RegisteredMigration};
pub use variables::{VariableReplacer, Variables};
