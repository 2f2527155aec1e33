//! Migration sources
//!
//! A [`MigrationSource`] discovers the available changes and hands out the
//! executable text of each one. Changes come either from `.sql` files on
//! disk or from a registry the embedding program builds in code.

mod file;
mod registry;

pub use file::{FileMigrationSource, BOOTSTRAP_SCRIPT};
pub use registry::{MigrationRegistry, RegisteredMigration};

use crate::change::Change;
use crate::error::MigrationResult;

/// Where changes and their scripts come from
#[derive(Debug, Clone)]
pub enum MigrationSource {
    Files(FileMigrationSource),
    Registry(MigrationRegistry),
}

impl MigrationSource {
    /// All available changes ordered by id; duplicated ids are rejected.
    pub fn list_changes(&self) -> MigrationResult<Vec<Change>> {
        match self {
            MigrationSource::Files(source) => source.list_changes(),
            MigrationSource::Registry(registry) => registry.list_changes(),
        }
    }

    /// Forward (or, with `undo`, reverse) script text for `change`
    pub fn open_script(&self, change: &Change, undo: bool) -> MigrationResult<String> {
        match self {
            MigrationSource::Files(source) => source.open_script(change, undo),
            MigrationSource::Registry(registry) => registry.open_script(change, undo),
        }
    }

    pub fn open_bootstrap_script(&self) -> MigrationResult<Option<String>> {
        match self {
            MigrationSource::Files(source) => source.open_bootstrap_script(),
            MigrationSource::Registry(registry) => Ok(registry.bootstrap_script()),
        }
    }
}

impl From<FileMigrationSource> for MigrationSource {
    fn from(source: FileMigrationSource) -> Self {
        MigrationSource::Files(source)
    }
}

impl From<MigrationRegistry> for MigrationSource {
    fn from(registry: MigrationRegistry) -> Self {
        MigrationSource::Registry(registry)
    }
}
