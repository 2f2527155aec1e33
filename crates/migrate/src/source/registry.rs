//! Migrations registered in code
//!
//! The embedding program builds a [`MigrationRegistry`] of explicit
//! forward/reverse scripts instead of shipping `.sql` files. Registered
//! scripts are returned exactly as given: no splitting, no substitution.

use crate::change::{sort_unique, Change, ChangeId};
use crate::error::{MigrationError, MigrationResult};

/// One migration defined in code
#[derive(Debug, Clone)]
pub struct RegisteredMigration {
    pub id: ChangeId,
    pub description: String,
    pub forward: String,
    pub reverse: String,
}

impl RegisteredMigration {
    pub fn new(
        id: impl Into<ChangeId>,
        description: impl Into<String>,
        forward: impl Into<String>,
        reverse: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            forward: forward.into(),
            reverse: reverse.into(),
        }
    }
}

/// Typed collection of migrations handed to the engine
#[derive(Debug, Clone, Default)]
pub struct MigrationRegistry {
    migrations: Vec<RegisteredMigration>,
    bootstrap: Option<String>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, migration: RegisteredMigration) -> Self {
        self.migrations.push(migration);
        self
    }

    pub fn with_bootstrap(mut self, script: impl Into<String>) -> Self {
        self.bootstrap = Some(script.into());
        self
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    pub fn list_changes(&self) -> MigrationResult<Vec<Change>> {
        let changes = self
            .migrations
            .iter()
            .map(|m| Change::new(m.id.clone(), m.description.clone()))
            .collect();
        sort_unique(changes)
    }

    pub fn open_script(&self, change: &Change, undo: bool) -> MigrationResult<String> {
        let migration = self
            .migrations
            .iter()
            .find(|m| m.id == change.id)
            .ok_or_else(|| MigrationError::UnknownVersion {
                version: change.id.to_string(),
            })?;
        Ok(if undo {
            migration.reverse.clone()
        } else {
            migration.forward.clone()
        })
    }

    pub fn bootstrap_script(&self) -> Option<String> {
        self.bootstrap.clone()
    }
}
