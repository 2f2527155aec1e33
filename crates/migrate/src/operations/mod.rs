//! Migration operations
//!
//! [`Migrator`] ties a [`MigrationSource`], a connection provider and a
//! changelog together. Each operation lives in its own module and makes one
//! full pass: changes are re-discovered and the changelog re-read on every
//! call, and every step runs on its own database session.

mod bootstrap;
mod down;
mod pending;
mod script;
mod status;
mod up;
mod version;

pub use script::ScriptRange;
pub use status::StatusReport;

use std::sync::Arc;
use tracing::debug;

use crate::backends::{release, ConnectionProvider};
use crate::change::{Change, ChangeId};
use crate::changelog::{ChangelogStore, DatabaseChangelog};
use crate::config::{
    DatabaseOperationOptions, Environment, TimeZoneSetting, DEFAULT_CHANGELOG_TABLE,
};
use crate::error::MigrationResult;
use crate::hooks::{HookContext, MigrationHook, NoOpHook};
use crate::runner::{ScriptReport, ScriptRunner};
use crate::source::MigrationSource;

/// Changes touched by one operation, in execution order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationReport {
    /// Changes whose forward script ran and were recorded
    pub applied: Vec<ChangeId>,
    /// Changes whose reverse script ran
    pub undone: Vec<ChangeId>,
}

impl OperationReport {
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty() && self.undone.is_empty()
    }

    fn merge(&mut self, other: OperationReport) {
        self.applied.extend(other.applied);
        self.undone.extend(other.undone);
    }
}

/// Drives a database through its migrations
pub struct Migrator {
    source: MigrationSource,
    database: Arc<dyn ConnectionProvider>,
    changelog: Arc<dyn ChangelogStore>,
    options: DatabaseOperationOptions,
    changelog_table: String,
    time_zone: TimeZoneSetting,
    up_hook: Arc<dyn MigrationHook>,
    down_hook: Arc<dyn MigrationHook>,
}

impl Migrator {
    /// Migrator with default options and the changelog stored in `database`
    pub fn new(source: impl Into<MigrationSource>, database: Arc<dyn ConnectionProvider>) -> Self {
        Self {
            source: source.into(),
            changelog: Arc::new(DatabaseChangelog::new(database.clone())),
            database,
            options: DatabaseOperationOptions::default(),
            changelog_table: DEFAULT_CHANGELOG_TABLE.to_string(),
            time_zone: TimeZoneSetting::default(),
            up_hook: Arc::new(NoOpHook),
            down_hook: Arc::new(NoOpHook),
        }
    }

    /// Migrator configured from an environment's runner and changelog settings
    pub fn from_environment(
        source: impl Into<MigrationSource>,
        database: Arc<dyn ConnectionProvider>,
        environment: &Environment,
    ) -> Self {
        let changelog = DatabaseChangelog::from_environment(database.clone(), environment);
        Self {
            options: environment.operation_options(),
            changelog_table: environment.changelog_table.clone(),
            time_zone: environment.time_zone,
            ..Self::new(source, database)
        }
        .with_changelog(Arc::new(changelog))
    }

    pub fn with_changelog(mut self, changelog: Arc<dyn ChangelogStore>) -> Self {
        self.changelog = changelog;
        self
    }

    pub fn with_options(mut self, options: DatabaseOperationOptions) -> Self {
        self.options = options;
        self
    }

    /// Hooks fired by forward (`up`, `pending`) and backward (`down`) runs
    pub fn with_hooks(
        mut self,
        up_hook: Arc<dyn MigrationHook>,
        down_hook: Arc<dyn MigrationHook>,
    ) -> Self {
        self.up_hook = up_hook;
        self.down_hook = down_hook;
        self
    }

    pub fn source(&self) -> &MigrationSource {
        &self.source
    }

    pub fn options(&self) -> &DatabaseOperationOptions {
        &self.options
    }

    /// Whether the changelog table is present
    pub async fn changelog_exists(&self) -> bool {
        self.changelog.exists().await
    }

    /// Applied changes, empty when the changelog does not exist
    pub async fn applied_changes(&self) -> MigrationResult<Vec<Change>> {
        if !self.changelog.exists().await {
            return Ok(Vec::new());
        }
        self.changelog.select_all().await
    }

    /// Change with the highest applied id
    pub async fn last_applied(&self) -> MigrationResult<Option<Change>> {
        Ok(self.applied_changes().await?.into_iter().max())
    }

    fn hook_context(&self) -> HookContext {
        HookContext::new(self.database.clone(), self.options.clone())
    }

    /// Run SQL text on a fresh session
    async fn run_script(&self, script: &str) -> MigrationResult<ScriptReport> {
        let mut session = self.database.connect().await?;
        let outcome = ScriptRunner::new(&self.options)
            .run(session.as_mut(), script)
            .await;
        release(session, outcome).await
    }

    async fn run_change_script(&self, change: &Change, undo: bool) -> MigrationResult<()> {
        let script = self.source.open_script(change, undo)?;
        let report = self.run_script(&script).await?;
        debug!(
            statements = report.statements,
            failures = report.failures,
            "Finished {}",
            change.label()
        );
        Ok(())
    }

    /// Run the forward script of `change` and record it
    async fn apply_change(
        &self,
        change: &Change,
        hook: &dyn MigrationHook,
        context: &mut HookContext,
    ) -> MigrationResult<()> {
        context.set_change(Some(change));
        hook.before_each(context).await?;
        self.run_change_script(change, false).await?;
        self.changelog.insert(change).await?;
        hook.after_each(context).await?;
        context.set_change(None);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use async_trait::async_trait;
    use std::sync::Mutex;

    use super::*;
    use crate::error::MigrationError;
    use crate::source::{MigrationRegistry, RegisteredMigration};
    use crate::testing::FakeDatabase;

    /// Records every hook call with the id of the current change
    #[derive(Default)]
    pub struct RecordingHook {
        events: Mutex<Vec<String>>,
    }

    impl RecordingHook {
        pub fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn record(&self, event: &str, context: &HookContext) {
            let line = match context.change() {
                Some(change) => format!("{} {}", event, change.id),
                None => event.to_string(),
            };
            self.events.lock().unwrap().push(line);
        }
    }

    #[async_trait]
    impl MigrationHook for RecordingHook {
        async fn before(&self, context: &mut HookContext) -> MigrationResult<()> {
            self.record("before", context);
            Ok(())
        }

        async fn before_each(&self, context: &mut HookContext) -> MigrationResult<()> {
            self.record("before_each", context);
            Ok(())
        }

        async fn after_each(&self, context: &mut HookContext) -> MigrationResult<()> {
            self.record("after_each", context);
            Ok(())
        }

        async fn after(&self, context: &mut HookContext) -> MigrationResult<()> {
            self.record("after", context);
            Ok(())
        }
    }

    pub struct FailingBefore;

    #[async_trait]
    impl MigrationHook for FailingBefore {
        async fn before(&self, _context: &mut HookContext) -> MigrationResult<()> {
            Err(MigrationError::Hook {
                hook: "before".to_string(),
                message: "not allowed".to_string(),
            })
        }
    }

    /// Three changes; the first one creates the changelog table
    pub fn registry() -> MigrationRegistry {
        MigrationRegistry::new()
            .register(RegisteredMigration::new(
                1u64,
                "create changelog",
                "CREATE TABLE CHANGELOG (ID NUMERIC);",
                "DROP TABLE CHANGELOG;",
            ))
            .register(RegisteredMigration::new(
                2u64,
                "create people",
                "CREATE TABLE people (id INT);",
                "DROP TABLE people;",
            ))
            .register(RegisteredMigration::new(
                3u64,
                "create pets",
                "CREATE TABLE pets (id INT);",
                "DROP TABLE pets;",
            ))
    }

    pub fn migrator(database: &FakeDatabase) -> Migrator {
        migrator_with(database, registry())
    }

    pub fn migrator_with(database: &FakeDatabase, registry: MigrationRegistry) -> Migrator {
        Migrator::new(registry, Arc::new(database.clone()))
            .with_changelog(Arc::new(database.clone()))
    }

    pub fn ids(values: &[u64]) -> Vec<ChangeId> {
        values.iter().map(|v| ChangeId::from(*v)).collect()
    }

    pub fn strings(values: &[u64]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }
}
