use tracing::info;

use super::{Migrator, OperationReport};
use crate::error::MigrationResult;

impl Migrator {
    /// Apply every change above the last applied one, at most `limit` of them.
    pub async fn up(&self, limit: Option<usize>) -> MigrationResult<OperationReport> {
        let changes = self.source.list_changes()?;
        let last_applied = self.last_applied().await?;
        let hook = self.up_hook.clone();
        let mut context = self.hook_context();
        let mut report = OperationReport::default();

        hook.before(&mut context).await?;
        for change in changes {
            if limit.map_or(false, |limit| report.applied.len() >= limit) {
                break;
            }
            if last_applied.as_ref().map_or(false, |last| change.id <= last.id) {
                continue;
            }
            info!("Applying: {}", change.label());
            self.apply_change(&change, hook.as_ref(), &mut context).await?;
            report.applied.push(change.id);
        }
        hook.after(&mut context).await?;

        if report.applied.is_empty() {
            info!("Nothing to apply, database is up to date");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::fixtures::*;
    use crate::error::MigrationError;
    use crate::hooks::NoOpHook;
    use crate::testing::FakeDatabase;

    #[tokio::test]
    async fn test_up_applies_everything_in_order() {
        let database = FakeDatabase::new();
        let report = migrator(&database).up(None).await.unwrap();

        assert_eq!(report.applied, ids(&[1, 2, 3]));
        assert_eq!(database.applied_ids(), Some(strings(&[1, 2, 3])));
        assert_eq!(
            database.statements(),
            vec![
                "CREATE TABLE CHANGELOG (ID NUMERIC)",
                "INSERT CHANGELOG 1",
                "CREATE TABLE people (id INT)",
                "INSERT CHANGELOG 2",
                "CREATE TABLE pets (id INT)",
                "INSERT CHANGELOG 3",
            ]
        );
        assert_eq!(database.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_up_skips_applied_changes() {
        let database = FakeDatabase::with_changelog(&[1, 2]);
        let report = migrator(&database).up(None).await.unwrap();
        assert_eq!(report.applied, ids(&[3]));
        assert_eq!(database.applied_ids(), Some(strings(&[1, 2, 3])));
    }

    #[tokio::test]
    async fn test_up_respects_limit() {
        let database = FakeDatabase::new();
        let report = migrator(&database).up(Some(2)).await.unwrap();
        assert_eq!(report.applied, ids(&[1, 2]));
        assert_eq!(database.applied_ids(), Some(strings(&[1, 2])));
    }

    #[tokio::test]
    async fn test_up_ignores_gaps_below_last_applied() {
        let database = FakeDatabase::with_changelog(&[1, 3]);
        let report = migrator(&database).up(None).await.unwrap();
        assert!(report.is_empty());
        assert_eq!(database.applied_ids(), Some(strings(&[1, 3])));
    }

    #[tokio::test]
    async fn test_up_fires_hooks_around_each_change() {
        let database = FakeDatabase::with_changelog(&[1]);
        let hook = Arc::new(RecordingHook::default());
        migrator(&database)
            .with_hooks(hook.clone(), Arc::new(NoOpHook))
            .up(None)
            .await
            .unwrap();

        assert_eq!(
            hook.events(),
            vec![
                "before",
                "before_each 2",
                "after_each 2",
                "before_each 3",
                "after_each 3",
                "after",
            ]
        );
    }

    #[tokio::test]
    async fn test_up_fires_before_and_after_with_nothing_to_do() {
        let database = FakeDatabase::with_changelog(&[1, 2, 3]);
        let hook = Arc::new(RecordingHook::default());
        migrator(&database)
            .with_hooks(hook.clone(), Arc::new(NoOpHook))
            .up(None)
            .await
            .unwrap();
        assert_eq!(hook.events(), vec!["before", "after"]);
    }

    #[tokio::test]
    async fn test_failing_before_hook_prevents_scripts() {
        let database = FakeDatabase::new();
        let err = migrator(&database)
            .with_hooks(Arc::new(FailingBefore), Arc::new(NoOpHook))
            .up(None)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::Hook { .. }));
        assert!(database.statements().is_empty());
    }

    #[tokio::test]
    async fn test_failed_script_stops_run_and_keeps_completed_steps() {
        let database = FakeDatabase::new();
        database.fail_on("people");
        let err = migrator(&database).up(None).await.unwrap_err();

        assert!(err.is_statement_failure());
        assert_eq!(database.applied_ids(), Some(strings(&[1])));
        assert_eq!(database.open_sessions(), 0);
    }
}
