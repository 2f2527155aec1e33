use std::cmp::Ordering;
use tracing::{info, warn};

use super::{Migrator, OperationReport};
use crate::change::ChangeId;
use crate::error::{MigrationError, MigrationResult};

impl Migrator {
    /// Move the database to `target` one change at a time.
    ///
    /// Every step is a complete single-step `up` or `down`, so a failure
    /// leaves the changelog at the last step that committed.
    pub async fn version(&self, target: &ChangeId) -> MigrationResult<OperationReport> {
        if !self
            .source
            .list_changes()?
            .iter()
            .any(|change| &change.id == target)
        {
            return Err(MigrationError::UnknownVersion {
                version: target.to_string(),
            });
        }

        let mut report = OperationReport::default();
        loop {
            let current = self.last_applied().await?;
            let direction = current
                .as_ref()
                .map_or(Ordering::Less, |change| change.id.cmp(target));

            let step = match direction {
                Ordering::Equal => {
                    info!("Database is at version {}", target);
                    return Ok(report);
                }
                Ordering::Less => {
                    info!("Upgrading to version {}", target);
                    self.up(Some(1)).await?
                }
                Ordering::Greater => {
                    info!("Downgrading to version {}", target);
                    let step = self.down(1).await?;
                    if !step.is_empty() && !self.changelog.exists().await {
                        return Err(MigrationError::ChangelogMissing {
                            message: format!(
                                "changelog was dropped before reaching version {}",
                                target
                            ),
                        });
                    }
                    step
                }
            };

            if step.is_empty() {
                warn!(
                    "Could not move from {} towards version {}",
                    current.map_or_else(|| "an empty changelog".to_string(), |c| c.id.to_string()),
                    target
                );
                return Ok(report);
            }
            report.merge(step);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use crate::change::ChangeId;
    use crate::error::MigrationError;
    use crate::source::{MigrationRegistry, RegisteredMigration};
    use crate::testing::FakeDatabase;

    #[tokio::test]
    async fn test_version_steps_down_one_change_at_a_time() {
        let database = FakeDatabase::with_changelog(&[1, 2, 3]);
        let report = migrator(&database).version(&ChangeId::from(1)).await.unwrap();

        assert_eq!(report.undone, ids(&[3, 2]));
        assert_eq!(database.applied_ids(), Some(strings(&[1])));
        assert_eq!(
            database.statements(),
            vec![
                "DROP TABLE pets",
                "DELETE CHANGELOG 3",
                "DROP TABLE people",
                "DELETE CHANGELOG 2",
            ]
        );
    }

    #[tokio::test]
    async fn test_version_steps_up() {
        let database = FakeDatabase::new();
        let report = migrator(&database).version(&ChangeId::from(2)).await.unwrap();
        assert_eq!(report.applied, ids(&[1, 2]));
        assert_eq!(database.applied_ids(), Some(strings(&[1, 2])));
    }

    #[tokio::test]
    async fn test_version_at_target_is_a_no_op() {
        let database = FakeDatabase::with_changelog(&[1, 2]);
        let report = migrator(&database).version(&ChangeId::from(2)).await.unwrap();
        assert!(report.is_empty());
        assert!(database.statements().is_empty());
    }

    #[tokio::test]
    async fn test_version_rejects_unknown_target() {
        let database = FakeDatabase::with_changelog(&[1]);
        let err = migrator(&database)
            .version(&ChangeId::from(7))
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::UnknownVersion { .. }));
        assert!(database.statements().is_empty());
    }

    #[tokio::test]
    async fn test_version_down_fails_when_changelog_disappears() {
        let registry = MigrationRegistry::new()
            .register(RegisteredMigration::new(
                1u64,
                "seed",
                "INSERT INTO t VALUES (1);",
                "DELETE FROM t;",
            ))
            .register(RegisteredMigration::new(
                2u64,
                "create changelog",
                "CREATE TABLE CHANGELOG (ID NUMERIC);",
                "DROP TABLE CHANGELOG;",
            ));
        let database = FakeDatabase::with_changelog(&[2]);
        let err = migrator_with(&database, registry)
            .version(&ChangeId::from(1))
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::ChangelogMissing { .. }));
        assert_eq!(database.statements(), vec!["DROP TABLE CHANGELOG"]);
    }
}
