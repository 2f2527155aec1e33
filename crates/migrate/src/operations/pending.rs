use std::collections::BTreeSet;
use tracing::{info, warn};

use super::{Migrator, OperationReport};
use crate::change::{Change, ChangeId};
use crate::error::{MigrationError, MigrationResult};

impl Migrator {
    /// Changes not recorded in the changelog, ascending, wherever they sit relative to applied ids
    pub async fn pending_changes(&self) -> MigrationResult<Vec<Change>> {
        let applied: BTreeSet<ChangeId> = self
            .applied_changes()
            .await?
            .into_iter()
            .map(|change| change.id)
            .collect();
        Ok(self
            .source
            .list_changes()?
            .into_iter()
            .filter(|change| !applied.contains(&change.id))
            .collect())
    }

    /// Apply every pending change, out of order if needed.
    ///
    /// Requires an existing changelog.
    pub async fn pending(&self) -> MigrationResult<OperationReport> {
        if !self.changelog.exists().await {
            return Err(MigrationError::ChangelogMissing {
                message: "no migrations applied yet, try running 'up' instead".to_string(),
            });
        }

        let pending = self.pending_changes().await?;
        let hook = self.up_hook.clone();
        let mut context = self.hook_context();
        let mut report = OperationReport::default();

        warn!("Running pending migrations out of order can create unexpected results");
        hook.before(&mut context).await?;
        for change in pending {
            info!("Applying: {}", change.label());
            self.apply_change(&change, hook.as_ref(), &mut context).await?;
            report.applied.push(change.id);
        }
        hook.after(&mut context).await?;
        Ok(report)
    }
}
