use tracing::{info, warn};

use super::{Migrator, OperationReport};
use crate::error::MigrationResult;

impl Migrator {
    /// Undo the last `steps` applied changes, newest first.
    ///
    /// When an undone change drops the changelog table itself, its row cannot
    /// be deleted; the run stops there without failing.
    pub async fn down(&self, steps: usize) -> MigrationResult<OperationReport> {
        let mut changes = self.source.list_changes()?;
        changes.reverse();
        let hook = self.down_hook.clone();
        let mut context = self.hook_context();
        let mut report = OperationReport::default();

        hook.before(&mut context).await?;

        let Some(mut last_applied) = self.last_applied().await? else {
            info!("No migrations have been applied, nothing to undo");
            hook.after(&mut context).await?;
            return Ok(report);
        };

        for change in changes {
            if report.undone.len() >= steps {
                break;
            }
            if change.id != last_applied.id {
                continue;
            }

            info!("Undoing: {}", change.label());
            context.set_change(Some(&change));
            hook.before_each(&mut context).await?;
            self.run_change_script(&change, true).await?;

            let changelog_dropped = !self.changelog.exists().await;
            if changelog_dropped {
                warn!(
                    "Changelog no longer exists after undoing {}; assuming that change dropped it, \
                     no further migrations will be undone",
                    change.label()
                );
            } else {
                self.changelog.delete_by_id(&change.id).await?;
            }
            hook.after_each(&mut context).await?;
            context.set_change(None);
            report.undone.push(change.id);

            if changelog_dropped {
                break;
            }
            match self.last_applied().await? {
                Some(next) => last_applied = next,
                None => break,
            }
        }
        hook.after(&mut context).await?;

        if report.undone.is_empty() {
            warn!(
                "Last applied change {} was not found among the available migrations",
                last_applied.id
            );
        }
        Ok(report)
    }
}
