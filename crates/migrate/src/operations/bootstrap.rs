use tracing::{info, warn};

use super::Migrator;
use crate::error::MigrationResult;

impl Migrator {
    /// Run the bootstrap script, which is never recorded in the changelog.
    ///
    /// Refuses when the changelog already exists unless `force` is set.
    /// Returns whether a script ran.
    pub async fn bootstrap(&self, force: bool) -> MigrationResult<bool> {
        if self.changelog.exists().await && !force {
            warn!(
                "For your safety, the bootstrap script only runs before migrations are applied \
                 (before the changelog exists). If you are certain, run it with --force."
            );
            return Ok(false);
        }

        match self.source.open_bootstrap_script()? {
            Some(script) => {
                info!("Running bootstrap script");
                let report = self.run_script(&script).await?;
                info!(statements = report.statements, "Bootstrap complete");
                Ok(true)
            }
            None => {
                info!("No bootstrap script found");
                Ok(false)
            }
        }
    }
}
