//! Changelog persistence
//!
//! The changelog table records which changes have been applied:
//! `ID` (exact numeric), `APPLIED_AT` (`yyyy-MM-dd HH:mm:ss`) and
//! `DESCRIPTION`. The table itself is created by the first migration, so its
//! absence simply means nothing has been applied yet.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::backends::{release, ConnectionProvider, SqlRow};
use crate::change::{Change, ChangeId};
use crate::config::{Environment, TimeZoneSetting, DEFAULT_CHANGELOG_TABLE};
use crate::error::{MigrationError, MigrationResult};

/// Persistence contract for the applied-changes ledger
#[async_trait]
pub trait ChangelogStore: Send + Sync {
    /// Whether the changelog table can be queried. Errors count as absence.
    async fn exists(&self) -> bool;

    /// Applied changes ordered by id, each carrying its applied timestamp
    async fn select_all(&self) -> MigrationResult<Vec<Change>>;

    /// Record `change` as applied now and return it with its timestamp.
    ///
    /// Commits immediately. Recording an already applied id is not guarded here.
    async fn insert(&self, change: &Change) -> MigrationResult<Change>;

    /// Remove the row for `id`, committing immediately
    async fn delete_by_id(&self, id: &ChangeId) -> MigrationResult<()>;
}

/// `INSERT` statement recording `change` with `applied_at`
pub fn insert_statement(table: &str, change: &Change, applied_at: &str) -> String {
    format!(
        "INSERT INTO {} (ID, APPLIED_AT, DESCRIPTION) VALUES ({}, {}, {})",
        table,
        change.id,
        quote(applied_at),
        quote(&change.description)
    )
}

/// `DELETE` statement removing the row for `id`
pub fn delete_statement(table: &str, id: &ChangeId) -> String {
    format!("DELETE FROM {} WHERE ID = {}", table, id)
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Changelog stored in a table of the target database
pub struct DatabaseChangelog {
    database: Arc<dyn ConnectionProvider>,
    table: String,
    time_zone: TimeZoneSetting,
}

impl DatabaseChangelog {
    pub fn new(database: Arc<dyn ConnectionProvider>) -> Self {
        Self {
            database,
            table: DEFAULT_CHANGELOG_TABLE.to_string(),
            time_zone: TimeZoneSetting::default(),
        }
    }

    pub fn from_environment(
        database: Arc<dyn ConnectionProvider>,
        environment: &Environment,
    ) -> Self {
        Self::new(database)
            .with_table(environment.changelog_table.clone())
            .with_time_zone(environment.time_zone)
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_time_zone(mut self, time_zone: TimeZoneSetting) -> Self {
        self.time_zone = time_zone;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    async fn execute(&self, sql: &str) -> MigrationResult<u64> {
        debug!("Changelog: {}", sql);
        let mut session = self.database.connect().await?;
        let outcome = session.execute(sql).await;
        release(session, outcome).await
    }

    async fn fetch_all(&self, sql: &str) -> MigrationResult<Vec<SqlRow>> {
        let mut session = self.database.connect().await?;
        let outcome = session.fetch_all(sql).await;
        release(session, outcome).await
    }
}

#[async_trait]
impl ChangelogStore for DatabaseChangelog {
    async fn exists(&self) -> bool {
        let sql = format!("SELECT COUNT(1) FROM {}", self.table);
        match self.fetch_all(&sql).await {
            Ok(_) => true,
            Err(err) => {
                debug!("Changelog table {} not available: {}", self.table, err);
                false
            }
        }
    }

    async fn select_all(&self) -> MigrationResult<Vec<Change>> {
        let sql = format!(
            "SELECT CAST(ID AS VARCHAR(64)), APPLIED_AT, DESCRIPTION FROM {} ORDER BY ID",
            self.table
        );
        let mut changes = self
            .fetch_all(&sql)
            .await?
            .into_iter()
            .map(|row| row_to_change(&self.table, row))
            .collect::<MigrationResult<Vec<_>>>()?;
        changes.sort();
        Ok(changes)
    }

    async fn insert(&self, change: &Change) -> MigrationResult<Change> {
        let applied_at = self.time_zone.now();
        self.execute(&insert_statement(&self.table, change, &applied_at))
            .await?;
        Ok(change.clone().with_applied_timestamp(applied_at))
    }

    async fn delete_by_id(&self, id: &ChangeId) -> MigrationResult<()> {
        self.execute(&delete_statement(&self.table, id)).await?;
        Ok(())
    }
}

fn row_to_change(table: &str, row: SqlRow) -> MigrationResult<Change> {
    let mut columns = row.into_iter();
    let id_text = columns.next().flatten().ok_or_else(|| MigrationError::Sql {
        message: format!("{} row without ID", table),
    })?;
    let id: ChangeId = id_text.parse().map_err(|_| MigrationError::Sql {
        message: format!("{} contains a non-numeric ID '{}'", table, id_text),
    })?;
    let applied_at = columns.next().flatten().unwrap_or_default();
    let description = columns.next().flatten().unwrap_or_default();
    Ok(Change::new(id, description).with_applied_timestamp(applied_at))
}
