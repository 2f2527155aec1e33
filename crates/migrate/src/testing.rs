//! In-memory database double for unit tests
//!
//! Records every statement it is asked to run and keeps a changelog in
//! memory. A statement containing `CREATE TABLE CHANGELOG` creates the
//! changelog; one containing `DROP TABLE CHANGELOG` removes it.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::backends::{ConnectionProvider, DatabaseSession, SqlRow};
use crate::change::{Change, ChangeId};
use crate::changelog::ChangelogStore;
use crate::error::{MigrationError, MigrationResult};

pub const FIXED_TIMESTAMP: &str = "2024-01-01 00:00:00";

#[derive(Default)]
struct FakeState {
    log: Vec<String>,
    changelog: Option<BTreeMap<ChangeId, Change>>,
    fail_on: Vec<String>,
    disconnect_on: Vec<String>,
    open_sessions: usize,
    sessions_opened: usize,
}

#[derive(Clone, Default)]
pub struct FakeDatabase {
    state: Arc<Mutex<FakeState>>,
}

impl FakeDatabase {
    /// Database without a changelog table
    pub fn new() -> Self {
        Self::default()
    }

    /// Database whose changelog already records `ids`
    pub fn with_changelog(ids: &[u64]) -> Self {
        let database = Self::new();
        {
            let mut state = database.state.lock().unwrap();
            let rows = ids
                .iter()
                .map(|id| {
                    let change = Change::new(ChangeId::from(*id), format!("change {}", id))
                        .with_applied_timestamp(FIXED_TIMESTAMP);
                    (change.id.clone(), change)
                })
                .collect();
            state.changelog = Some(rows);
        }
        database
    }

    pub fn session(&self) -> FakeSession {
        let mut state = self.state.lock().unwrap();
        state.open_sessions += 1;
        state.sessions_opened += 1;
        FakeSession {
            state: self.state.clone(),
        }
    }

    /// Statements containing `fragment` fail with a SQL error
    pub fn fail_on(&self, fragment: &str) {
        self.state.lock().unwrap().fail_on.push(fragment.to_string());
    }

    /// Statements containing `fragment` fail with a connection error
    pub fn disconnect_on(&self, fragment: &str) {
        self.state
            .lock()
            .unwrap()
            .disconnect_on
            .push(fragment.to_string());
    }

    /// Everything executed so far, including transaction control and changelog writes
    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    /// Executed statements without transaction control
    pub fn statements(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter(|entry| !matches!(entry.as_str(), "BEGIN" | "COMMIT" | "ROLLBACK"))
            .collect()
    }

    /// Ids recorded in the changelog, or `None` when the table is absent
    pub fn applied_ids(&self) -> Option<Vec<String>> {
        self.state
            .lock()
            .unwrap()
            .changelog
            .as_ref()
            .map(|rows| rows.keys().map(|id| id.to_string()).collect())
    }

    pub fn open_sessions(&self) -> usize {
        self.state.lock().unwrap().open_sessions
    }

    pub fn sessions_opened(&self) -> usize {
        self.state.lock().unwrap().sessions_opened
    }
}

pub struct FakeSession {
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl DatabaseSession for FakeSession {
    async fn execute(&mut self, sql: &str) -> MigrationResult<u64> {
        let mut state = self.state.lock().unwrap();
        let statement = record(&mut state, sql)?;

        let upper = statement.to_uppercase();
        if upper.contains("CREATE TABLE CHANGELOG") {
            state.changelog.get_or_insert_with(BTreeMap::new);
        } else if upper.contains("DROP TABLE CHANGELOG") {
            state.changelog = None;
        }
        Ok(0)
    }

    async fn fetch_all(&mut self, sql: &str) -> MigrationResult<Vec<SqlRow>> {
        let mut state = self.state.lock().unwrap();
        record(&mut state, sql)?;
        Ok(Vec::new())
    }

    async fn close(self: Box<Self>) -> MigrationResult<()> {
        self.state.lock().unwrap().open_sessions -= 1;
        Ok(())
    }
}

/// Log `sql` and apply the configured failures
fn record(state: &mut FakeState, sql: &str) -> MigrationResult<String> {
    let statement = sql.trim().to_string();
    state.log.push(statement.clone());

    if state.disconnect_on.iter().any(|f| statement.contains(f.as_str())) {
        return Err(MigrationError::Connection {
            message: "connection reset".to_string(),
        });
    }
    if state.fail_on.iter().any(|f| statement.contains(f.as_str())) {
        return Err(MigrationError::Sql {
            message: format!("statement rejected: {}", statement),
        });
    }
    Ok(statement)
}

#[async_trait]
impl ConnectionProvider for FakeDatabase {
    async fn connect(&self) -> MigrationResult<Box<dyn DatabaseSession>> {
        Ok(Box::new(self.session()))
    }
}

#[async_trait]
impl ChangelogStore for FakeDatabase {
    async fn exists(&self) -> bool {
        self.state.lock().unwrap().changelog.is_some()
    }

    async fn select_all(&self) -> MigrationResult<Vec<Change>> {
        let state = self.state.lock().unwrap();
        let rows = state.changelog.as_ref().ok_or_else(|| MigrationError::Sql {
            message: "no such table: CHANGELOG".to_string(),
        })?;
        Ok(rows.values().cloned().collect())
    }

    async fn insert(&self, change: &Change) -> MigrationResult<Change> {
        let mut state = self.state.lock().unwrap();
        state.log.push(format!("INSERT CHANGELOG {}", change.id));
        let rows = state.changelog.as_mut().ok_or_else(|| MigrationError::Sql {
            message: "no such table: CHANGELOG".to_string(),
        })?;
        let applied = change.clone().with_applied_timestamp(FIXED_TIMESTAMP);
        rows.insert(applied.id.clone(), applied.clone());
        Ok(applied)
    }

    async fn delete_by_id(&self, id: &ChangeId) -> MigrationResult<()> {
        let mut state = self.state.lock().unwrap();
        state.log.push(format!("DELETE CHANGELOG {}", id));
        let rows = state.changelog.as_mut().ok_or_else(|| MigrationError::Sql {
            message: "no such table: CHANGELOG".to_string(),
        })?;
        rows.remove(id);
        Ok(())
    }
}
