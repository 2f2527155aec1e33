//! Core database backend traits
//!
//! A session is one live connection. Every step of an operation acquires its
//! own session and closes it before the next step starts.

use async_trait::async_trait;

use crate::error::MigrationResult;

/// A result row with every column rendered as text
pub type SqlRow = Vec<Option<String>>;

/// One live database connection
#[async_trait]
pub trait DatabaseSession: Send {
    /// Execute SQL text and return the affected row count
    async fn execute(&mut self, sql: &str) -> MigrationResult<u64>;

    /// Execute a query and return all rows
    async fn fetch_all(&mut self, sql: &str) -> MigrationResult<Vec<SqlRow>>;

    async fn begin(&mut self) -> MigrationResult<()> {
        self.execute("BEGIN").await.map(|_| ())
    }

    async fn commit(&mut self) -> MigrationResult<()> {
        self.execute("COMMIT").await.map(|_| ())
    }

    async fn rollback(&mut self) -> MigrationResult<()> {
        self.execute("ROLLBACK").await.map(|_| ())
    }

    /// Close the connection
    async fn close(self: Box<Self>) -> MigrationResult<()>;
}

/// Hands out sessions against the target database
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn connect(&self) -> MigrationResult<Box<dyn DatabaseSession>>;
}

/// Close `session` and return `outcome`, preferring the outcome's error.
pub async fn release<T>(
    session: Box<dyn DatabaseSession>,
    outcome: MigrationResult<T>,
) -> MigrationResult<T> {
    let closed = session.close().await;
    let value = outcome?;
    closed?;
    Ok(value)
}
