//! sqlx `Any` backend
//!
//! The driver is picked from the URL scheme (`postgres://`, `sqlite://`).

use async_trait::async_trait;
use sqlx::any::{install_default_drivers, AnyRow};
use sqlx::AnyConnection;
use sqlx::{Connection, Executor, Row, ValueRef};
use tracing::debug;

use super::core::{ConnectionProvider, DatabaseSession, SqlRow};
use crate::config::Environment;
use crate::error::{MigrationError, MigrationResult};

/// Opens one sqlx connection per session
#[derive(Debug, Clone)]
pub struct SqlxConnectionProvider {
    url: String,
}

impl SqlxConnectionProvider {
    pub fn new(url: impl Into<String>) -> Self {
        install_default_drivers();
        Self { url: url.into() }
    }

    pub fn from_environment(environment: &Environment) -> MigrationResult<Self> {
        Ok(Self::new(environment.connection_url()?))
    }
}

#[async_trait]
impl ConnectionProvider for SqlxConnectionProvider {
    async fn connect(&self) -> MigrationResult<Box<dyn DatabaseSession>> {
        let connection = AnyConnection::connect(&self.url)
            .await
            .map_err(|e| MigrationError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;
        debug!(backend = connection.backend_name(), "Opened database session");
        Ok(Box::new(SqlxSession { connection }))
    }
}

/// A live sqlx connection
pub struct SqlxSession {
    connection: AnyConnection,
}

#[async_trait]
impl DatabaseSession for SqlxSession {
    async fn execute(&mut self, sql: &str) -> MigrationResult<u64> {
        let result = self.connection.execute(sql).await?;
        Ok(result.rows_affected())
    }

    async fn fetch_all(&mut self, sql: &str) -> MigrationResult<Vec<SqlRow>> {
        let rows = self.connection.fetch_all(sql).await?;
        rows.iter().map(row_to_text).collect()
    }

    async fn close(self: Box<Self>) -> MigrationResult<()> {
        self.connection.close().await.map_err(|e| MigrationError::Connection {
            message: format!("Failed to close database session: {}", e),
        })
    }
}

fn row_to_text(row: &AnyRow) -> MigrationResult<SqlRow> {
    (0..row.columns().len())
        .map(|index| column_text(row, index))
        .collect()
}

fn column_text(row: &AnyRow, index: usize) -> MigrationResult<Option<String>> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(None);
    }
    if let Ok(text) = row.try_get::<String, _>(index) {
        return Ok(Some(text));
    }
    if let Ok(number) = row.try_get::<i64, _>(index) {
        return Ok(Some(number.to_string()));
    }
    let number: f64 = row.try_get(index)?;
    Ok(Some(number.to_string()))
}
