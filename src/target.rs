//! Access to the live target database that scheduled queries run against.
//!
//! This is deliberately separate from [`crate::db::Store`]: the store is the
//! engine's own bookkeeping database, the target is whatever the user
//! connected. Each operation opens its own short-lived connection through
//! the credential resolver and releases it before returning.

use async_trait::async_trait;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, FromQueryResult, Statement,
};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::credentials::{ConnSpec, CredentialError, CredentialResolver};
use crate::models::query::QueryType;

#[derive(Debug, Error)]
pub enum TargetError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("Could not connect to target database: {0}")]
    Connect(String),

    #[error("Query execution failed: {0}")]
    Execute(String),
}

/// Result of executing one statement against the target.
#[derive(Debug, Clone)]
pub enum SqlOutcome {
    /// Row data from a read query.
    Rows(Vec<serde_json::Value>),
    /// Affected-row count from a write query.
    RowsAffected(u64),
}

/// The relational database the pipeline executes against.
#[async_trait]
pub trait QueryTarget: Send + Sync {
    async fn list_tables(&self) -> Result<Vec<String>, TargetError>;

    async fn table_columns(&self, table: &str) -> Result<Vec<String>, TargetError>;

    async fn run_sql(&self, sql: &str, kind: QueryType) -> Result<SqlOutcome, TargetError>;

    async fn test_connection(&self) -> Result<(), TargetError>;
}

/// [`QueryTarget`] over a sea-orm connection built per call from the
/// sanitized descriptor plus the keyring secret.
pub struct LiveTarget {
    spec: ConnSpec,
    resolver: CredentialResolver,
    connect_timeout: Duration,
}

impl LiveTarget {
    pub fn new(spec: ConnSpec, resolver: CredentialResolver, connect_timeout: Duration) -> Self {
        Self {
            spec,
            resolver,
            connect_timeout,
        }
    }

    #[must_use]
    pub const fn spec(&self) -> &ConnSpec {
        &self.spec
    }

    async fn connect(&self) -> Result<DatabaseConnection, TargetError> {
        let url = self.resolver.resolve_url(&self.spec)?;

        let mut opt = ConnectOptions::new(url);
        opt.max_connections(1)
            .connect_timeout(self.connect_timeout)
            .sqlx_logging(false);

        debug!("Connecting to target: {}", self.spec.masked());

        Database::connect(opt)
            .await
            .map_err(|e| TargetError::Connect(e.to_string()))
    }
}

#[async_trait]
impl QueryTarget for LiveTarget {
    async fn list_tables(&self) -> Result<Vec<String>, TargetError> {
        let conn = self.connect().await?;
        let backend = conn.get_database_backend();

        let sql = match backend {
            sea_orm::DatabaseBackend::Sqlite => {
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'"
            }
            _ => {
                "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
                 WHERE TABLE_TYPE = 'BASE TABLE'"
            }
        };

        let rows = conn
            .query_all(Statement::from_string(backend, sql.to_string()))
            .await
            .map_err(|e| TargetError::Execute(e.to_string()))?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row
                .try_get_by_index(0)
                .map_err(|e| TargetError::Execute(e.to_string()))?;
            tables.push(name);
        }
        Ok(tables)
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<String>, TargetError> {
        let conn = self.connect().await?;
        let backend = conn.get_database_backend();

        let stmt = match backend {
            sea_orm::DatabaseBackend::Sqlite => Statement::from_sql_and_values(
                backend,
                "SELECT name FROM pragma_table_info($1)",
                [table.into()],
            ),
            sea_orm::DatabaseBackend::MySql => Statement::from_sql_and_values(
                backend,
                "SELECT COLUMN_NAME FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_NAME = ?",
                [table.into()],
            ),
            _ => Statement::from_sql_and_values(
                backend,
                "SELECT COLUMN_NAME FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_NAME = $1",
                [table.into()],
            ),
        };

        let rows = conn
            .query_all(stmt)
            .await
            .map_err(|e| TargetError::Execute(e.to_string()))?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row
                .try_get_by_index(0)
                .map_err(|e| TargetError::Execute(e.to_string()))?;
            columns.push(name);
        }
        Ok(columns)
    }

    async fn run_sql(&self, sql: &str, kind: QueryType) -> Result<SqlOutcome, TargetError> {
        let conn = self.connect().await?;
        let backend = conn.get_database_backend();
        let stmt = Statement::from_string(backend, sql.to_string());

        if kind.is_read() {
            let rows: Vec<sea_orm::JsonValue> = sea_orm::JsonValue::find_by_statement(stmt)
                .all(&conn)
                .await
                .map_err(|e| TargetError::Execute(e.to_string()))?;
            Ok(SqlOutcome::Rows(rows))
        } else {
            let result = conn
                .execute(stmt)
                .await
                .map_err(|e| TargetError::Execute(e.to_string()))?;
            Ok(SqlOutcome::RowsAffected(result.rows_affected()))
        }
    }

    async fn test_connection(&self) -> Result<(), TargetError> {
        let conn = self.connect().await?;
        let backend = conn.get_database_backend();
        conn.query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await
            .map_err(|e| TargetError::Execute(e.to_string()))?;
        Ok(())
    }
}
