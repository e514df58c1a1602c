//! Blocking wrapper around one sqlx connection.

use std::collections::HashMap;

use sqlx::any::AnyRow;
use sqlx::{AnyConnection, Column, Connection as _, Executor, Row as _};
use tokio::runtime::Runtime;
use tracing::debug;

use super::Row;
use crate::error::{PhoenixError, PhoenixResult};

/// One live connection plus the runtime driving it.
///
/// Statements without bind parameters go through the drivers' text protocol,
/// so DDL and transaction control work on every engine.
pub struct Connection {
    runtime: Runtime,
    inner: AnyConnection,
}

impl Connection {
    /// Connect to a database URL (`mysql://`, `postgres://`, `sqlite:`).
    pub fn open(url: &str) -> PhoenixResult<Self> {
        sqlx::any::install_default_drivers();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let inner = runtime
            .block_on(AnyConnection::connect(url))
            .map_err(|e| PhoenixError::Connection(e.to_string()))?;

        Ok(Self { runtime, inner })
    }

    /// Run a statement, returning affected rows and the generated id if any.
    pub fn execute(&mut self, sql: &str) -> PhoenixResult<(u64, Option<i64>)> {
        debug!(%sql, "execute");
        let result = self
            .runtime
            .block_on(self.inner.execute(sql))
            .map_err(|e| query_error(sql, e))?;
        Ok((result.rows_affected(), result.last_insert_id()))
    }

    /// Run a query and decode every row.
    pub fn fetch_all(&mut self, sql: &str) -> PhoenixResult<Vec<Row>> {
        let rows: Vec<AnyRow> = self
            .runtime
            .block_on(sqlx::query(sql).fetch_all(&mut self.inner))
            .map_err(|e| query_error(sql, e))?;
        Ok(rows.iter().map(row_to_map).collect())
    }

    pub fn close(self) -> PhoenixResult<()> {
        let Self { runtime, inner } = self;
        runtime
            .block_on(inner.close())
            .map_err(|e| PhoenixError::Connection(e.to_string()))
    }
}

/// Driver error with its SQLSTATE / vendor code preserved.
fn query_error(sql: &str, error: sqlx::Error) -> PhoenixError {
    match &error {
        sqlx::Error::Database(db) => {
            PhoenixError::query(sql, db.code().map(|c| c.into_owned()), db.message())
        }
        _ => PhoenixError::query(sql, None, error.to_string()),
    }
}

/// Convert an AnyRow to a HashMap, trying the widest types first.
fn row_to_map(row: &AnyRow) -> Row {
    let mut map = HashMap::new();

    for (i, column) in row.columns().iter().enumerate() {
        let value = if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
            v.map(|v| serde_json::Value::Number(v.into()))
        } else if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
            v.and_then(serde_json::Number::from_f64).map(serde_json::Value::Number)
        } else if let Ok(v) = row.try_get::<Option<String>, _>(i) {
            v.map(serde_json::Value::String)
        } else if let Ok(v) = row.try_get::<Option<bool>, _>(i) {
            v.map(serde_json::Value::Bool)
        } else {
            None
        };
        map.insert(column.name().to_string(), value.unwrap_or(serde_json::Value::Null));
    }

    map
}
