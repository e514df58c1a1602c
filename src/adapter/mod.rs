//! Live database access.
//!
//! An [`Adapter`] owns exactly one connection for its lifetime. It executes
//! statements, hands out the matching [`QueryBuilder`], drives transactions
//! and introspects the live schema into a [`Structure`].

mod connection;
pub mod mysql;
pub mod native_type;
pub mod pgsql;
pub mod sqlite;

use std::collections::HashMap;

use serde_json::Value;

use crate::builder::{BuildContext, Dialect, QueryBuilder};
use crate::config::Environment;
use crate::error::PhoenixResult;
use crate::schema::Structure;

pub use connection::Connection;
pub use mysql::MysqlAdapter;
pub use pgsql::PgsqlAdapter;
pub use sqlite::SqliteAdapter;

/// One result row, keyed by column label.
pub type Row = HashMap<String, Value>;

pub trait Adapter {
    fn dialect(&self) -> Dialect;

    /// Run one statement and return the number of affected rows.
    fn execute(&mut self, sql: &str) -> PhoenixResult<u64>;

    fn fetch_all(&mut self, sql: &str) -> PhoenixResult<Vec<Row>>;

    /// Insert one row and return its generated id, if the table has one.
    fn insert(&mut self, table: &str, values: &[(String, Value)]) -> PhoenixResult<Option<i64>>;

    /// Introspect every table of the current database / schema.
    fn load_structure(&mut self) -> PhoenixResult<Structure>;

    fn start_transaction(&mut self) -> PhoenixResult<()> {
        let sql = match self.dialect() {
            Dialect::MySql => "START TRANSACTION",
            Dialect::Postgres | Dialect::Sqlite => "BEGIN",
        };
        self.execute(sql).map(|_| ())
    }

    fn commit(&mut self) -> PhoenixResult<()> {
        self.execute("COMMIT").map(|_| ())
    }

    fn rollback(&mut self) -> PhoenixResult<()> {
        self.execute("ROLLBACK").map(|_| ())
    }

    fn query_builder<'a>(&self, context: BuildContext<'a>) -> Box<dyn QueryBuilder + 'a> {
        self.dialect().builder(context)
    }
}

/// Open the adapter an environment asks for.
pub fn connect(environment: &Environment) -> PhoenixResult<Box<dyn Adapter>> {
    let url = environment.url()?;
    Ok(match environment.adapter {
        Dialect::MySql => Box::new(MysqlAdapter::connect(&url)?),
        Dialect::Postgres => Box::new(PgsqlAdapter::connect(&url)?),
        Dialect::Sqlite => Box::new(SqliteAdapter::connect(&url)?),
    })
}

/// Column value as text; numbers are rendered.
pub(crate) fn text(row: &Row, key: &str) -> Option<String> {
    match row.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Column value as an integer; numeric text is parsed.
pub(crate) fn number(row: &Row, key: &str) -> Option<i64> {
    match row.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

/// Like [`text`] but empty strings count as missing.
pub(crate) fn non_empty(row: &Row, key: &str) -> Option<String> {
    text(row, key).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_accessors() {
        let row: Row = [
            ("name".to_string(), json!("users")),
            ("position".to_string(), json!("3")),
            ("pk".to_string(), json!(1)),
            ("comment".to_string(), json!("")),
            ("missing".to_string(), Value::Null),
        ]
        .into_iter()
        .collect();

        assert_eq!(text(&row, "name").as_deref(), Some("users"));
        assert_eq!(text(&row, "pk").as_deref(), Some("1"));
        assert_eq!(number(&row, "position"), Some(3));
        assert_eq!(number(&row, "pk"), Some(1));
        assert_eq!(non_empty(&row, "comment"), None);
        assert_eq!(text(&row, "missing"), None);
        assert_eq!(number(&row, "absent"), None);
    }
}
