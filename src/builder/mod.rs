//! Dialect query builders.
//!
//! A [`QueryBuilder`] turns one [`TableChange`] into the literal statements a
//! database engine executes, in application order. Identifier quoting, type
//! names and literal escaping are per dialect; the dispatch on the change's
//! operation is shared.

pub mod mysql;
pub mod pgsql;
pub mod sqlite;

use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PhoenixError, PhoenixResult};
use crate::schema::{DefaultValue, ForeignKey, ForeignKeyAction, Structure};
use crate::table::{Operation, TableChange};

pub use mysql::MysqlQueryBuilder;
pub use pgsql::PgsqlQueryBuilder;
pub use sqlite::SqliteQueryBuilder;

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Dialect {
    #[default]
    #[serde(rename = "mysql", alias = "mariadb")]
    MySql,
    #[serde(rename = "pgsql", alias = "postgres", alias = "postgresql")]
    Postgres,
    #[serde(rename = "sqlite")]
    Sqlite,
}

impl Dialect {
    pub const fn name(&self) -> &'static str {
        match self {
            Dialect::MySql => "mysql",
            Dialect::Postgres => "pgsql",
            Dialect::Sqlite => "sqlite",
        }
    }

    /// Builder for this dialect.
    pub fn builder<'a>(&self, context: BuildContext<'a>) -> Box<dyn QueryBuilder + 'a> {
        match self {
            Dialect::MySql => Box::new(MysqlQueryBuilder::new(context)),
            Dialect::Postgres => Box::new(PgsqlQueryBuilder::new(context)),
            Dialect::Sqlite => Box::new(SqliteQueryBuilder::new(context)),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = PhoenixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "pgsql" | "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "sqlite" => Ok(Dialect::Sqlite),
            _ => Err(PhoenixError::invalid("adapter", s, &["mysql", "pgsql", "sqlite"])),
        }
    }
}

/// What a builder may know beyond the change set itself.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    /// Live (or replayed) schema, needed by rebuilds and by key extensions.
    pub structure: Option<&'a Structure>,
    /// Clock reading embedded in temporary table names.
    pub timestamp: NaiveDateTime,
}

impl<'a> BuildContext<'a> {
    pub fn new() -> Self {
        Self {
            structure: None,
            timestamp: Local::now().naive_local(),
        }
    }

    pub fn with_structure(mut self, structure: &'a Structure) -> Self {
        self.structure = Some(structure);
        self
    }

    pub fn at(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = timestamp;
        self
    }
}

impl Default for BuildContext<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Translator from change sets to dialect SQL.
pub trait QueryBuilder {
    fn dialect(&self) -> Dialect;

    fn quote_identifier(&self, name: &str) -> String;

    /// Quoted string literal.
    fn escape_string(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    fn bool_literal(&self, value: bool) -> String {
        if value { "1".to_string() } else { "0".to_string() }
    }

    fn create_table(&self, change: &TableChange) -> PhoenixResult<Vec<String>>;

    fn alter_table(&self, change: &TableChange) -> PhoenixResult<Vec<String>>;

    fn drop_table(&self, change: &TableChange) -> PhoenixResult<Vec<String>> {
        Ok(vec![format!("DROP TABLE {};", self.quote_identifier(change.name()))])
    }

    fn rename_table(&self, change: &TableChange, new_name: &str) -> PhoenixResult<Vec<String>> {
        Ok(vec![format!(
            "ALTER TABLE {} RENAME TO {};",
            self.quote_identifier(change.name()),
            self.quote_identifier(new_name)
        )])
    }

    fn copy_table(&self, change: &TableChange) -> PhoenixResult<Vec<String>>;

    fn truncate_table(&self, change: &TableChange) -> PhoenixResult<Vec<String>> {
        Ok(vec![format!("TRUNCATE TABLE {};", self.quote_identifier(change.name()))])
    }

    /// Statements for whatever operation `change` carries.
    fn build(&self, change: &TableChange) -> PhoenixResult<Vec<String>> {
        match change.operation() {
            Operation::Create => self.create_table(change),
            Operation::Alter => self.alter_table(change),
            Operation::Drop => self.drop_table(change),
            Operation::Rename(to) => self.rename_table(change, to),
            Operation::Copy { .. } => self.copy_table(change),
            Operation::Truncate => self.truncate_table(change),
        }
    }

    fn quote_list(&self, names: &[String]) -> String {
        names
            .iter()
            .map(|n| self.quote_identifier(n))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn default_literal(&self, value: &DefaultValue) -> String {
        match value {
            DefaultValue::Bool(b) => self.bool_literal(*b),
            DefaultValue::Integer(i) => i.to_string(),
            DefaultValue::String(s) => self.escape_string(s),
            DefaultValue::Raw(expression) => expression.clone(),
        }
    }

    /// Literal for a data value used by inserts, updates and deletes.
    fn value_literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => self.bool_literal(*b),
            Value::Number(n) => n.to_string(),
            Value::String(s) => self.escape_string(s),
            other => self.escape_string(&other.to_string()),
        }
    }

    /// `CONSTRAINT .. FOREIGN KEY (..) REFERENCES .. (..)` plus actions.
    fn foreign_key_definition(&self, fk: &ForeignKey) -> String {
        let mut sql = format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            self.quote_identifier(&fk.name),
            self.quote_list(&fk.columns),
            self.quote_identifier(&fk.referenced_table),
            self.quote_list(&fk.referenced_columns)
        );
        if fk.on_delete != ForeignKeyAction::Default {
            sql.push_str(" ON DELETE ");
            sql.push_str(fk.on_delete.keyword());
        }
        if fk.on_update != ForeignKeyAction::Default {
            sql.push_str(" ON UPDATE ");
            sql.push_str(fk.on_update.keyword());
        }
        sql
    }

    fn insert(&self, table: &str, values: &[(String, Value)]) -> String {
        let columns: Vec<String> = values.iter().map(|(c, _)| c.clone()).collect();
        let literals: Vec<String> = values.iter().map(|(_, v)| self.value_literal(v)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({});",
            self.quote_identifier(table),
            self.quote_list(&columns),
            literals.join(",")
        )
    }

    fn update(&self, table: &str, values: &[(String, Value)], conditions: &[(String, Value)]) -> String {
        let assignments: Vec<String> = values
            .iter()
            .map(|(c, v)| format!("{} = {}", self.quote_identifier(c), self.value_literal(v)))
            .collect();
        format!(
            "UPDATE {} SET {}{};",
            self.quote_identifier(table),
            assignments.join(", "),
            self.where_clause(conditions)
        )
    }

    fn delete(&self, table: &str, conditions: &[(String, Value)]) -> String {
        format!(
            "DELETE FROM {}{};",
            self.quote_identifier(table),
            self.where_clause(conditions)
        )
    }

    fn where_clause(&self, conditions: &[(String, Value)]) -> String {
        if conditions.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = conditions
            .iter()
            .map(|(c, v)| match v {
                Value::Null => format!("{} IS NULL", self.quote_identifier(c)),
                _ => format!("{} = {}", self.quote_identifier(c), self.value_literal(v)),
            })
            .collect();
        format!(" WHERE {}", parts.join(" AND "))
    }
}

/// Primary key after `change`, if the builder has to (re)declare it.
///
/// A change adding key columns to a table whose key survives extends that key,
/// which needs the live definition to know the existing columns.
pub(crate) fn extended_primary(change: &TableChange, structure: Option<&Structure>) -> (bool, Vec<String>) {
    if change.primary_to_add().is_empty() || change.drops_primary_key() {
        return (change.drops_primary_key(), change.primary_to_add().to_vec());
    }
    let existing = structure
        .and_then(|s| s.get_table(change.name()))
        .map(|t| t.primary.clone())
        .unwrap_or_default();
    if existing.is_empty() {
        return (false, change.primary_to_add().to_vec());
    }
    let mut primary = existing;
    for name in change.primary_to_add() {
        if !primary.contains(name) {
            primary.push(name.clone());
        }
    }
    (true, primary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dialect_from_str() {
        assert_eq!("MySQL".parse::<Dialect>().unwrap(), Dialect::MySql);
        assert_eq!("postgres".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("sqlite".parse::<Dialect>().unwrap(), Dialect::Sqlite);
        assert!("oracle".parse::<Dialect>().is_err());
    }

    #[test]
    fn test_data_statements() {
        let builder = Dialect::Postgres.builder(BuildContext::new());
        assert_eq!(
            builder.insert("users", &[("name".into(), json!("O'Hara")), ("active".into(), json!(true))]),
            "INSERT INTO \"users\" (\"name\",\"active\") VALUES ('O''Hara',TRUE);"
        );
        assert_eq!(
            builder.update("users", &[("name".into(), json!("x"))], &[("id".into(), json!(3))]),
            "UPDATE \"users\" SET \"name\" = 'x' WHERE \"id\" = 3;"
        );
        assert_eq!(
            builder.delete("users", &[("deleted_at".into(), Value::Null)]),
            "DELETE FROM \"users\" WHERE \"deleted_at\" IS NULL;"
        );
        assert_eq!(builder.delete("users", &[]), "DELETE FROM \"users\";");
    }
}
