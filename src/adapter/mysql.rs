use indexmap::IndexMap;
use serde_json::Value;

use super::native_type::{column_spec, parse_mysql_default, parse_native_type, parse_sql_default};
use super::{non_empty, number, text, Adapter, Connection, Row};
use crate::builder::{BuildContext, Dialect};
use crate::error::PhoenixResult;
use crate::schema::{
    ForeignKey, ForeignKeyAction, Index, IndexColumn, IndexMethod, IndexType, Structure, Table,
};

const TABLES: &str = "SELECT TABLE_NAME AS name, TABLE_COLLATION AS collation_name, TABLE_COMMENT AS comment \
    FROM information_schema.TABLES \
    WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE' \
    ORDER BY TABLE_NAME";

const COLUMNS: &str = "SELECT TABLE_NAME AS table_name, COLUMN_NAME AS name, COLUMN_TYPE AS column_type, \
    IS_NULLABLE AS nullable, COLUMN_DEFAULT AS default_value, EXTRA AS extra, \
    CHARACTER_SET_NAME AS charset, COLLATION_NAME AS collation_name, COLUMN_COMMENT AS comment \
    FROM information_schema.COLUMNS \
    WHERE TABLE_SCHEMA = DATABASE() \
    ORDER BY TABLE_NAME, ORDINAL_POSITION";

const STATISTICS: &str = "SELECT TABLE_NAME AS table_name, INDEX_NAME AS name, \
    CAST(NON_UNIQUE AS CHAR) AS non_unique, INDEX_TYPE AS index_type, COLUMN_NAME AS column_name, \
    COLLATION AS sort_order, CAST(SUB_PART AS CHAR) AS sub_part \
    FROM information_schema.STATISTICS \
    WHERE TABLE_SCHEMA = DATABASE() \
    ORDER BY TABLE_NAME, INDEX_NAME, SEQ_IN_INDEX";

const FOREIGN_KEYS: &str = "SELECT k.TABLE_NAME AS table_name, k.CONSTRAINT_NAME AS name, \
    k.COLUMN_NAME AS column_name, k.REFERENCED_TABLE_NAME AS referenced_table, \
    k.REFERENCED_COLUMN_NAME AS referenced_column, r.UPDATE_RULE AS on_update, r.DELETE_RULE AS on_delete \
    FROM information_schema.KEY_COLUMN_USAGE k \
    JOIN information_schema.REFERENTIAL_CONSTRAINTS r \
    ON r.CONSTRAINT_SCHEMA = k.CONSTRAINT_SCHEMA AND r.CONSTRAINT_NAME = k.CONSTRAINT_NAME AND r.TABLE_NAME = k.TABLE_NAME \
    WHERE k.TABLE_SCHEMA = DATABASE() AND k.REFERENCED_TABLE_NAME IS NOT NULL \
    ORDER BY k.TABLE_NAME, k.CONSTRAINT_NAME, k.ORDINAL_POSITION";

/// MySQL / MariaDB adapter, introspecting through `information_schema`.
pub struct MysqlAdapter {
    connection: Connection,
}

impl MysqlAdapter {
    pub fn connect(url: &str) -> PhoenixResult<Self> {
        Ok(Self {
            connection: Connection::open(url)?,
        })
    }

    pub fn close(self) -> PhoenixResult<()> {
        self.connection.close()
    }
}

impl Adapter for MysqlAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    fn execute(&mut self, sql: &str) -> PhoenixResult<u64> {
        self.connection.execute(sql).map(|(affected, _)| affected)
    }

    fn fetch_all(&mut self, sql: &str) -> PhoenixResult<Vec<Row>> {
        self.connection.fetch_all(sql)
    }

    fn insert(&mut self, table: &str, values: &[(String, Value)]) -> PhoenixResult<Option<i64>> {
        let sql = self.query_builder(BuildContext::new()).insert(table, values);
        self.connection.execute(&sql).map(|(_, id)| id)
    }

    fn load_structure(&mut self) -> PhoenixResult<Structure> {
        let tables = self.connection.fetch_all(TABLES)?;
        let columns = self.connection.fetch_all(COLUMNS)?;
        let statistics = self.connection.fetch_all(STATISTICS)?;
        let foreign_keys = self.connection.fetch_all(FOREIGN_KEYS)?;
        assemble(&tables, &columns, &statistics, &foreign_keys)
    }
}

/// Build a structure from the four `information_schema` result sets.
fn assemble(tables: &[Row], columns: &[Row], statistics: &[Row], foreign_keys: &[Row]) -> PhoenixResult<Structure> {
    let mut loaded: IndexMap<String, Table> = IndexMap::new();
    for row in tables {
        let Some(name) = text(row, "name") else { continue };
        let mut table = Table::new(&name);
        if let Some(collation) = non_empty(row, "collation_name") {
            table.charset = collation.split('_').next().map(str::to_string);
            table.collation = Some(collation);
        }
        table.comment = non_empty(row, "comment");
        loaded.insert(name, table);
    }

    for row in columns {
        let Some(table) = text(row, "table_name").and_then(|t| loaded.get_mut(&t)) else { continue };
        let native = parse_native_type(&text(row, "column_type").unwrap_or_default())?;
        let mut column = column_spec(&native)?.into_column(text(row, "name").unwrap_or_default());
        let settings = &mut column.settings;
        settings.nullable = text(row, "nullable").as_deref() == Some("YES");
        settings.autoincrement = text(row, "extra").is_some_and(|e| e.to_lowercase().contains("auto_increment"));
        settings.default = match text(row, "default_value") {
            // MariaDB reports quoted literals and a literal NULL
            Some(raw) if raw.starts_with('\'') || raw.eq_ignore_ascii_case("null") => {
                parse_sql_default(&raw, column.column_type)
            }
            Some(raw) => Some(parse_mysql_default(&raw, column.column_type)),
            None => None,
        };
        settings.charset = text(row, "charset").filter(|c| Some(c) != table.charset.as_ref());
        settings.collation = text(row, "collation_name").filter(|c| Some(c) != table.collation.as_ref());
        settings.comment = non_empty(row, "comment");
        table.columns.push(column);
    }

    for row in foreign_keys {
        let Some(table) = text(row, "table_name").and_then(|t| loaded.get_mut(&t)) else { continue };
        let name = text(row, "name").unwrap_or_default();
        let column = text(row, "column_name").unwrap_or_default();
        let referenced = text(row, "referenced_column").unwrap_or_default();
        match table.foreign_keys.iter_mut().find(|f| f.name == name) {
            Some(existing) => {
                existing.columns.push(column);
                existing.referenced_columns.push(referenced);
            }
            None => table.foreign_keys.push(
                ForeignKey::new([column], text(row, "referenced_table").unwrap_or_default())
                    .references([referenced])
                    .named(name)
                    .on_delete(action(row, "on_delete")?)
                    .on_update(action(row, "on_update")?),
            ),
        }
    }

    for row in statistics {
        let Some(table) = text(row, "table_name").and_then(|t| loaded.get_mut(&t)) else { continue };
        let name = text(row, "name").unwrap_or_default();
        let column_name = text(row, "column_name").unwrap_or_default();
        if name == "PRIMARY" {
            table.primary.push(column_name);
            continue;
        }
        // implicit index backing a foreign key
        if table.foreign_keys.iter().any(|f| f.name == name) {
            continue;
        }
        let mut column = IndexColumn::new(column_name);
        if text(row, "sort_order").as_deref() == Some("D") {
            column = column.desc();
        }
        if let Some(length) = number(row, "sub_part") {
            column = column.length(length as u32);
        }
        match table.indexes.iter_mut().find(|i| i.name == name) {
            Some(index) => index.columns.push(column),
            None => {
                let index_type = text(row, "index_type").unwrap_or_default().to_uppercase();
                let kind = if index_type == "FULLTEXT" {
                    IndexType::Fulltext
                } else if number(row, "non_unique") == Some(0) {
                    IndexType::Unique
                } else {
                    IndexType::Normal
                };
                let method = if index_type == "HASH" { IndexMethod::Hash } else { IndexMethod::Default };
                table
                    .indexes
                    .push(Index::new([column]).named(name).kind(kind).method(method));
            }
        }
    }

    let mut structure = Structure::new();
    for (_, table) in loaded {
        structure.add_table(table);
    }
    Ok(structure)
}

fn action(row: &Row, key: &str) -> PhoenixResult<ForeignKeyAction> {
    match text(row, key) {
        Some(a) if !a.eq_ignore_ascii_case("NO ACTION") => a.parse(),
        _ => Ok(ForeignKeyAction::Default),
    }
}
