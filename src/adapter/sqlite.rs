use std::collections::BTreeMap;

use serde_json::Value;

use super::native_type::{column_spec, foreign_key_names, parse_native_type, parse_sql_default};
use super::{number, text, Adapter, Connection, Row};
use crate::builder::{BuildContext, Dialect};
use crate::error::PhoenixResult;
use crate::schema::{ForeignKey, ForeignKeyAction, Index, IndexColumn, IndexType, Structure, Table};

/// SQLite adapter, introspecting through `sqlite_master` and `PRAGMA` calls.
pub struct SqliteAdapter {
    connection: Connection,
}

impl SqliteAdapter {
    pub fn connect(url: &str) -> PhoenixResult<Self> {
        let mut connection = Connection::open(url)?;
        // rebuilds rename the old table; child tables must keep referencing the original name
        connection.execute("PRAGMA foreign_keys = OFF")?;
        Ok(Self { connection })
    }

    /// Private in-memory database, gone when the adapter is dropped.
    pub fn memory() -> PhoenixResult<Self> {
        Self::connect("sqlite::memory:")
    }

    pub fn close(self) -> PhoenixResult<()> {
        self.connection.close()
    }

    fn pragma(&mut self, pragma: &str, target: &str) -> PhoenixResult<Vec<Row>> {
        let sql = format!("PRAGMA {pragma}(\"{}\")", target.replace('"', "\"\""));
        self.connection.fetch_all(&sql)
    }

    fn load_table(&mut self, name: &str, create_sql: &str) -> PhoenixResult<Table> {
        let mut table = Table::new(name);

        let mut primary: Vec<(i64, String)> = Vec::new();
        for row in self.pragma("table_info", name)? {
            let column_name = text(&row, "name").unwrap_or_default();
            let declared = text(&row, "type").filter(|t| !t.is_empty()).unwrap_or_else(|| "blob".into());
            let mut column = column_spec(&parse_native_type(&declared)?)?.into_column(&column_name);
            column.settings.nullable = number(&row, "notnull") == Some(0);
            if let Some(raw) = text(&row, "dflt_value") {
                column.settings.default = parse_sql_default(&raw, column.column_type);
            }
            let position = number(&row, "pk").unwrap_or(0);
            if position > 0 {
                primary.push((position, column_name));
            }
            table.columns.push(column);
        }
        primary.sort();
        table.primary = primary.into_iter().map(|(_, name)| name).collect();

        if table.primary.len() == 1 && create_sql.to_uppercase().contains("AUTOINCREMENT") {
            let key = table.primary[0].clone();
            if let Some(column) = table.columns.iter_mut().find(|c| c.name == key) {
                column.settings.autoincrement = true;
            }
        }

        for row in self.pragma("index_list", name)? {
            let Some(index_name) = text(&row, "name") else { continue };
            let origin = text(&row, "origin");
            if index_name.starts_with("sqlite_autoindex") || origin.is_some_and(|o| o != "c") {
                continue;
            }
            let mut parts: Vec<(i64, IndexColumn)> = Vec::new();
            for part in self.pragma("index_xinfo", &index_name)? {
                if number(&part, "key") != Some(1) {
                    continue;
                }
                let Some(column) = text(&part, "name") else { continue };
                let column = match number(&part, "desc") {
                    Some(1) => IndexColumn::new(column).desc(),
                    _ => IndexColumn::new(column),
                };
                parts.push((number(&part, "seqno").unwrap_or(0), column));
            }
            parts.sort_by_key(|(seq, _)| *seq);
            let kind = if number(&row, "unique") == Some(1) { IndexType::Unique } else { IndexType::Normal };
            table.indexes.push(
                Index::new(parts.into_iter().map(|(_, c)| c))
                    .named(index_name)
                    .kind(kind),
            );
        }
        table.indexes.sort_by(|a, b| a.name.cmp(&b.name));

        let named = foreign_key_names(create_sql);
        let mut groups: BTreeMap<i64, Vec<Row>> = BTreeMap::new();
        for row in self.pragma("foreign_key_list", name)? {
            groups.entry(number(&row, "id").unwrap_or(0)).or_default().push(row);
        }
        for (_, mut rows) in groups {
            rows.sort_by_key(|r| number(r, "seq").unwrap_or(0));
            let columns: Vec<String> = rows.iter().filter_map(|r| text(r, "from")).collect();
            let referenced: Vec<String> = rows
                .iter()
                .map(|r| text(r, "to").unwrap_or_else(|| "id".into()))
                .collect();
            let first = &rows[0];
            let fk_name = named
                .iter()
                .find(|(_, cols)| *cols == columns)
                .map(|(n, _)| n.clone())
                .unwrap_or_else(|| ForeignKey::default_name(name, &columns));
            table.foreign_keys.push(
                ForeignKey::new(columns, text(first, "table").unwrap_or_default())
                    .references(referenced)
                    .named(fk_name)
                    .on_delete(action(first, "on_delete")?)
                    .on_update(action(first, "on_update")?),
            );
        }

        Ok(table)
    }
}

/// `NO ACTION` is SQLite's default and reads back as such.
fn action(row: &Row, key: &str) -> PhoenixResult<ForeignKeyAction> {
    match text(row, key) {
        Some(a) if !a.eq_ignore_ascii_case("NO ACTION") => a.parse(),
        _ => Ok(ForeignKeyAction::Default),
    }
}

impl Adapter for SqliteAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute(&mut self, sql: &str) -> PhoenixResult<u64> {
        self.connection.execute(sql).map(|(affected, _)| affected)
    }

    fn fetch_all(&mut self, sql: &str) -> PhoenixResult<Vec<Row>> {
        self.connection.fetch_all(sql)
    }

    /// The `Any` driver reports no last-insert-id for SQLite; the rowid is read back.
    fn insert(&mut self, table: &str, values: &[(String, Value)]) -> PhoenixResult<Option<i64>> {
        let sql = self.query_builder(BuildContext::new()).insert(table, values);
        self.connection.execute(&sql)?;
        let rows = self.connection.fetch_all("SELECT last_insert_rowid() AS id")?;
        Ok(rows.first().and_then(|row| number(row, "id")).filter(|id| *id > 0))
    }

    fn load_structure(&mut self) -> PhoenixResult<Structure> {
        let tables = self.connection.fetch_all(
            "SELECT name, sql FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let mut structure = Structure::new();
        for row in tables {
            let (Some(name), sql) = (text(&row, "name"), text(&row, "sql").unwrap_or_default()) else {
                continue;
            };
            structure.add_table(self.load_table(&name, &sql)?);
        }
        Ok(structure)
    }
}
