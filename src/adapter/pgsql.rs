use indexmap::IndexMap;
use serde_json::Value;

use super::native_type::{parse_index_definition, parse_sql_default, pgsql_column_spec};
use super::{non_empty, number, text, Adapter, Connection, Row};
use crate::builder::{BuildContext, Dialect};
use crate::error::PhoenixResult;
use crate::schema::{ForeignKey, ForeignKeyAction, Index, Structure, Table};

// Every column is cast to text so the generic driver decodes catalog types.

const TABLES: &str = "SELECT c.relname::text AS name, obj_description(c.oid, 'pg_class')::text AS comment \
    FROM pg_class c JOIN pg_namespace n ON n.oid = c.relnamespace \
    WHERE c.relkind = 'r' AND n.nspname = current_schema() \
    ORDER BY c.relname";

const COLUMNS: &str = "SELECT c.table_name::text AS table_name, c.column_name::text AS name, \
    c.udt_name::text AS udt_name, c.is_nullable::text AS nullable, c.column_default::text AS default_value, \
    c.character_maximum_length::text AS length, c.numeric_precision::text AS precision, \
    c.numeric_scale::text AS scale, \
    col_description(format('%I.%I', c.table_schema, c.table_name)::regclass::oid, c.ordinal_position::int)::text AS comment \
    FROM information_schema.columns c \
    WHERE c.table_schema = current_schema() \
    ORDER BY c.table_name, c.ordinal_position";

const PRIMARY_KEYS: &str = "SELECT tc.table_name::text AS table_name, kcu.column_name::text AS column_name \
    FROM information_schema.table_constraints tc \
    JOIN information_schema.key_column_usage kcu \
    ON kcu.constraint_name = tc.constraint_name AND kcu.table_schema = tc.table_schema AND kcu.table_name = tc.table_name \
    WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = current_schema() \
    ORDER BY tc.table_name, kcu.ordinal_position";

const INDEXES: &str = "SELECT tablename::text AS table_name, indexname::text AS name, indexdef::text AS definition \
    FROM pg_indexes WHERE schemaname = current_schema() \
    ORDER BY tablename, indexname";

const FOREIGN_KEYS: &str = "SELECT cl.relname::text AS table_name, con.conname::text AS name, \
    ref.relname::text AS referenced_table, \
    array_to_string(ARRAY(SELECT a.attname FROM unnest(con.conkey) WITH ORDINALITY k(attnum, ord) \
        JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum ORDER BY k.ord), ',')::text AS columns, \
    array_to_string(ARRAY(SELECT a.attname FROM unnest(con.confkey) WITH ORDINALITY k(attnum, ord) \
        JOIN pg_attribute a ON a.attrelid = con.confrelid AND a.attnum = k.attnum ORDER BY k.ord), ',')::text AS referenced_columns, \
    con.confupdtype::text AS on_update, con.confdeltype::text AS on_delete \
    FROM pg_constraint con \
    JOIN pg_class cl ON cl.oid = con.conrelid \
    JOIN pg_class ref ON ref.oid = con.confrelid \
    JOIN pg_namespace n ON n.oid = cl.relnamespace \
    WHERE con.contype = 'f' AND n.nspname = current_schema() \
    ORDER BY cl.relname, con.conname";

/// PostgreSQL adapter. Introspection is limited to `current_schema()`.
pub struct PgsqlAdapter {
    connection: Connection,
}

impl PgsqlAdapter {
    pub fn connect(url: &str) -> PhoenixResult<Self> {
        Ok(Self {
            connection: Connection::open(url)?,
        })
    }

    pub fn close(self) -> PhoenixResult<()> {
        self.connection.close()
    }

    fn has_id_column(&mut self, table: &str) -> PhoenixResult<bool> {
        let sql = format!(
            "SELECT COUNT(*) AS n FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = '{}' AND column_name = 'id'",
            table.replace('\'', "''")
        );
        let rows = self.connection.fetch_all(&sql)?;
        Ok(rows.first().and_then(|row| number(row, "n")).unwrap_or(0) > 0)
    }
}

impl Adapter for PgsqlAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn execute(&mut self, sql: &str) -> PhoenixResult<u64> {
        self.connection.execute(sql).map(|(affected, _)| affected)
    }

    fn fetch_all(&mut self, sql: &str) -> PhoenixResult<Vec<Row>> {
        self.connection.fetch_all(sql)
    }

    /// PostgreSQL has no last-insert-id; an `id` column comes back via `RETURNING`.
    fn insert(&mut self, table: &str, values: &[(String, Value)]) -> PhoenixResult<Option<i64>> {
        let sql = self.query_builder(BuildContext::new()).insert(table, values);
        if !self.has_id_column(table)? {
            self.connection.execute(&sql)?;
            return Ok(None);
        }
        let sql = format!("{} RETURNING CAST(id AS bigint) AS id", sql.trim_end_matches(';'));
        let rows = self.connection.fetch_all(&sql)?;
        Ok(rows.first().and_then(|row| number(row, "id")))
    }

    fn load_structure(&mut self) -> PhoenixResult<Structure> {
        let tables = self.connection.fetch_all(TABLES)?;
        let columns = self.connection.fetch_all(COLUMNS)?;
        let primary_keys = self.connection.fetch_all(PRIMARY_KEYS)?;
        let indexes = self.connection.fetch_all(INDEXES)?;
        let foreign_keys = self.connection.fetch_all(FOREIGN_KEYS)?;
        assemble(&tables, &columns, &primary_keys, &indexes, &foreign_keys)
    }
}

fn assemble(
    tables: &[Row],
    columns: &[Row],
    primary_keys: &[Row],
    indexes: &[Row],
    foreign_keys: &[Row],
) -> PhoenixResult<Structure> {
    let mut loaded: IndexMap<String, Table> = IndexMap::new();
    for row in tables {
        let Some(name) = text(row, "name") else { continue };
        let mut table = Table::new(&name);
        table.comment = non_empty(row, "comment");
        loaded.insert(name, table);
    }

    let size = |row: &Row, key: &str| number(row, key).map(|n| n as u32);
    for row in columns {
        let Some(table) = text(row, "table_name").and_then(|t| loaded.get_mut(&t)) else { continue };
        let spec = pgsql_column_spec(
            &text(row, "udt_name").unwrap_or_default(),
            size(row, "length"),
            size(row, "precision"),
            size(row, "scale"),
        )?;
        let mut column = spec.into_column(text(row, "name").unwrap_or_default());
        column.settings.nullable = text(row, "nullable").as_deref() == Some("YES");
        if let Some(raw) = text(row, "default_value") {
            if raw.starts_with("nextval(") {
                column.settings.autoincrement = true;
            } else {
                column.settings.default = parse_sql_default(&raw, column.column_type);
            }
        }
        column.settings.comment = non_empty(row, "comment");
        table.columns.push(column);
    }

    for row in primary_keys {
        if let Some(table) = text(row, "table_name").and_then(|t| loaded.get_mut(&t)) {
            table.primary.extend(text(row, "column_name"));
        }
    }

    for row in indexes {
        let Some(table) = text(row, "table_name").and_then(|t| loaded.get_mut(&t)) else { continue };
        let name = text(row, "name").unwrap_or_default();
        if name == format!("{}_pkey", table.name) {
            continue;
        }
        let definition = parse_index_definition(&text(row, "definition").unwrap_or_default())?;
        table.indexes.push(Index {
            name: definition.name,
            columns: definition.columns,
            kind: definition.kind,
            method: definition.method,
        });
    }

    let list = |row: &Row, key: &str| -> Vec<String> {
        text(row, key)
            .map(|s| s.split(',').map(str::to_string).collect())
            .unwrap_or_default()
    };
    for row in foreign_keys {
        let Some(table) = text(row, "table_name").and_then(|t| loaded.get_mut(&t)) else { continue };
        table.foreign_keys.push(
            ForeignKey::new(list(row, "columns"), text(row, "referenced_table").unwrap_or_default())
                .references(list(row, "referenced_columns"))
                .named(text(row, "name").unwrap_or_default())
                .on_delete(action(row, "on_delete"))
                .on_update(action(row, "on_update")),
        );
    }

    let mut structure = Structure::new();
    for (_, table) in loaded {
        structure.add_table(table);
    }
    Ok(structure)
}

/// `pg_constraint` action codes; `a` (no action) and `d` (set default) read as default.
fn action(row: &Row, key: &str) -> ForeignKeyAction {
    match text(row, key).as_deref() {
        Some("c") => ForeignKeyAction::Cascade,
        Some("r") => ForeignKeyAction::Restrict,
        Some("n") => ForeignKeyAction::SetNull,
        _ => ForeignKeyAction::Default,
    }
}
