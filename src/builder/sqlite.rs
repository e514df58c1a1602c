//! SQLite builder.
//!
//! SQLite only alters a table in place to rename it or to append a column that
//! can be filled without a value. Everything else is a rebuild:
//!
//! 1. rename the table to `_<table>_old_<YYYYMMDDHHMMSS>`
//! 2. create the table again under its name with the altered definition
//! 3. copy the rows, mapping renamed columns back to their old names
//! 4. drop the renamed table
//! 5. recreate the indexes
//!
//! The rename runs with `legacy_alter_table` on, so foreign keys of other
//! tables keep pointing at the original name. A rebuild needs the live table
//! definition; without one the builder fails with
//! [`PhoenixError::MissingAdapter`].
//!
//! Some types have no SQLite counterpart and do not survive introspection:
//! `json` and `set` are stored as `text`, `uuid` as `char(36)` and an enum as a
//! `varchar` whose `CHECK` is not read back. A table holding such columns
//! always differs from its definition when compared against the live database.

use super::{BuildContext, Dialect, QueryBuilder};
use crate::error::{PhoenixError, PhoenixResult};
use crate::schema::{structure::copied_index_name, Column, ColumnType, Index, IndexType, Order, Table};
use crate::table::{CopyMode, Operation, TableChange};

pub struct SqliteQueryBuilder<'a> {
    context: BuildContext<'a>,
}

impl<'a> SqliteQueryBuilder<'a> {
    pub fn new(context: BuildContext<'a>) -> Self {
        Self { context }
    }

    /// Name the table is moved to during a rebuild.
    pub fn temporary_name(&self, table: &str) -> String {
        format!("_{}_old_{}", table, self.context.timestamp.format("%Y%m%d%H%M%S"))
    }

    fn native_type(&self, column: &Column) -> String {
        let settings = &column.settings;
        let length = |default: u32| settings.length.unwrap_or(default);
        match column.column_type {
            _ if settings.autoincrement => "integer".into(),
            ColumnType::TinyInteger => "tinyint".into(),
            ColumnType::SmallInteger => "smallint".into(),
            ColumnType::MediumInteger => "mediumint".into(),
            ColumnType::Integer => "integer".into(),
            ColumnType::BigInteger => "bigint".into(),
            ColumnType::Boolean => "boolean".into(),
            ColumnType::String | ColumnType::Enum => format!("varchar({})", length(255)),
            ColumnType::Char => format!("char({})", length(255)),
            ColumnType::Uuid => "char(36)".into(),
            ColumnType::Text | ColumnType::Json | ColumnType::Set => "text".into(),
            ColumnType::TinyText => "tinytext".into(),
            ColumnType::MediumText => "mediumtext".into(),
            ColumnType::LongText => "longtext".into(),
            ColumnType::Decimal => format!("decimal({},{})", length(10), settings.decimals.unwrap_or(0)),
            ColumnType::Numeric => format!("numeric({},{})", length(10), settings.decimals.unwrap_or(0)),
            ColumnType::Float => "float".into(),
            ColumnType::Double => "double".into(),
            ColumnType::Date => "date".into(),
            ColumnType::Time => "time".into(),
            ColumnType::DateTime => "datetime".into(),
            ColumnType::Timestamp => "timestamp".into(),
            ColumnType::Year => "year".into(),
            ColumnType::Bit => "bit".into(),
            ColumnType::Binary
            | ColumnType::VarBinary
            | ColumnType::Blob
            | ColumnType::TinyBlob
            | ColumnType::MediumBlob
            | ColumnType::LongBlob => "blob".into(),
            ColumnType::Point | ColumnType::Line | ColumnType::Polygon => "text".into(),
        }
    }

    fn column_definition(&self, column: &Column) -> String {
        let settings = &column.settings;
        let mut sql = format!("{} {}", self.quote_identifier(&column.name), self.native_type(column));
        if settings.autoincrement {
            sql.push_str(" PRIMARY KEY AUTOINCREMENT");
        }
        if column.column_type == ColumnType::Enum {
            let values: Vec<String> = settings.values.iter().map(|v| self.escape_string(v)).collect();
            sql.push_str(&format!(
                " CHECK ({} IN ({}))",
                self.quote_identifier(&column.name),
                values.join(",")
            ));
        }
        if !settings.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &settings.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&self.default_literal(default));
        }
        sql
    }

    fn create_index(&self, table: &str, index: &Index) -> String {
        let columns: Vec<String> = index
            .columns
            .iter()
            .map(|c| match c.order {
                Order::Desc => format!("{} DESC", self.quote_identifier(&c.name)),
                Order::Asc => self.quote_identifier(&c.name),
            })
            .collect();
        let unique = if index.kind == IndexType::Unique { "UNIQUE " } else { "" };
        format!(
            "CREATE {unique}INDEX {} ON {} ({});",
            self.quote_identifier(&index.name),
            self.quote_identifier(table),
            columns.join(",")
        )
    }

    /// `CREATE TABLE` for a full definition, without its indexes.
    fn create_statement(&self, table: &Table) -> String {
        let mut parts: Vec<String> = table.columns.iter().map(|c| self.column_definition(c)).collect();
        let inline_key = table.columns.iter().any(|c| c.settings.autoincrement);
        if !table.primary.is_empty() && !inline_key {
            parts.push(format!("PRIMARY KEY ({})", self.quote_list(&table.primary)));
        }
        parts.extend(table.foreign_keys.iter().map(|f| self.foreign_key_definition(f)));
        format!("CREATE TABLE {} ({});", self.quote_identifier(&table.name), parts.join(","))
    }

    fn create_with_indexes(&self, table: &Table) -> Vec<String> {
        let mut statements = vec![self.create_statement(table)];
        statements.extend(table.indexes.iter().map(|i| self.create_index(&table.name, i)));
        statements
    }

    fn live_table(&self, name: &str) -> PhoenixResult<&'a Table> {
        self.context
            .structure
            .and_then(|s| s.get_table(name))
            .ok_or_else(|| PhoenixError::MissingAdapter { table: name.to_string() })
    }

    /// Changes SQLite applies without a rebuild.
    fn is_simple_alter(change: &TableChange) -> bool {
        change.columns_to_drop().is_empty()
            && change.columns_to_change().is_empty()
            && change.primary_to_add().is_empty()
            && !change.drops_primary_key()
            && change.foreign_keys_to_add().is_empty()
            && change.foreign_keys_to_drop().is_empty()
            && change.columns_to_add().iter().all(|c| {
                !c.settings.autoincrement && (c.settings.nullable || c.settings.default.is_some())
            })
    }

    /// Expression filling a new `NOT NULL` column that has no default.
    ///
    /// An enum takes its first value so the copied rows pass its `CHECK`.
    fn implicit_value(&self, column: &Column) -> String {
        match column.column_type {
            ColumnType::Enum => column
                .settings
                .values
                .first()
                .map_or_else(|| "''".to_string(), |first| self.escape_string(first)),
            ColumnType::Boolean => "0".into(),
            kind if kind.is_numeric() => "0".into(),
            _ => "''".into(),
        }
    }

    fn rebuild(&self, change: &TableChange) -> PhoenixResult<Vec<String>> {
        let live = self.live_table(change.name())?;
        let target = live.apply(change)?;
        let temporary = self.temporary_name(change.name());

        let mut columns = Vec::new();
        let mut sources = Vec::new();
        for column in &target.columns {
            let previous = change
                .columns_to_change()
                .iter()
                .find(|(_, c)| c.name == column.name)
                .map(|(old, _)| old.as_str())
                .or_else(|| {
                    let added = change.columns_to_add().iter().any(|c| c.name == column.name);
                    (!added && live.has_column(&column.name)).then_some(column.name.as_str())
                });
            match previous {
                Some(old) => sources.push(self.quote_identifier(old)),
                None if column.settings.nullable
                    || column.settings.default.is_some()
                    || column.settings.autoincrement =>
                {
                    continue;
                }
                None => sources.push(self.implicit_value(column)),
            }
            columns.push(column.name.clone());
        }

        let mut statements = vec![
            "PRAGMA legacy_alter_table = ON;".to_string(),
            format!(
                "ALTER TABLE {} RENAME TO {};",
                self.quote_identifier(change.name()),
                self.quote_identifier(&temporary)
            ),
            "PRAGMA legacy_alter_table = OFF;".to_string(),
            self.create_statement(&target),
        ];
        if !columns.is_empty() {
            statements.push(format!(
                "INSERT INTO {} ({}) SELECT {} FROM {};",
                self.quote_identifier(change.name()),
                self.quote_list(&columns),
                sources.join(","),
                self.quote_identifier(&temporary)
            ));
        }
        statements.push(format!("DROP TABLE {};", self.quote_identifier(&temporary)));
        statements.extend(target.indexes.iter().map(|i| self.create_index(&target.name, i)));
        Ok(statements)
    }
}

impl QueryBuilder for SqliteQueryBuilder<'_> {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn create_table(&self, change: &TableChange) -> PhoenixResult<Vec<String>> {
        Ok(self.create_with_indexes(&change.to_table()))
    }

    fn alter_table(&self, change: &TableChange) -> PhoenixResult<Vec<String>> {
        if !Self::is_simple_alter(change) {
            return self.rebuild(change);
        }
        let table = self.quote_identifier(change.name());
        let mut statements = Vec::new();
        for name in change.indexes_to_drop() {
            statements.push(format!("DROP INDEX {};", self.quote_identifier(name)));
        }
        for column in change.columns_to_add() {
            statements.push(format!("ALTER TABLE {table} ADD COLUMN {};", self.column_definition(column)));
        }
        for index in change.indexes_to_add() {
            statements.push(self.create_index(change.name(), index));
        }
        Ok(statements)
    }

    fn copy_table(&self, change: &TableChange) -> PhoenixResult<Vec<String>> {
        let Operation::Copy { to, mode } = change.operation() else {
            return Ok(Vec::new());
        };
        let live = self.live_table(change.name())?;
        let mut statements = Vec::new();
        if matches!(mode, CopyMode::Structure | CopyMode::Both) {
            let mut copy = live.clone();
            copy.name = to.clone();
            for index in &mut copy.indexes {
                index.name = copied_index_name(&live.name, to, &index.name);
            }
            statements.extend(self.create_with_indexes(&copy));
        }
        if matches!(mode, CopyMode::Data | CopyMode::Both) {
            let columns: Vec<String> = live.columns.iter().map(|c| c.name.clone()).collect();
            let list = self.quote_list(&columns);
            statements.push(format!(
                "INSERT INTO {} ({list}) SELECT {list} FROM {};",
                self.quote_identifier(to),
                self.quote_identifier(change.name())
            ));
        }
        Ok(statements)
    }

    fn truncate_table(&self, change: &TableChange) -> PhoenixResult<Vec<String>> {
        Ok(vec![format!("DELETE FROM {};", self.quote_identifier(change.name()))])
    }
}
