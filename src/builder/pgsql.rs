use super::{extended_primary, BuildContext, Dialect, QueryBuilder};
use crate::error::PhoenixResult;
use crate::schema::{Column, ColumnType, Index, IndexMethod, IndexType, Order};
use crate::table::{CopyMode, Operation, TableChange};

/// PostgreSQL builder.
///
/// Enums become `varchar` columns guarded by a `CHECK`, sets become `varchar`
/// arrays, and `FULLTEXT` indexes are created as plain indexes.
pub struct PgsqlQueryBuilder<'a> {
    context: BuildContext<'a>,
}

impl<'a> PgsqlQueryBuilder<'a> {
    pub fn new(context: BuildContext<'a>) -> Self {
        Self { context }
    }

    fn native_type(&self, column: &Column, serial: bool) -> String {
        let settings = &column.settings;
        let length = |default: u32| settings.length.unwrap_or(default);
        let autoincrement = serial && settings.autoincrement;
        match column.column_type {
            ColumnType::TinyInteger | ColumnType::SmallInteger if autoincrement => "smallserial".into(),
            ColumnType::MediumInteger | ColumnType::Integer if autoincrement => "serial".into(),
            ColumnType::BigInteger if autoincrement => "bigserial".into(),
            ColumnType::TinyInteger | ColumnType::SmallInteger => "int2".into(),
            ColumnType::MediumInteger | ColumnType::Integer => "int4".into(),
            ColumnType::BigInteger => "int8".into(),
            ColumnType::Boolean => "bool".into(),
            ColumnType::String | ColumnType::Enum => format!("varchar({})", length(255)),
            ColumnType::Set => format!("varchar({})[]", length(255)),
            ColumnType::Char => format!("char({})", length(255)),
            ColumnType::Text | ColumnType::TinyText | ColumnType::MediumText | ColumnType::LongText => {
                "text".into()
            }
            ColumnType::Json => "json".into(),
            ColumnType::Uuid => "uuid".into(),
            ColumnType::Decimal | ColumnType::Numeric => {
                format!("numeric({},{})", length(10), settings.decimals.unwrap_or(0))
            }
            ColumnType::Float => "float4".into(),
            ColumnType::Double => "float8".into(),
            ColumnType::Date => "date".into(),
            ColumnType::Time => "time".into(),
            ColumnType::DateTime | ColumnType::Timestamp => "timestamp(6)".into(),
            ColumnType::Year => "numeric(4)".into(),
            ColumnType::Binary
            | ColumnType::VarBinary
            | ColumnType::Blob
            | ColumnType::TinyBlob
            | ColumnType::MediumBlob
            | ColumnType::LongBlob => "bytea".into(),
            ColumnType::Bit => format!("bit({})", length(32)),
            ColumnType::Point => "point".into(),
            ColumnType::Line => "line".into(),
            ColumnType::Polygon => "polygon".into(),
        }
    }

    fn enum_check(&self, column: &Column) -> Option<String> {
        (column.column_type == ColumnType::Enum).then(|| {
            let values: Vec<String> = column.settings.values.iter().map(|v| self.escape_string(v)).collect();
            format!(
                "CHECK ({} IN ({}))",
                self.quote_identifier(&column.name),
                values.join(",")
            )
        })
    }

    fn column_definition(&self, column: &Column) -> String {
        let settings = &column.settings;
        let mut sql = format!(
            "{} {}",
            self.quote_identifier(&column.name),
            self.native_type(column, true)
        );
        if let Some(check) = self.enum_check(column) {
            sql.push(' ');
            sql.push_str(&check);
        }
        if !settings.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &settings.default
            && !settings.autoincrement
        {
            sql.push_str(" DEFAULT ");
            sql.push_str(&self.default_literal(default));
        }
        sql
    }

    fn primary_constraint(&self, table: &str) -> String {
        self.quote_identifier(&format!("{table}_pkey"))
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
        let method = match index.method {
            IndexMethod::Default => String::new(),
            other => format!("USING {} ", other.keyword()),
        };
        format!(
            "CREATE {unique}INDEX {} ON {} {method}({});",
            self.quote_identifier(&index.name),
            self.quote_identifier(table),
            columns.join(",")
        )
    }

    fn comments(&self, change: &TableChange, columns: &[&Column]) -> Vec<String> {
        let table = self.quote_identifier(change.name());
        let mut statements = Vec::new();
        if let Some(comment) = change.comment() {
            statements.push(format!("COMMENT ON TABLE {table} IS {};", self.escape_string(comment)));
        }
        for column in columns {
            if let Some(comment) = &column.settings.comment {
                statements.push(format!(
                    "COMMENT ON COLUMN {table}.{} IS {};",
                    self.quote_identifier(&column.name),
                    self.escape_string(comment)
                ));
            }
        }
        statements
    }

    /// Name PostgreSQL gives the inline `CHECK` of an enum column.
    fn check_constraint(&self, table: &str, column: &str) -> String {
        self.quote_identifier(&format!("{table}_{column}_check"))
    }

    /// `ALTER TABLE` actions bringing a column to `column`'s definition.
    ///
    /// A renamed column keeps the check constraint named after `old_name`;
    /// it is dropped and an enum target gets a fresh one.
    fn change_actions(&self, table: &str, old_name: &str, column: &Column) -> Vec<String> {
        let name = self.quote_identifier(&column.name);
        let mut actions = vec![
            format!("DROP CONSTRAINT IF EXISTS {}", self.check_constraint(table, old_name)),
            format!("ALTER COLUMN {name} TYPE {}", self.native_type(column, false)),
        ];
        if column.settings.nullable {
            actions.push(format!("ALTER COLUMN {name} DROP NOT NULL"));
        } else {
            actions.push(format!("ALTER COLUMN {name} SET NOT NULL"));
        }
        match &column.settings.default {
            Some(default) => actions.push(format!(
                "ALTER COLUMN {name} SET DEFAULT {}",
                self.default_literal(default)
            )),
            None if !column.settings.autoincrement => {
                actions.push(format!("ALTER COLUMN {name} DROP DEFAULT"))
            }
            None => {}
        }
        if let Some(check) = self.enum_check(column) {
            actions.push(format!(
                "ADD CONSTRAINT {} {check}",
                self.check_constraint(table, &column.name)
            ));
        }
        actions
    }
}

impl QueryBuilder for PgsqlQueryBuilder<'_> {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn bool_literal(&self, value: bool) -> String {
        if value { "TRUE".to_string() } else { "FALSE".to_string() }
    }

    fn create_table(&self, change: &TableChange) -> PhoenixResult<Vec<String>> {
        let mut parts: Vec<String> = change
            .columns_to_add()
            .iter()
            .map(|c| self.column_definition(c))
            .collect();
        if !change.primary_to_add().is_empty() {
            parts.push(format!(
                "CONSTRAINT {} PRIMARY KEY ({})",
                self.primary_constraint(change.name()),
                self.quote_list(change.primary_to_add())
            ));
        }
        parts.extend(change.foreign_keys_to_add().iter().map(|f| self.foreign_key_definition(f)));

        let mut statements = vec![format!(
            "CREATE TABLE {} ({});",
            self.quote_identifier(change.name()),
            parts.join(",")
        )];
        statements.extend(change.indexes_to_add().iter().map(|i| self.create_index(change.name(), i)));
        let columns: Vec<&Column> = change.columns_to_add().iter().collect();
        statements.extend(self.comments(change, &columns));
        Ok(statements)
    }

    fn alter_table(&self, change: &TableChange) -> PhoenixResult<Vec<String>> {
        let table = self.quote_identifier(change.name());
        let mut statements = Vec::new();

        for name in change.foreign_keys_to_drop() {
            statements.push(format!("ALTER TABLE {table} DROP CONSTRAINT {};", self.quote_identifier(name)));
        }
        for name in change.indexes_to_drop() {
            statements.push(format!("DROP INDEX {};", self.quote_identifier(name)));
        }

        let (drop_primary, primary) = extended_primary(change, self.context.structure);
        let mut parts = Vec::new();
        if drop_primary {
            parts.push(format!("DROP CONSTRAINT {}", self.primary_constraint(change.name())));
        }
        for name in change.columns_to_drop() {
            parts.push(format!("DROP COLUMN {}", self.quote_identifier(name)));
        }
        for column in change.columns_to_add() {
            parts.push(format!("ADD COLUMN {}", self.column_definition(column)));
        }
        if !parts.is_empty() {
            statements.push(format!("ALTER TABLE {table} {};", parts.join(",")));
        }

        let mut actions = Vec::new();
        for (old_name, column) in change.columns_to_change() {
            if *old_name != column.name {
                statements.push(format!(
                    "ALTER TABLE {table} RENAME COLUMN {} TO {};",
                    self.quote_identifier(old_name),
                    self.quote_identifier(&column.name)
                ));
            }
            actions.extend(self.change_actions(change.name(), old_name, column));
        }
        if !actions.is_empty() {
            statements.push(format!("ALTER TABLE {table} {};", actions.join(",")));
        }

        let mut parts = Vec::new();
        if !primary.is_empty() {
            parts.push(format!(
                "ADD CONSTRAINT {} PRIMARY KEY ({})",
                self.primary_constraint(change.name()),
                self.quote_list(&primary)
            ));
        }
        if !parts.is_empty() {
            statements.push(format!("ALTER TABLE {table} {};", parts.join(",")));
        }
        for index in change.indexes_to_add() {
            statements.push(self.create_index(change.name(), index));
        }
        if !change.foreign_keys_to_add().is_empty() {
            let adds: Vec<String> = change
                .foreign_keys_to_add()
                .iter()
                .map(|f| format!("ADD {}", self.foreign_key_definition(f)))
                .collect();
            statements.push(format!("ALTER TABLE {table} {};", adds.join(",")));
        }

        let mut commented: Vec<&Column> = change.columns_to_add().iter().collect();
        commented.extend(change.columns_to_change().iter().map(|(_, c)| c));
        statements.extend(self.comments(change, &commented));
        Ok(statements)
    }

    fn copy_table(&self, change: &TableChange) -> PhoenixResult<Vec<String>> {
        let Operation::Copy { to, mode } = change.operation() else {
            return Ok(Vec::new());
        };
        let from = self.quote_identifier(change.name());
        let to = self.quote_identifier(to);
        let mut statements = Vec::new();
        if matches!(mode, CopyMode::Structure | CopyMode::Both) {
            statements.push(format!("CREATE TABLE {to} (LIKE {from} INCLUDING ALL);"));
        }
        if matches!(mode, CopyMode::Data | CopyMode::Both) {
            statements.push(format!("INSERT INTO {to} SELECT * FROM {from};"));
        }
        Ok(statements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DefaultValue, ForeignKey, ForeignKeyAction};
    use crate::table::MigrationTable;
    use pretty_assertions::assert_eq;

    fn build(table: MigrationTable) -> Vec<String> {
        let change = table.finish().unwrap();
        PgsqlQueryBuilder::new(BuildContext::new()).build(&change).unwrap()
    }

    #[test]
    fn test_create_simple_table() {
        let mut table = MigrationTable::new("simple");
        table
            .add_primary_column(Column::new("id", ColumnType::Integer).autoincrement())
            .unwrap()
            .add_column(Column::new("title", ColumnType::String))
            .unwrap()
            .add_column(Column::new("settings", ColumnType::Json))
            .unwrap()
            .set_charset("utf8")
            .create()
            .unwrap();

        assert_eq!(
            build(table),
            vec![
                "CREATE TABLE \"simple\" (\"id\" serial NOT NULL,\"title\" varchar(255) NOT NULL,\"settings\" json NOT NULL,CONSTRAINT \"simple_pkey\" PRIMARY KEY (\"id\"));"
            ]
        );
    }

    #[test]
    fn test_create_with_enum_index_and_comments() {
        let mut table = MigrationTable::new("tickets");
        table
            .add_column(Column::new("state", ColumnType::Enum).values(["open", "closed"]).default("open"))
            .unwrap()
            .add_column(Column::new("user_id", ColumnType::Integer).comment("owner"))
            .unwrap()
            .add_column(Column::new("done", ColumnType::Boolean).default(DefaultValue::Bool(false)))
            .unwrap()
            .add_index(Index::new(["state"]).method(IndexMethod::Hash))
            .unwrap()
            .add_foreign_key(ForeignKey::new(["user_id"], "users").on_delete(ForeignKeyAction::SetNull))
            .unwrap()
            .set_comment("support tickets")
            .create()
            .unwrap();

        assert_eq!(
            build(table),
            vec![
                "CREATE TABLE \"tickets\" (\
\"state\" varchar(255) CHECK (\"state\" IN ('open','closed')) NOT NULL DEFAULT 'open',\
\"user_id\" int4 NOT NULL,\
\"done\" bool NOT NULL DEFAULT FALSE,\
CONSTRAINT \"tickets_user_id\" FOREIGN KEY (\"user_id\") REFERENCES \"users\" (\"id\") ON DELETE SET NULL);",
                "CREATE INDEX \"idx_tickets_state\" ON \"tickets\" USING HASH (\"state\");",
                "COMMENT ON TABLE \"tickets\" IS 'support tickets';",
                "COMMENT ON COLUMN \"tickets\".\"user_id\" IS 'owner';",
            ]
        );
    }

    #[test]
    fn test_alter_renames_then_changes_column() {
        let mut table = MigrationTable::new("users");
        table
            .change_column("name", Column::new("full_name", ColumnType::String).length(120).nullable())
            .unwrap()
            .add_column(Column::new("age", ColumnType::SmallInteger).nullable())
            .unwrap()
            .drop_index(["name"])
            .add_index(Index::new(["full_name"]).unique())
            .unwrap()
            .save()
            .unwrap();

        assert_eq!(
            build(table),
            vec![
                "DROP INDEX \"idx_users_name\";",
                "ALTER TABLE \"users\" ADD COLUMN \"age\" int2;",
                "ALTER TABLE \"users\" RENAME COLUMN \"name\" TO \"full_name\";",
                "ALTER TABLE \"users\" DROP CONSTRAINT IF EXISTS \"users_name_check\",\
ALTER COLUMN \"full_name\" TYPE varchar(120),\
ALTER COLUMN \"full_name\" DROP NOT NULL,\
ALTER COLUMN \"full_name\" DROP DEFAULT;",
                "CREATE UNIQUE INDEX \"idx_users_full_name\" ON \"users\" (\"full_name\");",
            ]
        );
    }

    #[test]
    fn test_change_to_and_from_enum_replaces_check() {
        let mut table = MigrationTable::new("tickets");
        table
            .change_column("state", Column::new("state", ColumnType::Enum).values(["open", "closed"]).default("open"))
            .unwrap()
            .change_column("kind", Column::new("kind", ColumnType::String).length(20))
            .unwrap()
            .save()
            .unwrap();

        assert_eq!(
            build(table),
            vec![
                "ALTER TABLE \"tickets\" DROP CONSTRAINT IF EXISTS \"tickets_state_check\",\
ALTER COLUMN \"state\" TYPE varchar(255),\
ALTER COLUMN \"state\" SET NOT NULL,\
ALTER COLUMN \"state\" SET DEFAULT 'open',\
ADD CONSTRAINT \"tickets_state_check\" CHECK (\"state\" IN ('open','closed')),\
DROP CONSTRAINT IF EXISTS \"tickets_kind_check\",\
ALTER COLUMN \"kind\" TYPE varchar(20),\
ALTER COLUMN \"kind\" SET NOT NULL,\
ALTER COLUMN \"kind\" DROP DEFAULT;",
            ]
        );
    }

    #[test]
    fn test_primary_key_replacement() {
        let mut table = MigrationTable::new("pairs");
        table.drop_primary_key().add_primary(["a", "b"]).save().unwrap();
        assert_eq!(
            build(table),
            vec![
                "ALTER TABLE \"pairs\" DROP CONSTRAINT \"pairs_pkey\";",
                "ALTER TABLE \"pairs\" ADD CONSTRAINT \"pairs_pkey\" PRIMARY KEY (\"a\",\"b\");",
            ]
        );
    }

    #[test]
    fn test_copy_and_rename() {
        let mut copy = MigrationTable::new("a");
        copy.copy("b", CopyMode::Structure).unwrap();
        assert_eq!(build(copy), vec!["CREATE TABLE \"b\" (LIKE \"a\" INCLUDING ALL);"]);

        let mut rename = MigrationTable::new("a");
        rename.rename("b").unwrap();
        assert_eq!(build(rename), vec!["ALTER TABLE \"a\" RENAME TO \"b\";"]);
    }
}
