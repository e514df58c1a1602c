use super::{extended_primary, BuildContext, Dialect, QueryBuilder};
use crate::error::PhoenixResult;
use crate::schema::{Column, ColumnType, Index, IndexMethod, IndexType, Order, Position};
use crate::table::{CopyMode, Operation, TableChange};

/// MySQL / MariaDB builder.
pub struct MysqlQueryBuilder<'a> {
    context: BuildContext<'a>,
}

impl<'a> MysqlQueryBuilder<'a> {
    pub fn new(context: BuildContext<'a>) -> Self {
        Self { context }
    }

    fn native_type(&self, column: &Column) -> String {
        let settings = &column.settings;
        let length = |default: u32| settings.length.unwrap_or(default);
        match column.column_type {
            ColumnType::TinyInteger => format!("tinyint({})", length(4)),
            ColumnType::SmallInteger => format!("smallint({})", length(6)),
            ColumnType::MediumInteger => format!("mediumint({})", length(9)),
            ColumnType::Integer => format!("int({})", length(11)),
            ColumnType::BigInteger => format!("bigint({})", length(20)),
            ColumnType::Boolean => "tinyint(1)".to_string(),
            ColumnType::String => format!("varchar({})", length(255)),
            ColumnType::Char => format!("char({})", length(255)),
            ColumnType::Text => "text".to_string(),
            ColumnType::TinyText => "tinytext".to_string(),
            ColumnType::MediumText => "mediumtext".to_string(),
            ColumnType::LongText => "longtext".to_string(),
            ColumnType::Json => "json".to_string(),
            ColumnType::Uuid => "char(36)".to_string(),
            ColumnType::Decimal => format!("decimal({},{})", length(10), settings.decimals.unwrap_or(0)),
            ColumnType::Numeric => format!("numeric({},{})", length(10), settings.decimals.unwrap_or(0)),
            ColumnType::Float | ColumnType::Double => {
                let name = if column.column_type == ColumnType::Float { "float" } else { "double" };
                match (settings.length, settings.decimals) {
                    (Some(l), Some(d)) => format!("{name}({l},{d})"),
                    _ => name.to_string(),
                }
            }
            ColumnType::Date => "date".to_string(),
            ColumnType::Time => "time".to_string(),
            ColumnType::DateTime => "datetime".to_string(),
            ColumnType::Timestamp => "timestamp".to_string(),
            ColumnType::Year => "year".to_string(),
            ColumnType::Binary => format!("binary({})", length(255)),
            ColumnType::VarBinary => format!("varbinary({})", length(255)),
            ColumnType::Blob => "blob".to_string(),
            ColumnType::TinyBlob => "tinyblob".to_string(),
            ColumnType::MediumBlob => "mediumblob".to_string(),
            ColumnType::LongBlob => "longblob".to_string(),
            ColumnType::Bit => format!("bit({})", length(32)),
            ColumnType::Enum | ColumnType::Set => {
                let values: Vec<String> = settings.values.iter().map(|v| self.escape_string(v)).collect();
                format!("{}({})", column.column_type.as_str(), values.join(","))
            }
            ColumnType::Point => "point".to_string(),
            ColumnType::Line => "linestring".to_string(),
            ColumnType::Polygon => "polygon".to_string(),
        }
    }

    fn column_definition(&self, column: &Column, with_position: bool) -> String {
        let settings = &column.settings;
        let mut sql = format!("{} {}", self.quote_identifier(&column.name), self.native_type(column));
        if !settings.signed && column.column_type.is_numeric() {
            sql.push_str(" unsigned");
        }
        if column.column_type.is_textual() {
            if let Some(charset) = &settings.charset {
                sql.push_str(&format!(" CHARACTER SET {charset}"));
            }
            if let Some(collation) = &settings.collation {
                sql.push_str(&format!(" COLLATE {collation}"));
            }
        }
        if !settings.nullable {
            sql.push_str(" NOT NULL");
        } else if settings.default.is_none() {
            sql.push_str(" DEFAULT NULL");
        }
        if let Some(default) = &settings.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&self.default_literal(default));
        }
        if settings.autoincrement {
            sql.push_str(" AUTO_INCREMENT");
        }
        if let Some(comment) = &settings.comment {
            sql.push_str(&format!(" COMMENT {}", self.escape_string(comment)));
        }
        if with_position {
            match &settings.position {
                Some(Position::First) => sql.push_str(" FIRST"),
                Some(Position::After(after)) => {
                    sql.push_str(&format!(" AFTER {}", self.quote_identifier(after)))
                }
                None => {}
            }
        }
        sql
    }

    fn index_definition(&self, index: &Index) -> String {
        let columns: Vec<String> = index
            .columns
            .iter()
            .map(|c| {
                let mut part = self.quote_identifier(&c.name);
                if let Some(length) = c.length {
                    part.push_str(&format!("({length})"));
                }
                if c.order == Order::Desc {
                    part.push_str(" DESC");
                }
                part
            })
            .collect();
        let kind = match index.kind {
            IndexType::Normal => String::new(),
            other => format!("{} ", other.keyword()),
        };
        let mut sql = format!("{kind}INDEX {} ({})", self.quote_identifier(&index.name), columns.join(","));
        if index.method != IndexMethod::Default {
            sql.push_str(" USING ");
            sql.push_str(index.method.keyword());
        }
        sql
    }

    fn table_options(&self, change: &TableChange) -> String {
        let mut sql = String::new();
        if let Some(charset) = change.charset() {
            sql.push_str(&format!(" DEFAULT CHARACTER SET={charset}"));
        }
        if let Some(collation) = change.collation() {
            sql.push_str(&format!(" COLLATE={collation}"));
        }
        if let Some(comment) = change.comment() {
            sql.push_str(&format!(" COMMENT={}", self.escape_string(comment)));
        }
        sql
    }
}

impl QueryBuilder for MysqlQueryBuilder<'_> {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn escape_string(&self, value: &str) -> String {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
    }

    fn create_table(&self, change: &TableChange) -> PhoenixResult<Vec<String>> {
        let mut parts: Vec<String> = change
            .columns_to_add()
            .iter()
            .map(|c| self.column_definition(c, false))
            .collect();
        if !change.primary_to_add().is_empty() {
            parts.push(format!("PRIMARY KEY ({})", self.quote_list(change.primary_to_add())));
        }
        parts.extend(change.indexes_to_add().iter().map(|i| self.index_definition(i)));
        parts.extend(change.foreign_keys_to_add().iter().map(|f| self.foreign_key_definition(f)));

        Ok(vec![format!(
            "CREATE TABLE {} ({}){};",
            self.quote_identifier(change.name()),
            parts.join(","),
            self.table_options(change)
        )])
    }

    fn alter_table(&self, change: &TableChange) -> PhoenixResult<Vec<String>> {
        let table = self.quote_identifier(change.name());
        let mut statements = Vec::new();

        // Indexes backing a foreign key cannot go before the key itself.
        if !change.foreign_keys_to_drop().is_empty() {
            let drops: Vec<String> = change
                .foreign_keys_to_drop()
                .iter()
                .map(|name| format!("DROP FOREIGN KEY {}", self.quote_identifier(name)))
                .collect();
            statements.push(format!("ALTER TABLE {table} {};", drops.join(",")));
        }
        if !change.indexes_to_drop().is_empty() {
            let drops: Vec<String> = change
                .indexes_to_drop()
                .iter()
                .map(|name| format!("DROP INDEX {}", self.quote_identifier(name)))
                .collect();
            statements.push(format!("ALTER TABLE {table} {};", drops.join(",")));
        }

        let (drop_primary, primary) = extended_primary(change, self.context.structure);
        let mut parts = Vec::new();
        if drop_primary {
            parts.push("DROP PRIMARY KEY".to_string());
        }
        for name in change.columns_to_drop() {
            parts.push(format!("DROP COLUMN {}", self.quote_identifier(name)));
        }
        for column in change.columns_to_add() {
            parts.push(format!("ADD COLUMN {}", self.column_definition(column, true)));
        }
        for (old_name, column) in change.columns_to_change() {
            parts.push(format!(
                "CHANGE COLUMN {} {}",
                self.quote_identifier(old_name),
                self.column_definition(column, true)
            ));
        }
        if !primary.is_empty() {
            parts.push(format!("ADD PRIMARY KEY ({})", self.quote_list(&primary)));
        }
        for index in change.indexes_to_add() {
            parts.push(format!("ADD {}", self.index_definition(index)));
        }
        for fk in change.foreign_keys_to_add() {
            parts.push(format!("ADD {}", self.foreign_key_definition(fk)));
        }
        if !parts.is_empty() {
            statements.push(format!("ALTER TABLE {table} {};", parts.join(",")));
        }

        let options = self.table_options(change);
        if !options.is_empty() {
            statements.push(format!("ALTER TABLE {table}{options};"));
        }
        Ok(statements)
    }

    fn rename_table(&self, change: &TableChange, new_name: &str) -> PhoenixResult<Vec<String>> {
        Ok(vec![format!(
            "RENAME TABLE {} TO {};",
            self.quote_identifier(change.name()),
            self.quote_identifier(new_name)
        )])
    }

    fn copy_table(&self, change: &TableChange) -> PhoenixResult<Vec<String>> {
        let Operation::Copy { to, mode } = change.operation() else {
            return Ok(Vec::new());
        };
        let from = self.quote_identifier(change.name());
        let to = self.quote_identifier(to);
        let mut statements = Vec::new();
        if matches!(mode, CopyMode::Structure | CopyMode::Both) {
            statements.push(format!("CREATE TABLE {to} LIKE {from};"));
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
    use crate::schema::{Column, ColumnType, ForeignKey, ForeignKeyAction, Index, Structure, Table};
    use crate::table::MigrationTable;
    use pretty_assertions::assert_eq;

    fn build(table: MigrationTable) -> Vec<String> {
        let change = table.finish().unwrap();
        MysqlQueryBuilder::new(BuildContext::new()).build(&change).unwrap()
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
                "CREATE TABLE `simple` (`id` int(11) NOT NULL AUTO_INCREMENT,`title` varchar(255) NOT NULL,`settings` json NOT NULL,PRIMARY KEY (`id`)) DEFAULT CHARACTER SET=utf8;"
            ]
        );
    }

    #[test]
    fn test_create_with_settings_indexes_and_keys() {
        let mut table = MigrationTable::new("items");
        table
            .add_primary_column(Column::new("id", ColumnType::BigInteger).unsigned().autoincrement())
            .unwrap()
            .add_column(Column::new("price", ColumnType::Decimal).length(8).decimals(2).default(0))
            .unwrap()
            .add_column(Column::new("state", ColumnType::Enum).values(["new", "sold"]).nullable())
            .unwrap()
            .add_column(Column::new("owner_id", ColumnType::Integer).comment("who's"))
            .unwrap()
            .add_index(Index::new(["state"]).unique())
            .unwrap()
            .add_foreign_key(
                ForeignKey::new(["owner_id"], "owners").on_delete(ForeignKeyAction::Cascade),
            )
            .unwrap()
            .set_collation("utf8_general_ci")
            .create()
            .unwrap();

        assert_eq!(
            build(table),
            vec![
                "CREATE TABLE `items` (`id` bigint(20) unsigned NOT NULL AUTO_INCREMENT,\
`price` decimal(8,2) NOT NULL DEFAULT 0,\
`state` enum('new','sold') DEFAULT NULL,\
`owner_id` int(11) NOT NULL COMMENT 'who\\'s',\
PRIMARY KEY (`id`),\
UNIQUE INDEX `idx_items_state` (`state`),\
CONSTRAINT `items_owner_id` FOREIGN KEY (`owner_id`) REFERENCES `owners` (`id`) ON DELETE CASCADE) \
COLLATE=utf8_general_ci;"
            ]
        );
    }

    #[test]
    fn test_alter_orders_drops_first() {
        let mut table = MigrationTable::new("posts");
        table
            .add_column(Column::new("slug", ColumnType::String).length(100).after("title"))
            .unwrap()
            .change_column("body", Column::new("content", ColumnType::Text).nullable())
            .unwrap()
            .drop_column("legacy")
            .drop_index(["legacy"])
            .drop_foreign_key(["author_id"])
            .add_index(Index::new(["slug"]).unique())
            .unwrap()
            .save()
            .unwrap();

        assert_eq!(
            build(table),
            vec![
                "ALTER TABLE `posts` DROP FOREIGN KEY `posts_author_id`;",
                "ALTER TABLE `posts` DROP INDEX `idx_posts_legacy`;",
                "ALTER TABLE `posts` DROP COLUMN `legacy`,\
ADD COLUMN `slug` varchar(100) NOT NULL AFTER `title`,\
CHANGE COLUMN `body` `content` text DEFAULT NULL,\
ADD UNIQUE INDEX `idx_posts_slug` (`slug`);",
            ]
        );
    }

    #[test]
    fn test_adding_primary_column_extends_live_key() {
        let structure = Structure::new().with_table(
            Table::new("pairs")
                .column(Column::new("a", ColumnType::Integer))
                .primary(["a"]),
        );
        let mut table = MigrationTable::new("pairs");
        table
            .add_primary_column(Column::new("b", ColumnType::Integer))
            .unwrap()
            .save()
            .unwrap();
        let change = table.finish().unwrap();

        let sql = MysqlQueryBuilder::new(BuildContext::new().with_structure(&structure))
            .build(&change)
            .unwrap();
        assert_eq!(
            sql,
            vec!["ALTER TABLE `pairs` DROP PRIMARY KEY,ADD COLUMN `b` int(11) NOT NULL,ADD PRIMARY KEY (`a`,`b`);"]
        );
    }

    #[test]
    fn test_table_level_operations() {
        let mut rename = MigrationTable::new("a");
        rename.rename("b").unwrap();
        assert_eq!(build(rename), vec!["RENAME TABLE `a` TO `b`;"]);

        let mut copy = MigrationTable::new("a");
        copy.copy("b", CopyMode::Both).unwrap();
        assert_eq!(
            build(copy),
            vec!["CREATE TABLE `b` LIKE `a`;", "INSERT INTO `b` SELECT * FROM `a`;"]
        );

        let mut drop = MigrationTable::new("a");
        drop.drop().unwrap();
        assert_eq!(build(drop), vec!["DROP TABLE `a`;"]);

        let mut truncate = MigrationTable::new("a");
        truncate.truncate().unwrap();
        assert_eq!(build(truncate), vec!["TRUNCATE TABLE `a`;"]);
    }
}
