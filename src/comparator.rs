//! Structure comparator.
//!
//! Computes the change sets that turn one [`Structure`] into another. Tables
//! only in the source are dropped, tables only in the target are created, and
//! tables in both are altered. Renames are never detected: a table that
//! disappears while another appears is a drop plus a create.

use std::collections::HashSet;

use crate::schema::{Position, Structure, Table};
use crate::table::{Operation, TableChange};

/// Edit script transforming `source` into `target`.
///
/// Drops come first, then creates (referenced tables before the tables
/// pointing at them), then alters. No-op alters are never emitted, so
/// `diff(s, s)` is empty.
pub fn diff(source: &Structure, target: &Structure) -> Vec<TableChange> {
    let mut changes = Vec::new();

    let dropped: Vec<&Table> = source
        .tables()
        .filter(|t| !target.has_table(&t.name))
        .collect();
    for table in dropped.into_iter().rev() {
        changes.push(TableChange::empty(&table.name, Operation::Drop));
    }

    let created: Vec<&Table> = target
        .tables()
        .filter(|t| !source.has_table(&t.name))
        .collect();
    for table in creation_order(created) {
        changes.push(TableChange::create_from(table));
    }

    for table in target.tables() {
        if let Some(existing) = source.get_table(&table.name) {
            let change = diff_table(existing, table);
            if change.change_count() > 0 {
                changes.push(change);
            }
        }
    }

    changes
}

/// `ALTER` change set between two versions of one table.
pub fn diff_table(source: &Table, target: &Table) -> TableChange {
    let mut change = TableChange::empty(&target.name, Operation::Alter);

    if target.charset.is_some() && target.charset != source.charset {
        change.charset = target.charset.clone();
    }
    if target.collation.is_some() && target.collation != source.collation {
        change.collation = target.collation.clone();
    }
    if target.comment.is_some() && target.comment != source.comment {
        change.comment = target.comment.clone();
    }

    if source.primary != target.primary {
        change.drop_primary = !source.primary.is_empty();
        change.primary_to_add = target.primary.clone();
    }

    for column in &source.columns {
        if !target.has_column(&column.name) {
            change.columns_to_drop.push(column.name.clone());
        }
    }

    for (i, column) in target.columns.iter().enumerate() {
        match source.get_column(&column.name) {
            None => {
                let mut added = column.clone();
                added.settings.position = Some(match i {
                    0 => Position::First,
                    _ => Position::After(target.columns[i - 1].name.clone()),
                });
                change.columns_to_add.push(added);
            }
            Some(existing) if !existing.same_definition(column) => {
                change
                    .columns_to_change
                    .push((column.name.clone(), column.without_position()));
            }
            Some(_) => {}
        }
    }

    for index in &source.indexes {
        if target.get_index(&index.name).is_none() {
            change.indexes_to_drop.push(index.name.clone());
        }
    }
    for index in &target.indexes {
        if source.get_index(&index.name).is_none() {
            change.indexes_to_add.push(index.clone());
        }
    }

    for fk in &source.foreign_keys {
        if target.get_foreign_key(&fk.name).is_none() {
            change.foreign_keys_to_drop.push(fk.name.clone());
        }
    }
    for fk in &target.foreign_keys {
        if source.get_foreign_key(&fk.name).is_none() {
            change.foreign_keys_to_add.push(fk.clone());
        }
    }

    change
}

/// Order new tables so that referenced tables are created first. Cycles keep
/// their declaration order.
fn creation_order(mut pending: Vec<&Table>) -> Vec<&Table> {
    let mut ordered: Vec<&Table> = Vec::with_capacity(pending.len());
    while !pending.is_empty() {
        let waiting: HashSet<&str> = pending.iter().map(|t| t.name.as_str()).collect();
        let ready = pending.iter().position(|table| {
            table.foreign_keys.iter().all(|fk| {
                fk.referenced_table == table.name || !waiting.contains(fk.referenced_table.as_str())
            })
        });
        ordered.push(pending.remove(ready.unwrap_or(0)));
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ColumnType, ForeignKey, Index};

    fn users() -> Table {
        Table::new("users")
            .column(Column::new("id", ColumnType::Integer).autoincrement())
            .column(Column::new("name", ColumnType::String))
            .primary(["id"])
    }

    #[test]
    fn test_diff_identical_is_empty() {
        let s = Structure::new().with_table(users()).with_table(
            Table::new("posts")
                .column(Column::new("user_id", ColumnType::Integer))
                .foreign_key(ForeignKey::new(["user_id"], "users"))
                .index(Index::new(["user_id"])),
        );
        assert!(diff(&s, &s).is_empty());
    }

    #[test]
    fn test_diff_drops_before_creates() {
        let source = Structure::new().with_table(Table::new("old").column(Column::new("a", ColumnType::Text)));
        let target = Structure::new().with_table(users());

        let changes = diff(&source, &target);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].operation(), &Operation::Drop);
        assert_eq!(changes[0].name(), "old");
        assert_eq!(changes[1].operation(), &Operation::Create);
        assert_eq!(changes[1].name(), "users");
    }

    #[test]
    fn test_diff_never_detects_renames() {
        let source = Structure::new().with_table(users());
        let mut renamed = users();
        renamed.name = "members".into();
        let target = Structure::new().with_table(renamed);

        let changes = diff(&source, &target);
        let ops: Vec<&Operation> = changes.iter().map(|c| c.operation()).collect();
        assert_eq!(ops, vec![&Operation::Drop, &Operation::Create]);
    }

    #[test]
    fn test_diff_column_change_uses_full_target_definition() {
        let source = Structure::new().with_table(users());
        let target = Structure::new().with_table(
            Table::new("users")
                .column(Column::new("id", ColumnType::Integer).autoincrement())
                .column(Column::new("name", ColumnType::String).length(100).nullable())
                .column(Column::new("age", ColumnType::Integer).default(0))
                .primary(["id"]),
        );

        let changes = diff(&source, &target);
        assert_eq!(changes.len(), 1);
        let change = &changes[0];
        assert_eq!(change.operation(), &Operation::Alter);
        assert_eq!(change.columns_to_change().len(), 1);
        let (old, column) = &change.columns_to_change()[0];
        assert_eq!(old, "name");
        assert_eq!(column.settings.length, Some(100));
        assert!(column.settings.nullable);
        assert_eq!(change.columns_to_add()[0].settings.position, Some(Position::After("name".into())));
        assert!(!change.drops_primary_key());
    }

    #[test]
    fn test_diff_primary_key_change() {
        let source = Structure::new().with_table(users());
        let target = Structure::new().with_table(
            Table::new("users")
                .column(Column::new("id", ColumnType::Integer))
                .column(Column::new("name", ColumnType::String))
                .primary(["id", "name"]),
        );

        let change = &diff(&source, &target)[0];
        assert!(change.drops_primary_key());
        assert_eq!(change.primary_to_add(), ["id".to_string(), "name".to_string()]);
        assert!(change.columns_to_add().is_empty());
    }

    #[test]
    fn test_diff_indexes_and_foreign_keys_by_name() {
        let source = Structure::new().with_table(users().index(Index::new(["name"])));
        let target = Structure::new().with_table(
            users()
                .index(Index::new(["name"]).named("name_lookup"))
                .foreign_key(ForeignKey::new(["id"], "accounts")),
        );

        let change = &diff(&source, &target)[0];
        assert_eq!(change.indexes_to_drop(), ["idx_users_name".to_string()]);
        assert_eq!(change.indexes_to_add()[0].name, "name_lookup");
        assert_eq!(change.foreign_keys_to_add()[0].name, "users_id");
    }

    #[test]
    fn test_creates_referenced_tables_first() {
        let posts = Table::new("posts")
            .column(Column::new("user_id", ColumnType::Integer))
            .foreign_key(ForeignKey::new(["user_id"], "users"));
        let target = Structure::new().with_table(posts).with_table(users());

        let names: Vec<String> = diff(&Structure::new(), &target)
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, vec!["users", "posts"]);
    }
}
