//! Schema snapshots and change replay.

use indexmap::IndexMap;

use super::{Column, Position, Table};
use crate::error::{PhoenixError, PhoenixResult};
use crate::table::{CopyMode, Operation, TableChange};

/// A named collection of tables: either the live schema or a desired one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Structure {
    tables: IndexMap<String, Table>,
}

impl Structure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: Table) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn with_table(mut self, table: Table) -> Self {
        self.add_table(table);
        self
    }

    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Copy of the snapshot without `table` (e.g. the migration log table).
    pub fn without(&self, table: &str) -> Structure {
        let mut copy = self.clone();
        copy.tables.shift_remove(table);
        copy
    }

    /// Replay a change set onto the snapshot.
    pub fn update(&mut self, change: &TableChange) -> PhoenixResult<()> {
        let name = change.name();
        match change.operation() {
            Operation::Create => {
                if self.has_table(name) {
                    return Err(PhoenixError::illogical(name, "table already exists"));
                }
                self.add_table(change.to_table());
            }
            Operation::Alter => {
                let table = self.require(name)?;
                let altered = table.apply(change)?;
                self.tables.insert(name.to_string(), altered);
            }
            Operation::Drop => {
                self.tables
                    .shift_remove(name)
                    .ok_or_else(|| PhoenixError::TableNotFound(name.to_string()))?;
            }
            Operation::Rename(to) => {
                let (index, _, mut table) = self
                    .tables
                    .shift_remove_full(name)
                    .ok_or_else(|| PhoenixError::TableNotFound(name.to_string()))?;
                table.name = to.clone();
                let (new_index, _) = self.tables.insert_full(to.clone(), table);
                self.tables.move_index(new_index, index.min(self.tables.len() - 1));
                for other in self.tables.values_mut() {
                    for fk in &mut other.foreign_keys {
                        if fk.referenced_table == name {
                            fk.referenced_table = to.clone();
                        }
                    }
                }
            }
            Operation::Copy { to, mode } => {
                let source = self.require(name)?.clone();
                match mode {
                    CopyMode::Structure | CopyMode::Both => {
                        self.add_table(source.copied_as(to));
                    }
                    CopyMode::Data => {
                        self.require(to)?;
                    }
                }
            }
            Operation::Truncate => {
                self.require(name)?;
            }
        }
        Ok(())
    }

    fn require(&self, name: &str) -> PhoenixResult<&Table> {
        self.get_table(name)
            .ok_or_else(|| PhoenixError::TableNotFound(name.to_string()))
    }
}

/// Index name used for the copy of `index_name` when `from` is copied to `to`.
pub fn copied_index_name(from: &str, to: &str, index_name: &str) -> String {
    if index_name.contains(from) {
        index_name.replacen(from, to, 1)
    } else {
        format!("{to}_{index_name}")
    }
}

impl Table {
    /// Definition of this table after an `ALTER` change set.
    pub fn apply(&self, change: &TableChange) -> PhoenixResult<Table> {
        let mut table = self.clone();

        if let Some(charset) = change.charset() {
            table.charset = Some(charset.to_string());
        }
        if let Some(collation) = change.collation() {
            table.collation = Some(collation.to_string());
        }
        if let Some(comment) = change.comment() {
            table.comment = Some(comment.to_string());
        }

        if change.drops_primary_key() {
            table.primary.clear();
        }
        table
            .foreign_keys
            .retain(|fk| !change.foreign_keys_to_drop().contains(&fk.name));
        table
            .indexes
            .retain(|index| !change.indexes_to_drop().contains(&index.name));

        for name in change.columns_to_drop() {
            if !table.has_column(name) {
                return Err(PhoenixError::column_not_found(&table.name, name));
            }
            table.columns.retain(|c| c.name != *name);
            table.primary.retain(|c| c != name);
            for index in &mut table.indexes {
                index.columns.retain(|c| c.name != *name);
            }
            table.indexes.retain(|index| !index.columns.is_empty());
            table.foreign_keys.retain(|fk| !fk.columns.contains(name));
        }

        for column in change.columns_to_add() {
            if table.has_column(&column.name) {
                return Err(PhoenixError::illogical(
                    &table.name,
                    format!("column '{}' already exists", column.name),
                ));
            }
            table.place_column(column, None);
        }

        for (old_name, column) in change.columns_to_change() {
            let at = table
                .columns
                .iter()
                .position(|c| c.name == *old_name)
                .ok_or_else(|| PhoenixError::column_not_found(&table.name, old_name))?;
            table.columns.remove(at);
            table.place_column(column, Some(at));
            if *old_name != column.name {
                table.rename_references(old_name, &column.name);
            }
        }

        for name in change.primary_to_add() {
            if !table.primary.contains(name) {
                table.primary.push(name.clone());
            }
        }
        table.indexes.extend(change.indexes_to_add().iter().cloned());
        table
            .foreign_keys
            .extend(change.foreign_keys_to_add().iter().cloned());

        Ok(table)
    }

    /// Insert `column` honoring its position hint, else at `fallback` or the end.
    fn place_column(&mut self, column: &Column, fallback: Option<usize>) {
        let at = match &column.settings.position {
            Some(Position::First) => 0,
            Some(Position::After(after)) => self
                .columns
                .iter()
                .position(|c| c.name == *after)
                .map(|i| i + 1)
                .unwrap_or(self.columns.len()),
            None => fallback.unwrap_or(self.columns.len()),
        };
        self.columns.insert(at.min(self.columns.len()), column.without_position());
    }

    fn rename_references(&mut self, old_name: &str, new_name: &str) {
        for name in &mut self.primary {
            if name == old_name {
                *name = new_name.to_string();
            }
        }
        for index in &mut self.indexes {
            for column in &mut index.columns {
                if column.name == old_name {
                    column.name = new_name.to_string();
                }
            }
        }
        for fk in &mut self.foreign_keys {
            for column in &mut fk.columns {
                if column == old_name {
                    *column = new_name.to_string();
                }
            }
        }
    }

    fn copied_as(&self, name: &str) -> Table {
        let mut table = self.clone();
        table.name = name.to_string();
        for index in &mut table.indexes {
            index.name = copied_index_name(&self.name, name, &index.name);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnType, ForeignKey, Index};
    use crate::table::MigrationTable;

    fn users() -> Table {
        Table::new("users")
            .column(Column::new("id", ColumnType::Integer).autoincrement())
            .column(Column::new("name", ColumnType::String))
            .column(Column::new("email", ColumnType::String))
            .primary(["id"])
            .index(Index::new(["email"]).unique())
    }

    #[test]
    fn test_update_alter_adds_changes_and_drops() {
        let mut structure = Structure::new().with_table(users());

        let mut table = MigrationTable::new("users");
        table
            .add_column(Column::new("age", ColumnType::Integer).nullable().after("id"))
            .unwrap()
            .change_column("name", Column::new("full_name", ColumnType::String).length(100))
            .unwrap()
            .drop_column("email")
            .save()
            .unwrap();
        structure.update(&table.finish().unwrap()).unwrap();

        let users = structure.get_table("users").unwrap();
        assert_eq!(users.column_names(), vec!["id", "age", "full_name"]);
        assert_eq!(users.get_column("full_name").unwrap().settings.length, Some(100));
        // the unique index on email went away with its column
        assert!(users.indexes.is_empty());
    }

    #[test]
    fn test_update_rename_keeps_position_and_references() {
        let posts = Table::new("posts")
            .column(Column::new("user_id", ColumnType::Integer))
            .foreign_key(ForeignKey::new(["user_id"], "users"));
        let mut structure = Structure::new().with_table(users()).with_table(posts);

        let mut table = MigrationTable::new("users");
        table.rename("members").unwrap();
        structure.update(&table.finish().unwrap()).unwrap();

        assert_eq!(structure.table_names(), vec!["members", "posts"]);
        let fk = &structure.get_table("posts").unwrap().foreign_keys[0];
        assert_eq!(fk.referenced_table, "members");
    }

    #[test]
    fn test_update_copy_structure_renames_indexes() {
        let mut structure = Structure::new().with_table(users());

        let mut table = MigrationTable::new("users");
        table.copy("users_backup", CopyMode::Structure).unwrap();
        structure.update(&table.finish().unwrap()).unwrap();

        let copy = structure.get_table("users_backup").unwrap();
        assert_eq!(copy.indexes[0].name, "idx_users_backup_email");
        assert_eq!(copy.column_names(), vec!["id", "name", "email"]);
    }

    #[test]
    fn test_update_drop_unknown_table_fails() {
        let mut structure = Structure::new();
        let mut table = MigrationTable::new("ghost");
        table.drop().unwrap();
        assert!(matches!(
            structure.update(&table.finish().unwrap()),
            Err(PhoenixError::TableNotFound(_))
        ));
    }

    #[test]
    fn test_apply_unknown_column_fails() {
        let mut table = MigrationTable::new("users");
        table.drop_column("nope").save().unwrap();
        let change = table.finish().unwrap();
        assert!(matches!(
            users().apply(&change),
            Err(PhoenixError::ColumnNotFound { .. })
        ));
    }
}
