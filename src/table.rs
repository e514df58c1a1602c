//! Change descriptors.
//!
//! [`MigrationTable`] accumulates the intended changes of one table while a
//! migration (or the comparator) describes them. Once finalized with
//! [`MigrationTable::finish`] it becomes a [`TableChange`], the read-only
//! value consumed by query builders and by [`Structure::update`].
//!
//! ```
//! use phoenix::schema::{Column, ColumnType, Index};
//! use phoenix::table::{MigrationTable, Operation};
//!
//! let mut table = MigrationTable::new("posts");
//! table
//!     .add_primary_column(Column::new("id", ColumnType::Integer).autoincrement())?
//!     .add_column(Column::new("title", ColumnType::String))?
//!     .add_index(Index::new(["title"]))?
//!     .create()?;
//!
//! let change = table.finish()?;
//! assert_eq!(change.operation(), &Operation::Create);
//! assert_eq!(change.primary_to_add(), ["id".to_string()]);
//! # Ok::<(), phoenix::error::PhoenixError>(())
//! ```
//!
//! [`Structure::update`]: crate::schema::Structure::update

use crate::error::{PhoenixError, PhoenixResult};
use crate::schema::{Column, ForeignKey, Index, Table};

/// What to copy with [`MigrationTable::copy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    Structure,
    Data,
    Both,
}

/// Table-level operation of a change set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Create,
    Alter,
    Drop,
    Rename(String),
    Copy { to: String, mode: CopyMode },
    Truncate,
}

impl Operation {
    fn describe(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Alter => "save",
            Operation::Drop => "drop",
            Operation::Rename(_) => "rename",
            Operation::Copy { .. } => "copy",
            Operation::Truncate => "truncate",
        }
    }
}

/// Mutable description of the changes to one table.
///
/// Sub-changes accumulate in a [`TableChange`] whose operation is only
/// settled by [`MigrationTable::finish`].
#[derive(Debug, Clone)]
pub struct MigrationTable {
    operation: Option<Operation>,
    pending: TableChange,
}

impl MigrationTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            operation: None,
            pending: TableChange::empty(name, Operation::Alter),
        }
    }

    pub fn name(&self) -> &str {
        &self.pending.name
    }

    pub fn operation(&self) -> Option<&Operation> {
        self.operation.as_ref()
    }

    pub fn charset(&self) -> Option<&str> {
        self.pending.charset.as_deref()
    }

    pub fn collation(&self) -> Option<&str> {
        self.pending.collation.as_deref()
    }

    pub fn add_column(&mut self, column: Column) -> PhoenixResult<&mut Self> {
        column.validate()?;
        if self.pending.columns_to_add.iter().any(|c| c.name == column.name) {
            return Err(PhoenixError::illogical(
                &self.pending.name,
                format!("column '{}' is added twice", column.name),
            ));
        }
        self.pending.columns_to_add.push(column);
        Ok(self)
    }

    /// Add a column and make it part of the primary key.
    pub fn add_primary_column(&mut self, column: Column) -> PhoenixResult<&mut Self> {
        let name = column.name.clone();
        self.add_column(column)?;
        self.pending.primary_to_add.push(name);
        Ok(self)
    }

    /// Add existing (or just added) columns to the primary key.
    pub fn add_primary<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pending.primary_to_add.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn drop_primary_key(&mut self) -> &mut Self {
        self.pending.drop_primary = true;
        self
    }

    /// Replace column `old_name` with the full definition `column` (which may rename it).
    pub fn change_column(&mut self, old_name: impl Into<String>, column: Column) -> PhoenixResult<&mut Self> {
        column.validate()?;
        let old_name = old_name.into();
        if self.pending.columns_to_change.iter().any(|(old, _)| *old == old_name) {
            return Err(PhoenixError::illogical(
                &self.pending.name,
                format!("column '{old_name}' is changed twice"),
            ));
        }
        self.pending.columns_to_change.push((old_name, column));
        Ok(self)
    }

    pub fn drop_column(&mut self, name: impl Into<String>) -> &mut Self {
        self.pending.columns_to_drop.push(name.into());
        self
    }

    pub fn add_index(&mut self, index: Index) -> PhoenixResult<&mut Self> {
        if index.columns.is_empty() {
            return Err(PhoenixError::illogical(&self.pending.name, "index without columns"));
        }
        let index = index.with_default_name(&self.pending.name);
        self.pending.indexes_to_add.push(index);
        Ok(self)
    }

    /// Drop the index with the default name derived from `columns`.
    pub fn drop_index<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let name = Index::default_name(&self.pending.name, &columns);
        self.drop_index_by_name(name)
    }

    pub fn drop_index_by_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.pending.indexes_to_drop.push(name.into());
        self
    }

    pub fn add_foreign_key(&mut self, foreign_key: ForeignKey) -> PhoenixResult<&mut Self> {
        let foreign_key = foreign_key.with_default_name(&self.pending.name);
        foreign_key.validate()?;
        self.pending.foreign_keys_to_add.push(foreign_key);
        Ok(self)
    }

    /// Drop the foreign key with the default name derived from `columns`.
    pub fn drop_foreign_key<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let name = ForeignKey::default_name(&self.pending.name, &columns);
        self.drop_foreign_key_by_name(name)
    }

    pub fn drop_foreign_key_by_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.pending.foreign_keys_to_drop.push(name.into());
        self
    }

    pub fn set_charset(&mut self, charset: impl Into<String>) -> &mut Self {
        self.pending.charset = Some(charset.into());
        self
    }

    pub fn set_collation(&mut self, collation: impl Into<String>) -> &mut Self {
        self.pending.collation = Some(collation.into());
        self
    }

    pub fn set_comment(&mut self, comment: impl Into<String>) -> &mut Self {
        self.pending.comment = Some(comment.into());
        self
    }

    pub fn create(&mut self) -> PhoenixResult<&mut Self> {
        if !self.pending.columns_to_drop.is_empty()
            || !self.pending.columns_to_change.is_empty()
            || !self.pending.indexes_to_drop.is_empty()
            || !self.pending.foreign_keys_to_drop.is_empty()
            || self.pending.drop_primary
        {
            return Err(PhoenixError::illogical(
                &self.pending.name,
                "a table being created has nothing to drop or change",
            ));
        }
        if self.pending.columns_to_add.is_empty() {
            return Err(PhoenixError::illogical(&self.pending.name, "cannot create a table without columns"));
        }
        self.set_operation(Operation::Create)
    }

    /// Alter the existing table with the accumulated changes.
    pub fn save(&mut self) -> PhoenixResult<&mut Self> {
        self.set_operation(Operation::Alter)
    }

    pub fn drop(&mut self) -> PhoenixResult<&mut Self> {
        self.ensure_no_changes("drop")?;
        self.set_operation(Operation::Drop)
    }

    pub fn rename(&mut self, new_name: impl Into<String>) -> PhoenixResult<&mut Self> {
        self.ensure_no_changes("rename")?;
        self.set_operation(Operation::Rename(new_name.into()))
    }

    pub fn copy(&mut self, new_name: impl Into<String>, mode: CopyMode) -> PhoenixResult<&mut Self> {
        self.ensure_no_changes("copy")?;
        self.set_operation(Operation::Copy {
            to: new_name.into(),
            mode,
        })
    }

    pub fn truncate(&mut self) -> PhoenixResult<&mut Self> {
        self.ensure_no_changes("truncate")?;
        self.set_operation(Operation::Truncate)
    }

    /// Number of accumulated sub-changes.
    pub fn change_count(&self) -> usize {
        self.pending.change_count()
    }

    fn ensure_no_changes(&self, what: &str) -> PhoenixResult<()> {
        if self.change_count() > 0 {
            return Err(PhoenixError::illogical(
                &self.pending.name,
                format!("cannot {what} a table with pending column, index or key changes"),
            ));
        }
        Ok(())
    }

    fn set_operation(&mut self, operation: Operation) -> PhoenixResult<&mut Self> {
        if let Some(existing) = &self.operation {
            return Err(PhoenixError::illogical(
                &self.pending.name,
                format!(
                    "cannot {} a table that is already marked to {}",
                    operation.describe(),
                    existing.describe()
                ),
            ));
        }
        self.operation = Some(operation);
        Ok(self)
    }

    /// Freeze the description into a [`TableChange`].
    pub fn finish(self) -> PhoenixResult<TableChange> {
        let operation = self.operation.clone().ok_or_else(|| {
            PhoenixError::illogical(
                &self.pending.name,
                "described but never created, saved, dropped, renamed, copied or truncated",
            )
        })?;

        if matches!(operation, Operation::Create | Operation::Alter) {
            for column in &self.pending.columns_to_add {
                if column.settings.autoincrement && !self.pending.primary_to_add.contains(&column.name) {
                    return Err(PhoenixError::illogical(
                        &self.pending.name,
                        format!("autoincrement column '{}' must be part of the primary key", column.name),
                    ));
                }
            }
        }

        let mut change = self.pending;
        change.operation = operation;
        Ok(change)
    }
}

/// Immutable change set for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableChange {
    pub(crate) name: String,
    pub(crate) operation: Operation,
    pub(crate) charset: Option<String>,
    pub(crate) collation: Option<String>,
    pub(crate) comment: Option<String>,
    pub(crate) columns_to_add: Vec<Column>,
    pub(crate) columns_to_drop: Vec<String>,
    pub(crate) columns_to_change: Vec<(String, Column)>,
    pub(crate) primary_to_add: Vec<String>,
    pub(crate) drop_primary: bool,
    pub(crate) indexes_to_add: Vec<Index>,
    pub(crate) indexes_to_drop: Vec<String>,
    pub(crate) foreign_keys_to_add: Vec<ForeignKey>,
    pub(crate) foreign_keys_to_drop: Vec<String>,
}

impl TableChange {
    pub(crate) fn empty(name: impl Into<String>, operation: Operation) -> Self {
        Self {
            name: name.into(),
            operation,
            charset: None,
            collation: None,
            comment: None,
            columns_to_add: Vec::new(),
            columns_to_drop: Vec::new(),
            columns_to_change: Vec::new(),
            primary_to_add: Vec::new(),
            drop_primary: false,
            indexes_to_add: Vec::new(),
            indexes_to_drop: Vec::new(),
            foreign_keys_to_add: Vec::new(),
            foreign_keys_to_drop: Vec::new(),
        }
    }

    /// Number of sub-changes; zero for a no-op `ALTER`.
    pub fn change_count(&self) -> usize {
        self.columns_to_add.len()
            + self.columns_to_drop.len()
            + self.columns_to_change.len()
            + self.primary_to_add.len()
            + usize::from(self.drop_primary)
            + self.indexes_to_add.len()
            + self.indexes_to_drop.len()
            + self.foreign_keys_to_add.len()
            + self.foreign_keys_to_drop.len()
            + usize::from(self.charset.is_some())
            + usize::from(self.collation.is_some())
            + usize::from(self.comment.is_some())
    }

    /// `CREATE` change set reproducing `table` in full.
    pub fn create_from(table: &Table) -> Self {
        Self {
            name: table.name.clone(),
            operation: Operation::Create,
            charset: table.charset.clone(),
            collation: table.collation.clone(),
            comment: table.comment.clone(),
            columns_to_add: table.columns.clone(),
            columns_to_drop: Vec::new(),
            columns_to_change: Vec::new(),
            primary_to_add: table.primary.clone(),
            drop_primary: false,
            indexes_to_add: table.indexes.clone(),
            indexes_to_drop: Vec::new(),
            foreign_keys_to_add: table.foreign_keys.clone(),
            foreign_keys_to_drop: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn charset(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    pub fn collation(&self) -> Option<&str> {
        self.collation.as_deref()
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn columns_to_add(&self) -> &[Column] {
        &self.columns_to_add
    }

    pub fn columns_to_drop(&self) -> &[String] {
        &self.columns_to_drop
    }

    pub fn columns_to_change(&self) -> &[(String, Column)] {
        &self.columns_to_change
    }

    pub fn primary_to_add(&self) -> &[String] {
        &self.primary_to_add
    }

    pub fn drops_primary_key(&self) -> bool {
        self.drop_primary
    }

    pub fn indexes_to_add(&self) -> &[Index] {
        &self.indexes_to_add
    }

    pub fn indexes_to_drop(&self) -> &[String] {
        &self.indexes_to_drop
    }

    pub fn foreign_keys_to_add(&self) -> &[ForeignKey] {
        &self.foreign_keys_to_add
    }

    pub fn foreign_keys_to_drop(&self) -> &[String] {
        &self.foreign_keys_to_drop
    }

    /// Table the change set as a whole describes, for `CREATE`.
    pub fn to_table(&self) -> Table {
        Table {
            name: self.name.clone(),
            charset: self.charset.clone(),
            collation: self.collation.clone(),
            comment: self.comment.clone(),
            columns: self.columns_to_add.iter().map(Column::without_position).collect(),
            primary: self.primary_to_add.clone(),
            indexes: self.indexes_to_add.clone(),
            foreign_keys: self.foreign_keys_to_add.clone(),
        }
    }
}
