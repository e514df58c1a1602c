//! Schema element model.
//!
//! Plain value types describing tables: [`Column`], [`Index`], [`ForeignKey`],
//! [`Table`] and the aggregate [`Structure`]. Snapshots are built once (from
//! introspection or from a target definition) and compared or replayed, never
//! edited behind the back of their owner.
//!
//! ```
//! use phoenix::schema::{Column, ColumnType, Index, Table};
//!
//! let users = Table::new("users")
//!     .column(Column::new("id", ColumnType::Integer).autoincrement())
//!     .column(Column::new("email", ColumnType::String).length(190))
//!     .primary(["id"])
//!     .index(Index::new(["email"]).unique());
//!
//! assert_eq!(users.indexes[0].name, "idx_users_email");
//! ```

pub mod structure;
pub mod types;

pub use structure::Structure;
pub use types::{ColumnType, ForeignKeyAction, IndexMethod, IndexType, Order};

use crate::error::{PhoenixError, PhoenixResult};

/// Column default value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultValue {
    Bool(bool),
    Integer(i64),
    String(String),
    /// SQL expression emitted verbatim, e.g. `CURRENT_TIMESTAMP`.
    Raw(String),
}

impl DefaultValue {
    pub fn raw(expression: impl Into<String>) -> Self {
        Self::Raw(expression.into())
    }
}

impl From<bool> for DefaultValue {
    fn from(v: bool) -> Self {
        DefaultValue::Bool(v)
    }
}

impl From<i32> for DefaultValue {
    fn from(v: i32) -> Self {
        DefaultValue::Integer(v as i64)
    }
}

impl From<i64> for DefaultValue {
    fn from(v: i64) -> Self {
        DefaultValue::Integer(v)
    }
}

impl From<&str> for DefaultValue {
    fn from(v: &str) -> Self {
        DefaultValue::String(v.to_string())
    }
}

impl From<String> for DefaultValue {
    fn from(v: String) -> Self {
        DefaultValue::String(v)
    }
}

/// Placement hint for added or changed columns (MySQL only honors it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Position {
    First,
    After(String),
}

/// Everything about a column besides its name and type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSettings {
    pub nullable: bool,
    pub default: Option<DefaultValue>,
    pub length: Option<u32>,
    pub decimals: Option<u32>,
    pub autoincrement: bool,
    pub signed: bool,
    pub charset: Option<String>,
    pub collation: Option<String>,
    pub comment: Option<String>,
    /// Allowed values of `enum` and `set` columns.
    pub values: Vec<String>,
    pub position: Option<Position>,
}

impl Default for ColumnSettings {
    fn default() -> Self {
        Self {
            nullable: false,
            default: None,
            length: None,
            decimals: None,
            autoincrement: false,
            signed: true,
            charset: None,
            collation: None,
            comment: None,
            values: Vec::new(),
            position: None,
        }
    }
}

/// A column definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub settings: ColumnSettings,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            settings: ColumnSettings::default(),
        }
    }

    /// Build a column from a textual type name (`"string"`, `"integer"`...).
    pub fn parse(name: impl Into<String>, column_type: &str) -> PhoenixResult<Self> {
        Ok(Self::new(name, column_type.parse()?))
    }

    pub fn nullable(mut self) -> Self {
        self.settings.nullable = true;
        self
    }

    pub fn default(mut self, value: impl Into<DefaultValue>) -> Self {
        self.settings.default = Some(value.into());
        self
    }

    pub fn length(mut self, length: u32) -> Self {
        self.settings.length = Some(length);
        self
    }

    pub fn decimals(mut self, decimals: u32) -> Self {
        self.settings.decimals = Some(decimals);
        self
    }

    pub fn autoincrement(mut self) -> Self {
        self.settings.autoincrement = true;
        self
    }

    pub fn unsigned(mut self) -> Self {
        self.settings.signed = false;
        self
    }

    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.settings.charset = Some(charset.into());
        self
    }

    pub fn collation(mut self, collation: impl Into<String>) -> Self {
        self.settings.collation = Some(collation.into());
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.settings.comment = Some(comment.into());
        self
    }

    pub fn values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn after(mut self, column: impl Into<String>) -> Self {
        self.settings.position = Some(Position::After(column.into()));
        self
    }

    pub fn first(mut self) -> Self {
        self.settings.position = Some(Position::First);
        self
    }

    /// Check the column-local invariants.
    pub fn validate(&self) -> PhoenixResult<()> {
        if self.name.trim().is_empty() {
            return Err(PhoenixError::Migration("Column name must not be empty".into()));
        }
        if self.settings.autoincrement && !self.column_type.is_integer() {
            return Err(PhoenixError::Migration(format!(
                "Column '{}' of type {} cannot be autoincrement",
                self.name, self.column_type
            )));
        }
        if self.column_type.is_enumerated() && self.settings.values.is_empty() {
            return Err(PhoenixError::Migration(format!(
                "Column '{}' of type {} needs a list of values",
                self.name, self.column_type
            )));
        }
        Ok(())
    }

    /// Equality of the persisted definition (placement hints excluded).
    pub fn same_definition(&self, other: &Column) -> bool {
        self.name == other.name
            && self.column_type == other.column_type
            && ColumnSettings {
                position: None,
                ..self.settings.clone()
            } == ColumnSettings {
                position: None,
                ..other.settings.clone()
            }
    }

    /// Copy of the column without its placement hint.
    pub fn without_position(&self) -> Column {
        let mut column = self.clone();
        column.settings.position = None;
        column
    }
}

/// One column of an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexColumn {
    pub name: String,
    pub order: Order,
    /// Prefix length.
    pub length: Option<u32>,
}

impl IndexColumn {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: Order::Asc,
            length: None,
        }
    }

    pub fn desc(mut self) -> Self {
        self.order = Order::Desc;
        self
    }

    pub fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }
}

impl From<&str> for IndexColumn {
    fn from(name: &str) -> Self {
        IndexColumn::new(name)
    }
}

impl From<String> for IndexColumn {
    fn from(name: String) -> Self {
        IndexColumn::new(name)
    }
}

/// An index. An empty `name` is filled in when the index is attached to a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub name: String,
    pub columns: Vec<IndexColumn>,
    pub kind: IndexType,
    pub method: IndexMethod,
}

impl Index {
    pub fn new<I, C>(columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<IndexColumn>,
    {
        Self {
            name: String::new(),
            columns: columns.into_iter().map(Into::into).collect(),
            kind: IndexType::Normal,
            method: IndexMethod::Default,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn unique(mut self) -> Self {
        self.kind = IndexType::Unique;
        self
    }

    pub fn fulltext(mut self) -> Self {
        self.kind = IndexType::Fulltext;
        self
    }

    pub fn kind(mut self, kind: IndexType) -> Self {
        self.kind = kind;
        self
    }

    pub fn method(mut self, method: IndexMethod) -> Self {
        self.method = method;
        self
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// `idx_<table>_<col1>_<col2>...`
    pub fn default_name<S: AsRef<str>>(table: &str, columns: &[S]) -> String {
        let cols: Vec<&str> = columns.iter().map(AsRef::as_ref).collect();
        format!("idx_{}_{}", table, cols.join("_"))
    }

    pub(crate) fn with_default_name(mut self, table: &str) -> Self {
        if self.name.is_empty() {
            self.name = Self::default_name(table, &self.column_names());
        }
        self
    }
}

/// A foreign key. An empty `name` is filled in when attached to a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    pub on_delete: ForeignKeyAction,
    pub on_update: ForeignKeyAction,
}

impl ForeignKey {
    /// Foreign key referencing `referenced_table(id)` until told otherwise.
    pub fn new<I, S>(columns: I, referenced_table: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: String::new(),
            columns: columns.into_iter().map(Into::into).collect(),
            referenced_table: referenced_table.into(),
            referenced_columns: vec!["id".to_string()],
            on_delete: ForeignKeyAction::Default,
            on_update: ForeignKeyAction::Default,
        }
    }

    pub fn references<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.referenced_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = action;
        self
    }

    pub fn on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = action;
        self
    }

    /// `<table>_<col1>_<col2>...`
    pub fn default_name<S: AsRef<str>>(table: &str, columns: &[S]) -> String {
        let mut name = table.to_string();
        for column in columns {
            name.push('_');
            name.push_str(column.as_ref());
        }
        name
    }

    pub(crate) fn with_default_name(mut self, table: &str) -> Self {
        if self.name.is_empty() {
            self.name = Self::default_name(table, &self.columns);
        }
        self
    }

    pub fn validate(&self) -> PhoenixResult<()> {
        if self.columns.is_empty() {
            return Err(PhoenixError::Migration(format!(
                "Foreign key to '{}' has no columns",
                self.referenced_table
            )));
        }
        if self.columns.len() != self.referenced_columns.len() {
            return Err(PhoenixError::Migration(format!(
                "Foreign key '{}' has {} local columns but {} referenced columns",
                self.name,
                self.columns.len(),
                self.referenced_columns.len()
            )));
        }
        Ok(())
    }
}

/// A table definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    pub charset: Option<String>,
    pub collation: Option<String>,
    pub comment: Option<String>,
    /// Declaration order.
    pub columns: Vec<Column>,
    pub primary: Vec<String>,
    pub indexes: Vec<Index>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            charset: None,
            collation: None,
            comment: None,
            columns: Vec::new(),
            primary: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column.without_position());
        self
    }

    pub fn primary<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn index(mut self, index: Index) -> Self {
        let index = index.with_default_name(&self.name);
        self.indexes.push(index);
        self
    }

    pub fn foreign_key(mut self, foreign_key: ForeignKey) -> Self {
        let foreign_key = foreign_key.with_default_name(&self.name);
        self.foreign_keys.push(foreign_key);
        self
    }

    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    pub fn with_collation(mut self, collation: impl Into<String>) -> Self {
        self.collation = Some(collation.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.get_column(name).is_some()
    }

    pub fn get_index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name == name)
    }

    pub fn get_foreign_key(&self, name: &str) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|f| f.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_builder() {
        let col = Column::new("price", ColumnType::Decimal)
            .length(10)
            .decimals(2)
            .unsigned()
            .nullable()
            .default(0)
            .after("title");

        assert_eq!(col.settings.length, Some(10));
        assert_eq!(col.settings.decimals, Some(2));
        assert!(!col.settings.signed);
        assert!(col.settings.nullable);
        assert_eq!(col.settings.default, Some(DefaultValue::Integer(0)));
        assert_eq!(col.settings.position, Some(Position::After("title".into())));
    }

    #[test]
    fn test_column_validation() {
        assert!(Column::new("id", ColumnType::Integer).autoincrement().validate().is_ok());
        assert!(Column::new("id", ColumnType::String).autoincrement().validate().is_err());
        assert!(Column::new("", ColumnType::String).validate().is_err());
        assert!(Column::new("state", ColumnType::Enum).validate().is_err());
        assert!(Column::new("state", ColumnType::Enum).values(["a", "b"]).validate().is_ok());
    }

    #[test]
    fn test_column_parse_rejects_unknown_type() {
        assert!(Column::parse("title", "string").is_ok());
        assert!(matches!(
            Column::parse("title", "varchar"),
            Err(PhoenixError::InvalidArgumentValue { .. })
        ));
    }

    #[test]
    fn test_same_definition_ignores_position() {
        let a = Column::new("title", ColumnType::String).after("id");
        let b = Column::new("title", ColumnType::String).first();
        assert!(a.same_definition(&b));
        assert!(!a.same_definition(&b.clone().nullable()));
    }

    #[test]
    fn test_default_names() {
        let table = Table::new("t")
            .index(Index::new(["a", "b"]))
            .foreign_key(ForeignKey::new(["a", "b"], "other_table").references(["x", "y"]));

        assert_eq!(table.indexes[0].name, "idx_t_a_b");
        assert_eq!(table.foreign_keys[0].name, "t_a_b");
    }

    #[test]
    fn test_foreign_key_column_count_mismatch() {
        let fk = ForeignKey::new(["a", "b"], "other").with_default_name("t");
        assert!(fk.validate().is_err());
        assert!(fk.references(["a", "b"]).validate().is_ok());
    }
}
