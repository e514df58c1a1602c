//! Closed enumerations of the schema model.
//!
//! Every value that used to be a free-form string (column type, index type,
//! index method, foreign key action, sort order) is a Rust enum. Parsing from
//! text is the only place where an unknown value can appear, and it fails with
//! [`PhoenixError::InvalidArgumentValue`].

use std::fmt;
use std::str::FromStr;

use crate::error::PhoenixError;

/// Abstract column type, independent of any SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    TinyInteger,
    SmallInteger,
    MediumInteger,
    Integer,
    BigInteger,
    Boolean,
    String,
    Char,
    Text,
    TinyText,
    MediumText,
    LongText,
    Json,
    Uuid,
    Decimal,
    Numeric,
    Float,
    Double,
    Date,
    Time,
    DateTime,
    Timestamp,
    Year,
    Binary,
    VarBinary,
    Blob,
    TinyBlob,
    MediumBlob,
    LongBlob,
    Bit,
    Enum,
    Set,
    Point,
    Line,
    Polygon,
}

impl ColumnType {
    pub const ALL: [ColumnType; 35] = [
        Self::TinyInteger,
        Self::SmallInteger,
        Self::MediumInteger,
        Self::Integer,
        Self::BigInteger,
        Self::Boolean,
        Self::String,
        Self::Char,
        Self::Text,
        Self::TinyText,
        Self::MediumText,
        Self::LongText,
        Self::Json,
        Self::Uuid,
        Self::Decimal,
        Self::Numeric,
        Self::Float,
        Self::Double,
        Self::Date,
        Self::Time,
        Self::DateTime,
        Self::Timestamp,
        Self::Year,
        Self::Binary,
        Self::VarBinary,
        Self::Blob,
        Self::TinyBlob,
        Self::MediumBlob,
        Self::LongBlob,
        Self::Bit,
        Self::Enum,
        Self::Set,
        Self::Point,
        Self::Line,
        Self::Polygon,
    ];

    /// Canonical lowercase name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TinyInteger => "tinyinteger",
            Self::SmallInteger => "smallinteger",
            Self::MediumInteger => "mediuminteger",
            Self::Integer => "integer",
            Self::BigInteger => "biginteger",
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::Char => "char",
            Self::Text => "text",
            Self::TinyText => "tinytext",
            Self::MediumText => "mediumtext",
            Self::LongText => "longtext",
            Self::Json => "json",
            Self::Uuid => "uuid",
            Self::Decimal => "decimal",
            Self::Numeric => "numeric",
            Self::Float => "float",
            Self::Double => "double",
            Self::Date => "date",
            Self::Time => "time",
            Self::DateTime => "datetime",
            Self::Timestamp => "timestamp",
            Self::Year => "year",
            Self::Binary => "binary",
            Self::VarBinary => "varbinary",
            Self::Blob => "blob",
            Self::TinyBlob => "tinyblob",
            Self::MediumBlob => "mediumblob",
            Self::LongBlob => "longblob",
            Self::Bit => "bit",
            Self::Enum => "enum",
            Self::Set => "set",
            Self::Point => "point",
            Self::Line => "line",
            Self::Polygon => "polygon",
        }
    }

    /// Integer family. Only these may carry `autoincrement`.
    pub const fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::TinyInteger
                | Self::SmallInteger
                | Self::MediumInteger
                | Self::Integer
                | Self::BigInteger
        )
    }

    /// Types for which `signed = false` produces an `unsigned` suffix.
    pub const fn is_numeric(&self) -> bool {
        self.is_integer()
            || matches!(
                self,
                Self::Decimal | Self::Numeric | Self::Float | Self::Double
            )
    }

    /// Types that accept a character set and collation.
    pub const fn is_textual(&self) -> bool {
        matches!(
            self,
            Self::String
                | Self::Char
                | Self::Text
                | Self::TinyText
                | Self::MediumText
                | Self::LongText
                | Self::Enum
                | Self::Set
        )
    }

    /// Types that need the `values` setting.
    pub const fn is_enumerated(&self) -> bool {
        matches!(self, Self::Enum | Self::Set)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = PhoenixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|t| t.as_str()).collect();
                PhoenixError::invalid("column type", s, &names)
            })
    }
}

/// Kind of index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexType {
    #[default]
    Normal,
    Unique,
    Fulltext,
}

impl IndexType {
    pub const fn keyword(&self) -> &'static str {
        match self {
            Self::Normal => "",
            Self::Unique => "UNIQUE",
            Self::Fulltext => "FULLTEXT",
        }
    }
}

impl FromStr for IndexType {
    type Err = PhoenixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "" | "NORMAL" => Ok(Self::Normal),
            "UNIQUE" => Ok(Self::Unique),
            "FULLTEXT" => Ok(Self::Fulltext),
            _ => Err(PhoenixError::invalid(
                "index type",
                s,
                &["", "NORMAL", "UNIQUE", "FULLTEXT"],
            )),
        }
    }
}

/// Index access method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexMethod {
    #[default]
    Default,
    Btree,
    Hash,
}

impl IndexMethod {
    pub const fn keyword(&self) -> &'static str {
        match self {
            Self::Default => "",
            Self::Btree => "BTREE",
            Self::Hash => "HASH",
        }
    }
}

impl FromStr for IndexMethod {
    type Err = PhoenixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "" | "DEFAULT" => Ok(Self::Default),
            "BTREE" => Ok(Self::Btree),
            "HASH" => Ok(Self::Hash),
            _ => Err(PhoenixError::invalid(
                "index method",
                s,
                &["", "DEFAULT", "BTREE", "HASH"],
            )),
        }
    }
}

/// Referential action for `ON DELETE` / `ON UPDATE`.
///
/// `Default` leaves the clause out so the engine applies its own default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ForeignKeyAction {
    #[default]
    Default,
    Cascade,
    Restrict,
    SetNull,
    NoAction,
}

impl ForeignKeyAction {
    pub const fn keyword(&self) -> &'static str {
        match self {
            Self::Default => "",
            Self::Cascade => "CASCADE",
            Self::Restrict => "RESTRICT",
            Self::SetNull => "SET NULL",
            Self::NoAction => "NO ACTION",
        }
    }
}

impl FromStr for ForeignKeyAction {
    type Err = PhoenixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('_', " ").as_str() {
            "" | "DEFAULT" => Ok(Self::Default),
            "CASCADE" => Ok(Self::Cascade),
            "RESTRICT" => Ok(Self::Restrict),
            "SET NULL" => Ok(Self::SetNull),
            "NO ACTION" => Ok(Self::NoAction),
            _ => Err(PhoenixError::invalid(
                "foreign key action",
                s,
                &["", "CASCADE", "RESTRICT", "SET NULL", "NO ACTION"],
            )),
        }
    }
}

/// Sort order of an index column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl FromStr for Order {
    type Err = PhoenixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "" | "ASC" | "A" => Ok(Self::Asc),
            "DESC" | "D" => Ok(Self::Desc),
            _ => Err(PhoenixError::invalid("index order", s, &["ASC", "DESC"])),
        }
    }
}
