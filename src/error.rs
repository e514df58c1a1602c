//! Error types for phoenix.

use thiserror::Error;

/// The main error type for phoenix operations.
#[derive(Debug, Error)]
pub enum PhoenixError {
    /// Bad or missing environment / directory configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A value outside of its closed set (column type, index type, action...).
    #[error("Invalid value '{value}' for {kind}. Expected one of: {expected}")]
    InvalidArgumentValue {
        kind: &'static str,
        value: String,
        expected: String,
    },

    /// The driver reported a failure while executing a statement.
    #[error("Query failed{}: {message}\nSQL: {sql}", code_suffix(.code))]
    DatabaseQueryExecute {
        sql: String,
        code: Option<String>,
        message: String,
    },

    /// A dialect operation needs the live table definition but got none.
    #[error("Missing adapter: table '{table}' cannot be rebuilt without its live structure")]
    MissingAdapter { table: String },

    /// Contradictory use of a table description (e.g. create and drop).
    #[error("Illogical operation on table '{table}': {message}")]
    IllogicalOperation { table: String, message: String },

    /// Table not present in a structure.
    #[error("Table '{0}' not found")]
    TableNotFound(String),

    /// Column not present in a table.
    #[error("Column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },

    /// Connection could not be established.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Generic migration-level error.
    #[error("Migration error: {0}")]
    Migration(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file could not be parsed.
    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PhoenixError {
    /// Create an invalid argument error listing the accepted values.
    pub fn invalid(kind: &'static str, value: impl Into<String>, expected: &[&str]) -> Self {
        Self::InvalidArgumentValue {
            kind,
            value: value.into(),
            expected: expected.join(", "),
        }
    }

    /// Create an illogical operation error.
    pub fn illogical(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::IllogicalOperation {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create an execution error for `sql`.
    pub fn query(sql: impl Into<String>, code: Option<String>, message: impl Into<String>) -> Self {
        Self::DatabaseQueryExecute {
            sql: sql.into(),
            code,
            message: message.into(),
        }
    }

    /// Create a column-not-found error.
    pub fn column_not_found(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::ColumnNotFound {
            table: table.into(),
            column: column.into(),
        }
    }
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref().map(|c| format!(" [{c}]")).unwrap_or_default()
}

/// Result type alias for phoenix operations.
pub type PhoenixResult<T> = Result<T, PhoenixError>;
