//! # Phoenix: reversible schema migrations
//!
//! Phoenix records an ordered, versioned sequence of schema changes, applies
//! or reverts them against MySQL, PostgreSQL or SQLite, and computes the
//! difference between two schema snapshots.
//!
//! ## Quick Example
//!
//! ```
//! use phoenix::prelude::*;
//!
//! let mut table = MigrationTable::new("simple");
//! table
//!     .add_primary_column(Column::new("id", ColumnType::Integer).autoincrement())?
//!     .add_column(Column::new("title", ColumnType::String))?
//!     .add_column(Column::new("settings", ColumnType::Json))?
//!     .set_charset("utf8")
//!     .create()?;
//!
//! let builder = Dialect::MySql.builder(BuildContext::new());
//! let sql = builder.build(&table.finish()?)?;
//! assert_eq!(
//!     sql,
//!     ["CREATE TABLE `simple` (`id` int(11) NOT NULL AUTO_INCREMENT,`title` varchar(255) NOT NULL,`settings` json NOT NULL,PRIMARY KEY (`id`)) DEFAULT CHARACTER SET=utf8;"]
//! );
//! # Ok::<(), PhoenixError>(())
//! ```
//!
//! ## Layers
//!
//! | Module | Role |
//! |--------|------|
//! | [`schema`] | Element model and structure snapshots |
//! | [`table`] | Change descriptors |
//! | [`comparator`] | Structure diff |
//! | [`builder`] | Per-dialect SQL generation |
//! | [`adapter`] | Live connections and introspection |
//! | [`migration`] | Migrations and the execution engine |

pub mod adapter;
pub mod builder;
pub mod comparator;
pub mod config;
pub mod error;
pub mod migration;
pub mod schema;
pub mod table;

pub mod prelude {
    pub use crate::adapter::{Adapter, MysqlAdapter, PgsqlAdapter, SqliteAdapter};
    pub use crate::builder::{BuildContext, Dialect, QueryBuilder};
    pub use crate::comparator::diff;
    pub use crate::config::{Config, Environment};
    pub use crate::error::*;
    pub use crate::migration::{
        Manager, MigrateOptions, Migration, MigrationId, Plan, RollbackOptions, SqlFileMigration,
    };
    pub use crate::schema::{
        Column, ColumnType, DefaultValue, ForeignKey, ForeignKeyAction, Index, IndexColumn, IndexMethod,
        IndexType, Structure, Table,
    };
    pub use crate::table::{CopyMode, MigrationTable, Operation, TableChange};
}
