//! Migrations and their execution engine.
//!
//! A [`Migration`] describes its forward and backward changes into a
//! [`Plan`]; the [`Manager`] turns plans into SQL through the adapter's
//! query builder, runs them and records applied migrations in the log table.
//!
//! Identity is the pair of a sortable datetime token (`YYYYMMDDHHMMSS`) and a
//! class name. Migrations are applied in ascending and rolled back in
//! descending identity order.

pub mod manager;
pub mod plan;
pub mod sql_file;

use std::fmt;

use crate::error::{PhoenixError, PhoenixResult};

pub use manager::{Clock, Manager, MigrateOptions, MigrationStatus, RollbackOptions};
pub use plan::{Plan, Step};
pub use sql_file::{discover, SqlFileMigration};

/// Sortable identity of a migration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MigrationId {
    pub datetime: String,
    pub class_name: String,
}

impl MigrationId {
    pub fn new(datetime: impl Into<String>, class_name: impl Into<String>) -> PhoenixResult<Self> {
        let datetime = datetime.into();
        if datetime.len() != 14 || !datetime.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PhoenixError::Migration(format!(
                "migration datetime '{datetime}' must be 14 digits (YYYYMMDDHHMMSS)"
            )));
        }
        Ok(Self {
            datetime,
            class_name: class_name.into(),
        })
    }
}

impl fmt::Display for MigrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.datetime, self.class_name)
    }
}

/// A versioned pair of forward and backward changes.
pub trait Migration {
    fn id(&self) -> &MigrationId;

    /// Run all statements of this migration in one transaction.
    fn use_transaction(&self) -> bool {
        true
    }

    fn up(&self, plan: &mut Plan) -> PhoenixResult<()>;

    fn down(&self, plan: &mut Plan) -> PhoenixResult<()>;
}

/// `add_users_table` -> `AddUsersTable`
pub fn class_name_from(name: &str) -> String {
    name.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_id_order() {
        let a = MigrationId::new("20240101000000", "CreateUsers").unwrap();
        let b = MigrationId::new("20240101000000", "CreatePosts").unwrap();
        let c = MigrationId::new("20231231235959", "Init").unwrap();
        let mut ids = vec![a.clone(), b.clone(), c.clone()];
        ids.sort();
        assert_eq!(ids, vec![c, b, a]);
    }

    #[test]
    fn test_migration_id_validation() {
        assert!(MigrationId::new("2024", "Short").is_err());
        assert!(MigrationId::new("2024010100000x", "Letters").is_err());
    }

    #[test]
    fn test_class_name_from() {
        assert_eq!(class_name_from("add_users_table"), "AddUsersTable");
        assert_eq!(class_name_from("init"), "Init");
        assert_eq!(class_name_from("fix--posts"), "FixPosts");
    }
}
