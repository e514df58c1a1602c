use serde_json::Value;

use crate::error::PhoenixResult;
use crate::table::{MigrationTable, TableChange};

/// One unit of work collected from a migration.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Table(TableChange),
    Sql(String),
    Insert {
        table: String,
        values: Vec<(String, Value)>,
    },
    Update {
        table: String,
        values: Vec<(String, Value)>,
        conditions: Vec<(String, Value)>,
    },
    Delete {
        table: String,
        conditions: Vec<(String, Value)>,
    },
}

/// Ordered steps a migration's `up` or `down` describes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    steps: Vec<Step>,
}

fn pairs<I, K>(values: I) -> Vec<(String, Value)>
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    values.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a described table; it must have been created, saved, dropped...
    pub fn table(&mut self, table: MigrationTable) -> PhoenixResult<&mut Self> {
        self.steps.push(Step::Table(table.finish()?));
        Ok(self)
    }

    pub fn change(&mut self, change: TableChange) -> &mut Self {
        self.steps.push(Step::Table(change));
        self
    }

    /// Raw SQL, passed through untouched.
    pub fn execute(&mut self, sql: impl Into<String>) -> &mut Self {
        self.steps.push(Step::Sql(sql.into()));
        self
    }

    pub fn insert<I, K>(&mut self, table: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.steps.push(Step::Insert {
            table: table.into(),
            values: pairs(values),
        });
        self
    }

    pub fn update<I, K, C, L>(&mut self, table: impl Into<String>, values: I, conditions: C) -> &mut Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
        C: IntoIterator<Item = (L, Value)>,
        L: Into<String>,
    {
        self.steps.push(Step::Update {
            table: table.into(),
            values: pairs(values),
            conditions: pairs(conditions),
        });
        self
    }

    pub fn delete<C, L>(&mut self, table: impl Into<String>, conditions: C) -> &mut Self
    where
        C: IntoIterator<Item = (L, Value)>,
        L: Into<String>,
    {
        self.steps.push(Step::Delete {
            table: table.into(),
            conditions: pairs(conditions),
        });
        self
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn into_steps(self) -> Vec<Step> {
        self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PhoenixError;
    use crate::schema::{Column, ColumnType};
    use serde_json::json;

    #[test]
    fn test_plan_collects_steps_in_order() {
        let mut users = MigrationTable::new("users");
        users
            .add_primary_column(Column::new("id", ColumnType::Integer).autoincrement())
            .unwrap()
            .create()
            .unwrap();

        let mut plan = Plan::new();
        plan.table(users).unwrap();
        plan.insert("users", [("id", json!(1))])
            .update("users", [("id", json!(2))], [("id", json!(1))])
            .delete("users", [("id", json!(2))])
            .execute("VACUUM");

        let kinds: Vec<&str> = plan
            .steps()
            .iter()
            .map(|s| match s {
                Step::Table(_) => "table",
                Step::Sql(_) => "sql",
                Step::Insert { .. } => "insert",
                Step::Update { .. } => "update",
                Step::Delete { .. } => "delete",
            })
            .collect();
        assert_eq!(kinds, ["table", "insert", "update", "delete", "sql"]);
    }

    #[test]
    fn test_unfinished_table_is_rejected() {
        let mut plan = Plan::new();
        let err = plan.table(MigrationTable::new("users")).unwrap_err();
        assert!(matches!(err, PhoenixError::IllogicalOperation { .. }));
        assert!(plan.is_empty());
    }
}
