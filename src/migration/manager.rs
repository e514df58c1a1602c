//! Migration execution engine.
//!
//! The manager keeps one working [`Structure`] per run. It is loaded from the
//! database before the first table step and replayed forward after every
//! table step (dry runs included), so builders that need the live table
//! definition see the state earlier migrations produced.

use std::collections::HashMap;

use chrono::{Local, NaiveDateTime};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{Migration, MigrationId, Plan, Step};
use crate::adapter::{text, Adapter};
use crate::builder::{BuildContext, Dialect};
use crate::config::{Config, Environment, DEFAULT_LOG_TABLE};
use crate::error::{PhoenixError, PhoenixResult};
use crate::schema::{Column, ColumnType, Structure};
use crate::table::{MigrationTable, Operation, TableChange};

/// Source of "now" for log rows and temporary table names.
pub type Clock = Box<dyn Fn() -> NaiveDateTime>;

const EXECUTED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Default)]
pub struct MigrateOptions {
    /// Collect the SQL without executing it.
    pub dry_run: bool,
    /// Only the oldest pending migration.
    pub first: bool,
    /// Stop after this datetime token (inclusive).
    pub target: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RollbackOptions {
    pub dry_run: bool,
    pub all: bool,
    /// Roll back down to this datetime token (inclusive).
    pub target: Option<String>,
    /// Number of most recent migrations; one when unset.
    pub limit: Option<usize>,
}

/// One row of [`Manager::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub id: MigrationId,
    pub executed_at: Option<String>,
    /// False for log entries without a registered migration.
    pub known: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

/// Working schema of the current run.
struct Snapshot {
    structure: Option<Structure>,
    stale: bool,
}

impl Snapshot {
    fn new() -> Self {
        Self {
            structure: None,
            stale: true,
        }
    }
}

struct Executor {
    adapter: Box<dyn Adapter>,
    log_table: String,
    charset: Option<String>,
    collation: Option<String>,
    clock: Clock,
}

/// Applies and reverts registered migrations, one run at a time.
pub struct Manager {
    executor: Executor,
    migrations: Vec<Box<dyn Migration>>,
}

impl Manager {
    pub fn new(adapter: Box<dyn Adapter>) -> Self {
        Self {
            executor: Executor {
                adapter,
                log_table: DEFAULT_LOG_TABLE.to_string(),
                charset: None,
                collation: None,
                clock: Box::new(|| Local::now().naive_local()),
            },
            migrations: Vec::new(),
        }
    }

    /// Manager using the log table of `config` and the table defaults of `environment`.
    pub fn from_config(adapter: Box<dyn Adapter>, config: &Config, environment: &Environment) -> Self {
        Self::new(adapter)
            .with_log_table(&config.log_table_name)
            .with_table_defaults(environment.charset.clone(), environment.collation.clone())
    }

    pub fn with_log_table(mut self, name: impl Into<String>) -> Self {
        self.executor.log_table = name.into();
        self
    }

    /// Charset and collation for created tables that set none.
    pub fn with_table_defaults(mut self, charset: Option<String>, collation: Option<String>) -> Self {
        self.executor.charset = charset;
        self.executor.collation = collation;
        self
    }

    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + 'static) -> Self {
        self.executor.clock = Box::new(clock);
        self
    }

    pub fn log_table(&self) -> &str {
        &self.executor.log_table
    }

    pub fn adapter(&mut self) -> &mut dyn Adapter {
        self.executor.adapter.as_mut()
    }

    pub fn into_adapter(self) -> Box<dyn Adapter> {
        self.executor.adapter
    }

    pub fn register(&mut self, migration: impl Migration + 'static) -> PhoenixResult<&mut Self> {
        self.register_boxed(Box::new(migration))
    }

    pub fn register_boxed(&mut self, migration: Box<dyn Migration>) -> PhoenixResult<&mut Self> {
        if self.migrations.iter().any(|m| m.id() == migration.id()) {
            return Err(PhoenixError::Migration(format!(
                "migration {} is registered twice",
                migration.id()
            )));
        }
        self.migrations.push(migration);
        self.migrations.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(self)
    }

    pub fn migrations(&self) -> impl Iterator<Item = &MigrationId> {
        self.migrations.iter().map(|m| m.id())
    }

    /// Create the log table unless it exists. Returns whether it was created.
    pub fn init(&mut self) -> PhoenixResult<bool> {
        self.executor.init()
    }

    pub fn find_migrations_to_execute(&mut self, options: &MigrateOptions) -> PhoenixResult<Vec<MigrationId>> {
        let executed = self.executor.executed()?;
        let mut pending: Vec<MigrationId> = self
            .migrations()
            .filter(|id| !executed.contains_key(*id))
            .filter(|id| options.target.as_ref().is_none_or(|t| id.datetime <= *t))
            .cloned()
            .collect();
        if options.first {
            pending.truncate(1);
        }
        Ok(pending)
    }

    pub fn find_migrations_to_rollback(&mut self, options: &RollbackOptions) -> PhoenixResult<Vec<MigrationId>> {
        let executed = self.executor.executed()?;
        let mut applied: Vec<MigrationId> = Vec::new();
        for id in executed.keys() {
            if self.migrations().any(|m| m == id) {
                applied.push(id.clone());
            } else {
                warn!(migration = %id, "executed migration is not registered, skipping");
            }
        }
        applied.sort_by(|a, b| b.cmp(a));

        if let Some(target) = &options.target {
            applied.retain(|id| id.datetime >= *target);
        } else if !options.all {
            applied.truncate(options.limit.unwrap_or(1));
        }
        Ok(applied)
    }

    /// Apply pending migrations. Returns every statement run (or, in a dry
    /// run, every statement that would run), log bookkeeping excluded.
    pub fn migrate(&mut self, options: &MigrateOptions) -> PhoenixResult<Vec<String>> {
        if !options.dry_run {
            self.init()?;
        }
        let ids = self.find_migrations_to_execute(options)?;
        self.run(&ids, Direction::Up, options.dry_run)
    }

    pub fn rollback(&mut self, options: &RollbackOptions) -> PhoenixResult<Vec<String>> {
        let ids = self.find_migrations_to_rollback(options)?;
        self.run(&ids, Direction::Down, options.dry_run)
    }

    /// Every registered or logged migration, in identity order.
    pub fn status(&mut self) -> PhoenixResult<Vec<MigrationStatus>> {
        let mut executed = self.executor.executed()?;
        let mut rows: Vec<MigrationStatus> = self
            .migrations()
            .map(|id| MigrationStatus {
                id: id.clone(),
                executed_at: executed.remove(id),
                known: true,
            })
            .collect();
        rows.extend(executed.into_iter().map(|(id, executed_at)| MigrationStatus {
            id,
            executed_at: Some(executed_at),
            known: false,
        }));
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rows)
    }

    fn run(&mut self, ids: &[MigrationId], direction: Direction, dry_run: bool) -> PhoenixResult<Vec<String>> {
        let mut snapshot = Snapshot::new();
        let mut statements = Vec::new();
        for id in ids {
            let migration = self
                .migrations
                .iter()
                .find(|m| m.id() == id)
                .ok_or_else(|| PhoenixError::Migration(format!("migration {id} is not registered")))?;
            match direction {
                Direction::Up => info!(migration = %id, dry_run, "migrating up"),
                Direction::Down => info!(migration = %id, dry_run, "rolling back"),
            }
            let executed = self
                .executor
                .apply(migration.as_ref(), direction, dry_run, &mut snapshot)?;
            info!(migration = %id, statements = executed.len(), "done");
            statements.extend(executed);
        }
        Ok(statements)
    }
}

impl Executor {
    fn dialect(&self) -> Dialect {
        self.adapter.dialect()
    }

    fn now(&self) -> NaiveDateTime {
        (self.clock)()
    }

    fn quoted_log_table(&self) -> String {
        self.adapter
            .query_builder(BuildContext::new())
            .quote_identifier(&self.log_table)
    }

    fn log_table_exists(&mut self) -> bool {
        let sql = format!("SELECT COUNT(*) AS n FROM {}", self.quoted_log_table());
        self.adapter.fetch_all(&sql).is_ok()
    }

    fn init(&mut self) -> PhoenixResult<bool> {
        if self.log_table_exists() {
            return Ok(false);
        }
        let mut table = MigrationTable::new(&self.log_table);
        table
            .add_primary_column(Column::new("id", ColumnType::Integer).autoincrement())?
            .add_column(Column::new("migration_datetime", ColumnType::String).length(14))?
            .add_column(Column::new("classname", ColumnType::String))?
            .add_column(Column::new("executed_at", ColumnType::DateTime))?
            .create()?;
        let change = self.with_defaults(&table.finish()?);
        let statements = self.adapter.query_builder(BuildContext::new()).build(&change)?;
        for sql in &statements {
            self.adapter.execute(sql)?;
        }
        info!(table = %self.log_table, "created migration log table");
        Ok(true)
    }

    /// Logged migrations with their execution time.
    fn executed(&mut self) -> PhoenixResult<HashMap<MigrationId, String>> {
        if !self.log_table_exists() {
            return Ok(HashMap::new());
        }
        let executed_at = match self.dialect() {
            Dialect::MySql => "CAST(executed_at AS CHAR)",
            Dialect::Postgres => "executed_at::text",
            Dialect::Sqlite => "CAST(executed_at AS TEXT)",
        };
        let sql = format!(
            "SELECT migration_datetime, classname, {executed_at} AS executed_at FROM {}",
            self.quoted_log_table()
        );
        let mut executed = HashMap::new();
        for row in self.adapter.fetch_all(&sql)? {
            let id = MigrationId {
                datetime: text(&row, "migration_datetime").unwrap_or_default(),
                class_name: text(&row, "classname").unwrap_or_default(),
            };
            executed.insert(id, text(&row, "executed_at").unwrap_or_default());
        }
        Ok(executed)
    }

    /// Fill in the environment's charset and collation on created tables.
    fn with_defaults(&self, change: &TableChange) -> TableChange {
        let mut change = change.clone();
        if change.operation == Operation::Create {
            if change.charset.is_none() {
                change.charset = self.charset.clone();
            }
            if change.collation.is_none() {
                change.collation = self.collation.clone();
            }
        }
        change
    }

    fn refresh(&mut self, snapshot: &mut Snapshot) {
        if !snapshot.stale {
            return;
        }
        snapshot.structure = match self.adapter.load_structure() {
            Ok(structure) => Some(structure),
            Err(e) => {
                warn!(error = %e, "could not introspect the database; builders run without the live structure");
                None
            }
        };
        snapshot.stale = false;
    }

    fn statements(&self, step: &Step, snapshot: &Snapshot, at: NaiveDateTime) -> PhoenixResult<Vec<String>> {
        let mut context = BuildContext::new().at(at);
        if let Some(structure) = &snapshot.structure {
            context = context.with_structure(structure);
        }
        let builder = self.adapter.query_builder(context);
        Ok(match step {
            Step::Table(change) => builder.build(&self.with_defaults(change))?,
            Step::Sql(sql) => vec![sql.clone()],
            Step::Insert { table, values } => vec![builder.insert(table, values)],
            Step::Update {
                table,
                values,
                conditions,
            } => vec![builder.update(table, values, conditions)],
            Step::Delete { table, conditions } => vec![builder.delete(table, conditions)],
        })
    }

    fn run_plan(&mut self, plan: Plan, dry_run: bool, snapshot: &mut Snapshot) -> PhoenixResult<Vec<String>> {
        let mut executed = Vec::new();
        for step in plan.into_steps() {
            if matches!(step, Step::Table(_)) {
                self.refresh(snapshot);
            }
            let statements = self.statements(&step, snapshot, self.now())?;
            for sql in &statements {
                if dry_run {
                    debug!(%sql, "dry run");
                } else {
                    self.adapter.execute(sql)?;
                }
            }
            executed.extend(statements);

            match &step {
                Step::Table(change) => {
                    if let Some(structure) = snapshot.structure.as_mut()
                        && let Err(e) = structure.update(change)
                    {
                        debug!(error = %e, "working structure out of sync");
                        snapshot.stale = !dry_run;
                    }
                }
                // raw SQL may change the schema behind the snapshot's back
                Step::Sql(_) if !dry_run => snapshot.stale = true,
                _ => {}
            }
        }
        Ok(executed)
    }

    fn record(&mut self, id: &MigrationId, direction: Direction) -> PhoenixResult<()> {
        let key = [
            ("migration_datetime".to_string(), Value::String(id.datetime.clone())),
            ("classname".to_string(), Value::String(id.class_name.clone())),
        ];
        match direction {
            Direction::Up => {
                let mut values = key.to_vec();
                values.push((
                    "executed_at".to_string(),
                    Value::String(self.now().format(EXECUTED_AT_FORMAT).to_string()),
                ));
                self.adapter.insert(&self.log_table, &values)?;
            }
            Direction::Down => {
                let sql = self
                    .adapter
                    .query_builder(BuildContext::new())
                    .delete(&self.log_table, &key);
                self.adapter.execute(&sql)?;
            }
        }
        Ok(())
    }

    fn apply(
        &mut self,
        migration: &dyn Migration,
        direction: Direction,
        dry_run: bool,
        snapshot: &mut Snapshot,
    ) -> PhoenixResult<Vec<String>> {
        let mut plan = Plan::new();
        match direction {
            Direction::Up => migration.up(&mut plan)?,
            Direction::Down => migration.down(&mut plan)?,
        }

        let transactional = migration.use_transaction() && !dry_run;
        if transactional {
            self.adapter.start_transaction()?;
        }

        let result = self.run_plan(plan, dry_run, snapshot).and_then(|statements| {
            if !dry_run {
                self.record(migration.id(), direction)?;
            }
            Ok(statements)
        });

        match result {
            Ok(statements) => {
                if transactional {
                    self.adapter.commit()?;
                }
                Ok(statements)
            }
            Err(e) => {
                if transactional {
                    warn!(migration = %migration.id(), error = %e, "rolling back failed migration");
                    if let Err(rollback) = self.adapter.rollback() {
                        warn!(error = %rollback, "rollback failed");
                    }
                }
                snapshot.stale = true;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::SqliteAdapter;
    use crate::schema::Index;
    use chrono::NaiveDate;

    struct CreatePosts(MigrationId);

    impl Migration for CreatePosts {
        fn id(&self) -> &MigrationId {
            &self.0
        }

        fn up(&self, plan: &mut Plan) -> PhoenixResult<()> {
            let mut posts = MigrationTable::new("posts");
            posts
                .add_primary_column(Column::new("id", ColumnType::Integer).autoincrement())?
                .add_column(Column::new("title", ColumnType::String))?
                .add_index(Index::new(["title"]))?
                .create()?;
            plan.table(posts)?;
            plan.insert("posts", [("title", Value::String("hello".into()))]);
            Ok(())
        }

        fn down(&self, plan: &mut Plan) -> PhoenixResult<()> {
            let mut posts = MigrationTable::new("posts");
            posts.drop()?;
            plan.table(posts)?;
            Ok(())
        }
    }

    struct Broken(MigrationId);

    impl Migration for Broken {
        fn id(&self) -> &MigrationId {
            &self.0
        }

        fn up(&self, plan: &mut Plan) -> PhoenixResult<()> {
            plan.insert("posts", [("title", Value::String("second".into()))])
                .execute("INSERT INTO nowhere VALUES (1)");
            Ok(())
        }

        fn down(&self, _plan: &mut Plan) -> PhoenixResult<()> {
            Ok(())
        }
    }

    /// Same statements as `Broken`, outside a transaction.
    struct BrokenUnguarded(MigrationId);

    impl Migration for BrokenUnguarded {
        fn id(&self) -> &MigrationId {
            &self.0
        }

        fn use_transaction(&self) -> bool {
            false
        }

        fn up(&self, plan: &mut Plan) -> PhoenixResult<()> {
            Broken(self.0.clone()).up(plan)
        }

        fn down(&self, _plan: &mut Plan) -> PhoenixResult<()> {
            Ok(())
        }
    }

    struct CreateTags(MigrationId);

    impl Migration for CreateTags {
        fn id(&self) -> &MigrationId {
            &self.0
        }

        fn up(&self, plan: &mut Plan) -> PhoenixResult<()> {
            plan.execute("CREATE TABLE tags (id integer PRIMARY KEY)");
            Ok(())
        }

        fn down(&self, plan: &mut Plan) -> PhoenixResult<()> {
            plan.execute("DROP TABLE tags");
            Ok(())
        }
    }

    fn id(datetime: &str, class_name: &str) -> MigrationId {
        MigrationId::new(datetime, class_name).unwrap()
    }

    fn manager() -> Manager {
        let at = NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(12, 30, 45))
            .unwrap();
        Manager::new(Box::new(SqliteAdapter::memory().unwrap())).with_clock(move || at)
    }

    fn count(manager: &mut Manager, sql: &str) -> i64 {
        let rows = manager.adapter().fetch_all(sql).unwrap();
        crate::adapter::number(&rows[0], "n").unwrap()
    }

    #[test]
    fn test_migrate_is_exactly_once() {
        let mut manager = manager();
        manager.register(CreatePosts(id("20240101000000", "CreatePosts"))).unwrap();

        let statements = manager.migrate(&MigrateOptions::default()).unwrap();
        assert_eq!(statements.len(), 3);
        assert!(manager.migrate(&MigrateOptions::default()).unwrap().is_empty());

        assert_eq!(count(&mut manager, "SELECT COUNT(*) AS n FROM phoenix_log"), 1);
        assert_eq!(count(&mut manager, "SELECT COUNT(*) AS n FROM posts"), 1);

        let status = manager.status().unwrap();
        assert_eq!(status[0].executed_at.as_deref(), Some("2024-03-01 12:30:45"));
    }

    #[test]
    fn test_rollback_removes_log_entry() {
        let mut manager = manager();
        manager.register(CreatePosts(id("20240101000000", "CreatePosts"))).unwrap();
        manager.migrate(&MigrateOptions::default()).unwrap();

        let statements = manager.rollback(&RollbackOptions::default()).unwrap();
        assert_eq!(statements, vec!["DROP TABLE \"posts\";".to_string()]);
        assert_eq!(count(&mut manager, "SELECT COUNT(*) AS n FROM phoenix_log"), 0);
        assert_eq!(
            manager.find_migrations_to_execute(&MigrateOptions::default()).unwrap(),
            vec![id("20240101000000", "CreatePosts")]
        );
    }

    #[test]
    fn test_failed_transactional_migration_is_rolled_back() {
        let mut manager = manager();
        manager.register(CreatePosts(id("20240101000000", "CreatePosts"))).unwrap();
        manager.register(Broken(id("20240102000000", "Broken"))).unwrap();

        let err = manager.migrate(&MigrateOptions::default()).unwrap_err();
        assert!(matches!(err, PhoenixError::DatabaseQueryExecute { .. }));

        // the first migration stays, the broken one leaves nothing behind
        assert_eq!(count(&mut manager, "SELECT COUNT(*) AS n FROM posts"), 1);
        assert_eq!(count(&mut manager, "SELECT COUNT(*) AS n FROM phoenix_log"), 1);
        assert_eq!(
            manager.find_migrations_to_execute(&MigrateOptions::default()).unwrap(),
            vec![id("20240102000000", "Broken")]
        );
    }

    #[test]
    fn test_failed_migration_without_transaction_keeps_partial_work() {
        let mut manager = manager();
        manager.register(CreatePosts(id("20240101000000", "CreatePosts"))).unwrap();
        manager.register(BrokenUnguarded(id("20240102000000", "BrokenUnguarded"))).unwrap();
        manager.register(CreateTags(id("20240103000000", "CreateTags"))).unwrap();

        let err = manager.migrate(&MigrateOptions::default()).unwrap_err();
        assert!(matches!(err, PhoenixError::DatabaseQueryExecute { .. }));

        // the insert before the failing statement is not undone
        assert_eq!(count(&mut manager, "SELECT COUNT(*) AS n FROM posts"), 2);
        assert_eq!(count(&mut manager, "SELECT COUNT(*) AS n FROM phoenix_log"), 1);
        assert_eq!(
            count(&mut manager, "SELECT COUNT(*) AS n FROM phoenix_log WHERE classname = 'BrokenUnguarded'"),
            0
        );
        assert!(!manager.adapter().load_structure().unwrap().has_table("tags"));
        assert_eq!(
            manager.find_migrations_to_execute(&MigrateOptions::default()).unwrap(),
            vec![id("20240102000000", "BrokenUnguarded"), id("20240103000000", "CreateTags")]
        );
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let mut manager = manager();
        manager.register(CreatePosts(id("20240101000000", "CreatePosts"))).unwrap();

        let options = MigrateOptions {
            dry_run: true,
            ..Default::default()
        };
        let statements = manager.migrate(&options).unwrap();
        assert_eq!(statements[0], "CREATE TABLE \"posts\" (\"id\" integer PRIMARY KEY AUTOINCREMENT NOT NULL,\"title\" varchar(255) NOT NULL);");
        assert!(manager.adapter().load_structure().unwrap().is_empty());
    }

    #[test]
    fn test_selection_options() {
        let mut manager = manager();
        manager.register(CreatePosts(id("20240101000000", "CreatePosts"))).unwrap();
        manager.register(Broken(id("20240102000000", "Broken"))).unwrap();

        let first = MigrateOptions {
            first: true,
            ..Default::default()
        };
        assert_eq!(manager.find_migrations_to_execute(&first).unwrap().len(), 1);

        let target = MigrateOptions {
            target: Some("20240101000000".into()),
            ..Default::default()
        };
        assert_eq!(
            manager.find_migrations_to_execute(&target).unwrap(),
            vec![id("20240101000000", "CreatePosts")]
        );

        assert!(manager.register(Broken(id("20240102000000", "Broken"))).is_err());
    }

    #[test]
    fn test_create_defaults_apply_to_created_tables_only() {
        let manager = Manager::new(Box::new(SqliteAdapter::memory().unwrap()))
            .with_table_defaults(Some("utf8mb4".into()), None);

        let mut created = MigrationTable::new("a");
        created.add_column(Column::new("x", ColumnType::Integer)).unwrap().create().unwrap();
        let created = manager.executor.with_defaults(&created.finish().unwrap());
        assert_eq!(created.charset(), Some("utf8mb4"));

        let mut altered = MigrationTable::new("a");
        altered.add_column(Column::new("y", ColumnType::Integer).nullable()).unwrap().save().unwrap();
        let altered = manager.executor.with_defaults(&altered.finish().unwrap());
        assert_eq!(altered.charset(), None);
    }
}
