//! Diffs applied to a live SQLite database introspect back to their target.

use phoenix::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::Value;

fn users_v1() -> Table {
    Table::new("users")
        .column(Column::new("id", ColumnType::Integer).autoincrement())
        .column(Column::new("email", ColumnType::String).length(190))
        .column(Column::new("name", ColumnType::String).nullable())
        .primary(["id"])
}

fn posts_v1() -> Table {
    Table::new("posts")
        .column(Column::new("id", ColumnType::Integer).autoincrement())
        .column(Column::new("user_id", ColumnType::Integer))
        .column(Column::new("title", ColumnType::String))
        .column(Column::new("body", ColumnType::Text).nullable())
        .primary(["id"])
        .index(Index::new(["title"]))
        .foreign_key(ForeignKey::new(["user_id"], "users").on_delete(ForeignKeyAction::Cascade))
}

fn version_one() -> Structure {
    Structure::new().with_table(users_v1()).with_table(posts_v1())
}

fn version_two() -> Structure {
    let users = Table::new("users")
        .column(Column::new("id", ColumnType::Integer).autoincrement())
        .column(Column::new("email", ColumnType::String).length(190))
        .column(Column::new("name", ColumnType::String).default(""))
        .column(Column::new("active", ColumnType::Boolean).default(true))
        .primary(["id"])
        .index(Index::new(["email"]).unique());
    let posts = Table::new("posts")
        .column(Column::new("id", ColumnType::Integer).autoincrement())
        .column(Column::new("user_id", ColumnType::Integer))
        .column(Column::new("title", ColumnType::String).length(200))
        .column(Column::new("published_at", ColumnType::DateTime).nullable())
        .primary(["id"])
        .index(Index::new(["title"]))
        .foreign_key(ForeignKey::new(["user_id"], "users").on_delete(ForeignKeyAction::Cascade));
    let tags = Table::new("tags")
        .column(Column::new("id", ColumnType::Integer).autoincrement())
        .column(Column::new("label", ColumnType::String).length(64))
        .primary(["id"])
        .index(Index::new(["label"]).unique());
    Structure::new().with_table(users).with_table(posts).with_table(tags)
}

/// Run every change against the database, the way the manager does.
fn apply(adapter: &mut SqliteAdapter, changes: &[TableChange]) {
    let mut working = adapter.load_structure().unwrap();
    for change in changes {
        let statements = adapter
            .query_builder(BuildContext::new().with_structure(&working))
            .build(change)
            .unwrap();
        for sql in &statements {
            adapter.execute(sql).unwrap();
        }
        working.update(change).unwrap();
    }
}

fn scalar(adapter: &mut SqliteAdapter, sql: &str) -> Value {
    let rows = adapter.fetch_all(sql).unwrap();
    rows[0].get("v").cloned().unwrap_or(Value::Null)
}

#[test]
fn test_create_from_empty_database() {
    let mut adapter = SqliteAdapter::memory().unwrap();
    let target = version_one();

    let changes = diff(&adapter.load_structure().unwrap(), &target);
    assert_eq!(changes.len(), 2);
    // users is referenced by posts and must exist first
    assert_eq!(changes[0].name(), "users");
    apply(&mut adapter, &changes);

    let loaded = adapter.load_structure().unwrap();
    assert!(diff(&loaded, &target).is_empty());
    assert!(diff(&target, &loaded).is_empty());
}

#[test]
fn test_alter_reaches_target_and_keeps_rows() {
    let mut adapter = SqliteAdapter::memory().unwrap();
    apply(&mut adapter, &diff(&Structure::new(), &version_one()));
    adapter
        .execute("INSERT INTO users (email, name) VALUES ('ada@example.com', 'Ada'), ('bob@example.com', 'Bob')")
        .unwrap();
    adapter
        .execute("INSERT INTO posts (user_id, title, body) VALUES (1, 'Hello', 'First post')")
        .unwrap();

    let target = version_two();
    let changes = diff(&adapter.load_structure().unwrap(), &target);
    let operations: Vec<&Operation> = changes.iter().map(|c| c.operation()).collect();
    assert_eq!(operations, vec![&Operation::Create, &Operation::Alter, &Operation::Alter]);
    apply(&mut adapter, &changes);

    let loaded = adapter.load_structure().unwrap();
    assert!(diff(&loaded, &target).is_empty(), "{:?}", diff(&loaded, &target));

    assert_eq!(scalar(&mut adapter, "SELECT COUNT(*) AS v FROM users"), Value::from(2));
    assert_eq!(
        scalar(&mut adapter, "SELECT name AS v FROM users WHERE email = 'ada@example.com'"),
        Value::from("Ada")
    );
    assert_eq!(
        scalar(&mut adapter, "SELECT title AS v FROM posts WHERE user_id = 1"),
        Value::from("Hello")
    );
    // the foreign key still points at users, not at the rebuild's temporary table
    let posts = loaded.get_table("posts").unwrap();
    assert_eq!(posts.foreign_keys[0].referenced_table, "users");
    assert_eq!(loaded.len(), 3);
}

#[test]
fn test_rebuild_fills_new_not_null_column() {
    let mut adapter = SqliteAdapter::memory().unwrap();
    apply(&mut adapter, &diff(&Structure::new(), &Structure::new().with_table(posts_v1())));
    adapter
        .execute("INSERT INTO posts (user_id, title) VALUES (7, 'a'), (8, 'b')")
        .unwrap();

    let mut posts = MigrationTable::new("posts");
    posts
        .change_column("body", Column::new("content", ColumnType::Text).nullable())
        .unwrap()
        .add_column(Column::new("views", ColumnType::Integer))
        .unwrap()
        .save()
        .unwrap();
    apply(&mut adapter, &[posts.finish().unwrap()]);

    let rows = adapter
        .fetch_all("SELECT title, content, views FROM posts ORDER BY id")
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("title"), Some(&Value::from("a")));
    assert_eq!(rows[1].get("views"), Some(&Value::from(0)));

    let loaded = adapter.load_structure().unwrap();
    let table = loaded.get_table("posts").unwrap();
    assert!(table.has_column("content"));
    assert!(!table.has_column("body"));
    assert!(table.get_index("idx_posts_title").is_some());
}

#[test]
fn test_rebuild_fills_new_enum_column_with_first_value() {
    let mut adapter = SqliteAdapter::memory().unwrap();
    apply(&mut adapter, &diff(&Structure::new(), &Structure::new().with_table(posts_v1())));
    adapter
        .execute("INSERT INTO posts (user_id, title) VALUES (7, 'a')")
        .unwrap();

    let mut posts = MigrationTable::new("posts");
    posts
        .add_column(Column::new("state", ColumnType::Enum).values(["draft", "live"]))
        .unwrap()
        .save()
        .unwrap();
    apply(&mut adapter, &[posts.finish().unwrap()]);

    assert_eq!(scalar(&mut adapter, "SELECT state AS v FROM posts WHERE title = 'a'"), Value::from("draft"));
    assert!(adapter.execute("UPDATE posts SET state = 'gone'").is_err());
}

#[test]
fn test_identical_structures_need_no_changes() {
    let mut adapter = SqliteAdapter::memory().unwrap();
    apply(&mut adapter, &diff(&Structure::new(), &version_two()));

    let loaded = adapter.load_structure().unwrap();
    assert!(diff(&loaded, &loaded).is_empty());
    assert!(diff(&loaded, &version_two()).is_empty());
}
