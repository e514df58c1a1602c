//! Migrations written as plain SQL files.
//!
//! A file named `20240301123045_add_users.sql` becomes migration
//! `20240301123045 AddUsers`. Its body is split into sections by marker lines:
//!
//! ```sql
//! -- up
//! CREATE TABLE users (id integer PRIMARY KEY);
//! -- down
//! DROP TABLE users;
//! ```
//!
//! A `-- no-transaction` line anywhere before the first section opts out of
//! the per-migration transaction.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{class_name_from, Migration, MigrationId, Plan};
use crate::error::{PhoenixError, PhoenixResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlFileMigration {
    id: MigrationId,
    path: PathBuf,
    up: Vec<String>,
    down: Vec<String>,
    use_transaction: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    Up,
    Down,
}

impl SqlFileMigration {
    /// Load one migration file.
    pub fn load(path: impl AsRef<Path>) -> PhoenixResult<Self> {
        let path = path.as_ref();
        let (datetime, name) = parse_file_name(path).ok_or_else(|| {
            PhoenixError::Migration(format!(
                "{} is not named <YYYYMMDDHHMMSS>_<name>.sql",
                path.display()
            ))
        })?;
        let content = fs::read_to_string(path)?;
        let mut migration = Self::parse(&datetime, &name, &content)
            .map_err(|e| PhoenixError::Migration(format!("{}: {e}", path.display())))?;
        migration.path = path.to_path_buf();
        Ok(migration)
    }

    pub fn parse(datetime: &str, name: &str, content: &str) -> PhoenixResult<Self> {
        let mut section = Section::Header;
        let mut use_transaction = true;
        let mut up = String::new();
        let mut down = String::new();

        for line in content.lines() {
            let marker = line.trim().strip_prefix("--").map(|m| m.trim().to_lowercase());
            match marker.as_deref() {
                Some("up") => section = Section::Up,
                Some("down") => section = Section::Down,
                Some("no-transaction") if section == Section::Header => use_transaction = false,
                _ => match section {
                    Section::Up => {
                        up.push_str(line);
                        up.push('\n');
                    }
                    Section::Down => {
                        down.push_str(line);
                        down.push('\n');
                    }
                    Section::Header if !line.trim().is_empty() && marker.is_none() => {
                        return Err(PhoenixError::Migration(
                            "statements before the `-- up` marker".into(),
                        ));
                    }
                    Section::Header => {}
                },
            }
        }

        Ok(Self {
            id: MigrationId::new(datetime, class_name_from(name))?,
            path: PathBuf::new(),
            up: split_statements(&up),
            down: split_statements(&down),
            use_transaction,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn up_statements(&self) -> &[String] {
        &self.up
    }

    pub fn down_statements(&self) -> &[String] {
        &self.down
    }
}

impl Migration for SqlFileMigration {
    fn id(&self) -> &MigrationId {
        &self.id
    }

    fn use_transaction(&self) -> bool {
        self.use_transaction
    }

    fn up(&self, plan: &mut Plan) -> PhoenixResult<()> {
        for sql in &self.up {
            plan.execute(sql.clone());
        }
        Ok(())
    }

    fn down(&self, plan: &mut Plan) -> PhoenixResult<()> {
        for sql in &self.down {
            plan.execute(sql.clone());
        }
        Ok(())
    }
}

/// `(datetime, name)` of `YYYYMMDDHHMMSS_name.sql`.
fn parse_file_name(path: &Path) -> Option<(String, String)> {
    if path.extension()? != "sql" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let (datetime, name) = stem.split_once('_')?;
    let valid = datetime.len() == 14
        && datetime.bytes().all(|b| b.is_ascii_digit())
        && !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    valid.then(|| (datetime.to_string(), name.to_string()))
}

/// Split a script on `;` outside quotes and comments. Empty statements are
/// dropped; each kept statement ends with `;`.
pub fn split_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = script.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            current.push(c);
            if c == q {
                // doubled quote is an escaped quote
                if chars.peek() == Some(&q) {
                    current.push(q);
                    chars.next();
                } else {
                    quote = None;
                }
            } else if c == '\\' && q == '\'' {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                current.push(c);
            }
            '-' if chars.peek() == Some(&'-') => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        current.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut previous = ' ';
                for skipped in chars.by_ref() {
                    if previous == '*' && skipped == '/' {
                        break;
                    }
                    previous = skipped;
                }
                current.push(' ');
            }
            ';' => {
                push_statement(&mut statements, &current);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    push_statement(&mut statements, &current);
    statements
}

fn push_statement(statements: &mut Vec<String>, text: &str) {
    let text = text.trim();
    if !text.is_empty() {
        statements.push(format!("{text};"));
    }
}

/// Every SQL-file migration in the given directories, sorted by identity.
pub fn discover(dirs: &[(String, PathBuf)]) -> PhoenixResult<Vec<SqlFileMigration>> {
    let mut migrations: Vec<SqlFileMigration> = Vec::new();
    for (name, dir) in dirs {
        let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .collect();
        entries.sort();
        for path in entries {
            if parse_file_name(&path).is_none() {
                debug!(dir = %name, file = %path.display(), "skipping non-migration file");
                continue;
            }
            let migration = SqlFileMigration::load(&path)?;
            if let Some(existing) = migrations.iter().find(|m| m.id == migration.id) {
                return Err(PhoenixError::Migration(format!(
                    "duplicate migration {}: {} and {}",
                    migration.id,
                    existing.path.display(),
                    path.display()
                )));
            }
            migrations.push(migration);
        }
    }
    migrations.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(migrations)
}
