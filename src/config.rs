//! Configuration loaded from `phoenix.toml`.
//!
//! ```toml
//! log_table_name = "phoenix_log"
//! default_environment = "local"
//!
//! [migration_dirs]
//! main = "migrations"
//!
//! [environments.local]
//! adapter = "mysql"
//! host = "localhost"
//! username = "root"
//! db_name = "app"
//! charset = "utf8mb4"
//!
//! [environments.test]
//! adapter = "sqlite"
//! dsn = ":memory:"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::builder::Dialect;
use crate::error::{PhoenixError, PhoenixResult};

pub const CONFIG_FILE: &str = "phoenix.toml";
pub const DEFAULT_LOG_TABLE: &str = "phoenix_log";

/// Which adapter an environment uses.
pub type AdapterKind = Dialect;

fn default_log_table_name() -> String {
    DEFAULT_LOG_TABLE.to_string()
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_log_table_name")]
    pub log_table_name: String,

    /// Named migration directories, in lookup order.
    #[serde(default)]
    pub migration_dirs: IndexMap<String, PathBuf>,

    #[serde(default)]
    pub environments: IndexMap<String, Environment>,

    #[serde(default)]
    pub default_environment: Option<String>,

    /// Directory relative migration paths resolve against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_table_name: default_log_table_name(),
            migration_dirs: IndexMap::new(),
            environments: IndexMap::new(),
            default_environment: None,
            base_dir: PathBuf::from("."),
        }
    }
}

/// Connection settings of one environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub adapter: AdapterKind,
    /// Full connection URL; wins over the individual fields.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub db_name: Option<String>,
    /// SQLite database file, or `:memory:`.
    #[serde(default)]
    pub dsn: Option<String>,
    /// Applied to created tables that set none.
    #[serde(default)]
    pub charset: Option<String>,
    #[serde(default)]
    pub collation: Option<String>,
}

impl Environment {
    pub fn sqlite_memory() -> Self {
        Self {
            adapter: Dialect::Sqlite,
            dsn: Some(":memory:".into()),
            ..Default::default()
        }
    }

    /// Connection URL understood by the sqlx drivers.
    pub fn url(&self) -> PhoenixResult<String> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }

        match self.adapter {
            Dialect::Sqlite => match self.dsn.as_deref() {
                Some(":memory:") => Ok("sqlite::memory:".into()),
                Some(path) => Ok(format!("sqlite://{path}?mode=rwc")),
                None => Err(PhoenixError::Config("sqlite environment needs `dsn` or `url`".into())),
            },
            Dialect::MySql => self.server_url("mysql", 3306),
            Dialect::Postgres => self.server_url("postgres", 5432),
        }
    }

    fn server_url(&self, scheme: &str, default_port: u16) -> PhoenixResult<String> {
        let db_name = self
            .db_name
            .as_deref()
            .ok_or_else(|| PhoenixError::Config(format!("{} environment needs `db_name` or `url`", self.adapter)))?;
        let host = self.host.as_deref().unwrap_or("localhost");
        let port = self.port.unwrap_or(default_port);

        let invalid = |what: &str| PhoenixError::Config(format!("{} environment has an invalid {what}", self.adapter));
        let mut url = Url::parse(&format!("{scheme}://{host}:{port}")).map_err(|e| invalid(&e.to_string()))?;
        if let Some(user) = &self.username {
            url.set_username(user).map_err(|_| invalid("username"))?;
            url.set_password(self.password.as_deref()).map_err(|_| invalid("password"))?;
        }
        url.path_segments_mut().map_err(|_| invalid("host"))?.push(db_name);
        Ok(url.to_string())
    }
}

impl Config {
    pub fn from_toml(content: &str) -> PhoenixResult<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a config file; relative migration dirs resolve against its directory.
    pub fn load(path: impl AsRef<Path>) -> PhoenixResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| PhoenixError::Config(format!("cannot read {}: {e}", path.display())))?;
        let mut config = Self::from_toml(&content)?;
        config.base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(config)
    }

    /// `./phoenix.toml`, else `<config dir>/phoenix/phoenix.toml`.
    pub fn locate() -> PhoenixResult<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE);
        if local.is_file() {
            return Ok(local);
        }
        if let Some(global) = dirs::config_dir().map(|d| d.join("phoenix").join(CONFIG_FILE))
            && global.is_file()
        {
            return Ok(global);
        }
        Err(PhoenixError::Config(format!(
            "{CONFIG_FILE} not found in the current directory or the user config directory"
        )))
    }

    fn validate(&self) -> PhoenixResult<()> {
        if self.log_table_name.trim().is_empty() {
            return Err(PhoenixError::Config("log_table_name must not be empty".into()));
        }
        if let Some(name) = &self.default_environment
            && !self.environments.contains_key(name)
        {
            return Err(PhoenixError::Config(format!(
                "default environment '{name}' is not defined"
            )));
        }
        Ok(())
    }

    /// Environment by name, falling back to the default, then to the only one.
    pub fn environment(&self, name: Option<&str>) -> PhoenixResult<&Environment> {
        let name = match name.or(self.default_environment.as_deref()) {
            Some(name) => name,
            None if self.environments.len() == 1 => {
                return self
                    .environments
                    .values()
                    .next()
                    .ok_or_else(|| PhoenixError::Config("no environment configured".into()));
            }
            None => return Err(PhoenixError::Config("no environment selected".into())),
        };
        self.environments
            .get(name)
            .ok_or_else(|| PhoenixError::Config(format!("environment '{name}' is not defined")))
    }

    /// Existing migration directories, optionally limited to the named ones.
    pub fn migration_dirs(&self, only: &[String]) -> PhoenixResult<Vec<(String, PathBuf)>> {
        if self.migration_dirs.is_empty() {
            return Err(PhoenixError::Config("no migration_dirs configured".into()));
        }
        for name in only {
            if !self.migration_dirs.contains_key(name) {
                return Err(PhoenixError::Config(format!("migration dir '{name}' is not defined")));
            }
        }

        let mut dirs = Vec::new();
        for (name, path) in &self.migration_dirs {
            if !only.is_empty() && !only.contains(name) {
                continue;
            }
            let path = if path.is_absolute() { path.clone() } else { self.base_dir.join(path) };
            if !path.is_dir() {
                return Err(PhoenixError::Config(format!(
                    "migration dir '{name}' ({}) does not exist",
                    path.display()
                )));
            }
            dirs.push((name.clone(), path));
        }
        Ok(dirs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
default_environment = "local"

[migration_dirs]
main = "migrations"

[environments.local]
adapter = "mysql"
host = "db"
username = "root"
password = "p@ss"
db_name = "app"
charset = "utf8mb4"

[environments.pg]
adapter = "postgresql"
port = 6543
db_name = "app"

[environments.test]
adapter = "sqlite"
dsn = ":memory:"
"#;

    #[test]
    fn test_parse_config() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(config.log_table_name, "phoenix_log");
        assert_eq!(config.environments.len(), 3);

        let local = config.environment(None).unwrap();
        assert_eq!(local.adapter, Dialect::MySql);
        assert_eq!(local.charset.as_deref(), Some("utf8mb4"));
        assert_eq!(local.url().unwrap(), "mysql://root:p%40ss@db:3306/app");

        let pg = config.environment(Some("pg")).unwrap();
        assert_eq!(pg.adapter, Dialect::Postgres);
        assert_eq!(pg.url().unwrap(), "postgres://localhost:6543/app");

        assert_eq!(config.environment(Some("test")).unwrap().url().unwrap(), "sqlite::memory:");
    }

    #[test]
    fn test_explicit_url_wins() {
        let env = Environment {
            adapter: Dialect::Postgres,
            url: Some("postgres://u@h/db".into()),
            db_name: Some("ignored".into()),
            ..Default::default()
        };
        assert_eq!(env.url().unwrap(), "postgres://u@h/db");
    }

    #[test]
    fn test_config_errors() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert!(matches!(config.environment(Some("prod")), Err(PhoenixError::Config(_))));
        assert!(matches!(
            config.migration_dirs(&["other".to_string()]),
            Err(PhoenixError::Config(_))
        ));

        let err = Config::from_toml("default_environment = \"x\"").unwrap_err();
        assert!(matches!(err, PhoenixError::Config(_)));

        let err = Config::from_toml("[environments.a]\nadapter = \"oracle\"").unwrap_err();
        assert!(matches!(err, PhoenixError::Toml(_)));

        let mysql = Environment::default();
        assert!(matches!(mysql.url(), Err(PhoenixError::Config(_))));
    }

    #[test]
    fn test_credentials_are_percent_encoded() {
        let env = Environment {
            adapter: Dialect::Postgres,
            host: Some("db".into()),
            username: Some("app user".into()),
            password: Some("pa\tss\\w^rd:@/".into()),
            db_name: Some("app".into()),
            ..Default::default()
        };
        let url = env.url().unwrap();
        assert_eq!(url, "postgres://app%20user:pa%09ss%5Cw%5Erd%3A%40%2F@db:5432/app");

        let parsed = Url::parse(&url).unwrap();
        assert_eq!(parsed.host_str(), Some("db"));
        assert_eq!(parsed.password(), Some("pa%09ss%5Cw%5Erd%3A%40%2F"));
    }

    #[test]
    fn test_migration_dirs_resolve_against_config_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("migrations")).unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, SAMPLE).unwrap();

        let config = Config::load(&path).unwrap();
        let dirs = config.migration_dirs(&[]).unwrap();
        assert_eq!(dirs, vec![("main".to_string(), dir.path().join("migrations"))]);
    }
}
