//! phoenix: the migration CLI
//!
//! # Usage
//!
//! ```bash
//! # Create the log table
//! phoenix init
//!
//! # Apply pending migrations, or just print their SQL
//! phoenix migrate
//! phoenix migrate --dry-run --target 20240301123045
//!
//! # Revert the last migration / all of them
//! phoenix rollback
//! phoenix rollback --all
//!
//! # Compare two environments
//! phoenix diff --source local --target staging
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use phoenix::adapter::{self, Adapter};
use phoenix::builder::BuildContext;
use phoenix::comparator::diff;
use phoenix::config::{Config, Environment};
use phoenix::migration::{discover, Manager, MigrateOptions, RollbackOptions};
use phoenix::table::TableChange;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "phoenix")]
#[command(version)]
#[command(about = "Reversible, versioned schema migrations", long_about = None)]
struct Cli {
    /// Config file (default: ./phoenix.toml, then the user config dir)
    #[arg(short, long, global = true, env = "PHOENIX_CONFIG")]
    config: Option<PathBuf>,

    /// Environment to use (default: `default_environment`)
    #[arg(short, long, global = true, env = "PHOENIX_ENV")]
    env: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the migration log table
    Init,
    /// Apply pending migrations
    Migrate {
        /// Print the SQL instead of executing it
        #[arg(long)]
        dry_run: bool,
        /// Only the oldest pending migration
        #[arg(long)]
        first: bool,
        /// Apply up to and including this datetime
        #[arg(long)]
        target: Option<String>,
        /// Limit to these migration dirs
        #[arg(short, long)]
        dir: Vec<String>,
    },
    /// Revert applied migrations
    Rollback {
        #[arg(long)]
        dry_run: bool,
        /// Revert every applied migration
        #[arg(long, conflicts_with_all = ["target", "limit"])]
        all: bool,
        /// Revert down to and including this datetime
        #[arg(long)]
        target: Option<String>,
        /// Number of migrations to revert
        #[arg(long)]
        limit: Option<usize>,
        #[arg(short, long)]
        dir: Vec<String>,
    },
    /// List migrations and when they ran
    Status {
        #[arg(short, long)]
        dir: Vec<String>,
    },
    /// Print the SQL turning one environment's schema into another's
    Diff {
        #[arg(long)]
        source: String,
        #[arg(long)]
        target: String,
    },
    /// Print CREATE statements for the current schema
    Dump,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("phoenix=info")))
        .with_target(false)
        .init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::locate()?,
    };
    Config::load(&path).with_context(|| format!("loading {}", path.display()))
}

fn manager(config: &Config, environment: &Environment, dirs: &[String]) -> Result<Manager> {
    let adapter = adapter::connect(environment)?;
    let mut manager = Manager::from_config(adapter, config, environment);
    if !config.migration_dirs.is_empty() {
        for migration in discover(&config.migration_dirs(dirs)?)? {
            manager.register(migration)?;
        }
    }
    Ok(manager)
}

fn print_statements(statements: &[String]) {
    for sql in statements {
        println!("{}", sql.white());
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let environment = config.environment(cli.env.as_deref())?;

    match &cli.command {
        Commands::Init => {
            let mut manager = manager(&config, environment, &[])?;
            if manager.init()? {
                println!("{} Created log table {}", "✓".green(), manager.log_table().cyan());
            } else {
                println!("{} Log table {} already exists", "○".dimmed(), manager.log_table().cyan());
            }
        }
        Commands::Migrate {
            dry_run,
            first,
            target,
            dir,
        } => {
            let mut manager = manager(&config, environment, dir)?;
            let options = MigrateOptions {
                dry_run: *dry_run,
                first: *first,
                target: target.clone(),
            };
            let pending = manager.find_migrations_to_execute(&options)?;
            if pending.is_empty() {
                println!("{}", "Nothing to migrate.".green());
                return Ok(());
            }
            let statements = manager.migrate(&options)?;
            if *dry_run {
                println!("{}", "Dry run, nothing executed:".yellow().bold());
                print_statements(&statements);
            }
            for id in &pending {
                println!("  {} {}", "↑".green(), id);
            }
            println!("{} {} migration(s), {} statement(s)", "✓".green(), pending.len(), statements.len());
        }
        Commands::Rollback {
            dry_run,
            all,
            target,
            limit,
            dir,
        } => {
            let mut manager = manager(&config, environment, dir)?;
            let options = RollbackOptions {
                dry_run: *dry_run,
                all: *all,
                target: target.clone(),
                limit: *limit,
            };
            let reverted = manager.find_migrations_to_rollback(&options)?;
            if reverted.is_empty() {
                println!("{}", "Nothing to roll back.".green());
                return Ok(());
            }
            let statements = manager.rollback(&options)?;
            if *dry_run {
                println!("{}", "Dry run, nothing executed:".yellow().bold());
                print_statements(&statements);
            }
            for id in &reverted {
                println!("  {} {}", "↓".yellow(), id);
            }
            println!("{} {} migration(s) rolled back", "✓".green(), reverted.len());
        }
        Commands::Status { dir } => {
            let mut manager = manager(&config, environment, dir)?;
            println!("{}", "Migration status".cyan().bold());
            for row in manager.status()? {
                let state = match (&row.executed_at, row.known) {
                    (Some(at), true) => format!("executed {at}").green(),
                    (Some(at), false) => format!("executed {at}, file missing").red(),
                    (None, _) => "pending".yellow(),
                };
                println!("  {:<14} {:<40} {}", row.id.datetime, row.id.class_name, state);
            }
        }
        Commands::Diff { source, target } => {
            let source_env = config.environment(Some(source))?;
            let target_env = config.environment(Some(target))?;
            let mut source_adapter = adapter::connect(source_env)?;
            let from = source_adapter.load_structure()?;
            let to = adapter::connect(target_env)?.load_structure()?;

            let changes = diff(&from, &to);
            if changes.is_empty() {
                println!("{}", "Schemas are identical.".green());
                return Ok(());
            }
            let mut working = from.clone();
            for change in &changes {
                let statements = source_adapter
                    .query_builder(BuildContext::new().with_structure(&working))
                    .build(change)?;
                print_statements(&statements);
                working.update(change)?;
            }
        }
        Commands::Dump => {
            let mut adapter: Box<dyn Adapter> = adapter::connect(environment)?;
            let structure = adapter.load_structure()?;
            let builder = adapter.query_builder(BuildContext::new());
            for table in structure.tables() {
                print_statements(&builder.build(&TableChange::create_from(table))?);
            }
        }
    }

    Ok(())
}
