//! Command-line front end for the user store.
//!
//! # Responsibility
//! - Map flags and environment variables onto `StoreConfig`.
//! - Run one repository use case per invocation and print JSON lines.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use userstore_core::{
    default_log_level, DbLocation, SqliteUserRepository, StoreConfig, UserId, UserService,
};

mod commands;

#[derive(Parser)]
#[command(name = "userstore")]
#[command(about = "Inspect and edit a userstore database", long_about = None)]
#[command(version)]
struct Cli {
    /// Database file; an in-memory store is used when omitted.
    #[arg(long, env = "USERSTORE_DB", global = true)]
    db: Option<PathBuf>,

    /// trace | debug | info | warn | error
    #[arg(long, env = "USERSTORE_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Directory for rolling log files; logging is off when omitted.
    #[arg(long, env = "USERSTORE_LOG_DIR", global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new user
    Add {
        id: UserId,
        name: String,
        #[arg(long)]
        email: Option<String>,
    },
    /// Print a user, failing when it does not exist
    Get { id: UserId },
    /// Print a user if it exists
    Find { id: UserId },
    /// Print the lowest-id user with exactly this name
    ByName { name: String },
    /// List users, optionally filtered
    List {
        #[arg(long)]
        name_contains: Option<String>,
        #[arg(long)]
        email_domain: Option<String>,
    },
    /// Change the name of an existing user
    Rename { id: UserId, name: String },
    /// Remove a user; unknown ids are ignored
    Remove { id: UserId },
    /// Remove every user
    Clear,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = store_config(&cli)?;

    config
        .init_logging()
        .map_err(anyhow::Error::msg)
        .context("failed to initialize logging")?;
    let conn = config.open().context("failed to open user store")?;
    let repo = SqliteUserRepository::try_new(&conn)?;

    commands::run(&UserService::new(repo), cli.command)
}

fn store_config(cli: &Cli) -> Result<StoreConfig> {
    let log_dir = match cli.log_dir.as_ref() {
        Some(dir) if dir.is_relative() => Some(
            std::env::current_dir()
                .context("failed to resolve current directory")?
                .join(dir),
        ),
        other => other.cloned(),
    };

    Ok(StoreConfig::default()
        .with_db(DbLocation::from_path(cli.db.clone()))
        .with_log_level(
            cli.log_level
                .clone()
                .unwrap_or_else(|| default_log_level().to_string()),
        )
        .with_log_dir(log_dir))
}
