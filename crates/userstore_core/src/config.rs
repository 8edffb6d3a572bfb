//! Store configuration.
//!
//! # Responsibility
//! - Describe where the user store lives and how it logs.
//! - Open the configured database in one call.
//!
//! # Invariants
//! - An unset database location means a private in-memory store.
//! - `log_dir = None` leaves logging uninitialized.

use crate::db::{open_db, open_db_in_memory, DbResult};
use crate::logging::{default_log_level, init_logging};
use rusqlite::Connection;
use std::path::PathBuf;

/// Where user data is stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DbLocation {
    #[default]
    Memory,
    File(PathBuf),
}

impl DbLocation {
    pub fn from_path(path: Option<PathBuf>) -> Self {
        match path {
            Some(path) if !path.as_os_str().is_empty() => Self::File(path),
            _ => Self::Memory,
        }
    }
}

/// Runtime configuration for the user store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub db: DbLocation,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db: DbLocation::Memory,
            log_level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}

impl StoreConfig {
    pub fn with_db(mut self, db: DbLocation) -> Self {
        self.db = db;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_log_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.log_dir = dir;
        self
    }

    /// Starts file logging when a log directory is configured.
    ///
    /// # Errors
    /// - Returns the logging bootstrap message on invalid level/dir or on a
    ///   conflicting re-initialization.
    pub fn init_logging(&self) -> Result<(), String> {
        match self.log_dir.as_ref() {
            Some(dir) => {
                let dir = dir
                    .to_str()
                    .ok_or_else(|| format!("log_dir `{}` is not valid UTF-8", dir.display()))?;
                init_logging(&self.log_level, dir)
            }
            None => Ok(()),
        }
    }

    /// Opens and migrates the configured database.
    pub fn open(&self) -> DbResult<Connection> {
        match &self.db {
            DbLocation::Memory => open_db_in_memory(),
            DbLocation::File(path) => open_db(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DbLocation, StoreConfig};
    use std::path::PathBuf;

    #[test]
    fn empty_path_falls_back_to_memory() {
        assert_eq!(DbLocation::from_path(None), DbLocation::Memory);
        assert_eq!(
            DbLocation::from_path(Some(PathBuf::new())),
            DbLocation::Memory
        );
        assert_eq!(
            DbLocation::from_path(Some(PathBuf::from("users.db"))),
            DbLocation::File(PathBuf::from("users.db"))
        );
    }

    #[test]
    fn default_config_opens_memory_store_without_logging() {
        let config = StoreConfig::default();
        assert!(config.init_logging().is_ok());
        assert!(config.open().is_ok());
    }
}
