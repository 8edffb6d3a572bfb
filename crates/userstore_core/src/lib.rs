//! Core user persistence for userstore.
//! Owns the user model, the repository contract and its storage backends.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{DbLocation, StoreConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::spec::UserSpec;
pub use model::user::{User, UserId, UserValidationError};
pub use repo::memory_user_repo::InMemoryUserRepository;
pub use repo::sqlite_user_repo::SqliteUserRepository;
pub use repo::user_repo::{RepoError, RepoResult, StoreError, UserLookup, UserRepository};
pub use service::user_service::UserService;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
