//! User persistence contract and its backends.
//!
//! # Responsibility
//! - Define the storage-agnostic `UserRepository` contract.
//! - Provide SQLite and in-memory implementations of it.
//!
//! # Invariants
//! - Repository writes enforce `User::validate()` before persistence.
//! - "Not found" and "store failure" stay distinct error tags.

pub mod memory_user_repo;
pub mod sqlite_user_repo;
pub mod user_repo;
