//! Domain model for user persistence.
//!
//! # Responsibility
//! - Define the user record, its identifier and caller-built filters.
//! - Keep validation independent from any storage backend.

pub mod spec;
pub mod user;
