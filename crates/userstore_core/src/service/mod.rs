//! Use-case services over user persistence.
//!
//! # Responsibility
//! - Compose repository calls into caller-facing use cases.
//! - Keep front ends decoupled from storage details.

pub mod user_service;
