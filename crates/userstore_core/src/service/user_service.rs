//! User use-case service.
//!
//! # Responsibility
//! - Provide stable entry points for user registration and lookup.
//! - Compose read-then-write sequences the repository contract does not
//!   offer as single operations.
//!
//! # Invariants
//! - Service APIs never bypass repository validation.
//! - Composed operations (`rename`, `change_email`) are not atomic across
//!   concurrent writers.

use crate::model::spec::UserSpec;
use crate::model::user::{User, UserId};
use crate::repo::user_repo::{RepoResult, UserRepository};

/// Use-case wrapper around any [`UserRepository`].
pub struct UserService<R: UserRepository> {
    repo: R,
}

impl<R: UserRepository> UserService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Borrows the underlying repository.
    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Registers a new user; fails on a duplicate id or invalid fields.
    pub fn register(
        &self,
        id: UserId,
        name: impl Into<String>,
        email: Option<String>,
    ) -> RepoResult<User> {
        let user = User {
            id,
            name: name.into(),
            email,
        };
        self.repo.add(&user)?;
        Ok(user)
    }

    pub fn profile(&self, id: UserId) -> RepoResult<User> {
        self.repo.get(id)
    }

    pub fn lookup_by_name(&self, name: &str) -> RepoResult<User> {
        self.repo.get_by_name(name)
    }

    /// Renames an existing user and returns the stored record.
    pub fn rename(&self, id: UserId, new_name: impl Into<String>) -> RepoResult<User> {
        let mut user = self.repo.get(id)?;
        user.name = new_name.into();
        self.repo.update(&user)?;
        Ok(user)
    }

    /// Sets or clears the email of an existing user.
    pub fn change_email(&self, id: UserId, email: Option<String>) -> RepoResult<User> {
        let mut user = self.repo.get(id)?;
        user.email = email;
        self.repo.update(&user)?;
        Ok(user)
    }

    /// Best-effort search; store failures yield an empty list.
    pub fn search(&self, spec: &UserSpec) -> Vec<User> {
        self.repo.find_by_spec(spec)
    }

    pub fn directory(&self) -> Vec<User> {
        self.repo.find_all()
    }

    /// Removes a user if present; returns whether one existed beforehand.
    pub fn deregister(&self, id: UserId) -> bool {
        let existed = self.repo.find(id).is_some();
        self.repo.remove(id);
        existed
    }
}
