//! In-memory user repository.
//!
//! # Responsibility
//! - Implement [`UserRepository`] without external storage.
//! - Serve as the reference backend for [`UserSpec`] evaluation.
//!
//! # Invariants
//! - Every operation holds the lock for its whole duration, so each call is
//!   atomic; sequences of calls are not.
//! - A poisoned lock is reported as `StoreError::Poisoned`, never unwrapped.

use crate::model::spec::UserSpec;
use crate::model::user::{User, UserId};
use crate::repo::user_repo::{
    absorb, unresolved_ids, validate_for_update, RepoError, RepoResult, StoreError, UserLookup,
    UserRepository,
};
use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

type UserMap = BTreeMap<UserId, User>;

/// Thread-safe user repository backed by an ordered map.
#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    users: RwLock<UserMap>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a repository pre-populated with `users`.
    ///
    /// Invalid users and repeated ids are skipped, matching `add_many`.
    pub fn with_users(users: &[User]) -> Self {
        let repo = Self::new();
        repo.add_many(users);
        repo
    }

    /// Number of stored users; `0` when the lock is poisoned.
    pub fn len(&self) -> usize {
        self.read().map_or(0, |users| users.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, UserMap>, StoreError> {
        self.users.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, UserMap>, StoreError> {
        self.users.write().map_err(|_| StoreError::Poisoned)
    }

    fn retain_logged(&self, operation: &str, spec: &UserSpec) {
        match self.write() {
            Ok(mut users) => {
                let before = users.len();
                users.retain(|_, user| !spec.is_satisfied_by(user));
                info!(
                    "event=user_{operation} module=repo status=ok removed={}",
                    before - users.len()
                );
            }
            Err(cause) => absorb(operation, &RepoError::RemoveFailure(cause), ()),
        }
    }
}

impl UserRepository for InMemoryUserRepository {
    fn get(&self, id: UserId) -> RepoResult<User> {
        self.read()
            .map_err(RepoError::GetFailure)?
            .get(&id)
            .cloned()
            .ok_or(RepoError::NotFound(UserLookup::Id(id)))
    }

    fn get_many(&self, ids: &[UserId]) -> RepoResult<Vec<User>> {
        let users = self.read().map_err(RepoError::GetFailure)?;
        let found: Vec<User> = ids.iter().filter_map(|id| users.get(id).cloned()).collect();
        if found.len() != ids.len() {
            return Err(RepoError::GetFailure(StoreError::Missing(unresolved_ids(
                ids, &found,
            ))));
        }
        Ok(found)
    }

    fn get_by_spec(&self, spec: &UserSpec) -> RepoResult<Vec<User>> {
        let users = self.read().map_err(RepoError::GetFailure)?;
        Ok(users
            .values()
            .filter(|user| spec.is_satisfied_by(user))
            .cloned()
            .collect())
    }

    fn get_by_name(&self, name: &str) -> RepoResult<User> {
        self.read()
            .map_err(RepoError::GetFailure)?
            .values()
            .find(|user| user.name == name)
            .cloned()
            .ok_or_else(|| RepoError::NotFound(UserLookup::Name(name.to_string())))
    }

    fn add(&self, user: &User) -> RepoResult<()> {
        user.validate().map_err(RepoError::add_failure)?;

        let mut users = self.write().map_err(RepoError::AddFailure)?;
        if users.contains_key(&user.id) {
            return Err(RepoError::AddFailure(StoreError::Duplicate(user.id)));
        }
        users.insert(user.id, user.clone());
        debug!("event=user_add module=repo status=ok id={}", user.id);
        Ok(())
    }

    fn update(&self, user: &User) -> RepoResult<()> {
        validate_for_update(user)?;

        let mut users = self.write().map_err(RepoError::UpdateFailure)?;
        match users.get_mut(&user.id) {
            Some(stored) => {
                *stored = user.clone();
                debug!("event=user_update module=repo status=ok id={}", user.id);
                Ok(())
            }
            None => Err(RepoError::NotFound(UserLookup::Id(user.id))),
        }
    }

    fn update_many(&self, users: &[User]) -> RepoResult<()> {
        for user in users {
            user.validate().map_err(RepoError::update_failure)?;
        }

        let mut stored = self.write().map_err(RepoError::UpdateFailure)?;
        let mut missing: Vec<UserId> = Vec::new();
        for user in users {
            if !stored.contains_key(&user.id) && !missing.contains(&user.id) {
                missing.push(user.id);
            }
        }
        if !missing.is_empty() {
            return Err(RepoError::UpdateFailure(StoreError::Missing(missing)));
        }

        for user in users {
            stored.insert(user.id, user.clone());
        }
        Ok(())
    }

    fn find_many(&self, ids: &[UserId]) -> Vec<User> {
        match self.read() {
            Ok(users) => ids.iter().filter_map(|id| users.get(id).cloned()).collect(),
            Err(cause) => absorb("find_many", &RepoError::GetFailure(cause), Vec::new()),
        }
    }

    fn add_many(&self, users: &[User]) {
        let mut stored = match self.write() {
            Ok(stored) => stored,
            Err(cause) => return absorb("add_many", &RepoError::AddFailure(cause), ()),
        };

        let mut inserted = 0usize;
        for user in users {
            let outcome = match user.validate() {
                Err(err) => Err(StoreError::Validation(err)),
                Ok(()) if stored.contains_key(&user.id) => Err(StoreError::Duplicate(user.id)),
                Ok(()) => Ok(()),
            };
            match outcome {
                Ok(()) => {
                    stored.insert(user.id, user.clone());
                    inserted += 1;
                }
                Err(cause) => absorb("add_many", &RepoError::AddFailure(cause), ()),
            }
        }

        debug!(
            "event=user_add_many module=repo status=ok requested={} inserted={}",
            users.len(),
            inserted
        );
    }

    fn remove(&self, id: UserId) {
        match self.write() {
            Ok(mut users) => {
                users.remove(&id);
            }
            Err(cause) => absorb("remove", &RepoError::RemoveFailure(cause), ()),
        }
    }

    fn remove_many(&self, ids: &[UserId]) {
        if ids.is_empty() {
            return;
        }
        self.retain_logged("remove_many", &UserSpec::ids(ids.iter().copied()));
    }

    fn remove_by_spec(&self, spec: &UserSpec) {
        self.retain_logged("remove_by_spec", spec);
    }

    fn remove_all(&self) {
        self.retain_logged("remove_all", &UserSpec::All);
    }
}

#[cfg(test)]
mod tests {
    use super::InMemoryUserRepository;
    use crate::model::user::{User, UserId};
    use crate::repo::user_repo::{RepoError, StoreError, UserRepository};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn with_users_skips_invalid_and_repeated_ids() {
        let repo = InMemoryUserRepository::with_users(&[
            User::new(1, "Ann"),
            User::new(1, "Ann again"),
            User::new(2, " "),
            User::new(3, "Cid"),
        ]);
        assert_eq!(repo.len(), 2);
        assert_eq!(repo.get(UserId::new(1)).unwrap().name, "Ann");
    }

    #[test]
    fn poisoned_lock_is_a_store_failure() {
        let repo = Arc::new(InMemoryUserRepository::with_users(&[User::new(1, "Ann")]));
        let poisoner = Arc::clone(&repo);
        let _ = thread::spawn(move || {
            let _guard = poisoner.users.write().unwrap();
            panic!("poison the user map");
        })
        .join();

        assert!(matches!(
            repo.get(UserId::new(1)),
            Err(RepoError::GetFailure(StoreError::Poisoned))
        ));
        assert!(repo.find(UserId::new(1)).is_none());
        assert!(repo.find_all().is_empty());
        assert!(repo.is_empty());
    }
}
