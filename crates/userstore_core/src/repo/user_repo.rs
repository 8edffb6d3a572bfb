//! User repository contract and error taxonomy.
//!
//! # Responsibility
//! - Define the storage-agnostic user persistence contract.
//! - Keep "not found" and "store failure" as distinct error tags.
//!
//! # Invariants
//! - Throwing operations (`get*`, `add`, `update*`) report misses as errors.
//! - Nullable operations (`find*`, `add_many`, `remove*`) never return an
//!   error; store failures are logged and surface as absence.
//! - Bulk reads keep input order and return one user per resolved input.
//! - `get_many` and `update_many` are all-or-nothing.

use crate::db::DbError;
use crate::model::spec::UserSpec;
use crate::model::user::{User, UserId, UserValidationError};
use log::warn;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Key used by a lookup that found nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserLookup {
    Id(UserId),
    Name(String),
}

impl Display for UserLookup {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id {id}"),
            Self::Name(name) => write!(f, "name `{name}`"),
        }
    }
}

/// Underlying cause of a failed store operation.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    Validation(UserValidationError),
    /// A user with this id already exists.
    Duplicate(UserId),
    /// Ids a bulk operation required but could not resolve.
    Missing(Vec<UserId>),
    /// Persisted row cannot be converted to a valid `User`.
    InvalidData(String),
    /// In-memory store lock was poisoned by a panicking writer.
    Poisoned,
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Duplicate(id) => write!(f, "user {id} already exists"),
            Self::Missing(ids) => {
                let ids = ids
                    .iter()
                    .map(UserId::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "users not found: [{ids}]")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted user data: {message}"),
            Self::Poisoned => write!(f, "user store lock poisoned"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Duplicate(_) => None,
            Self::Missing(_) => None,
            Self::InvalidData(_) => None,
            Self::Poisoned => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<UserValidationError> for StoreError {
    fn from(value: UserValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Error returned by throwing repository operations and backend setup.
#[derive(Debug)]
pub enum RepoError {
    /// No user matches the requested id or name.
    NotFound(UserLookup),
    /// A read failed, or a bulk read could not resolve every id.
    GetFailure(StoreError),
    /// An insert violated a constraint or the store failed.
    AddFailure(StoreError),
    /// A write failed, or a bulk update referenced a missing id.
    UpdateFailure(StoreError),
    /// A delete failed; only logged, since removals return `()`.
    RemoveFailure(StoreError),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl RepoError {
    pub fn get_failure(cause: impl Into<StoreError>) -> Self {
        Self::GetFailure(cause.into())
    }

    pub fn add_failure(cause: impl Into<StoreError>) -> Self {
        Self::AddFailure(cause.into())
    }

    pub fn update_failure(cause: impl Into<StoreError>) -> Self {
        Self::UpdateFailure(cause.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Stable machine-readable code, safe to log.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "user_not_found",
            Self::GetFailure(_) => "user_get_failure",
            Self::AddFailure(_) => "user_add_failure",
            Self::UpdateFailure(_) => "user_update_failure",
            Self::RemoveFailure(_) => "user_remove_failure",
            Self::UninitializedConnection { .. } => "uninitialized_connection",
            Self::MissingRequiredTable(_) => "missing_required_table",
            Self::MissingRequiredColumn { .. } => "missing_required_column",
        }
    }

    /// Store-level cause, when the error carries one.
    pub fn store_cause(&self) -> Option<&StoreError> {
        match self {
            Self::GetFailure(cause)
            | Self::AddFailure(cause)
            | Self::UpdateFailure(cause)
            | Self::RemoveFailure(cause) => Some(cause),
            _ => None,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(lookup) => write!(f, "user not found by {lookup}"),
            Self::GetFailure(cause) => write!(f, "failed to get users: {cause}"),
            Self::AddFailure(cause) => write!(f, "failed to add user: {cause}"),
            Self::UpdateFailure(cause) => write!(f, "failed to update users: {cause}"),
            Self::RemoveFailure(cause) => write!(f, "failed to remove users: {cause}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "user repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "user repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "user repository requires column `{column}` in table `{table}`"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.store_cause().map(|cause| cause as &(dyn Error + 'static))
    }
}

/// Persistence contract for user records.
///
/// The nullable family has default implementations built on the throwing
/// family; backends override them where a direct query is cheaper.
pub trait UserRepository {
    /// Loads one user by id.
    fn get(&self, id: UserId) -> RepoResult<User>;

    /// Loads every requested user, in input order, or fails listing the
    /// ids that could not be resolved.
    fn get_many(&self, ids: &[UserId]) -> RepoResult<Vec<User>>;

    /// Loads users matching `spec`, ordered by id. Zero matches is `Ok`.
    fn get_by_spec(&self, spec: &UserSpec) -> RepoResult<Vec<User>>;

    /// Loads the user with exactly this name; the lowest id wins on ties.
    fn get_by_name(&self, name: &str) -> RepoResult<User>;

    fn add(&self, user: &User) -> RepoResult<()>;

    /// Replaces an existing user.
    ///
    /// A non-positive id can never be stored, so it reports `NotFound`
    /// rather than a validation failure.
    fn update(&self, user: &User) -> RepoResult<()>;

    /// Replaces every user in one unit; nothing changes on failure.
    fn update_many(&self, users: &[User]) -> RepoResult<()>;

    fn find(&self, id: UserId) -> Option<User> {
        match self.get(id) {
            Ok(user) => Some(user),
            Err(RepoError::NotFound(_)) => None,
            Err(err) => absorb("find", &err, None),
        }
    }

    fn find_many(&self, ids: &[UserId]) -> Vec<User> {
        if ids.is_empty() {
            return Vec::new();
        }
        let spec = UserSpec::ids(ids.iter().copied());
        match self.get_by_spec(&spec) {
            Ok(found) => in_input_order(ids, found),
            Err(err) => absorb("find_many", &err, Vec::new()),
        }
    }

    fn find_by_spec(&self, spec: &UserSpec) -> Vec<User> {
        self.get_by_spec(spec)
            .unwrap_or_else(|err| absorb("find_by_spec", &err, Vec::new()))
    }

    fn find_all(&self) -> Vec<User> {
        self.get_by_spec(&UserSpec::All)
            .unwrap_or_else(|err| absorb("find_all", &err, Vec::new()))
    }

    /// Inserts each user independently; rejected users are skipped.
    fn add_many(&self, users: &[User]) {
        for user in users {
            if let Err(err) = self.add(user) {
                absorb("add_many", &err, ());
            }
        }
    }

    fn remove(&self, id: UserId);

    fn remove_many(&self, ids: &[UserId]);

    fn remove_by_spec(&self, spec: &UserSpec);

    fn remove_all(&self);
}

/// Logs a failure swallowed by a nullable operation and returns `fallback`.
pub(crate) fn absorb<T>(operation: &str, err: &RepoError, fallback: T) -> T {
    match err.store_cause() {
        Some(cause) => warn!(
            "event=user_{operation} module=repo status=degraded error_code={} error={cause}",
            err.code()
        ),
        None => warn!(
            "event=user_{operation} module=repo status=degraded error_code={}",
            err.code()
        ),
    }
    fallback
}

/// Validates `user` for a single-row update.
pub(crate) fn validate_for_update(user: &User) -> RepoResult<()> {
    match user.validate() {
        Ok(()) => Ok(()),
        Err(UserValidationError::NonPositiveId(id)) => {
            Err(RepoError::NotFound(UserLookup::Id(id)))
        }
        Err(err) => Err(RepoError::update_failure(err)),
    }
}

/// Arranges `found` to follow `ids`, one entry per resolved input.
pub(crate) fn in_input_order(ids: &[UserId], found: Vec<User>) -> Vec<User> {
    let by_id: HashMap<UserId, User> = found.into_iter().map(|user| (user.id, user)).collect();
    ids.iter().filter_map(|id| by_id.get(id).cloned()).collect()
}

/// Ids from `ids` that are absent from `found`, deduplicated, in input order.
pub(crate) fn unresolved_ids(ids: &[UserId], found: &[User]) -> Vec<UserId> {
    let resolved: HashSet<UserId> = found.iter().map(|user| user.id).collect();
    let mut seen = HashSet::new();
    ids.iter()
        .copied()
        .filter(|id| !resolved.contains(id) && seen.insert(*id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{
        in_input_order, unresolved_ids, validate_for_update, RepoError, StoreError, UserLookup,
    };
    use crate::model::user::{User, UserId};
    use std::error::Error;

    #[test]
    fn in_input_order_follows_ids_and_skips_unresolved() {
        let found = vec![User::new(1, "Ann"), User::new(3, "Cid")];
        let ids = [UserId::new(3), UserId::new(2), UserId::new(1)];
        let ordered: Vec<i64> = in_input_order(&ids, found)
            .into_iter()
            .map(|user| user.id.get())
            .collect();
        assert_eq!(ordered, vec![3, 1]);
    }

    #[test]
    fn unresolved_ids_are_deduplicated() {
        let found = vec![User::new(1, "Ann")];
        let ids = [UserId::new(9), UserId::new(1), UserId::new(9)];
        assert_eq!(unresolved_ids(&ids, &found), vec![UserId::new(9)]);
    }

    #[test]
    fn failures_expose_store_cause_as_source() {
        let err = RepoError::add_failure(StoreError::Duplicate(UserId::new(4)));
        assert_eq!(err.code(), "user_add_failure");
        assert_eq!(err.to_string(), "failed to add user: user 4 already exists");
        assert!(err.source().is_some());

        let not_found = RepoError::NotFound(UserLookup::Name("Bob".to_string()));
        assert!(not_found.is_not_found());
        assert!(not_found.source().is_none());
    }

    #[test]
    fn remove_failures_have_their_own_code() {
        let err = RepoError::RemoveFailure(StoreError::Poisoned);
        assert_eq!(err.code(), "user_remove_failure");
        assert_eq!(
            err.to_string(),
            "failed to remove users: user store lock poisoned"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn update_validation_reports_non_positive_id_as_not_found() {
        assert!(validate_for_update(&User::new(0, "Ann"))
            .unwrap_err()
            .is_not_found());
        assert!(matches!(
            validate_for_update(&User::new(1, " ")),
            Err(RepoError::UpdateFailure(StoreError::Validation(_)))
        ));
        assert!(validate_for_update(&User::new(1, "Ann")).is_ok());
    }
}
