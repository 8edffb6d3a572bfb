//! SQLite-backed user repository.
//!
//! # Responsibility
//! - Implement [`UserRepository`] over the migrated `users` table.
//! - Translate [`UserSpec`] trees into parameterized `WHERE` clauses.
//!
//! # Invariants
//! - Write paths call `User::validate()` before any SQL mutation.
//! - Read paths reject invalid persisted rows instead of masking them.
//! - `update_many` and `add_many` each run in a single transaction.
//! - Reads are ordered by `id ASC` unless input order applies.

use crate::db::migrations::latest_version;
use crate::model::spec::UserSpec;
use crate::model::user::{User, UserId};
use crate::repo::user_repo::{
    absorb, in_input_order, unresolved_ids, validate_for_update, RepoError, RepoResult, StoreError,
    UserLookup, UserRepository,
};
use log::{error, info, warn};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

const USER_SELECT_SQL: &str = "SELECT
    id,
    name,
    email
FROM users";

const USER_COLUMNS: [&str; 5] = ["id", "name", "email", "created_at", "updated_at"];

/// SQLite-backed user repository borrowing a migrated connection.
#[derive(Debug)]
pub struct SqliteUserRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteUserRepository<'conn> {
    /// Constructs a repository from a connection opened by `db::open_db*`.
    ///
    /// # Errors
    /// - `UninitializedConnection` when the schema version is not current.
    /// - `MissingRequiredTable` / `MissingRequiredColumn` when `users` is
    ///   absent or incomplete.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_user_connection_ready(conn)?;
        Ok(Self { conn })
    }

    fn select_users(&self, spec: &UserSpec) -> Result<Vec<User>, StoreError> {
        let mut binds = Vec::new();
        let predicate = spec_to_sql(spec, &mut binds);
        let sql = format!("{USER_SELECT_SQL} WHERE {predicate} ORDER BY id ASC;");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut users = Vec::new();
        while let Some(row) = rows.next()? {
            users.push(parse_user_row(row)?);
        }
        Ok(users)
    }

    fn delete_where(&self, spec: &UserSpec) -> Result<usize, StoreError> {
        let mut binds = Vec::new();
        let predicate = spec_to_sql(spec, &mut binds);
        let removed = self.conn.execute(
            &format!("DELETE FROM users WHERE {predicate};"),
            params_from_iter(binds),
        )?;
        Ok(removed)
    }

    fn delete_logged(&self, operation: &str, spec: &UserSpec) {
        match self.delete_where(spec) {
            Ok(removed) => info!(
                "event=user_{operation} module=repo status=ok removed={removed}"
            ),
            Err(cause) => absorb(operation, &RepoError::RemoveFailure(cause), ()),
        }
    }
}

impl UserRepository for SqliteUserRepository<'_> {
    fn get(&self, id: UserId) -> RepoResult<User> {
        self.select_users(&UserSpec::IdIn(vec![id]))
            .map_err(RepoError::GetFailure)?
            .into_iter()
            .next()
            .ok_or(RepoError::NotFound(UserLookup::Id(id)))
    }

    fn get_many(&self, ids: &[UserId]) -> RepoResult<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let found = self
            .select_users(&UserSpec::ids(ids.iter().copied()))
            .map_err(RepoError::GetFailure)?;
        let missing = unresolved_ids(ids, &found);
        if !missing.is_empty() {
            warn!(
                "event=user_get_many module=repo status=error error_code=user_get_failure requested={} missing={}",
                ids.len(),
                missing.len()
            );
            return Err(RepoError::GetFailure(StoreError::Missing(missing)));
        }

        Ok(in_input_order(ids, found))
    }

    fn get_by_spec(&self, spec: &UserSpec) -> RepoResult<Vec<User>> {
        self.select_users(spec).map_err(RepoError::GetFailure)
    }

    fn get_by_name(&self, name: &str) -> RepoResult<User> {
        self.select_users(&UserSpec::name_equals(name))
            .map_err(RepoError::GetFailure)?
            .into_iter()
            .next()
            .ok_or_else(|| RepoError::NotFound(UserLookup::Name(name.to_string())))
    }

    fn add(&self, user: &User) -> RepoResult<()> {
        user.validate().map_err(RepoError::add_failure)?;
        insert_user(self.conn, user).map_err(RepoError::AddFailure)?;
        info!("event=user_add module=repo status=ok id={}", user.id);
        Ok(())
    }

    fn update(&self, user: &User) -> RepoResult<()> {
        validate_for_update(user)?;

        let changed = update_user(self.conn, user).map_err(RepoError::update_failure)?;
        if changed == 0 {
            return Err(RepoError::NotFound(UserLookup::Id(user.id)));
        }

        info!("event=user_update module=repo status=ok id={}", user.id);
        Ok(())
    }

    fn update_many(&self, users: &[User]) -> RepoResult<()> {
        for user in users {
            user.validate().map_err(RepoError::update_failure)?;
        }
        if users.is_empty() {
            return Ok(());
        }

        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(RepoError::update_failure)?;
        let mut missing: Vec<UserId> = Vec::new();
        for user in users {
            let changed = update_user(&tx, user).map_err(RepoError::update_failure)?;
            if changed == 0 && !missing.contains(&user.id) {
                missing.push(user.id);
            }
        }

        if !missing.is_empty() {
            // Dropping `tx` rolls back every row written above.
            warn!(
                "event=user_update_many module=repo status=error error_code=user_update_failure requested={} missing={}",
                users.len(),
                missing.len()
            );
            return Err(RepoError::UpdateFailure(StoreError::Missing(missing)));
        }

        tx.commit().map_err(RepoError::update_failure)?;
        info!(
            "event=user_update_many module=repo status=ok updated={}",
            users.len()
        );
        Ok(())
    }

    fn add_many(&self, users: &[User]) {
        if users.is_empty() {
            return;
        }

        let tx = match self.conn.unchecked_transaction() {
            Ok(tx) => tx,
            Err(err) => return absorb("add_many", &RepoError::add_failure(err), ()),
        };

        let mut inserted = 0usize;
        for user in users {
            let outcome = user
                .validate()
                .map_err(StoreError::from)
                .and_then(|()| insert_user(&tx, user));
            match outcome {
                Ok(()) => inserted += 1,
                Err(cause) => absorb("add_many", &RepoError::AddFailure(cause), ()),
            }
        }

        match tx.commit() {
            Ok(()) => info!(
                "event=user_add_many module=repo status=ok requested={} inserted={} skipped={}",
                users.len(),
                inserted,
                users.len() - inserted
            ),
            Err(err) => error!(
                "event=user_add_many module=repo status=error error_code=commit_failed requested={} error={err}",
                users.len()
            ),
        }
    }

    fn remove(&self, id: UserId) {
        self.delete_logged("remove", &UserSpec::IdIn(vec![id]));
    }

    fn remove_many(&self, ids: &[UserId]) {
        if ids.is_empty() {
            return;
        }
        self.delete_logged("remove_many", &UserSpec::ids(ids.iter().copied()));
    }

    fn remove_by_spec(&self, spec: &UserSpec) {
        self.delete_logged("remove_by_spec", spec);
    }

    fn remove_all(&self) {
        self.delete_logged("remove_all", &UserSpec::All);
    }
}

/// Appends the SQL predicate for `spec` and pushes its bind values.
///
/// Every generated predicate evaluates to 0 or 1, never NULL, so `NOT`
/// agrees with [`UserSpec::is_satisfied_by`].
fn spec_to_sql(spec: &UserSpec, binds: &mut Vec<Value>) -> String {
    match spec {
        UserSpec::All => "1 = 1".to_string(),
        UserSpec::IdIn(ids) if ids.is_empty() => "1 = 0".to_string(),
        UserSpec::IdIn(ids) if ids.len() == 1 => {
            binds.push(Value::Integer(ids[0].get()));
            "id = ?".to_string()
        }
        UserSpec::IdIn(ids) => {
            // One bind per list keeps large id sets under SQLite's variable limit.
            binds.push(Value::Text(id_list_json(ids)));
            "id IN (SELECT value FROM json_each(?))".to_string()
        }
        UserSpec::NameEquals(name) => {
            binds.push(Value::Text(name.clone()));
            "name = ?".to_string()
        }
        UserSpec::NameContains(fragment) if fragment.is_empty() => "1 = 1".to_string(),
        UserSpec::NameContains(fragment) => {
            binds.push(Value::Text(fragment.clone()));
            "instr(name, ?) > 0".to_string()
        }
        UserSpec::EmailDomain(domain) => {
            binds.push(Value::Text(domain.clone()));
            "(email IS NOT NULL
              AND instr(email, '@') > 0
              AND lower(substr(email, instr(email, '@') + 1)) = lower(?))"
                .to_string()
        }
        UserSpec::HasEmail => "email IS NOT NULL".to_string(),
        UserSpec::And(parts) if parts.is_empty() => "1 = 1".to_string(),
        UserSpec::And(parts) => join_predicates(parts, " AND ", binds),
        UserSpec::Or(parts) if parts.is_empty() => "1 = 0".to_string(),
        UserSpec::Or(parts) => join_predicates(parts, " OR ", binds),
        UserSpec::Not(inner) => format!("NOT ({})", spec_to_sql(inner, binds)),
    }
}

fn id_list_json(ids: &[UserId]) -> String {
    let items = ids
        .iter()
        .map(|id| id.get().to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("[{items}]")
}

fn join_predicates(parts: &[UserSpec], separator: &str, binds: &mut Vec<Value>) -> String {
    let joined = parts
        .iter()
        .map(|part| spec_to_sql(part, binds))
        .collect::<Vec<_>>()
        .join(separator);
    format!("({joined})")
}

fn insert_user(conn: &Connection, user: &User) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO users (id, name, email) VALUES (?1, ?2, ?3);",
        params![user.id.get(), user.name.as_str(), user.email.as_deref()],
    )
    .map_err(|err| {
        if is_primary_key_violation(&err) {
            StoreError::Duplicate(user.id)
        } else {
            StoreError::from(err)
        }
    })?;
    Ok(())
}

fn update_user(conn: &Connection, user: &User) -> Result<usize, StoreError> {
    let changed = conn.execute(
        "UPDATE users
         SET
            name = ?1,
            email = ?2,
            updated_at = (strftime('%s', 'now') * 1000)
         WHERE id = ?3;",
        params![user.name.as_str(), user.email.as_deref(), user.id.get()],
    )?;
    Ok(changed)
}

fn is_primary_key_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

fn parse_user_row(row: &Row<'_>) -> Result<User, StoreError> {
    let user = User {
        id: UserId::new(row.get("id")?),
        name: row.get("name")?,
        email: row.get("email")?,
    };
    user.validate().map_err(|err| {
        StoreError::InvalidData(format!("row for user {} is invalid: {err}", user.id))
    })?;
    Ok(user)
}

fn ensure_user_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn
        .query_row("PRAGMA user_version;", [], |row| row.get(0))
        .map_err(RepoError::get_failure)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "users").map_err(RepoError::get_failure)? {
        return Err(RepoError::MissingRequiredTable("users"));
    }

    for column in USER_COLUMNS {
        if !table_has_column(conn, "users", column).map_err(RepoError::get_failure)? {
            return Err(RepoError::MissingRequiredColumn {
                table: "users",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::spec_to_sql;
    use crate::model::spec::UserSpec;
    use crate::model::user::UserId;
    use rusqlite::types::Value;

    #[test]
    fn empty_combinators_translate_to_constants() {
        let mut binds = Vec::new();
        assert_eq!(spec_to_sql(&UserSpec::IdIn(Vec::new()), &mut binds), "1 = 0");
        assert_eq!(spec_to_sql(&UserSpec::Or(Vec::new()), &mut binds), "1 = 0");
        assert_eq!(spec_to_sql(&UserSpec::And(Vec::new()), &mut binds), "1 = 1");
        assert!(binds.is_empty());
    }

    #[test]
    fn nested_spec_binds_values_in_placeholder_order() {
        let spec = UserSpec::ids([UserId::new(1), UserId::new(2)])
            .or(UserSpec::name_equals("Ann").negate());
        let mut binds = Vec::new();
        let sql = spec_to_sql(&spec, &mut binds);

        assert_eq!(
            sql,
            "(id IN (SELECT value FROM json_each(?)) OR NOT (name = ?))"
        );
        assert_eq!(
            binds,
            vec![
                Value::Text("[1,2]".to_string()),
                Value::Text("Ann".to_string())
            ]
        );
    }

    #[test]
    fn id_list_uses_one_bind_regardless_of_length() {
        let mut binds = Vec::new();
        assert_eq!(
            spec_to_sql(&UserSpec::ids([UserId::new(7)]), &mut binds),
            "id = ?"
        );
        assert_eq!(binds, vec![Value::Integer(7)]);

        let mut binds = Vec::new();
        let spec = UserSpec::ids((1..=40_000).map(UserId::new));
        spec_to_sql(&spec, &mut binds);
        assert_eq!(binds.len(), 1);
    }
}
