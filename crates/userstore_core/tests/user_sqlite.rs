use rusqlite::Connection;
use userstore_core::db::migrations::latest_version;
use userstore_core::db::{open_db, open_db_in_memory};
use userstore_core::{
    InMemoryUserRepository, RepoError, SqliteUserRepository, StoreError, User, UserId,
    UserRepository, UserSpec,
};

fn sample_users() -> Vec<User> {
    vec![
        User::new(1, "Ann Lee").with_email("ann@Example.com"),
        User::new(2, "Bob").with_email("bob@other.org"),
        User::new(3, "Cid Lee"),
        User::new(4, "Dee").with_email("dee@example.COM"),
        User::new(5, "lee"),
    ]
}

#[test]
fn users_survive_reopening_the_database_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("users.db");

    {
        let conn = open_db(&path).unwrap();
        let repo = SqliteUserRepository::try_new(&conn).unwrap();
        repo.add_many(&sample_users());
    }

    let conn = open_db(&path).unwrap();
    let repo = SqliteUserRepository::try_new(&conn).unwrap();
    assert_eq!(repo.find_all(), sample_users());
}

#[test]
fn sqlite_and_memory_agree_on_spec_evaluation() {
    let conn = open_db_in_memory().unwrap();
    let sqlite = SqliteUserRepository::try_new(&conn).unwrap();
    sqlite.add_many(&sample_users());
    let memory = InMemoryUserRepository::with_users(&sample_users());

    let specs = vec![
        UserSpec::All,
        UserSpec::IdIn(Vec::new()),
        UserSpec::ids([UserId::new(2), UserId::new(5), UserId::new(8)]),
        UserSpec::name_equals("Bob"),
        UserSpec::name_contains("Lee"),
        UserSpec::name_contains("lee"),
        UserSpec::name_contains(""),
        UserSpec::email_domain("EXAMPLE.com"),
        UserSpec::email_domain("@other.org"),
        UserSpec::HasEmail.negate(),
        UserSpec::email_domain("example.com").negate(),
        UserSpec::name_contains("Lee").and(UserSpec::HasEmail),
        UserSpec::name_equals("Bob").or(UserSpec::name_contains("ee").negate()),
        UserSpec::And(Vec::new()),
        UserSpec::Or(Vec::new()),
        UserSpec::Or(Vec::new()).negate(),
    ];

    for spec in &specs {
        assert_eq!(
            sqlite.get_by_spec(spec).unwrap(),
            memory.get_by_spec(spec).unwrap(),
            "backends disagree on {spec:?}"
        );
    }
}

fn check_id_lists_beyond_variable_limit(repo: &dyn UserRepository) {
    repo.add_many(&[User::new(1, "Ann"), User::new(2, "Bob")]);
    let mut ids: Vec<UserId> = (1..=40_000).map(UserId::new).collect();
    ids.push(UserId::new(1));

    let found: Vec<i64> = repo.find_many(&ids).iter().map(|user| user.id.get()).collect();
    assert_eq!(found, vec![1, 2, 1]);

    match repo.get_many(&ids).unwrap_err() {
        RepoError::GetFailure(StoreError::Missing(missing)) => {
            assert_eq!(missing.len(), 39_998);
            assert_eq!(missing[0], UserId::new(3));
        }
        other => panic!("unexpected error: {other}"),
    }

    let existing: Vec<UserId> = [UserId::new(1), UserId::new(2)]
        .into_iter()
        .cycle()
        .take(40_000)
        .collect();
    assert_eq!(repo.get_many(&existing).unwrap().len(), 40_000);

    repo.remove_many(&ids);
    assert!(repo.find_all().is_empty());
}

#[test]
fn id_lists_beyond_sqlite_variable_limit_behave_like_memory() {
    let conn = open_db_in_memory().unwrap();
    check_id_lists_beyond_variable_limit(&SqliteUserRepository::try_new(&conn).unwrap());
    check_id_lists_beyond_variable_limit(&InMemoryUserRepository::new());
}

#[test]
fn repository_rejects_uninitialized_connection() {
    let conn = Connection::open_in_memory().unwrap();

    match SqliteUserRepository::try_new(&conn) {
        Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version: 0,
        }) => assert_eq!(expected_version, latest_version()),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected uninitialized connection error"),
    }
}

#[test]
fn repository_rejects_connection_without_users_table() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(&format!("PRAGMA user_version = {};", latest_version()))
        .unwrap();

    assert!(matches!(
        SqliteUserRepository::try_new(&conn),
        Err(RepoError::MissingRequiredTable("users"))
    ));
}

#[test]
fn repository_rejects_users_table_missing_a_column() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE users (
            id INTEGER PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            email TEXT,
            created_at INTEGER NOT NULL DEFAULT 0
        );",
    )
    .unwrap();
    conn.execute_batch(&format!("PRAGMA user_version = {};", latest_version()))
        .unwrap();

    assert!(matches!(
        SqliteUserRepository::try_new(&conn),
        Err(RepoError::MissingRequiredColumn {
            table: "users",
            column: "updated_at"
        })
    ));
}

#[test]
fn invalid_persisted_row_is_a_get_failure_and_absent_for_find() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO users (id, name, email) VALUES (7, 'Eve', 'broken');",
        [],
    )
    .unwrap();
    let repo = SqliteUserRepository::try_new(&conn).unwrap();

    let err = repo.get(UserId::new(7)).unwrap_err();
    assert!(matches!(err, RepoError::GetFailure(StoreError::InvalidData(_))));
    assert!(repo.find(UserId::new(7)).is_none());
    assert!(repo.find_all().is_empty());
}

#[test]
fn update_touches_updated_at_only_for_target_row() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteUserRepository::try_new(&conn).unwrap();
    repo.add_many(&sample_users());
    conn.execute("UPDATE users SET updated_at = 0;", []).unwrap();

    repo.update(&User::new(2, "Robert")).unwrap();

    let touched: Vec<i64> = {
        let mut stmt = conn
            .prepare("SELECT id FROM users WHERE updated_at > 0 ORDER BY id;")
            .unwrap();
        let rows = stmt.query_map([], |row| row.get(0)).unwrap();
        rows.map(Result::unwrap).collect()
    };
    assert_eq!(touched, vec![2]);
    assert_eq!(repo.get(UserId::new(2)).unwrap().email, None);
}

#[test]
fn update_many_rolls_back_rows_written_before_the_missing_id() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.db");
    let conn = open_db(&path).unwrap();
    let repo = SqliteUserRepository::try_new(&conn).unwrap();
    repo.add_many(&sample_users());

    let batch = vec![
        User::new(1, "Ann v2"),
        User::new(2, "Bob v2"),
        User::new(40, "Missing"),
        User::new(3, "Cid v2"),
    ];
    assert!(repo.update_many(&batch).is_err());

    drop(repo);
    drop(conn);
    let reopened = open_db(&path).unwrap();
    let repo = SqliteUserRepository::try_new(&reopened).unwrap();
    assert_eq!(repo.find_all(), sample_users());
}
