//! Durable user store on SQLite.
//!
//! # Invariants
//! - The schema is migrated before the store is handed out.
//! - `users.email` is unique; a clash surfaces as [`StoreError::Conflict`].
//! - Ids come from `AUTOINCREMENT`, so they are never reused after a delete.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use tracing::{error, info};

use super::{migrations, Entity, Page, Store, StoreError, StoreResult};
use crate::resource::user::{User, UserFilter, UserInput, UserPatch};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SELECT_USER: &str = "SELECT id, name, email, age, bio, created_at, updated_at FROM users";

/// SQLite-backed [`Store`] for [`User`].
///
/// One connection behind one lock: SQLite serialises writers anyway.
pub struct SqliteUserStore {
    conn: Mutex<Connection>,
}

impl SqliteUserStore {
    /// Opens (creating if needed) the database file and applies migrations.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let started = Instant::now();
        let conn = Connection::open(path).map_err(|e| {
            error!(path = %path.display(), "database open failed: {e}");
            StoreError::from(e)
        })?;
        let store = Self::bootstrap(conn)?;
        info!(path = %path.display(), duration_ms = started.elapsed().as_millis() as u64, "user database ready");
        Ok(store)
    }

    /// In-memory database; contents vanish with the store.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::bootstrap(Connection::open_in_memory()?)
    }

    fn bootstrap(mut conn: Connection) -> StoreResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        migrations::apply(&mut conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Loads the row, applies `edit` and writes every column back in one
    /// transaction.
    fn rewrite(&self, id: i64, edit: impl FnOnce(&mut User)) -> StoreResult<User> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let mut user = fetch(&tx, id)?;
        edit(&mut user);
        tx.execute(
            "UPDATE users
             SET name = ?1, email = ?2, age = ?3, bio = ?4, updated_at = ?5
             WHERE id = ?6",
            params![user.name, user.email, user.age, user.bio, user.updated_at, id],
        )
        .map_err(unique_email)?;
        tx.commit()?;
        Ok(user)
    }
}

fn fetch(conn: &Connection, id: i64) -> StoreResult<User> {
    conn.query_row(&format!("{SELECT_USER} WHERE id = ?1"), [id], read_user)
        .optional()?
        .ok_or(StoreError::NotFound { resource: User::KIND, id })
}

fn insert(conn: &Connection, user: &User) -> StoreResult<i64> {
    conn.execute(
        "INSERT INTO users (name, email, age, bio, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![user.name, user.email, user.age, user.bio, user.created_at, user.updated_at],
    )
    .map_err(unique_email)?;
    Ok(conn.last_insert_rowid())
}

fn read_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        age: row.get(3)?,
        bio: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn unique_email(e: rusqlite::Error) -> StoreError {
    let is_email_clash = e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation)
        && e.to_string().contains("users.email");
    if is_email_clash {
        StoreError::Conflict("Email already registered".to_owned())
    } else {
        e.into()
    }
}

/// Escapes `LIKE` metacharacters so the needle matches literally.
/// SQLite's `LIKE` folds ASCII case only, which is what `User::matches` does too.
fn like_literal(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn sql_limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

impl Store<User> for SqliteUserStore {
    fn create(&self, input: UserInput) -> StoreResult<User> {
        let conn = self.lock()?;
        // Placeholder id; the real one comes from AUTOINCREMENT.
        let mut user = User::build(0, input, Utc::now());
        user.id = insert(&conn, &user)?;
        info!(kind = User::KIND, id = user.id, "created");
        Ok(user)
    }

    fn create_many(&self, inputs: Vec<UserInput>) -> StoreResult<Vec<User>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now();

        let mut created = Vec::with_capacity(inputs.len());
        for input in inputs {
            let mut user = User::build(0, input, now);
            user.id = insert(&tx, &user)?;
            created.push(user);
        }
        tx.commit()?;
        info!(kind = User::KIND, count = created.len(), "created batch");
        Ok(created)
    }

    fn get(&self, id: i64) -> StoreResult<User> {
        fetch(&*self.lock()?, id)
    }

    fn list(&self, filter: &UserFilter, page: Page) -> StoreResult<Vec<User>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            "{SELECT_USER}
             WHERE (?1 IS NULL OR email = ?1)
               AND (?2 IS NULL OR name LIKE '%' || ?2 || '%' ESCAPE '\\')
             ORDER BY id
             LIMIT ?3 OFFSET ?4"
        ))?;
        let rows = stmt.query_map(
            params![
                filter.email,
                filter.name.as_deref().map(like_literal),
                sql_limit(page.limit),
                sql_limit(page.skip)
            ],
            read_user,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn update(&self, id: i64, input: UserInput) -> StoreResult<User> {
        let user = self.rewrite(id, |u| u.replace(input, Utc::now()))?;
        info!(kind = User::KIND, id, "replaced");
        Ok(user)
    }

    fn patch(&self, id: i64, patch: UserPatch) -> StoreResult<User> {
        let user = self.rewrite(id, |u| u.merge(patch, Utc::now()))?;
        info!(kind = User::KIND, id, "patched");
        Ok(user)
    }

    fn delete(&self, id: i64) -> StoreResult<()> {
        let changed = self.lock()?.execute("DELETE FROM users WHERE id = ?1", [id])?;
        if changed == 0 {
            return Err(StoreError::NotFound { resource: User::KIND, id });
        }
        info!(kind = User::KIND, id, "deleted");
        Ok(())
    }

    fn ping(&self) -> StoreResult<()> {
        self.lock()?.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::latest_version;

    fn input(name: &str, email: &str, age: Option<i64>) -> UserInput {
        UserInput { name: name.to_owned(), email: email.to_owned(), age, bio: None }
    }

    #[test]
    fn create_then_get_round_trips() {
        let store = SqliteUserStore::open_in_memory().unwrap();
        let created = store.create(input("John Doe", "john@example.com", Some(30))).unwrap();

        assert_eq!(created.id, 1);
        assert_eq!(store.get(1).unwrap(), created);
        assert!(matches!(store.get(999), Err(StoreError::NotFound { resource: "User", id: 999 })));
    }

    #[test]
    fn duplicate_email_is_a_conflict() {
        let store = SqliteUserStore::open_in_memory().unwrap();
        store.create(input("A", "a@example.com", None)).unwrap();
        let b = store.create(input("B", "b@example.com", None)).unwrap();

        assert!(matches!(store.create(input("C", "a@example.com", None)), Err(StoreError::Conflict(_))));
        assert!(matches!(store.update(b.id, input("B", "a@example.com", None)), Err(StoreError::Conflict(_))));
        assert_eq!(store.get(b.id).unwrap().email, "b@example.com");
    }

    #[test]
    fn update_replaces_and_is_idempotent() {
        let store = SqliteUserStore::open_in_memory().unwrap();
        let mut original = input("John", "john@example.com", Some(30));
        original.bio = Some("hi".to_owned());
        let u = store.create(original).unwrap();

        let once = store.update(u.id, input("John", "john@example.com", Some(31))).unwrap();
        let twice = store.update(u.id, input("John", "john@example.com", Some(31))).unwrap();

        assert_eq!(once, twice);
        assert_eq!(once.age, Some(31));
        assert_eq!(once.bio, None);
        assert_eq!(store.get(u.id).unwrap(), twice);
    }

    #[test]
    fn patch_merges_and_can_clear_nullable_fields() {
        let store = SqliteUserStore::open_in_memory().unwrap();
        let u = store.create(input("John", "john@example.com", Some(30))).unwrap();

        let patched = store.patch(u.id, UserPatch { age: Some(None), ..UserPatch::default() }).unwrap();
        assert_eq!(patched.age, None);
        assert_eq!(patched.name, "John");
        assert!(patched.updated_at >= u.updated_at);
    }

    #[test]
    fn list_filters_orders_and_pages() {
        let store = SqliteUserStore::open_in_memory().unwrap();
        for i in 0..12 {
            store.create(input(&format!("user{i}"), &format!("u{i}@example.com"), None)).unwrap();
        }

        let first = store.list(&UserFilter::default(), Page::default()).unwrap();
        assert_eq!(first.len(), 10);
        let second = store.list(&UserFilter::default(), Page { skip: 10, limit: 10 }).unwrap();
        assert_eq!(second.iter().map(|u| u.id).collect::<Vec<_>>(), vec![11, 12]);

        let by_email = UserFilter { email: Some("u3@example.com".to_owned()), ..UserFilter::default() };
        assert_eq!(store.list(&by_email, Page::default()).unwrap()[0].id, 4);

        let by_name = UserFilter { name: Some("user1".to_owned()), ..UserFilter::default() };
        let ids: Vec<_> = store.list(&by_name, Page::everything()).unwrap().iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![2, 11, 12]);
    }

    #[test]
    fn name_filter_agrees_with_the_memory_store() {
        let sqlite = SqliteUserStore::open_in_memory().unwrap();
        let memory = crate::store::MemoryStore::<User>::new();
        for (i, name) in ["Ann", "Bob", "Émile", "100%_sure", "back\\slash"].into_iter().enumerate() {
            let email = format!("u{i}@example.com");
            sqlite.create(input(name, &email, None)).unwrap();
            memory.create(input(name, &email, None)).unwrap();
        }

        for needle in ["_", "%", "\\", "%_", "émile", "MILE", "AN", "b", "zzz"] {
            let filter = UserFilter { name: Some(needle.to_owned()), ..UserFilter::default() };
            let ids = |users: Vec<User>| users.iter().map(|u| u.id).collect::<Vec<_>>();
            assert_eq!(
                ids(sqlite.list(&filter, Page::everything()).unwrap()),
                ids(memory.list(&filter, Page::everything()).unwrap()),
                "needle {needle:?}"
            );
        }

        let literal = UserFilter { name: Some("%_".to_owned()), ..UserFilter::default() };
        assert_eq!(sqlite.list(&literal, Page::everything()).unwrap()[0].id, 4);
    }

    #[test]
    fn delete_then_get_is_not_found_and_ids_are_not_reused() {
        let store = SqliteUserStore::open_in_memory().unwrap();
        let u = store.create(input("A", "a@example.com", None)).unwrap();
        store.delete(u.id).unwrap();

        assert!(matches!(store.get(u.id), Err(StoreError::NotFound { .. })));
        assert!(matches!(store.delete(u.id), Err(StoreError::NotFound { .. })));
        assert_eq!(store.create(input("B", "b@example.com", None)).unwrap().id, 2);
    }

    #[test]
    fn batch_insert_rolls_back_on_conflict() {
        let store = SqliteUserStore::open_in_memory().unwrap();
        let res = store.create_many(vec![input("A", "a@example.com", None), input("B", "a@example.com", None)]);
        assert!(matches!(res, Err(StoreError::Conflict(_))));
        assert!(store.list(&UserFilter::default(), Page::default()).unwrap().is_empty());
    }

    #[test]
    fn contents_survive_reopening_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.db");

        let created = {
            let store = SqliteUserStore::open(&path).unwrap();
            store.create(input("John Doe", "john@example.com", Some(30))).unwrap()
        };

        let reopened = SqliteUserStore::open(&path).unwrap();
        assert_eq!(reopened.get(created.id).unwrap(), created);
        reopened.ping().unwrap();
    }

    #[test]
    fn newer_schema_versions_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.db");
        Connection::open(&path).unwrap().execute_batch("PRAGMA user_version = 999;").unwrap();

        match SqliteUserStore::open(&path) {
            Err(StoreError::UnsupportedSchemaVersion { db_version, latest_supported }) => {
                assert_eq!(db_version, 999);
                assert_eq!(latest_supported, latest_version());
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("opened a database from the future"),
        }
    }
}
