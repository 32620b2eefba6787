//! Process-local store behind a single coarse lock.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use tracing::info;

use super::{Entity, Page, Store, StoreError, StoreResult};

struct Inner<E> {
    next_id: i64,
    rows: BTreeMap<i64, E>,
}

/// Ephemeral store: contents last for the process lifetime.
///
/// Rows live in a `BTreeMap` keyed by id, so iteration order is insertion
/// order. One `Mutex` guards the whole map; contention is low enough that
/// finer locking buys nothing.
pub struct MemoryStore<E> {
    inner: Mutex<Inner<E>>,
}

impl<E: Entity> MemoryStore<E> {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner { next_id: 1, rows: BTreeMap::new() }) }
    }

    /// A store pre-filled with `inputs`, ids assigned from 1.
    pub fn seeded(inputs: impl IntoIterator<Item = E::Input>) -> StoreResult<Self> {
        let store = Self::new();
        store.create_many(inputs.into_iter().collect())?;
        Ok(store)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner<E>>> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl<E: Entity> Default for MemoryStore<E> {
    fn default() -> Self { Self::new() }
}

impl<E> Inner<E>
where
    E: Entity,
{
    fn check_unique(&self, candidate: &E) -> StoreResult<()> {
        self.rows.values()
            .filter(|row| row.id() != candidate.id())
            .find_map(|row| candidate.conflicts_with(row))
            .map_or(Ok(()), |msg| Err(StoreError::Conflict(msg)))
    }

    fn row_mut(&mut self, id: i64) -> StoreResult<&mut E> {
        self.rows.get_mut(&id).ok_or(StoreError::NotFound { resource: E::KIND, id })
    }

    /// Applies `edit` to a copy and stores it only if it keeps keys unique.
    fn rewrite(&mut self, id: i64, edit: impl FnOnce(&mut E)) -> StoreResult<E> {
        let mut next = self.row_mut(id)?.clone();
        edit(&mut next);
        self.check_unique(&next)?;
        self.rows.insert(id, next.clone());
        Ok(next)
    }
}

impl<E: Entity> Store<E> for MemoryStore<E> {
    fn create(&self, input: E::Input) -> StoreResult<E> {
        let mut inner = self.lock()?;
        let entity = E::build(inner.next_id, input, Utc::now());
        inner.check_unique(&entity)?;
        inner.next_id += 1;
        inner.rows.insert(entity.id(), entity.clone());
        info!(kind = E::KIND, id = entity.id(), "created");
        Ok(entity)
    }

    fn create_many(&self, inputs: Vec<E::Input>) -> StoreResult<Vec<E>> {
        let mut inner = self.lock()?;
        let now = Utc::now();

        let mut created: Vec<E> = Vec::with_capacity(inputs.len());
        for (offset, input) in inputs.into_iter().enumerate() {
            let entity = E::build(inner.next_id + offset as i64, input, now);
            inner.check_unique(&entity)?;
            if let Some(msg) = created.iter().find_map(|c| entity.conflicts_with(c)) {
                return Err(StoreError::Conflict(msg));
            }
            created.push(entity);
        }

        inner.next_id += created.len() as i64;
        for entity in &created {
            inner.rows.insert(entity.id(), entity.clone());
        }
        info!(kind = E::KIND, count = created.len(), "created batch");
        Ok(created)
    }

    fn get(&self, id: i64) -> StoreResult<E> {
        self.lock()?
            .rows
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { resource: E::KIND, id })
    }

    fn list(&self, filter: &E::Filter, page: Page) -> StoreResult<Vec<E>> {
        let inner = self.lock()?;
        Ok(inner.rows.values()
            .filter(|row| row.matches(filter))
            .skip(page.skip)
            .take(page.limit)
            .cloned()
            .collect())
    }

    fn update(&self, id: i64, input: E::Input) -> StoreResult<E> {
        let entity = self.lock()?.rewrite(id, |row| row.replace(input, Utc::now()))?;
        info!(kind = E::KIND, id, "replaced");
        Ok(entity)
    }

    fn patch(&self, id: i64, patch: E::Patch) -> StoreResult<E> {
        let entity = self.lock()?.rewrite(id, |row| row.merge(patch, Utc::now()))?;
        info!(kind = E::KIND, id, "patched");
        Ok(entity)
    }

    fn delete(&self, id: i64) -> StoreResult<()> {
        self.lock()?
            .rows
            .remove(&id)
            .ok_or(StoreError::NotFound { resource: E::KIND, id })?;
        info!(kind = E::KIND, id, "deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::resource::task::{Priority, Task, TaskFilter, TaskInput, TaskPatch, TaskStatus};
    use crate::resource::user::{User, UserFilter, UserInput};

    fn task(title: &str) -> TaskInput {
        TaskInput {
            title: title.to_owned(),
            description: None,
            status: TaskStatus::Todo,
            priority: Priority::Medium,
        }
    }

    fn user(email: &str) -> UserInput {
        UserInput { name: "Ann".to_owned(), email: email.to_owned(), age: Some(30), bio: None }
    }

    #[test]
    fn create_then_get_returns_payload_plus_id() {
        let store = MemoryStore::<Task>::new();
        let created = store.create(task("write docs")).unwrap();

        assert_eq!(created.id, 1);
        let fetched = store.get(created.id).unwrap();
        assert_eq!(fetched.title, "write docs");
        assert_eq!(fetched.created_at, created.created_at);
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let store = MemoryStore::<Task>::new();
        store.create(task("a")).unwrap();
        assert!(matches!(store.get(999), Err(StoreError::NotFound { resource: "Task", id: 999 })));
        assert!(matches!(store.update(999, task("x")), Err(StoreError::NotFound { .. })));
        assert!(matches!(store.patch(999, TaskPatch::default()), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn delete_is_not_idempotent_and_ids_are_never_reused() {
        let store = MemoryStore::<Task>::new();
        let first = store.create(task("a")).unwrap();

        store.delete(first.id).unwrap();
        assert!(matches!(store.get(first.id), Err(StoreError::NotFound { .. })));
        assert!(matches!(store.delete(first.id), Err(StoreError::NotFound { .. })));

        assert_eq!(store.create(task("b")).unwrap().id, 2);
    }

    #[test]
    fn update_is_idempotent() {
        let store = MemoryStore::<User>::new();
        let u = store.create(user("ann@example.com")).unwrap();

        let mut input = user("ann@example.com");
        input.age = Some(31);
        let once = store.update(u.id, input.clone()).unwrap();
        let twice = store.update(u.id, input).unwrap();

        assert_eq!(once, twice);
        assert_eq!(store.get(u.id).unwrap(), twice);
    }

    #[test]
    fn pages_cover_the_whole_set_without_duplicates() {
        let store = MemoryStore::<Task>::new();
        for i in 0..23 {
            store.create(task(&format!("t{i}"))).unwrap();
        }

        let mut seen = Vec::new();
        let limit = 5;
        for skip in (0..30).step_by(limit) {
            let page = store.list(&TaskFilter::default(), Page { skip, limit }).unwrap();
            assert!(page.len() <= limit);
            seen.extend(page.into_iter().map(|t| t.id));
        }

        assert_eq!(seen.len(), 23);
        assert_eq!(seen.iter().collect::<HashSet<_>>().len(), 23);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn filters_apply_before_the_page() {
        let store = MemoryStore::<Task>::new();
        for i in 0..6 {
            let mut t = task(&format!("t{i}"));
            if i % 2 == 0 {
                t.priority = Priority::High;
            }
            store.create(t).unwrap();
        }

        let filter = TaskFilter { priority: Some(Priority::High), ..TaskFilter::default() };
        let ids: Vec<_> = store.list(&filter, Page { skip: 1, limit: 10 }).unwrap()
            .into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![3, 5]);
    }

    #[test]
    fn unique_keys_conflict_on_every_write_path() {
        let store = MemoryStore::<User>::new();
        store.create(user("a@example.com")).unwrap();
        let b = store.create(user("b@example.com")).unwrap();

        assert!(matches!(store.create(user("a@example.com")), Err(StoreError::Conflict(_))));
        assert!(matches!(store.update(b.id, user("a@example.com")), Err(StoreError::Conflict(_))));
        assert_eq!(store.get(b.id).unwrap().email, "b@example.com");

        let filter = UserFilter::default();
        assert_eq!(store.list(&filter, Page::default()).unwrap().len(), 2);
    }

    #[test]
    fn batch_create_is_all_or_nothing() {
        let store = MemoryStore::<User>::new();
        let res = store.create_many(vec![user("x@example.com"), user("x@example.com")]);
        assert!(matches!(res, Err(StoreError::Conflict(_))));
        assert!(store.list(&UserFilter::default(), Page::default()).unwrap().is_empty());

        let made = store.create_many(vec![user("x@example.com"), user("y@example.com")]).unwrap();
        assert_eq!(made.iter().map(|u| u.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(store.create(user("z@example.com")).unwrap().id, 3);
    }
}
