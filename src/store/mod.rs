//! Resource stores.
//!
//! One [`Store`] trait, two backends:
//!
//! | Backend | Lifetime | Used for |
//! |---|---|---|
//! | [`SqliteUserStore`] | durable, survives restart | users |
//! | [`MemoryStore`] | process lifetime | products, tasks (and any entity in tests) |
//!
//! Stores are synchronous. Handlers reach them through [`run`], which moves
//! the call onto tokio's blocking pool and bounds it with a timeout, so a
//! stuck database surfaces as [`StoreError::Unavailable`] instead of a hung
//! request.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::validate::Schema;

mod memory;
mod migrations;
mod sqlite;

pub use memory::MemoryStore;
pub use migrations::latest_version;
pub use sqlite::SqliteUserStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{resource} with id {id} not found")]
    NotFound { resource: &'static str, id: i64 },

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("sqlite: {0}")]
    Sqlite(rusqlite::Error),

    #[error("store lock poisoned by a panicked writer")]
    Poisoned,

    #[error("invalid persisted data: {0}")]
    Corrupt(String),

    #[error("database schema version {db_version} is newer than supported {latest_supported}")]
    UnsupportedSchemaVersion { db_version: u32, latest_supported: u32 },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;
        match e.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::CannotOpen) => {
                Self::Unavailable(e.to_string())
            }
            _ => Self::Sqlite(e),
        }
    }
}

// ── Entity ────────────────────────────────────────────────────────────────────

/// A record kind a [`Store`] can hold.
///
/// The entity owns its write semantics (how a validated input becomes a
/// record, what replace and merge mean, which key must be unique) so every
/// backend behaves identically.
pub trait Entity: Clone + Serialize + Send + Sync + 'static {
    /// Full payload, used by create and replace.
    type Input: DeserializeOwned + Clone + Send + 'static;
    /// Partial payload, used by merge.
    type Patch: DeserializeOwned + Send + 'static;
    type Filter: Default + Send + Sync + 'static;

    /// Human-readable kind, e.g. `"User"`.
    const KIND: &'static str;

    /// Field specification for both validation and documentation.
    fn schema() -> &'static Schema;

    fn id(&self) -> i64;

    fn build(id: i64, input: Self::Input, now: DateTime<Utc>) -> Self;

    /// Full replace. Timestamps move only if a content field changed.
    fn replace(&mut self, input: Self::Input, now: DateTime<Utc>);

    /// Field merge. Timestamps move only if a content field changed.
    fn merge(&mut self, patch: Self::Patch, now: DateTime<Utc>);

    fn matches(&self, filter: &Self::Filter) -> bool;

    /// Message for a unique-key clash with `other`, if there is one.
    fn conflicts_with(&self, _other: &Self) -> Option<String> {
        None
    }
}

// ── Pagination ────────────────────────────────────────────────────────────────

/// A window over a listing, applied after filtering.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Page {
    pub skip: usize,
    pub limit: usize,
}

impl Page {
    pub const DEFAULT_LIMIT: usize = 10;
    pub const MAX_LIMIT: usize = 100;

    /// Clamps raw query values into range instead of rejecting them:
    /// `skip` below 0 becomes 0, `limit` is forced into `1..=100`.
    pub fn clamped(skip: Option<i64>, limit: Option<i64>) -> Self {
        let skip = skip.unwrap_or(0).max(0);
        let limit = limit
            .unwrap_or(Self::DEFAULT_LIMIT as i64)
            .clamp(1, Self::MAX_LIMIT as i64);
        Self {
            skip: usize::try_from(skip).unwrap_or(usize::MAX),
            limit: limit as usize,
        }
    }

    /// No window at all; used by search.
    pub fn everything() -> Self {
        Self { skip: 0, limit: usize::MAX }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self { skip: 0, limit: Self::DEFAULT_LIMIT }
    }
}

// ── Store ─────────────────────────────────────────────────────────────────────

/// The CRUD contract every resource store satisfies.
///
/// Identifiers are assigned by the store, start at 1, grow monotonically and
/// are never reused, so id order is insertion order.
pub trait Store<E: Entity>: Send + Sync {
    /// Assigns a new id, persists and returns the stored entity.
    fn create(&self, input: E::Input) -> StoreResult<E>;

    /// All-or-nothing: either every input is stored or none is.
    fn create_many(&self, inputs: Vec<E::Input>) -> StoreResult<Vec<E>>;

    fn get(&self, id: i64) -> StoreResult<E>;

    /// Matching entities in insertion order, windowed by `page`.
    fn list(&self, filter: &E::Filter, page: Page) -> StoreResult<Vec<E>>;

    /// Full replace.
    fn update(&self, id: i64, input: E::Input) -> StoreResult<E>;

    /// Field merge.
    fn patch(&self, id: i64, patch: E::Patch) -> StoreResult<E>;

    /// A second delete of the same id fails with `NotFound`.
    fn delete(&self, id: i64) -> StoreResult<()>;

    /// Cheap liveness check of the backing storage.
    fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Runs a store call on the blocking pool, bounded by `timeout`.
pub async fn run<T, F>(timeout: Duration, op: F) -> StoreResult<T>
where
    F: FnOnce() -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(op)).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(StoreError::Corrupt(format!("store task failed: {join}"))),
        Err(_) => Err(StoreError::Unavailable(format!(
            "store did not answer within {} ms",
            timeout.as_millis()
        ))),
    }
}
