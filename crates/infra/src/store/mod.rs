//! Record storage.
//!
//! The store is the enforcement boundary for uniqueness: the policy layer's
//! snapshot pre-checks are a fast-reject UX layer that loses the
//! read-then-act race under concurrency, so both implementations enforce the
//! unique constraints atomically at write time and surface
//! [`StoreError::Conflict`].

mod memory;
mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use registra_core::{AppError, EntityKind, JsonMap, RecordId};
use registra_policy::Filter;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint rejected the write.
    #[error("{0}")]
    Conflict(String),

    /// The backend failed (connection, SQL, lock poisoning).
    #[error("{0}")]
    Backend(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::Backend(msg) => AppError::Internal(msg),
        }
    }
}

/// One table-per-entity-kind record store.
///
/// Single statements against a single table are assumed atomic; nothing here
/// spans tables transactionally.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch full rows (password column included) matching every filter.
    async fn select(
        &self,
        kind: EntityKind,
        filters: &[Filter],
    ) -> Result<Vec<JsonMap>, StoreError>;

    /// Insert rows, returning how many actually landed. Duplicate enrollment
    /// pairs are dropped silently (the count reveals the drop); other
    /// uniqueness violations are conflicts.
    async fn insert(&self, kind: EntityKind, rows: Vec<JsonMap>) -> Result<u64, StoreError>;

    /// Apply one partial-column SET keyed by id. Returns affected row count.
    async fn update(
        &self,
        kind: EntityKind,
        id: RecordId,
        fields: &JsonMap,
    ) -> Result<u64, StoreError>;

    /// Flag rows deleted over the whole id list in one statement; optionally
    /// force `status = inactive` as well. Already-deleted rows do not count.
    async fn soft_delete(
        &self,
        kind: EntityKind,
        ids: &[RecordId],
        force_inactive: bool,
    ) -> Result<u64, StoreError>;

    /// Physically remove rows over the whole id list in one statement.
    async fn hard_delete(&self, kind: EntityKind, ids: &[RecordId]) -> Result<u64, StoreError>;
}
