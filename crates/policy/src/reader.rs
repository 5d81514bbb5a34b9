//! Snapshot access for hooks.
//!
//! Hooks never touch storage directly; they observe cross-entity state
//! through this trait, which is backed either by an in-process snapshot
//! service or by an HTTP client talking to the read service. Any reader
//! failure (timeout, transport, non-2xx) surfaces as `AppError::Upstream`
//! and the mutation fails closed.

use async_trait::async_trait;

use registra_auth::Caller;
use registra_core::{AppResult, EntityKind, JsonMap, RecordId};

/// An equality filter on one column. Multiple values mean "any of"; on the
/// wire they travel comma-joined, so a batched id check is one round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub values: Vec<String>,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            values: vec![value.into()],
        }
    }

    pub fn any_ids(column: impl Into<String>, ids: &[RecordId]) -> Self {
        Self {
            column: column.into(),
            values: ids.iter().map(RecordId::to_string).collect(),
        }
    }

    /// The comma-joined wire form of the value list.
    pub fn wire_value(&self) -> String {
        self.values.join(",")
    }
}

/// Read-only snapshot queries, role-scoped to the calling principal.
#[async_trait]
pub trait SnapshotReader: Send + Sync {
    /// Fetch rows of `kind` matching every filter (values within one filter
    /// are OR-ed). `include_password` is honored only for admin callers or a
    /// caller reading their own record; the reader enforces that.
    async fn query(
        &self,
        caller: &Caller,
        bearer: Option<&str>,
        kind: EntityKind,
        filters: &[Filter],
        include_password: bool,
    ) -> AppResult<Vec<JsonMap>>;
}

/// Everything a hook invocation needs, passed in per call. Hooks share no
/// mutable state, so concurrent invocations for different callers are safe.
pub struct PolicyCtx<'a> {
    pub caller: &'a Caller,
    pub bearer: Option<&'a str>,
    pub reader: &'a dyn SnapshotReader,
}

impl<'a> PolicyCtx<'a> {
    pub fn new(caller: &'a Caller, bearer: Option<&'a str>, reader: &'a dyn SnapshotReader) -> Self {
        Self {
            caller,
            bearer,
            reader,
        }
    }

    pub async fn fetch(
        &self,
        kind: EntityKind,
        filters: &[Filter],
        include_password: bool,
    ) -> AppResult<Vec<JsonMap>> {
        self.reader
            .query(self.caller, self.bearer, kind, filters, include_password)
            .await
    }
}
