//! The policy registry.
//!
//! One `EntityPolicy` implementation per entity kind, registered once and
//! shared by the create, update, and delete paths, so the role and column
//! allow-lists cannot drift between services.

use std::collections::HashMap;

use async_trait::async_trait;

use registra_auth::Caller;
use registra_core::{access, AppError, AppResult, EntityKind, JsonMap, RecordId};

use crate::course::CoursePolicy;
use crate::enrollment::EnrollmentPolicy;
use crate::principal::PrincipalPolicy;
use crate::reader::PolicyCtx;

/// Outcome of `pre_insert`.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertPlan {
    /// Rows approved for insertion (1..N; multi-course enrollment produces
    /// several).
    Rows(Vec<JsonMap>),
    /// Every requested row already exists. Carries the pre-existing record so
    /// the caller can tell "nothing new created" from an empty result.
    AlreadyEnrolled(JsonMap),
}

/// Per-entity-kind mutation gate. Each method is a pure function of
/// (caller, input, snapshot state); implementations keep no state of their
/// own.
#[async_trait]
pub trait EntityPolicy: Send + Sync {
    fn kind(&self) -> EntityKind;

    /// Authorize and finalize a create request. Returns the rows to insert,
    /// or the existing record when deduplication dropped everything.
    async fn pre_insert(&self, ctx: &PolicyCtx<'_>, payload: JsonMap) -> AppResult<InsertPlan>;

    /// Authorize and finalize an update of one record. Returns the column
    /// map the executor may apply.
    async fn before_update(
        &self,
        ctx: &PolicyCtx<'_>,
        id: RecordId,
        payload: JsonMap,
    ) -> AppResult<JsonMap>;

    /// Authorize deletion of the full id batch, re-checking referential
    /// invariants with batched snapshot queries. All-or-nothing: any denied
    /// id denies the whole batch.
    async fn before_delete(&self, ctx: &PolicyCtx<'_>, ids: &[RecordId]) -> AppResult<()>;
}

/// Gate an insert on the shared role allow-list.
pub(crate) fn ensure_insert_role(caller: &Caller, kind: EntityKind) -> AppResult<()> {
    if access::insert_roles(kind).contains(&caller.role) {
        Ok(())
    } else {
        Err(AppError::authorization(format!(
            "role '{}' cannot create {} records",
            caller.role.as_str(),
            kind
        )))
    }
}

/// All five entity policies, keyed by kind.
pub struct PolicyRegistry {
    policies: HashMap<EntityKind, Box<dyn EntityPolicy>>,
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        let mut policies: HashMap<EntityKind, Box<dyn EntityPolicy>> = HashMap::new();
        for kind in EntityKind::PRINCIPALS {
            policies.insert(kind, Box::new(PrincipalPolicy::new(kind)));
        }
        policies.insert(EntityKind::Course, Box::new(CoursePolicy));
        policies.insert(EntityKind::Enrollment, Box::new(EnrollmentPolicy));
        Self { policies }
    }
}

impl PolicyRegistry {
    pub fn policy_for(&self, kind: EntityKind) -> &dyn EntityPolicy {
        // Default wires every variant; a miss would be a construction bug.
        self.policies[&kind].as_ref()
    }
}
