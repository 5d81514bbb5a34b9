//! `registra-policy`: the access-control hook registry.
//!
//! One polymorphic policy per entity kind gates every mutation phase:
//! `pre_insert`, `before_update`, `before_delete`. Hooks are pure functions
//! of (caller, input, snapshot state): they hold no mutable state of their
//! own, observe other services only through a [`SnapshotReader`], and return
//! structured errors instead of throwing across service boundaries.
//!
//! The hook pre-checks are a fast-reject layer, not the enforcement
//! boundary; the store's atomic uniqueness constraints are the backstop for
//! the read-then-act race.

pub mod course;
pub mod enrollment;
pub mod principal;
pub mod reader;
pub mod registry;
pub mod validate;

#[cfg(test)]
pub(crate) mod testutil;

pub use course::CoursePolicy;
pub use enrollment::EnrollmentPolicy;
pub use principal::PrincipalPolicy;
pub use reader::{Filter, PolicyCtx, SnapshotReader};
pub use registry::{EntityPolicy, InsertPlan, PolicyRegistry};
