//! `registra-core`: shared domain foundation.
//!
//! This crate contains **pure domain** primitives (no HTTP, no storage):
//! identifiers, roles, entity kinds, the shared table-access policy, the
//! error taxonomy, and typed views over record rows.

pub mod access;
pub mod entity;
pub mod error;
pub mod id;
pub mod records;
pub mod role;

pub use entity::EntityKind;
pub use error::{AppError, AppResult};
pub use id::RecordId;
pub use records::{CourseRow, EnrollmentRow, JsonMap, PrincipalRow};
pub use role::{AccountStatus, Role};
