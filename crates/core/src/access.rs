//! Shared table-access policy.
//!
//! One source of truth for role allow-lists and column allow-lists, used by
//! every service. The create/update/delete paths all key off these tables
//! instead of carrying their own copies, so the policies cannot drift apart.

use crate::entity::EntityKind;
use crate::role::Role;

const ALL_ROLES: &[Role] = &[Role::Student, Role::Teacher, Role::Admin];

/// Roles permitted to create records of this kind.
pub fn insert_roles(kind: EntityKind) -> &'static [Role] {
    match kind {
        EntityKind::Student | EntityKind::Teacher | EntityKind::Admin | EntityKind::Course => {
            &[Role::Admin]
        }
        // Students enroll themselves; admins enroll on behalf.
        EntityKind::Enrollment => &[Role::Student, Role::Admin],
    }
}

/// Roles permitted to read this table through the Oracle.
pub fn read_roles(kind: EntityKind) -> &'static [Role] {
    match kind {
        EntityKind::Student | EntityKind::Course | EntityKind::Enrollment => ALL_ROLES,
        EntityKind::Teacher => &[Role::Admin, Role::Teacher],
        EntityKind::Admin => &[Role::Admin],
    }
}

/// Column allow-list for inserts. Unknown payload fields are dropped
/// silently by the executor.
pub fn insert_fields(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Student | EntityKind::Teacher | EntityKind::Admin => {
            &["name", "email", "password", "phone", "gender", "cnic", "status"]
        }
        EntityKind::Course => &["name", "teacher_id", "credit_hours"],
        EntityKind::Enrollment => &["student_id", "course_id"],
    }
}

/// Column projection for Oracle reads. The password hash is never part of
/// the default projection; it is appended only when `includePassword` is
/// honored.
pub fn select_fields(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Student | EntityKind::Teacher | EntityKind::Admin => {
            &["id", "name", "email", "phone", "gender", "cnic", "status", "is_deleted"]
        }
        EntityKind::Course => &["id", "name", "teacher_id", "credit_hours", "is_deleted"],
        EntityKind::Enrollment => &["id", "student_id", "course_id"],
    }
}

/// Mutable-field allow-list for course updates (admin-only path).
pub const COURSE_UPDATE_FIELDS: &[&str] = &["name", "teacher_id", "credit_hours"];

/// Fields a non-admin principal may change on their own record. Password
/// rotation travels separately as `new_password`/`current_password`.
pub const SELF_UPDATE_FIELDS: &[&str] = &["name", "email", "phone", "gender"];

/// Contact fields that must be globally unique across all principal tables
/// among non-deleted rows.
pub const UNIQUE_CONTACT_FIELDS: &[&str] = &["email", "cnic", "phone"];
