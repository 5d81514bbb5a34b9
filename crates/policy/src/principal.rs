//! Mutation policy for principal tables (student, teacher, admin).

use async_trait::async_trait;

use registra_auth::verify_password;
use registra_core::access::{SELF_UPDATE_FIELDS, UNIQUE_CONTACT_FIELDS};
use registra_core::records::get_str;
use registra_core::{access, AppError, AppResult, EntityKind, JsonMap, PrincipalRow, RecordId};

use crate::reader::{Filter, PolicyCtx};
use crate::registry::{ensure_insert_role, EntityPolicy, InsertPlan};

/// One policy shared by all three principal subtypes; the kind picks the
/// table and the role the stored account carries.
pub struct PrincipalPolicy {
    kind: EntityKind,
}

impl PrincipalPolicy {
    pub fn new(kind: EntityKind) -> Self {
        debug_assert!(kind.is_principal());
        Self { kind }
    }

    /// Whether `caller` is the record being touched.
    fn is_self(&self, ctx: &PolicyCtx<'_>, id: RecordId) -> bool {
        ctx.caller.id == id && self.kind.principal_role() == Some(ctx.caller.role)
    }

    /// Scan all three principal tables for a live contact-field collision.
    /// One query per (table, present field); values are unique per column so
    /// there is nothing to batch further.
    async fn check_contact_collisions(
        &self,
        ctx: &PolicyCtx<'_>,
        payload: &JsonMap,
    ) -> AppResult<()> {
        for field in UNIQUE_CONTACT_FIELDS {
            let Some(value) = get_str(payload, field).map(str::trim) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            for table in EntityKind::PRINCIPALS {
                let rows = ctx
                    .fetch(table, &[Filter::eq(*field, value)], false)
                    .await?;
                let live = rows
                    .iter()
                    .filter_map(|row| PrincipalRow::from_map(row).ok())
                    .any(|row| !row.is_deleted);
                if live {
                    return Err(AppError::conflict(
                        "a user with this email, cnic, or phone already exists",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Fetch the target row, rejecting missing and soft-deleted records.
    /// Soft delete is terminal: a deleted account can never be updated back
    /// to life, not even its status.
    async fn fetch_target(
        &self,
        ctx: &PolicyCtx<'_>,
        id: RecordId,
        include_password: bool,
    ) -> AppResult<PrincipalRow> {
        let rows = ctx
            .fetch(
                self.kind,
                &[Filter::eq("id", id.to_string())],
                include_password,
            )
            .await?;
        let row = rows
            .first()
            .map(PrincipalRow::from_map)
            .transpose()?
            .ok_or_else(|| AppError::not_found(format!("{} not found", self.kind)))?;
        if row.is_deleted {
            return Err(AppError::not_found(format!("{} not found", self.kind)));
        }
        Ok(row)
    }
}

#[async_trait]
impl EntityPolicy for PrincipalPolicy {
    fn kind(&self) -> EntityKind {
        self.kind
    }

    async fn pre_insert(&self, ctx: &PolicyCtx<'_>, payload: JsonMap) -> AppResult<InsertPlan> {
        ensure_insert_role(ctx.caller, self.kind)?;
        self.check_contact_collisions(ctx, &payload).await?;
        Ok(InsertPlan::Rows(vec![payload]))
    }

    async fn before_update(
        &self,
        ctx: &PolicyCtx<'_>,
        id: RecordId,
        mut payload: JsonMap,
    ) -> AppResult<JsonMap> {
        let is_self = self.is_self(ctx, id);
        if !is_self {
            if !ctx.caller.is_admin() {
                return Err(AppError::authorization("you can only update your own record"));
            }
            if self.kind == EntityKind::Admin {
                return Err(AppError::authorization(
                    "admins can only update their own account",
                ));
            }
        }

        let rotating = get_str(&payload, "new_password")
            .map(|p| !p.trim().is_empty())
            .unwrap_or(false);

        // Fetch the stored hash only when a self-rotation must re-verify it.
        let target = self.fetch_target(ctx, id, rotating && is_self).await?;

        if rotating {
            if is_self {
                let supplied = get_str(&payload, "current_password").unwrap_or_default();
                let verified = target
                    .password
                    .as_deref()
                    .is_some_and(|stored| verify_password(supplied, stored));
                if !verified {
                    return Err(AppError::authorization("Current password is incorrect"));
                }
            }
            // Move the new plaintext into the password column; the executor
            // hashes it with every other password-shaped field.
            if let Some(new_password) = payload.get("new_password").cloned() {
                payload.insert("password".to_string(), new_password);
            }
        }
        payload.remove("new_password");
        payload.remove("current_password");

        let allowed: &[&str] = if ctx.caller.is_admin() {
            access::insert_fields(self.kind)
        } else {
            &["name", "email", "phone", "gender", "password"]
        };
        debug_assert!(SELF_UPDATE_FIELDS.iter().all(|f| allowed.contains(f)));

        payload.retain(|key, _| allowed.contains(&key.as_str()));
        if payload.is_empty() {
            return Err(AppError::validation("no valid fields to update"));
        }
        Ok(payload)
    }

    async fn before_delete(&self, ctx: &PolicyCtx<'_>, ids: &[RecordId]) -> AppResult<()> {
        if ids.is_empty() {
            return Err(AppError::validation("no ids provided"));
        }
        if !ctx.caller.is_admin() {
            return Err(AppError::authorization(format!(
                "only admins can delete {} records",
                self.kind
            )));
        }

        match self.kind {
            EntityKind::Admin => {
                if ids.iter().any(|id| *id != ctx.caller.id) {
                    return Err(AppError::authorization(
                        "admins can only delete their own account",
                    ));
                }
            }
            EntityKind::Teacher => {
                // One batched query over the whole id list.
                let courses = ctx
                    .fetch(
                        EntityKind::Course,
                        &[Filter::any_ids("teacher_id", ids)],
                        false,
                    )
                    .await?;
                let active = courses
                    .iter()
                    .filter_map(|row| registra_core::CourseRow::from_map(row).ok())
                    .any(|course| !course.is_deleted);
                if active {
                    return Err(AppError::conflict("cannot delete teacher with active courses"));
                }
            }
            EntityKind::Student => {
                let enrollments = ctx
                    .fetch(
                        EntityKind::Enrollment,
                        &[Filter::any_ids("student_id", ids)],
                        false,
                    )
                    .await?;
                if !enrollments.is_empty() {
                    return Err(AppError::conflict(
                        "cannot delete student with active enrollments",
                    ));
                }
            }
            _ => {}
        }
        Ok(())
    }
}
