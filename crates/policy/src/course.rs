//! Mutation policy for courses.

use async_trait::async_trait;

use registra_core::access::COURSE_UPDATE_FIELDS;
use registra_core::records::get_str;
use registra_core::{AppError, AppResult, CourseRow, EntityKind, JsonMap, RecordId};

use crate::reader::{Filter, PolicyCtx};
use crate::registry::{ensure_insert_role, EntityPolicy, InsertPlan};

pub struct CoursePolicy;

#[async_trait]
impl EntityPolicy for CoursePolicy {
    fn kind(&self) -> EntityKind {
        EntityKind::Course
    }

    async fn pre_insert(&self, ctx: &PolicyCtx<'_>, payload: JsonMap) -> AppResult<InsertPlan> {
        ensure_insert_role(ctx.caller, EntityKind::Course)?;

        if let Some(name) = get_str(&payload, "name").map(str::trim).filter(|n| !n.is_empty()) {
            let rows = ctx
                .fetch(EntityKind::Course, &[Filter::eq("name", name)], false)
                .await?;
            let live = rows
                .iter()
                .filter_map(|row| CourseRow::from_map(row).ok())
                .any(|course| !course.is_deleted);
            if live {
                return Err(AppError::conflict("a course with this name already exists"));
            }
        }
        Ok(InsertPlan::Rows(vec![payload]))
    }

    async fn before_update(
        &self,
        ctx: &PolicyCtx<'_>,
        id: RecordId,
        mut payload: JsonMap,
    ) -> AppResult<JsonMap> {
        if !ctx.caller.is_admin() {
            return Err(AppError::authorization("only admins can update courses"));
        }

        let rows = ctx
            .fetch(EntityKind::Course, &[Filter::eq("id", id.to_string())], false)
            .await?;
        let course = rows
            .first()
            .map(CourseRow::from_map)
            .transpose()?
            .ok_or_else(|| AppError::not_found("course not found"))?;
        if course.is_deleted {
            return Err(AppError::not_found("course not found"));
        }

        payload.retain(|key, _| COURSE_UPDATE_FIELDS.contains(&key.as_str()));
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
            return Err(AppError::authorization("only admins can delete courses"));
        }

        let enrollments = ctx
            .fetch(
                EntityKind::Enrollment,
                &[Filter::any_ids("course_id", ids)],
                false,
            )
            .await?;
        if !enrollments.is_empty() {
            return Err(AppError::conflict("cannot delete course with enrolled students"));
        }
        Ok(())
    }
}
