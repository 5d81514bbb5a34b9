//! Mutation policy for enrollments.
//!
//! Enrollments are the one multi-row insert path (a student may enroll in
//! several courses at once) and the one entity deletable by non-admins.
//! They are immutable after creation.

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value;

use registra_core::records::get_id;
use registra_core::{
    AppError, AppResult, CourseRow, EnrollmentRow, EntityKind, JsonMap, RecordId, Role,
};

use crate::reader::{Filter, PolicyCtx};
use crate::registry::{ensure_insert_role, EntityPolicy, InsertPlan};

pub struct EnrollmentPolicy;

fn parse_course_id(value: &Value) -> AppResult<RecordId> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(RecordId::new)
            .ok_or_else(|| AppError::validation(format!("invalid course_id: {n}"))),
        Value::String(s) => s.parse(),
        other => Err(AppError::validation(format!("invalid course_id: {other}"))),
    }
}

/// Extract the requested course ids; accepts one id or an array, with
/// intra-request duplicates dropped (first occurrence wins).
fn requested_course_ids(payload: &JsonMap) -> AppResult<Vec<RecordId>> {
    let value = payload
        .get("course_id")
        .ok_or_else(|| AppError::validation("course_id is required"))?;

    let raw = match value {
        Value::Array(items) => items.iter().map(parse_course_id).collect::<AppResult<Vec<_>>>()?,
        other => vec![parse_course_id(other)?],
    };

    let mut seen = HashSet::new();
    let ids: Vec<RecordId> = raw.into_iter().filter(|id| seen.insert(*id)).collect();
    if ids.is_empty() {
        return Err(AppError::validation("course_id is required"));
    }
    Ok(ids)
}

#[async_trait]
impl EntityPolicy for EnrollmentPolicy {
    fn kind(&self) -> EntityKind {
        EntityKind::Enrollment
    }

    async fn pre_insert(&self, ctx: &PolicyCtx<'_>, payload: JsonMap) -> AppResult<InsertPlan> {
        ensure_insert_role(ctx.caller, EntityKind::Enrollment)?;

        // Ownership cannot be spoofed by payload: a student always enrolls
        // themselves, only an admin may enroll on behalf.
        let student_id = if ctx.caller.role == Role::Student {
            ctx.caller.id
        } else {
            get_id(&payload, "student_id")
                .ok_or_else(|| AppError::validation("student_id is required"))?
        };

        let course_ids = requested_course_ids(&payload)?;

        // One batched existence check over the whole course list.
        let courses = ctx
            .fetch(EntityKind::Course, &[Filter::any_ids("id", &course_ids)], false)
            .await?;
        let live: HashSet<RecordId> = courses
            .iter()
            .filter_map(|row| CourseRow::from_map(row).ok())
            .filter(|course| !course.is_deleted)
            .map(|course| course.id)
            .collect();
        let missing: Vec<String> = course_ids
            .iter()
            .filter(|id| !live.contains(id))
            .map(|id| format!("course {id} does not exist"))
            .collect();
        if !missing.is_empty() {
            return Err(AppError::Validation(missing));
        }

        // Already-enrolled pairs are dropped, not rejected.
        let existing_rows = ctx
            .fetch(
                EntityKind::Enrollment,
                &[
                    Filter::eq("student_id", student_id.to_string()),
                    Filter::any_ids("course_id", &course_ids),
                ],
                false,
            )
            .await?;
        let enrolled: HashSet<RecordId> = existing_rows
            .iter()
            .filter_map(|row| EnrollmentRow::from_map(row).ok())
            .map(|row| row.course_id)
            .collect();

        let rows: Vec<JsonMap> = course_ids
            .iter()
            .filter(|id| !enrolled.contains(id))
            .map(|course_id| {
                let mut row = JsonMap::new();
                row.insert("student_id".to_string(), Value::from(student_id.as_i64()));
                row.insert("course_id".to_string(), Value::from(course_id.as_i64()));
                row
            })
            .collect();

        if rows.is_empty() {
            // Everything was deduplicated away; hand back the record that
            // already covers the request so the caller can tell nothing new
            // was created.
            let existing = existing_rows
                .into_iter()
                .next()
                .ok_or_else(|| AppError::internal("dedup dropped rows without an existing record"))?;
            return Ok(InsertPlan::AlreadyEnrolled(existing));
        }
        Ok(InsertPlan::Rows(rows))
    }

    async fn before_update(
        &self,
        _ctx: &PolicyCtx<'_>,
        _id: RecordId,
        _payload: JsonMap,
    ) -> AppResult<JsonMap> {
        Err(AppError::authorization("enrollments cannot be updated"))
    }

    async fn before_delete(&self, ctx: &PolicyCtx<'_>, ids: &[RecordId]) -> AppResult<()> {
        if ids.is_empty() {
            return Err(AppError::validation("no ids provided"));
        }

        let rows = ctx
            .fetch(EntityKind::Enrollment, &[Filter::any_ids("id", ids)], false)
            .await?;
        if rows.is_empty() {
            return Err(AppError::not_found("no enrollments found"));
        }
        let enrollments: Vec<EnrollmentRow> = rows
            .iter()
            .map(EnrollmentRow::from_map)
            .collect::<Result<_, _>>()?;

        match ctx.caller.role {
            Role::Admin => Ok(()),
            Role::Student => {
                // No partial allow: the owned subset must cover the whole
                // requested batch.
                let owned = enrollments
                    .iter()
                    .filter(|row| row.student_id == ctx.caller.id)
                    .count();
                if owned == ids.len() {
                    Ok(())
                } else {
                    Err(AppError::authorization(
                        "students can only delete their own enrollments",
                    ))
                }
            }
            Role::Teacher => {
                // Ownership is transitive through the enrollment's course.
                let course_ids: Vec<RecordId> =
                    enrollments.iter().map(|row| row.course_id).collect();
                let courses = ctx
                    .fetch(EntityKind::Course, &[Filter::any_ids("id", &course_ids)], false)
                    .await?;
                let mine: HashSet<RecordId> = courses
                    .iter()
                    .filter_map(|row| CourseRow::from_map(row).ok())
                    .filter(|course| course.teacher_id == ctx.caller.id)
                    .map(|course| course.id)
                    .collect();
                if enrollments.iter().all(|row| mine.contains(&row.course_id)) {
                    Ok(())
                } else {
                    Err(AppError::authorization(
                        "teachers can only delete enrollments in their own courses",
                    ))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{caller, InMemoryReader};
    use serde_json::json;

    fn payload(value: serde_json::Value) -> JsonMap {
        value.as_object().unwrap().clone()
    }

    fn reader_with_courses() -> InMemoryReader {
        InMemoryReader::new()
            .with(
                EntityKind::Course,
                json!([
                    {"id": 10, "name": "Algo", "teacher_id": 3, "is_deleted": false},
                    {"id": 11, "name": "Databases", "teacher_id": 3, "is_deleted": false}
                ]),
            )
            .with(EntityKind::Enrollment, json!([]))
    }

    #[tokio::test]
    async fn student_id_is_forced_to_the_caller() {
        let reader = reader_with_courses();
        let student = caller(7, Role::Student);
        let ctx = PolicyCtx::new(&student, None, &reader);

        let plan = EnrollmentPolicy
            .pre_insert(&ctx, payload(json!({"student_id": 999, "course_id": 10})))
            .await
            .unwrap();
        let InsertPlan::Rows(rows) = plan else {
            panic!("expected rows");
        };
        assert_eq!(rows[0].get("student_id"), Some(&json!(7)));
    }

    #[tokio::test]
    async fn missing_courses_collect_every_violation() {
        let reader = reader_with_courses();
        let student = caller(7, Role::Student);
        let ctx = PolicyCtx::new(&student, None, &reader);

        let err = EnrollmentPolicy
            .pre_insert(&ctx, payload(json!({"course_id": [10, 98, 99]})))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AppError::Validation(vec![
                "course 98 does not exist".into(),
                "course 99 does not exist".into()
            ])
        );
    }

    #[tokio::test]
    async fn soft_deleted_course_counts_as_missing() {
        let reader = InMemoryReader::new()
            .with(
                EntityKind::Course,
                json!([{"id": 10, "name": "Algo", "teacher_id": 3, "is_deleted": true}]),
            )
            .with(EntityKind::Enrollment, json!([]));
        let student = caller(7, Role::Student);
        let ctx = PolicyCtx::new(&student, None, &reader);

        let err = EnrollmentPolicy
            .pre_insert(&ctx, payload(json!({"course_id": 10})))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn already_enrolled_pairs_are_dropped_not_rejected() {
        let reader = InMemoryReader::new()
            .with(
                EntityKind::Course,
                json!([
                    {"id": 10, "name": "Algo", "teacher_id": 3, "is_deleted": false},
                    {"id": 11, "name": "Databases", "teacher_id": 3, "is_deleted": false}
                ]),
            )
            .with(
                EntityKind::Enrollment,
                json!([{"id": 50, "student_id": 7, "course_id": 10}]),
            );
        let student = caller(7, Role::Student);
        let ctx = PolicyCtx::new(&student, None, &reader);

        let plan = EnrollmentPolicy
            .pre_insert(&ctx, payload(json!({"course_id": [10, 11]})))
            .await
            .unwrap();
        let InsertPlan::Rows(rows) = plan else {
            panic!("expected rows");
        };
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("course_id"), Some(&json!(11)));
    }

    #[tokio::test]
    async fn all_duplicates_return_the_existing_record() {
        let reader = InMemoryReader::new()
            .with(
                EntityKind::Course,
                json!([{"id": 10, "name": "Algo", "teacher_id": 3, "is_deleted": false}]),
            )
            .with(
                EntityKind::Enrollment,
                json!([{"id": 50, "student_id": 7, "course_id": 10}]),
            );
        let student = caller(7, Role::Student);
        let ctx = PolicyCtx::new(&student, None, &reader);

        let plan = EnrollmentPolicy
            .pre_insert(&ctx, payload(json!({"course_id": 10})))
            .await
            .unwrap();
        let InsertPlan::AlreadyEnrolled(existing) = plan else {
            panic!("expected the existing record");
        };
        assert_eq!(existing.get("id"), Some(&json!(50)));
    }

    #[tokio::test]
    async fn intra_request_duplicates_collapse() {
        let reader = reader_with_courses();
        let student = caller(7, Role::Student);
        let ctx = PolicyCtx::new(&student, None, &reader);

        let plan = EnrollmentPolicy
            .pre_insert(&ctx, payload(json!({"course_id": [10, 10, 11]})))
            .await
            .unwrap();
        let InsertPlan::Rows(rows) = plan else {
            panic!("expected rows");
        };
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn admin_enrolls_on_behalf_with_explicit_student_id() {
        let reader = reader_with_courses();
        let admin = caller(1, Role::Admin);
        let ctx = PolicyCtx::new(&admin, None, &reader);

        let plan = EnrollmentPolicy
            .pre_insert(&ctx, payload(json!({"student_id": "7", "course_id": 10})))
            .await
            .unwrap();
        let InsertPlan::Rows(rows) = plan else {
            panic!("expected rows");
        };
        assert_eq!(rows[0].get("student_id"), Some(&json!(7)));

        let err = EnrollmentPolicy
            .pre_insert(&ctx, payload(json!({"course_id": 10})))
            .await
            .unwrap_err();
        assert_eq!(err, AppError::validation("student_id is required"));
    }

    #[tokio::test]
    async fn updates_are_unconditionally_rejected() {
        let reader = InMemoryReader::new();
        let admin = caller(1, Role::Admin);
        let ctx = PolicyCtx::new(&admin, None, &reader);

        let err = EnrollmentPolicy
            .before_update(&ctx, RecordId::new(1), payload(json!({"course_id": 11})))
            .await
            .unwrap_err();
        assert_eq!(err, AppError::authorization("enrollments cannot be updated"));
    }

    #[tokio::test]
    async fn student_batch_delete_is_all_or_nothing() {
        let reader = InMemoryReader::new().with(
            EntityKind::Enrollment,
            json!([
                {"id": 50, "student_id": 7, "course_id": 10},
                {"id": 51, "student_id": 8, "course_id": 10}
            ]),
        );
        let student = caller(7, Role::Student);
        let ctx = PolicyCtx::new(&student, None, &reader);

        let err = EnrollmentPolicy
            .before_delete(&ctx, &[RecordId::new(50), RecordId::new(51)])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AppError::authorization("students can only delete their own enrollments")
        );

        assert!(EnrollmentPolicy
            .before_delete(&ctx, &[RecordId::new(50)])
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn teacher_ownership_is_transitive_through_the_course() {
        let reader = InMemoryReader::new()
            .with(
                EntityKind::Enrollment,
                json!([
                    {"id": 50, "student_id": 7, "course_id": 10},
                    {"id": 51, "student_id": 8, "course_id": 20}
                ]),
            )
            .with(
                EntityKind::Course,
                json!([
                    {"id": 10, "name": "Algo", "teacher_id": 3, "is_deleted": false},
                    {"id": 20, "name": "Networks", "teacher_id": 4, "is_deleted": false}
                ]),
            );
        let teacher = caller(3, Role::Teacher);
        let ctx = PolicyCtx::new(&teacher, None, &reader);

        assert!(EnrollmentPolicy.before_delete(&ctx, &[RecordId::new(50)]).await.is_ok());
        let err = EnrollmentPolicy
            .before_delete(&ctx, &[RecordId::new(50), RecordId::new(51)])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AppError::authorization("teachers can only delete enrollments in their own courses")
        );
    }

    #[tokio::test]
    async fn deleting_unknown_enrollments_is_not_found() {
        let reader = InMemoryReader::new().with(EntityKind::Enrollment, json!([]));
        let admin = caller(1, Role::Admin);
        let ctx = PolicyCtx::new(&admin, None, &reader);

        let err = EnrollmentPolicy
            .before_delete(&ctx, &[RecordId::new(99)])
            .await
            .unwrap_err();
        assert_eq!(err, AppError::not_found("no enrollments found"));
    }
}
