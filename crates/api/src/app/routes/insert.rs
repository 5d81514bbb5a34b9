//! The create executor's route.
//!
//! Validation, then the entity's pre-insert hook, then the executor. The
//! hook may approve several rows (multi-course enrollment) or report that
//! every requested row already exists.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use registra_core::{AppError, EntityKind};
use registra_infra::executor::insert_records;
use registra_policy::{validate::validate_insert, InsertPlan, PolicyCtx};

use crate::app::errors::ApiResult;
use crate::app::services::AppServices;
use crate::context::{BearerToken, CallerContext};

pub fn router() -> Router {
    Router::new().route("/create", post(create))
}

#[derive(Deserialize)]
struct InsertRequest {
    table: String,
    data: Value,
}

async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CallerContext(caller)): Extension<CallerContext>,
    bearer: Option<Extension<BearerToken>>,
    Json(request): Json<InsertRequest>,
) -> ApiResult<Response> {
    let kind: EntityKind = request.table.parse()?;
    let payload = request
        .data
        .as_object()
        .cloned()
        .ok_or_else(|| AppError::validation("data must be an object"))?;
    validate_insert(kind, &payload)?;

    let bearer = bearer.as_ref().map(|ext| ext.0 .0.as_str());
    let ctx = PolicyCtx::new(&caller, bearer, services.reader.as_ref());
    let plan = services
        .registry
        .policy_for(kind)
        .pre_insert(&ctx, payload)
        .await?;

    match plan {
        InsertPlan::Rows(rows) => {
            let inserted = insert_records(services.store.as_ref(), kind, rows).await?;
            Ok((
                StatusCode::CREATED,
                Json(json!({ "message": format!("{kind} created"), "inserted": inserted })),
            )
                .into_response())
        }
        InsertPlan::AlreadyEnrolled(existing) => Ok((
            StatusCode::OK,
            Json(json!({
                "message": "already enrolled",
                "inserted": 0,
                "data": existing,
            })),
        )
            .into_response()),
    }
}
