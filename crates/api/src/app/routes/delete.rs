//! The delete executor's routes.
//!
//! Batched (`DELETE /delete` with an id list) and single
//! (`DELETE /delete/:type/:id`). Both run the entity's before-delete hook
//! over the whole batch; any denied id denies everything.

use std::sync::Arc;

use axum::extract::Path;
use axum::routing::delete;
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use registra_auth::Caller;
use registra_core::{AppError, AppResult, EntityKind, RecordId};
use registra_infra::executor::apply_delete;
use registra_policy::PolicyCtx;

use crate::app::errors::ApiResult;
use crate::app::services::AppServices;
use crate::context::{BearerToken, CallerContext};

pub fn router() -> Router {
    Router::new()
        .route("/delete", delete(delete_batch))
        .route("/delete/:table/:id", delete(delete_one))
}

fn parse_one(value: &Value) -> AppResult<RecordId> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(RecordId::new)
            .ok_or_else(|| AppError::validation(format!("invalid id: {n}"))),
        Value::String(s) => s.parse(),
        other => Err(AppError::validation(format!("invalid id: {other}"))),
    }
}

/// Accepts a single id or an array; duplicates collapse so the affected-row
/// count stays meaningful.
fn parse_ids(value: &Value) -> AppResult<Vec<RecordId>> {
    let mut ids = match value {
        Value::Array(items) => items.iter().map(parse_one).collect::<AppResult<Vec<_>>>()?,
        other => vec![parse_one(other)?],
    };
    if ids.is_empty() {
        return Err(AppError::validation("no ids provided"));
    }
    ids.sort_unstable();
    ids.dedup();
    Ok(ids)
}

#[derive(Deserialize)]
struct DeleteRequest {
    #[serde(rename = "type")]
    table: String,
    ids: Value,
}

async fn run_delete(
    services: &AppServices,
    caller: &Caller,
    bearer: Option<&str>,
    kind: EntityKind,
    ids: Vec<RecordId>,
) -> ApiResult<Json<Value>> {
    let ctx = PolicyCtx::new(caller, bearer, services.reader.as_ref());
    services
        .registry
        .policy_for(kind)
        .before_delete(&ctx, &ids)
        .await?;

    let deleted = apply_delete(services.store.as_ref(), kind, &ids).await?;
    Ok(Json(json!({
        "message": format!("{kind} deleted"),
        "deleted": deleted,
    })))
}

async fn delete_batch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CallerContext(caller)): Extension<CallerContext>,
    bearer: Option<Extension<BearerToken>>,
    Json(request): Json<DeleteRequest>,
) -> ApiResult<Json<Value>> {
    let kind: EntityKind = request.table.parse()?;
    let ids = parse_ids(&request.ids)?;
    let bearer = bearer.as_ref().map(|ext| ext.0 .0.as_str());
    run_delete(&services, &caller, bearer, kind, ids).await
}

async fn delete_one(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CallerContext(caller)): Extension<CallerContext>,
    bearer: Option<Extension<BearerToken>>,
    Path((table, id)): Path<(String, i64)>,
) -> ApiResult<Json<Value>> {
    let kind: EntityKind = table.parse()?;
    let bearer = bearer.as_ref().map(|ext| ext.0 .0.as_str());
    run_delete(&services, &caller, bearer, kind, vec![RecordId::new(id)]).await
}
