//! The update executor's route.

use std::sync::Arc;

use axum::extract::Path;
use axum::routing::patch;
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use registra_core::{AppError, EntityKind, RecordId};
use registra_infra::executor::apply_update;
use registra_policy::{validate::validate_update, PolicyCtx};

use crate::app::errors::ApiResult;
use crate::app::services::AppServices;
use crate::context::{BearerToken, CallerContext};

pub fn router() -> Router {
    Router::new().route("/update/:id", patch(update))
}

#[derive(Deserialize)]
struct UpdateRequest {
    #[serde(rename = "type")]
    table: String,
    data: Value,
}

async fn update(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CallerContext(caller)): Extension<CallerContext>,
    bearer: Option<Extension<BearerToken>>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateRequest>,
) -> ApiResult<Json<Value>> {
    let kind: EntityKind = request.table.parse()?;
    let payload = request
        .data
        .as_object()
        .cloned()
        .ok_or_else(|| AppError::validation("data must be an object"))?;
    validate_update(kind, &payload)?;

    let id = RecordId::new(id);
    let bearer = bearer.as_ref().map(|ext| ext.0 .0.as_str());
    let ctx = PolicyCtx::new(&caller, bearer, services.reader.as_ref());
    let fields = services
        .registry
        .policy_for(kind)
        .before_update(&ctx, id, payload)
        .await?;

    apply_update(services.store.as_ref(), kind, id, fields).await?;
    Ok(Json(json!({ "message": format!("{kind} updated") })))
}
