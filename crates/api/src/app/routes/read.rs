//! The Consistency Oracle's single route.
//!
//! `GET /read?tableName=<t>&<field>=<v[,v...]>&includePassword=true`. Any
//! query key other than the two reserved ones is an equality filter whose
//! value may be a comma-joined list.

use std::sync::Arc;

use axum::extract::Query;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde_json::{json, Value};

use registra_core::{AppError, EntityKind};
use registra_infra::ReadQuery;
use registra_policy::Filter;

use crate::app::errors::ApiResult;
use crate::app::services::AppServices;
use crate::context::CallerContext;

pub fn router() -> Router {
    Router::new().route("/read", get(read))
}

fn parse_query(params: Vec<(String, String)>) -> Result<ReadQuery, AppError> {
    let mut kind: Option<EntityKind> = None;
    let mut include_password = false;
    let mut filters = Vec::new();

    for (key, value) in params {
        match key.as_str() {
            "tableName" => kind = Some(value.parse()?),
            "includePassword" => include_password = value.eq_ignore_ascii_case("true"),
            _ => filters.push(Filter {
                column: key,
                values: value
                    .split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
                    .collect(),
            }),
        }
    }

    Ok(ReadQuery {
        kind: kind.ok_or_else(|| AppError::validation("tableName is required"))?,
        filters,
        include_password,
    })
}

async fn read(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(CallerContext(caller)): Extension<CallerContext>,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<Json<Value>> {
    let query = parse_query(params)?;
    let data = services.snapshot.read(&caller, query).await?;
    Ok(Json(json!({ "data": data })))
}
