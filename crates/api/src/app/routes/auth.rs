//! Token Service routes: login, whoami, logout.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::errors::ApiResult;
use crate::app::services::AppServices;
use crate::context::{BearerToken, CallerContext};
use crate::middleware;

/// `/auth/login` stays public; everything else requires a live session.
pub fn router(services: &Arc<AppServices>) -> Router {
    let protected = Router::new()
        .route("/auth/me", get(me))
        .route("/auth/logout", post(logout))
        .layer(axum::middleware::from_fn_with_state(
            services.clone(),
            middleware::identity,
        ));

    Router::new()
        .route("/auth/login", post(login))
        .merge(protected)
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<Value>> {
    let outcome = services
        .session
        .issue(&request.email, &request.password)
        .await?;
    Ok(Json(json!({
        "message": "login successful",
        "token": outcome.token,
        "expires_at": outcome.expires_at.to_rfc3339(),
        "user": outcome.caller,
    })))
}

async fn me(Extension(CallerContext(caller)): Extension<CallerContext>) -> Json<Value> {
    Json(json!({ "user": caller }))
}

async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    bearer: Option<Extension<BearerToken>>,
) -> ApiResult<Json<Value>> {
    // Revocation needs the token itself; an assertion-only caller has
    // nothing to revoke.
    let Some(Extension(BearerToken(token))) = bearer else {
        return Err(registra_core::AppError::authentication("missing bearer token").into());
    };
    services.session.revoke(&token).await?;
    Ok(Json(json!({ "message": "logged out" })))
}
