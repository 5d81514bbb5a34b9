//! Router assembly per service role.

pub mod errors;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::routing::get;
use axum::{Extension, Json, Router};
use serde_json::json;

use crate::config::ServiceKind;
use crate::middleware;
use services::AppServices;

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

fn protect(router: Router, services: &Arc<AppServices>) -> Router {
    router.layer(axum::middleware::from_fn_with_state(
        services.clone(),
        middleware::identity,
    ))
}

/// Build the router for one service role. The gateway has its own builder in
/// [`crate::gateway`]; here it only gets a health probe.
pub fn build_app(kind: ServiceKind, services: Arc<AppServices>) -> Router {
    let routes = match kind {
        ServiceKind::Auth => routes::auth::router(&services),
        ServiceKind::Read => protect(routes::read::router(), &services),
        ServiceKind::Create => protect(routes::insert::router(), &services),
        ServiceKind::Update => protect(routes::update::router(), &services),
        ServiceKind::Delete => protect(routes::delete::router(), &services),
        ServiceKind::Gateway => Router::new(),
    };

    routes
        .route("/health", get(health))
        .layer(Extension(services))
}
