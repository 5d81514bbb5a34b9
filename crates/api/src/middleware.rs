//! Identity middleware for the protected routes of every service.
//!
//! Two credentials are accepted, tried in order:
//! - `x-identity`: the gateway's short-lived signed assertion. Signature
//!   verification alone suffices; the gateway already consulted the Token
//!   Service for this request.
//! - `authorization: Bearer <token>`: a raw session token, validated the
//!   full way (signature plus live-token store). Keeps the services usable
//!   without a gateway in front.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

use registra_auth::Caller;
use registra_core::AppResult;

use crate::app::errors::json_error;
use crate::app::services::AppServices;
use crate::context::{BearerToken, CallerContext};

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

async fn resolve_caller(services: &AppServices, headers: &HeaderMap) -> AppResult<Option<Caller>> {
    if let Some(assertion) = headers.get("x-identity").and_then(|v| v.to_str().ok()) {
        return services.codec.verify_assertion(assertion).map(Some);
    }
    match extract_bearer(headers) {
        Some(token) => services.session.validate(token).await.map(Some),
        None => Ok(None),
    }
}

pub async fn identity(
    State(services): State<Arc<AppServices>>,
    mut request: Request,
    next: Next,
) -> Response {
    match resolve_caller(&services, request.headers()).await {
        Ok(Some(caller)) => {
            if let Some(token) = extract_bearer(request.headers()).map(str::to_string) {
                request.extensions_mut().insert(BearerToken(token));
            }
            request.extensions_mut().insert(CallerContext(caller));
            next.run(request).await
        }
        Ok(None) => json_error(
            StatusCode::UNAUTHORIZED,
            "authentication_error",
            "missing bearer token",
        ),
        Err(err) => json_error(StatusCode::UNAUTHORIZED, err.code(), err.to_string()),
    }
}
