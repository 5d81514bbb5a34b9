//! The relay itself.
//!
//! Order of operations for every request: classify the route, charge the
//! rate-limit budget, unwrap the encrypted envelope (mutating verbs only),
//! resolve the caller against the Token Service, then forward to the
//! class's upstream with a signed `x-identity` assertion attached. A local
//! failure at any step is a fixed response; only an upstream HTTP error is
//! relayed verbatim.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use registra_auth::{Caller, EnvelopeKey, TokenCodec};
use registra_core::{AppError, AppResult};

use crate::app::errors::{json_error, ApiError};
use crate::config::{Config, Upstreams};
use crate::gateway::rate_limit::{extract_client_ip, GatewayLimiter, RouteClass};

/// One relayed body may not exceed this.
const BODY_LIMIT: usize = 2 * 1024 * 1024;

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(5);

/// Hop-specific headers that must not be forwarded. `x-identity` is stripped
/// so a client can never smuggle its own assertion past the gateway.
const STRIPPED_HEADERS: [&str; 7] = [
    "host",
    "connection",
    "content-length",
    "accept-encoding",
    "cookie",
    "transfer-encoding",
    "x-identity",
];

pub struct GatewayState {
    codec: TokenCodec,
    client: reqwest::Client,
    upstreams: Upstreams,
    envelope: Arc<EnvelopeKey>,
    limiter: GatewayLimiter,
}

impl GatewayState {
    pub fn new(
        codec: TokenCodec,
        upstreams: Upstreams,
        envelope: Arc<EnvelopeKey>,
    ) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .build()
            .map_err(|e| AppError::internal(format!("http client construction failed: {e}")))?;
        Ok(Self {
            codec,
            client,
            upstreams,
            envelope,
            limiter: GatewayLimiter::new(),
        })
    }

    fn upstream_base(&self, class: RouteClass) -> &str {
        match class {
            RouteClass::Auth => &self.upstreams.auth,
            RouteClass::Read => &self.upstreams.read,
            RouteClass::Create => &self.upstreams.create,
            RouteClass::Update => &self.upstreams.update,
            RouteClass::Delete => &self.upstreams.delete,
        }
    }
}

pub fn build_gateway(config: &Config) -> anyhow::Result<Router> {
    let codec = TokenCodec::new(config.jwt_secret.as_bytes());
    let envelope = config.load_envelope_key()?;
    let state = Arc::new(GatewayState::new(
        codec,
        config.upstreams.clone(),
        envelope,
    )?);
    Ok(router(state))
}

pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .fallback(relay)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn is_mutating(method: &Method) -> bool {
    [Method::POST, Method::PATCH, Method::PUT, Method::DELETE].contains(method)
}

#[derive(Deserialize)]
struct EncryptedBody {
    encrypted: String,
}

/// Replace an `{ "encrypted": <armored> }` body with its plaintext. Bodies
/// without that shape pass through untouched; a body that claims the shape
/// but fails to decrypt is rejected outright.
fn unwrap_envelope(envelope: &EnvelopeKey, body: &[u8]) -> AppResult<Vec<u8>> {
    match serde_json::from_slice::<EncryptedBody>(body) {
        Ok(wrapped) => envelope.open(&wrapped.encrypted),
        Err(_) => Ok(body.to_vec()),
    }
}

#[derive(Deserialize)]
struct MeResponse {
    user: Caller,
}

/// Ask the Token Service who the bearer is. Its verdict is relayed as-is;
/// unreachability is a deny.
async fn resolve_identity(state: &GatewayState, bearer: &str) -> Result<Caller, Response> {
    let result = state
        .client
        .get(format!("{}/auth/me", state.upstreams.auth))
        .header(header::AUTHORIZATION, format!("Bearer {bearer}"))
        .send()
        .await;

    let response = match result {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(%err, "token service unreachable");
            return Err(json_error(
                StatusCode::BAD_GATEWAY,
                "upstream_unreachable",
                "authentication service unreachable",
            ));
        }
    };

    if !response.status().is_success() {
        return Err(relay_response(response).await);
    }
    match response.json::<MeResponse>().await {
        Ok(body) => Ok(body.user),
        Err(err) => {
            tracing::warn!(%err, "malformed token service response");
            Err(json_error(
                StatusCode::BAD_GATEWAY,
                "upstream_unreachable",
                "authentication service unreachable",
            ))
        }
    }
}

/// Mirror an upstream response: status, content type, body. Nothing else
/// crosses back through the gateway.
async fn relay_response(response: reqwest::Response) -> Response {
    let status = response.status();
    let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
    let bytes = response.bytes().await.unwrap_or_default();

    let mut builder = axum::http::Response::builder().status(status);
    if let Some(content_type) = content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    builder
        .body(Body::from(bytes))
        .map(IntoResponse::into_response)
        .unwrap_or_else(|_| {
            json_error(
                StatusCode::BAD_GATEWAY,
                "upstream_unreachable",
                "upstream service unreachable",
            )
        })
}

fn forwardable_headers(headers: &HeaderMap) -> impl Iterator<Item = (&header::HeaderName, &header::HeaderValue)> {
    headers
        .iter()
        .filter(|(name, _)| !STRIPPED_HEADERS.contains(&name.as_str()))
}

async fn relay(
    State(state): State<Arc<GatewayState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let path = request.uri().path().to_string();
    let Some(class) = RouteClass::classify(&path) else {
        return json_error(StatusCode::NOT_FOUND, "not_found", "unknown route");
    };

    let ip = extract_client_ip(request.headers(), peer.ip());
    if let Err(err) = state.limiter.check(class, ip) {
        return ApiError(err).into_response();
    }

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, BODY_LIMIT).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return json_error(
                StatusCode::BAD_REQUEST,
                "validation_error",
                "unable to read request body",
            )
        }
    };

    let body = if is_mutating(&parts.method) && !body.is_empty() {
        match unwrap_envelope(&state.envelope, &body) {
            Ok(plain) => plain,
            Err(err) => return ApiError(err).into_response(),
        }
    } else {
        body.to_vec()
    };

    // The Token Service authenticates its own routes; everything else needs
    // the caller resolved here so the assertion can be attached.
    let assertion = if class == RouteClass::Auth {
        None
    } else {
        let bearer = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        let Some(bearer) = bearer else {
            return json_error(
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "missing bearer token",
            );
        };
        let caller = match resolve_identity(&state, bearer).await {
            Ok(caller) => caller,
            Err(response) => return response,
        };
        match state.codec.sign_assertion(&caller, Utc::now()) {
            Ok(assertion) => Some(assertion),
            Err(err) => return ApiError(err).into_response(),
        }
    };

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or(&path);
    let url = format!("{}{path_and_query}", state.upstream_base(class));

    let mut builder = state.client.request(parts.method.clone(), url);
    for (name, value) in forwardable_headers(&parts.headers) {
        builder = builder.header(name, value);
    }
    if let Some(assertion) = assertion {
        builder = builder.header("x-identity", assertion);
    }

    match builder.body(body).send().await {
        Ok(response) => relay_response(response).await,
        Err(err) => {
            tracing::warn!(%err, ?class, "upstream unreachable");
            json_error(
                StatusCode::BAD_GATEWAY,
                "upstream_unreachable",
                "upstream service unreachable",
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutating_verbs_get_envelope_treatment() {
        assert!(is_mutating(&Method::POST));
        assert!(is_mutating(&Method::DELETE));
        assert!(!is_mutating(&Method::GET));
    }

    #[test]
    fn plaintext_bodies_pass_through_the_envelope_stage() {
        let key = EnvelopeKey::generate();
        let body = br#"{"table":"course","data":{}}"#;
        assert_eq!(unwrap_envelope(&key, body).unwrap(), body.to_vec());
    }

    #[test]
    fn claimed_envelopes_must_decrypt() {
        let key = EnvelopeKey::generate();
        let armored = EnvelopeKey::seal_for(&key.public_key(), b"{\"x\":1}").unwrap();
        let wrapped = serde_json::to_vec(&json!({ "encrypted": armored })).unwrap();
        assert_eq!(unwrap_envelope(&key, &wrapped).unwrap(), b"{\"x\":1}".to_vec());

        let garbage = serde_json::to_vec(&json!({ "encrypted": "nope" })).unwrap();
        let err = unwrap_envelope(&key, &garbage).unwrap_err();
        assert_eq!(err, AppError::validation("invalid encrypted envelope"));
    }

    #[test]
    fn client_identity_headers_are_stripped() {
        let mut headers = HeaderMap::new();
        headers.insert("x-identity", "forged".parse().unwrap());
        headers.insert("content-type", "application/json".parse().unwrap());
        let kept: Vec<_> = forwardable_headers(&headers)
            .map(|(name, _)| name.as_str().to_string())
            .collect();
        assert_eq!(kept, vec!["content-type"]);
    }
}
