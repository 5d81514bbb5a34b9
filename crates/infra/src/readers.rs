//! `SnapshotReader` adapters.
//!
//! Hooks observe state through `registra_policy::SnapshotReader`; these two
//! adapters back that trait with the in-process snapshot service (single
//! binary, tests) or with the read service over HTTP (split deployment).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use registra_auth::{Caller, TokenCodec};
use registra_core::{AppError, AppResult, EntityKind, JsonMap};
use registra_policy::{Filter, SnapshotReader};

use crate::snapshot::{ReadQuery, SnapshotService};

/// Fixed timeout for one Oracle round trip.
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// In-process adapter: hook queries go straight to the snapshot engine.
pub struct StoreSnapshotReader {
    snapshot: Arc<SnapshotService>,
}

impl StoreSnapshotReader {
    pub fn new(snapshot: Arc<SnapshotService>) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl SnapshotReader for StoreSnapshotReader {
    async fn query(
        &self,
        caller: &Caller,
        _bearer: Option<&str>,
        kind: EntityKind,
        filters: &[Filter],
        include_password: bool,
    ) -> AppResult<Vec<JsonMap>> {
        self.snapshot
            .read(
                caller,
                ReadQuery {
                    kind,
                    filters: filters.to_vec(),
                    include_password,
                },
            )
            .await
    }
}

#[derive(Deserialize)]
struct ReadResponse {
    data: Vec<JsonMap>,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// HTTP adapter: queries the read service under the caller's credentials,
/// carrying the signed identity assertion plus the original bearer token.
pub struct HttpSnapshotReader {
    client: reqwest::Client,
    base_url: String,
    codec: TokenCodec,
}

impl HttpSnapshotReader {
    pub fn new(base_url: impl Into<String>, codec: TokenCodec) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(READ_TIMEOUT)
            .build()
            .map_err(|e| AppError::internal(format!("http client construction failed: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            codec,
        })
    }
}

#[async_trait]
impl SnapshotReader for HttpSnapshotReader {
    async fn query(
        &self,
        caller: &Caller,
        bearer: Option<&str>,
        kind: EntityKind,
        filters: &[Filter],
        include_password: bool,
    ) -> AppResult<Vec<JsonMap>> {
        let mut params: Vec<(String, String)> =
            vec![("tableName".to_string(), kind.as_str().to_string())];
        for filter in filters {
            params.push((filter.column.clone(), filter.wire_value()));
        }
        if include_password {
            params.push(("includePassword".to_string(), "true".to_string()));
        }

        let assertion = self.codec.sign_assertion(caller, Utc::now())?;
        let mut request = self
            .client
            .get(format!("{}/read", self.base_url))
            .query(&params)
            .header("x-identity", assertion);
        if let Some(bearer) = bearer {
            request = request.header("authorization", format!("Bearer {bearer}"));
        }

        // Timeouts and transport failures deny the mutation; never allow.
        let response = request
            .send()
            .await
            .map_err(|e| AppError::upstream(format!("read service unreachable: {e}")))?;

        let status = response.status();
        if status.is_success() {
            let body: ReadResponse = response
                .json()
                .await
                .map_err(|e| AppError::upstream(format!("malformed read service response: {e}")))?;
            return Ok(body.data);
        }

        let message = response
            .json::<ErrorBody>()
            .await
            .unwrap_or_default()
            .message;
        Err(match status.as_u16() {
            400 => AppError::validation(message),
            401 => AppError::authentication(message),
            403 => AppError::authorization(message),
            404 => AppError::not_found(message),
            429 => AppError::throttled(message),
            code => AppError::upstream(format!("read service returned {code}: {message}")),
        })
    }
}
