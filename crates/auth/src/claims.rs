//! Session token and identity assertion claims (HS256).
//!
//! Two claim audiences share one signing secret:
//! - `registra/session`: the bearer token issued at login (1h expiry).
//!   Possession alone is not enough; validity additionally requires
//!   presence in the live-token store (closed revocation), which is the
//!   Token Service's job, not this crate's.
//! - `registra/identity`: the short-lived assertion the gateway attaches to
//!   forwarded requests, so internal hops verify identity instead of
//!   trusting an opaque header.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use registra_core::{AppError, AppResult, RecordId, Role};

use crate::principal::Caller;

/// Fixed session token lifetime.
pub const SESSION_TTL_SECS: i64 = 60 * 60;

/// Fixed identity assertion lifetime; just long enough for one hop.
pub const ASSERTION_TTL_SECS: i64 = 60;

const AUD_SESSION: &str = "registra/session";
const AUD_IDENTITY: &str = "registra/identity";

/// Claim set carried by both token kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: RecordId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    pub fn caller(&self) -> Caller {
        Caller {
            id: self.sub,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }
}

/// Signs and verifies the platform's HS256 tokens.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenCodec {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    /// Sign a session token for `caller`. Returns the token and its expiry.
    pub fn sign_session(
        &self,
        caller: &Caller,
        now: DateTime<Utc>,
    ) -> AppResult<(String, DateTime<Utc>)> {
        let expires_at = now + Duration::seconds(SESSION_TTL_SECS);
        let token = self.sign(caller, AUD_SESSION, now, expires_at)?;
        Ok((token, expires_at))
    }

    /// Verify a session token's signature and expiry.
    ///
    /// This is only half of validity; the live-token store must also be
    /// consulted.
    pub fn verify_session(&self, token: &str) -> AppResult<SessionClaims> {
        self.verify(token, AUD_SESSION)
    }

    /// Sign a one-hop identity assertion for gateway→service propagation.
    pub fn sign_assertion(&self, caller: &Caller, now: DateTime<Utc>) -> AppResult<String> {
        let expires_at = now + Duration::seconds(ASSERTION_TTL_SECS);
        self.sign(caller, AUD_IDENTITY, now, expires_at)
    }

    pub fn verify_assertion(&self, token: &str) -> AppResult<Caller> {
        self.verify(token, AUD_IDENTITY).map(|claims| claims.caller())
    }

    fn sign(
        &self,
        caller: &Caller,
        audience: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AppResult<String> {
        let claims = SessionClaims {
            sub: caller.id,
            name: caller.name.clone(),
            email: caller.email.clone(),
            role: caller.role,
            aud: audience.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::internal(format!("token signing failed: {e}")))
    }

    fn verify(&self, token: &str, audience: &str) -> AppResult<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[audience]);

        jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AppError::authentication("token has expired")
                }
                _ => AppError::authentication("invalid token"),
            })
    }
}
