//! The Token Service: issue, validate, revoke, sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use registra_auth::{verify_password, Caller, LoginThrottle, TokenCodec};
use registra_core::{AppError, AppResult, EntityKind, PrincipalRow};
use registra_policy::Filter;

use crate::store::RecordStore;
use crate::token_store::{TokenRecord, TokenStore};

/// How often the advisory expiry sweeper runs.
pub const SWEEP_PERIOD: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct LoginOutcome {
    pub token: String,
    pub caller: Caller,
    pub expires_at: chrono::DateTime<Utc>,
}

pub struct SessionService {
    store: Arc<dyn RecordStore>,
    tokens: Arc<dyn TokenStore>,
    codec: TokenCodec,
    throttle: LoginThrottle,
}

impl SessionService {
    pub fn new(store: Arc<dyn RecordStore>, tokens: Arc<dyn TokenStore>, codec: TokenCodec) -> Self {
        Self {
            store,
            tokens,
            codec,
            throttle: LoginThrottle::default(),
        }
    }

    /// Find the account for a contact identifier across every principal
    /// table, in lookup order.
    async fn lookup(&self, email: &str) -> AppResult<Option<(EntityKind, PrincipalRow)>> {
        for kind in EntityKind::PRINCIPALS {
            let rows = self
                .store
                .select(kind, &[Filter::eq("email", email)])
                .await?;
            if let Some(row) = rows.first() {
                return Ok(Some((kind, PrincipalRow::from_map(row)?)));
            }
        }
        Ok(None)
    }

    /// Issue a session token for valid credentials.
    ///
    /// Inside the lock window every attempt is throttled regardless of
    /// credential correctness. A success atomically replaces any prior live
    /// token for the same (principal, role).
    pub async fn issue(&self, email: &str, password: &str) -> AppResult<LoginOutcome> {
        let email = email.trim().to_ascii_lowercase();
        self.throttle.check(&email)?;

        let fail = |throttle: &LoginThrottle, message: &str| {
            throttle.record_failure(&email);
            Err(AppError::authentication(message.to_string()))
        };

        let Some((kind, account)) = self.lookup(&email).await? else {
            return fail(&self.throttle, "no account is registered with this email");
        };
        if account.is_deleted || account.status == registra_core::AccountStatus::Inactive {
            return fail(&self.throttle, "account is inactive");
        }
        let verified = account
            .password
            .as_deref()
            .is_some_and(|stored| verify_password(password, stored));
        if !verified {
            return fail(&self.throttle, "incorrect password");
        }

        self.throttle.reset(&email);
        let caller = Caller {
            id: account.id,
            name: account.name,
            email: account.email,
            // Lookup only walks principal tables, so the role is always set.
            role: kind
                .principal_role()
                .ok_or_else(|| AppError::internal("non-principal table in login lookup"))?,
        };

        let now = Utc::now();
        let (token, expires_at) = self.codec.sign_session(&caller, now)?;
        self.tokens
            .replace(TokenRecord {
                token: token.clone(),
                principal_id: caller.id,
                role: caller.role,
                issued_at: now,
                expires_at,
            })
            .await?;

        tracing::info!(principal = %caller.id, role = %caller.role.as_str(), "session issued");
        Ok(LoginOutcome {
            token,
            caller,
            expires_at,
        })
    }

    /// Closed revocation: a token is valid only if the signature verifies
    /// AND the row is still in the live store AND it has not expired.
    pub async fn validate(&self, token: &str) -> AppResult<Caller> {
        let claims = self.codec.verify_session(token)?;
        let record = self
            .tokens
            .find(token)
            .await?
            .ok_or_else(|| AppError::authentication("session expired or invalid"))?;
        // Sweep is advisory; expiry is rechecked here.
        if record.expires_at <= Utc::now() {
            let _ = self.tokens.remove(token).await;
            return Err(AppError::authentication("token has expired"));
        }
        Ok(claims.caller())
    }

    /// Logout. Removing an already-gone token is not an error.
    pub async fn revoke(&self, token: &str) -> AppResult<()> {
        let removed = self.tokens.remove(token).await?;
        tracing::info!(removed, "session revoked");
        Ok(())
    }
}

/// Periodically delete expired token rows. Advisory only.
pub fn spawn_sweeper(tokens: Arc<dyn TokenStore>, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match tokens.sweep(Utc::now()).await {
                Ok(0) => {}
                Ok(swept) => tracing::debug!(swept, "expired sessions swept"),
                Err(err) => tracing::warn!(%err, "session sweep failed"),
            }
        }
    })
}
