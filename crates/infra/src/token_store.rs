//! Live-token storage.
//!
//! The Token Service's revocation authority: a signed token is only valid
//! while its row is present here. `replace` enforces the single-session
//! invariant (at most one live token per (principal, role)) atomically, so
//! concurrent logins by the same principal cannot lose a delete.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use registra_core::{RecordId, Role};

use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub token: String,
    pub principal_id: RecordId,
    pub role: Role,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Delete every live token owned by (principal, role) and insert the new
    /// one, as one atomic unit.
    async fn replace(&self, record: TokenRecord) -> Result<(), StoreError>;

    async fn find(&self, token: &str) -> Result<Option<TokenRecord>, StoreError>;

    /// Remove one token. Returns whether it existed.
    async fn remove(&self, token: &str) -> Result<bool, StoreError>;

    /// Delete rows past expiry. Advisory only: `validate` rechecks expiry
    /// independently.
    async fn sweep(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// In-memory token store; one mutex makes `replace` atomic.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<HashMap<String, TokenRecord>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn replace(&self, record: TokenRecord) -> Result<(), StoreError> {
        let mut tokens = self
            .tokens
            .lock()
            .map_err(|_| StoreError::Backend("token store lock poisoned".to_string()))?;
        tokens.retain(|_, existing| {
            !(existing.principal_id == record.principal_id && existing.role == record.role)
        });
        tokens.insert(record.token.clone(), record);
        Ok(())
    }

    async fn find(&self, token: &str) -> Result<Option<TokenRecord>, StoreError> {
        let tokens = self
            .tokens
            .lock()
            .map_err(|_| StoreError::Backend("token store lock poisoned".to_string()))?;
        Ok(tokens.get(token).cloned())
    }

    async fn remove(&self, token: &str) -> Result<bool, StoreError> {
        let mut tokens = self
            .tokens
            .lock()
            .map_err(|_| StoreError::Backend("token store lock poisoned".to_string()))?;
        Ok(tokens.remove(token).is_some())
    }

    async fn sweep(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tokens = self
            .tokens
            .lock()
            .map_err(|_| StoreError::Backend("token store lock poisoned".to_string()))?;
        let before = tokens.len();
        tokens.retain(|_, record| record.expires_at > now);
        Ok((before - tokens.len()) as u64)
    }
}

/// Postgres token store; `replace` runs delete+insert in one transaction.
pub struct PgTokenStore {
    pool: sqlx::PgPool,
}

impl PgTokenStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("database error: {err}"))
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn replace(&self, record: TokenRecord) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        sqlx::query("DELETE FROM session_token WHERE principal_id = $1 AND role = $2")
            .bind(record.principal_id.as_i64())
            .bind(record.role.as_str())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        sqlx::query(
            "INSERT INTO session_token (token, principal_id, role, issued_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&record.token)
        .bind(record.principal_id.as_i64())
        .bind(record.role.as_str())
        .bind(record.issued_at)
        .bind(record.expires_at)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;
        tx.commit().await.map_err(backend)
    }

    async fn find(&self, token: &str) -> Result<Option<TokenRecord>, StoreError> {
        use sqlx::Row;

        let row = sqlx::query(
            "SELECT token, principal_id, role, issued_at, expires_at \
             FROM session_token WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(|row| {
            let role: String = row.try_get("role").map_err(backend)?;
            Ok(TokenRecord {
                token: row.try_get("token").map_err(backend)?,
                principal_id: RecordId::new(row.try_get("principal_id").map_err(backend)?),
                role: role
                    .parse()
                    .map_err(|_| StoreError::Backend(format!("unknown stored role: {role}")))?,
                issued_at: row.try_get("issued_at").map_err(backend)?,
                expires_at: row.try_get("expires_at").map_err(backend)?,
            })
        })
        .transpose()
    }

    async fn remove(&self, token: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM session_token WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn sweep(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM session_token WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(token: &str, principal: i64, role: Role, ttl_secs: i64) -> TokenRecord {
        let now = Utc::now();
        TokenRecord {
            token: token.to_string(),
            principal_id: RecordId::new(principal),
            role,
            issued_at: now,
            expires_at: now + Duration::seconds(ttl_secs),
        }
    }

    #[tokio::test]
    async fn replace_evicts_the_prior_token_for_the_same_owner() {
        let store = MemoryTokenStore::new();
        store.replace(record("t1", 7, Role::Student, 3600)).await.unwrap();
        store.replace(record("t2", 7, Role::Student, 3600)).await.unwrap();

        assert!(store.find("t1").await.unwrap().is_none());
        assert!(store.find("t2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn same_id_different_role_keeps_both_sessions() {
        let store = MemoryTokenStore::new();
        store.replace(record("t1", 7, Role::Student, 3600)).await.unwrap();
        store.replace(record("t2", 7, Role::Teacher, 3600)).await.unwrap();

        assert!(store.find("t1").await.unwrap().is_some());
        assert!(store.find("t2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_rows() {
        let store = MemoryTokenStore::new();
        store.replace(record("live", 1, Role::Admin, 3600)).await.unwrap();
        store.replace(record("dead", 2, Role::Student, -10)).await.unwrap();

        let swept = store.sweep(Utc::now()).await.unwrap();
        assert_eq!(swept, 1);
        assert!(store.find("live").await.unwrap().is_some());
        assert!(store.find("dead").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_reports_presence() {
        let store = MemoryTokenStore::new();
        store.replace(record("t", 1, Role::Admin, 3600)).await.unwrap();
        assert!(store.remove("t").await.unwrap());
        assert!(!store.remove("t").await.unwrap());
    }
}
