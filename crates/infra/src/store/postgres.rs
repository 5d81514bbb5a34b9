//! Postgres record store.
//!
//! Runtime-built queries (no compile-time macros: the column sets vary per
//! request). Column names never come from user input unchecked; every
//! identifier is validated against the shared access policy before it is
//! interpolated. Values always travel as binds.
//!
//! The schema (`schema.sql`) carries partial unique indexes
//! (`WHERE NOT is_deleted`) for course names and per-table contact fields,
//! and a plain unique index on enrollment pairs; SQLSTATE 23505 maps to
//! [`StoreError::Conflict`]. Cross-table contact uniqueness has no single
//! index, so the policy pre-check plus per-table indexes are the coverage.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use registra_core::{access, EntityKind, JsonMap, RecordId};
use registra_policy::Filter;

use super::{RecordStore, StoreError};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(backend)?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("database error: {err}"))
}

fn conflict_message(kind: EntityKind) -> String {
    match kind {
        EntityKind::Course => "a course with this name already exists".to_string(),
        k if k.is_principal() => {
            "a user with this email, cnic, or phone already exists".to_string()
        }
        _ => "record already exists".to_string(),
    }
}

fn map_write_error(kind: EntityKind, err: sqlx::Error) -> StoreError {
    let unique = err
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505");
    if unique {
        StoreError::Conflict(conflict_message(kind))
    } else {
        backend(err)
    }
}

/// Only policy-known identifiers may be interpolated into SQL.
fn ensure_column(kind: EntityKind, column: &str) -> Result<(), StoreError> {
    let known = column == "id"
        || column == "is_deleted"
        || column == "password"
        || access::select_fields(kind).contains(&column)
        || access::insert_fields(kind).contains(&column);
    if known {
        Ok(())
    } else {
        Err(StoreError::Backend(format!(
            "unknown column '{column}' for table {kind}"
        )))
    }
}

fn push_value(qb: &mut QueryBuilder<'_, Postgres>, value: &Value) -> Result<(), StoreError> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                qb.push_bind(i);
            } else if let Some(f) = n.as_f64() {
                qb.push_bind(f);
            } else {
                return Err(StoreError::Backend(format!("unbindable number: {n}")));
            }
        }
        Value::String(s) => {
            qb.push_bind(s.clone());
        }
        Value::Bool(b) => {
            qb.push_bind(*b);
        }
        other => {
            return Err(StoreError::Backend(format!(
                "unbindable value for storage: {other}"
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl RecordStore for PgStore {
    async fn select(
        &self,
        kind: EntityKind,
        filters: &[Filter],
    ) -> Result<Vec<JsonMap>, StoreError> {
        let table = kind.as_str();
        let mut qb =
            QueryBuilder::<Postgres>::new(format!("SELECT to_jsonb(t.*) AS row FROM {table} t"));
        for (i, filter) in filters.iter().enumerate() {
            ensure_column(kind, &filter.column)?;
            qb.push(if i == 0 { " WHERE " } else { " AND " });
            qb.push(format!("t.{}::text = ANY(", filter.column));
            qb.push_bind(filter.values.clone());
            qb.push(")");
        }
        qb.push(" ORDER BY t.id");

        let rows = qb.build().fetch_all(&self.pool).await.map_err(backend)?;
        rows.into_iter()
            .map(|row| {
                let value: Value = row.try_get("row").map_err(backend)?;
                value
                    .as_object()
                    .cloned()
                    .ok_or_else(|| StoreError::Backend("row was not a JSON object".to_string()))
            })
            .collect()
    }

    async fn insert(&self, kind: EntityKind, rows: Vec<JsonMap>) -> Result<u64, StoreError> {
        let table = kind.as_str();
        let mut inserted = 0;
        for row in rows {
            let fields: Vec<(&String, &Value)> =
                row.iter().filter(|(_, v)| !v.is_null()).collect();
            if fields.is_empty() {
                continue;
            }

            let mut qb = QueryBuilder::<Postgres>::new(format!("INSERT INTO {table} ("));
            for (i, (column, _)) in fields.iter().enumerate() {
                ensure_column(kind, column)?;
                if i > 0 {
                    qb.push(", ");
                }
                qb.push(column.as_str());
            }
            qb.push(") VALUES (");
            for (i, (_, value)) in fields.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                push_value(&mut qb, value)?;
            }
            qb.push(")");
            if kind == EntityKind::Enrollment {
                // Duplicate pairs drop silently; the count reveals the drop.
                qb.push(" ON CONFLICT (student_id, course_id) DO NOTHING");
            }

            let result = qb
                .build()
                .execute(&self.pool)
                .await
                .map_err(|e| map_write_error(kind, e))?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: RecordId,
        fields: &JsonMap,
    ) -> Result<u64, StoreError> {
        let table = kind.as_str();
        let mut qb = QueryBuilder::<Postgres>::new(format!("UPDATE {table} SET "));
        let mut first = true;
        for (column, value) in fields.iter().filter(|(_, v)| !v.is_null()) {
            ensure_column(kind, column)?;
            if !first {
                qb.push(", ");
            }
            first = false;
            qb.push(format!("{column} = "));
            push_value(&mut qb, value)?;
        }
        if first {
            return Ok(0);
        }
        qb.push(" WHERE id = ");
        qb.push_bind(id.as_i64());

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(kind, e))?;
        Ok(result.rows_affected())
    }

    async fn soft_delete(
        &self,
        kind: EntityKind,
        ids: &[RecordId],
        force_inactive: bool,
    ) -> Result<u64, StoreError> {
        let table = kind.as_str();
        let status_clause = if force_inactive { ", status = 'inactive'" } else { "" };
        let sql = format!(
            "UPDATE {table} SET is_deleted = TRUE{status_clause} \
             WHERE id = ANY($1) AND is_deleted = FALSE"
        );
        let ids: Vec<i64> = ids.iter().map(RecordId::as_i64).collect();
        let result = sqlx::query(&sql)
            .bind(&ids)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected())
    }

    async fn hard_delete(&self, kind: EntityKind, ids: &[RecordId]) -> Result<u64, StoreError> {
        let table = kind.as_str();
        let sql = format!("DELETE FROM {table} WHERE id = ANY($1)");
        let ids: Vec<i64> = ids.iter().map(RecordId::as_i64).collect();
        let result = sqlx::query(&sql)
            .bind(&ids)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected())
    }
}
