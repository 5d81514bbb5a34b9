//! Mutation executors.
//!
//! Apply a policy-approved change and report the outcome. The executors own
//! the column allow-list projection and password hashing; the policy layer
//! passes plaintext through in the `password` field and this is the single
//! place it becomes a hash.

use serde_json::Value;

use registra_auth::hash_password;
use registra_core::records::get_str;
use registra_core::{access, AppError, AppResult, EntityKind, JsonMap, RecordId};

use crate::store::RecordStore;

/// Project onto the insert allow-list, dropping unknown fields silently.
fn project(kind: EntityKind, row: &JsonMap) -> JsonMap {
    let allowed = access::insert_fields(kind);
    row.iter()
        .filter(|(key, _)| allowed.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn hash_password_field(row: &mut JsonMap) -> AppResult<()> {
    if let Some(plain) = get_str(row, "password").map(str::to_string) {
        row.insert("password".to_string(), Value::from(hash_password(&plain)?));
    }
    Ok(())
}

/// Insert 1..N policy-approved rows and report the aggregate count.
///
/// The count may be lower than the row count when the store dropped
/// duplicate enrollment pairs; there is no other signal for that.
pub async fn insert_records(
    store: &dyn RecordStore,
    kind: EntityKind,
    rows: Vec<JsonMap>,
) -> AppResult<u64> {
    let mut projected = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut row = project(kind, row);
        if row.is_empty() {
            return Err(AppError::validation("no valid fields provided"));
        }
        hash_password_field(&mut row)?;
        projected.push(row);
    }
    if projected.is_empty() {
        return Err(AppError::validation("no valid fields provided"));
    }

    let inserted = store.insert(kind, projected).await?;
    tracing::info!(kind = %kind, requested = rows.len(), inserted, "records inserted");
    Ok(inserted)
}

/// Apply one partial-column SET keyed by id.
pub async fn apply_update(
    store: &dyn RecordStore,
    kind: EntityKind,
    id: RecordId,
    mut fields: JsonMap,
) -> AppResult<()> {
    fields.remove("id");
    fields.remove("is_deleted");
    if fields.is_empty() {
        return Err(AppError::validation("no valid fields provided"));
    }
    hash_password_field(&mut fields)?;

    let affected = store.update(kind, id, &fields).await?;
    if affected == 0 {
        return Err(AppError::not_found(format!("{kind} not found")));
    }
    tracing::info!(kind = %kind, %id, "record updated");
    Ok(())
}

/// Delete over the full id list in one statement: soft-delete with forced
/// inactive status for principals, soft-delete for courses, hard delete for
/// enrollments.
pub async fn apply_delete(
    store: &dyn RecordStore,
    kind: EntityKind,
    ids: &[RecordId],
) -> AppResult<u64> {
    let deleted = match kind {
        EntityKind::Enrollment => store.hard_delete(kind, ids).await?,
        EntityKind::Course => store.soft_delete(kind, ids, false).await?,
        _ => store.soft_delete(kind, ids, true).await?,
    };
    if deleted == 0 {
        return Err(AppError::not_found(format!("{kind} not found")));
    }
    tracing::info!(kind = %kind, requested = ids.len(), deleted, "records deleted");
    Ok(deleted)
}
