//! In-memory record store.
//!
//! Intended for tests and single-process runs. One mutex guards all tables,
//! so each call is atomic; uniqueness is enforced check-and-insert under
//! that lock, which makes it a real backstop rather than a pre-check.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use registra_core::access::UNIQUE_CONTACT_FIELDS;
use registra_core::records::{get_bool, get_i64};
use registra_core::{EntityKind, JsonMap, RecordId};
use registra_policy::Filter;

use super::{RecordStore, StoreError};

#[derive(Debug, Default)]
struct Table {
    next_id: i64,
    rows: Vec<JsonMap>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<EntityKind, Table>>,
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn matches(row: &JsonMap, filter: &Filter) -> bool {
    row.get(&filter.column)
        .and_then(value_text)
        .is_some_and(|text| filter.values.iter().any(|v| *v == text))
}

fn is_deleted(row: &JsonMap) -> bool {
    get_bool(row, "is_deleted").unwrap_or(false)
}

fn field_text(row: &JsonMap, key: &str) -> Option<String> {
    row.get(key).and_then(value_text).filter(|s| !s.trim().is_empty())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live contact-field collision across all three principal tables,
    /// excluding one (table, id) so updates do not collide with themselves.
    fn contact_conflict(
        tables: &HashMap<EntityKind, Table>,
        candidate: &JsonMap,
        exclude: Option<(EntityKind, RecordId)>,
    ) -> bool {
        for field in UNIQUE_CONTACT_FIELDS {
            let Some(value) = field_text(candidate, field) else {
                continue;
            };
            for kind in EntityKind::PRINCIPALS {
                let Some(table) = tables.get(&kind) else {
                    continue;
                };
                for row in &table.rows {
                    if is_deleted(row) {
                        continue;
                    }
                    if let Some((ex_kind, ex_id)) = exclude {
                        if ex_kind == kind && get_i64(row, "id") == Some(ex_id.as_i64()) {
                            continue;
                        }
                    }
                    if field_text(row, field).as_deref() == Some(value.as_str()) {
                        return true;
                    }
                }
            }
        }
        false
    }

    fn course_name_conflict(
        tables: &HashMap<EntityKind, Table>,
        candidate: &JsonMap,
        exclude: Option<RecordId>,
    ) -> bool {
        let Some(name) = field_text(candidate, "name") else {
            return false;
        };
        tables
            .get(&EntityKind::Course)
            .map(|table| {
                table.rows.iter().any(|row| {
                    !is_deleted(row)
                        && exclude.map_or(true, |id| get_i64(row, "id") != Some(id.as_i64()))
                        && field_text(row, "name").as_deref() == Some(name.as_str())
                })
            })
            .unwrap_or(false)
    }

    fn enrollment_pair_exists(tables: &HashMap<EntityKind, Table>, candidate: &JsonMap) -> bool {
        let (Some(student), Some(course)) =
            (get_i64(candidate, "student_id"), get_i64(candidate, "course_id"))
        else {
            return false;
        };
        tables
            .get(&EntityKind::Enrollment)
            .map(|table| {
                table.rows.iter().any(|row| {
                    get_i64(row, "student_id") == Some(student)
                        && get_i64(row, "course_id") == Some(course)
                })
            })
            .unwrap_or(false)
    }

    fn check_insert(
        tables: &HashMap<EntityKind, Table>,
        kind: EntityKind,
        row: &JsonMap,
    ) -> Result<(), StoreError> {
        if kind.is_principal() && Self::contact_conflict(tables, row, None) {
            return Err(StoreError::Conflict(
                "a user with this email, cnic, or phone already exists".to_string(),
            ));
        }
        if kind == EntityKind::Course && Self::course_name_conflict(tables, row, None) {
            return Err(StoreError::Conflict(
                "a course with this name already exists".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn select(
        &self,
        kind: EntityKind,
        filters: &[Filter],
    ) -> Result<Vec<JsonMap>, StoreError> {
        let tables = self
            .tables
            .lock()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))?;
        Ok(tables
            .get(&kind)
            .map(|table| {
                table
                    .rows
                    .iter()
                    .filter(|row| filters.iter().all(|f| matches(row, f)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert(&self, kind: EntityKind, rows: Vec<JsonMap>) -> Result<u64, StoreError> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))?;

        let mut inserted = 0;
        for mut row in rows {
            // Duplicate enrollment pairs are dropped, not rejected; the
            // caller reads the drop off the returned count.
            if kind == EntityKind::Enrollment && Self::enrollment_pair_exists(&tables, &row) {
                continue;
            }
            Self::check_insert(&tables, kind, &row)?;

            let table = tables.entry(kind).or_default();
            table.next_id += 1;
            row.insert("id".to_string(), Value::from(table.next_id));
            if kind != EntityKind::Enrollment {
                row.entry("is_deleted").or_insert(Value::Bool(false));
            }
            if kind.is_principal() {
                row.entry("status").or_insert(Value::from("active"));
            }
            table.rows.push(row);
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: RecordId,
        fields: &JsonMap,
    ) -> Result<u64, StoreError> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))?;

        if kind.is_principal() && Self::contact_conflict(&tables, fields, Some((kind, id))) {
            return Err(StoreError::Conflict(
                "a user with this email, cnic, or phone already exists".to_string(),
            ));
        }
        if kind == EntityKind::Course && Self::course_name_conflict(&tables, fields, Some(id)) {
            return Err(StoreError::Conflict(
                "a course with this name already exists".to_string(),
            ));
        }

        let Some(table) = tables.get_mut(&kind) else {
            return Ok(0);
        };
        let Some(row) = table
            .rows
            .iter_mut()
            .find(|row| get_i64(row, "id") == Some(id.as_i64()))
        else {
            return Ok(0);
        };
        for (key, value) in fields {
            row.insert(key.clone(), value.clone());
        }
        Ok(1)
    }

    async fn soft_delete(
        &self,
        kind: EntityKind,
        ids: &[RecordId],
        force_inactive: bool,
    ) -> Result<u64, StoreError> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))?;
        let Some(table) = tables.get_mut(&kind) else {
            return Ok(0);
        };

        let wanted: Vec<i64> = ids.iter().map(RecordId::as_i64).collect();
        let mut affected = 0;
        for row in &mut table.rows {
            let in_batch = get_i64(row, "id").is_some_and(|id| wanted.contains(&id));
            if !in_batch || is_deleted(row) {
                continue;
            }
            row.insert("is_deleted".to_string(), Value::Bool(true));
            if force_inactive {
                row.insert("status".to_string(), Value::from("inactive"));
            }
            affected += 1;
        }
        Ok(affected)
    }

    async fn hard_delete(&self, kind: EntityKind, ids: &[RecordId]) -> Result<u64, StoreError> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))?;
        let Some(table) = tables.get_mut(&kind) else {
            return Ok(0);
        };

        let wanted: Vec<i64> = ids.iter().map(RecordId::as_i64).collect();
        let before = table.rows.len();
        table
            .rows
            .retain(|row| !get_i64(row, "id").is_some_and(|id| wanted.contains(&id)));
        Ok((before - table.rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> JsonMap {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn insert_assigns_sequential_ids_and_defaults() {
        let store = MemoryStore::new();
        let count = store
            .insert(
                EntityKind::Student,
                vec![
                    row(json!({"name": "Ada", "email": "ada@uni.edu"})),
                    row(json!({"name": "Alan", "email": "alan@uni.edu"})),
                ],
            )
            .await
            .unwrap();
        assert_eq!(count, 2);

        let rows = store.select(EntityKind::Student, &[]).await.unwrap();
        assert_eq!(rows[0].get("id"), Some(&json!(1)));
        assert_eq!(rows[1].get("id"), Some(&json!(2)));
        assert_eq!(rows[0].get("status"), Some(&json!("active")));
        assert_eq!(rows[0].get("is_deleted"), Some(&json!(false)));
    }

    #[tokio::test]
    async fn contact_uniqueness_is_enforced_across_principal_tables() {
        let store = MemoryStore::new();
        store
            .insert(EntityKind::Teacher, vec![row(json!({"email": "x@uni.edu"}))])
            .await
            .unwrap();

        let err = store
            .insert(EntityKind::Student, vec![row(json!({"email": "x@uni.edu"}))])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn soft_deleted_contact_can_be_reused() {
        let store = MemoryStore::new();
        store
            .insert(EntityKind::Student, vec![row(json!({"email": "x@uni.edu"}))])
            .await
            .unwrap();
        store
            .soft_delete(EntityKind::Student, &[RecordId::new(1)], true)
            .await
            .unwrap();

        assert_eq!(
            store
                .insert(EntityKind::Student, vec![row(json!({"email": "x@uni.edu"}))])
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn duplicate_enrollment_pairs_drop_silently() {
        let store = MemoryStore::new();
        let first = store
            .insert(
                EntityKind::Enrollment,
                vec![row(json!({"student_id": 7, "course_id": 10}))],
            )
            .await
            .unwrap();
        let second = store
            .insert(
                EntityKind::Enrollment,
                vec![
                    row(json!({"student_id": 7, "course_id": 10})),
                    row(json!({"student_id": 7, "course_id": 11})),
                ],
            )
            .await
            .unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 1);
    }

    #[tokio::test]
    async fn soft_delete_forces_inactive_and_counts_once() {
        let store = MemoryStore::new();
        store
            .insert(EntityKind::Student, vec![row(json!({"email": "x@uni.edu"}))])
            .await
            .unwrap();

        let first = store
            .soft_delete(EntityKind::Student, &[RecordId::new(1)], true)
            .await
            .unwrap();
        let again = store
            .soft_delete(EntityKind::Student, &[RecordId::new(1)], true)
            .await
            .unwrap();
        assert_eq!((first, again), (1, 0));

        let rows = store.select(EntityKind::Student, &[]).await.unwrap();
        assert_eq!(rows[0].get("status"), Some(&json!("inactive")));
        assert_eq!(rows[0].get("is_deleted"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn select_honors_multi_value_filters() {
        let store = MemoryStore::new();
        store
            .insert(
                EntityKind::Enrollment,
                vec![
                    row(json!({"student_id": 7, "course_id": 10})),
                    row(json!({"student_id": 7, "course_id": 11})),
                    row(json!({"student_id": 8, "course_id": 10})),
                ],
            )
            .await
            .unwrap();

        let rows = store
            .select(
                EntityKind::Enrollment,
                &[
                    Filter::eq("student_id", "7"),
                    Filter {
                        column: "course_id".to_string(),
                        values: vec!["10".to_string(), "11".to_string()],
                    },
                ],
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn update_merges_fields_and_reports_misses() {
        let store = MemoryStore::new();
        store
            .insert(EntityKind::Course, vec![row(json!({"name": "Algo", "teacher_id": 7}))])
            .await
            .unwrap();

        let affected = store
            .update(EntityKind::Course, RecordId::new(1), &row(json!({"credit_hours": 3})))
            .await
            .unwrap();
        assert_eq!(affected, 1);
        assert_eq!(
            store
                .update(EntityKind::Course, RecordId::new(99), &row(json!({"name": "X"})))
                .await
                .unwrap(),
            0
        );
    }
}
