//! The Consistency Oracle's query engine.
//!
//! Role-scoped, field-projected snapshot reads. This is the only way
//! write-path services observe each other's state, so the scoping here is a
//! real authorization boundary, not a convenience.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use registra_auth::Caller;
use registra_core::records::{get_id, get_str};
use registra_core::{access, AppError, AppResult, EntityKind, JsonMap, RecordId, Role};
use registra_policy::Filter;

use crate::store::RecordStore;

/// A parsed Oracle query: `?tableName=<t>&<field>=<v,...>&includePassword=`.
#[derive(Debug, Clone)]
pub struct ReadQuery {
    pub kind: EntityKind,
    pub filters: Vec<Filter>,
    pub include_password: bool,
}

pub struct SnapshotService {
    store: Arc<dyn RecordStore>,
}

impl SnapshotService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Whether every id filter pins the result to the caller's own record.
    fn filters_select_only_self(caller: &Caller, filters: &[Filter]) -> bool {
        let own = caller.id.to_string();
        filters
            .iter()
            .any(|f| f.column == "id" && f.values.len() == 1 && f.values[0] == own)
    }

    pub async fn read(&self, caller: &Caller, query: ReadQuery) -> AppResult<Vec<JsonMap>> {
        let ReadQuery {
            kind,
            mut filters,
            include_password,
        } = query;

        if !access::read_roles(kind).contains(&caller.role) {
            return Err(AppError::authorization("access denied"));
        }
        for filter in &filters {
            if !access::select_fields(kind).contains(&filter.column.as_str()) {
                return Err(AppError::validation(format!(
                    "unknown filter column: {}",
                    filter.column
                )));
            }
        }

        // The password hash leaves this service only for an admin or for a
        // caller pinned to their own row in their own table.
        if include_password {
            let own_table = kind.principal_role() == Some(caller.role);
            let is_self = own_table && Self::filters_select_only_self(caller, &filters);
            if !(caller.is_admin() || is_self) {
                return Err(AppError::authorization(
                    "you are not allowed to access the password field",
                ));
            }
        }

        // A student only ever sees their own enrollments, whatever the
        // request filters say.
        if kind == EntityKind::Enrollment && caller.role == Role::Student {
            filters.retain(|f| f.column != "student_id");
            filters.push(Filter::eq("student_id", caller.id.to_string()));
        }

        let rows = self.store.select(kind, &filters).await?;
        let mut rows = project(kind, rows, include_password);
        if kind == EntityKind::Course {
            self.attach_teacher_names(&mut rows).await?;
        }
        Ok(rows)
    }

    /// Enrich course rows with `teacher_name` through one batched teacher
    /// lookup.
    async fn attach_teacher_names(&self, rows: &mut [JsonMap]) -> AppResult<()> {
        let mut teacher_ids: Vec<RecordId> = rows
            .iter()
            .filter_map(|row| get_id(row, "teacher_id"))
            .collect();
        teacher_ids.sort_unstable();
        teacher_ids.dedup();
        if teacher_ids.is_empty() {
            return Ok(());
        }

        let teachers = self
            .store
            .select(EntityKind::Teacher, &[Filter::any_ids("id", &teacher_ids)])
            .await?;
        let names: HashMap<i64, String> = teachers
            .iter()
            .filter_map(|row| {
                let id = get_id(row, "id")?;
                let name = get_str(row, "name")?;
                Some((id.as_i64(), name.to_string()))
            })
            .collect();

        for row in rows {
            let name = get_id(row, "teacher_id")
                .and_then(|id| names.get(&id.as_i64()))
                .cloned();
            row.insert(
                "teacher_name".to_string(),
                name.map(Value::from).unwrap_or(Value::Null),
            );
        }
        Ok(())
    }
}

/// Project rows onto the table's read field set, appending the password hash
/// only when legally requested.
fn project(kind: EntityKind, rows: Vec<JsonMap>, include_password: bool) -> Vec<JsonMap> {
    let fields = access::select_fields(kind);
    rows.into_iter()
        .map(|row| {
            row.into_iter()
                .filter(|(key, _)| {
                    fields.contains(&key.as_str()) || (include_password && key == "password")
                })
                .collect()
        })
        .collect()
}
