//! In-memory snapshot reader for hook tests.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use registra_auth::Caller;
use registra_core::{AppError, AppResult, EntityKind, JsonMap, RecordId, Role};

use crate::reader::{Filter, SnapshotReader};

/// A canned snapshot: fixed rows per table, equality filtering, no role
/// scoping (tests control the data instead).
#[derive(Default)]
pub(crate) struct InMemoryReader {
    tables: HashMap<EntityKind, Vec<JsonMap>>,
    unreachable: bool,
}

impl InMemoryReader {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, kind: EntityKind, rows: Value) -> Self {
        let rows = rows
            .as_array()
            .expect("rows must be a JSON array")
            .iter()
            .map(|row| row.as_object().expect("row must be an object").clone())
            .collect();
        self.tables.insert(kind, rows);
        self
    }

    /// Make every query fail as if the read service were down.
    pub(crate) fn unreachable() -> Self {
        Self {
            tables: HashMap::new(),
            unreachable: true,
        }
    }
}

fn matches(row: &JsonMap, filter: &Filter) -> bool {
    let Some(value) = row.get(&filter.column) else {
        return false;
    };
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        _ => return false,
    };
    filter.values.iter().any(|candidate| candidate == &text)
}

#[async_trait]
impl SnapshotReader for InMemoryReader {
    async fn query(
        &self,
        _caller: &Caller,
        _bearer: Option<&str>,
        kind: EntityKind,
        filters: &[Filter],
        include_password: bool,
    ) -> AppResult<Vec<JsonMap>> {
        if self.unreachable {
            return Err(AppError::upstream("read service unreachable"));
        }

        let rows = self.tables.get(&kind).cloned().unwrap_or_default();
        Ok(rows
            .into_iter()
            .filter(|row| filters.iter().all(|f| matches(row, f)))
            .map(|mut row| {
                if !include_password {
                    row.remove("password");
                }
                row
            })
            .collect())
    }
}

pub(crate) fn caller(id: i64, role: Role) -> Caller {
    Caller {
        id: RecordId::new(id),
        name: format!("principal-{id}"),
        email: format!("p{id}@uni.edu"),
        role,
    }
}
