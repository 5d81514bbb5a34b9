//! Typed views over record rows.
//!
//! Rows travel as JSON objects (`{data: [...]}` on the Oracle wire). Hooks
//! need a handful of typed fields out of those maps; decoding is tolerant of
//! the 0/1 integer booleans legacy rows carry.

use serde_json::Value;

use crate::error::AppError;
use crate::id::RecordId;
use crate::role::AccountStatus;

/// A raw record row as it appears on the wire.
pub type JsonMap = serde_json::Map<String, Value>;

/// Read an integer field, accepting numbers and numeric strings.
pub fn get_i64(map: &JsonMap, key: &str) -> Option<i64> {
    match map.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn get_id(map: &JsonMap, key: &str) -> Option<RecordId> {
    get_i64(map, key).map(RecordId::new)
}

pub fn get_str<'a>(map: &'a JsonMap, key: &str) -> Option<&'a str> {
    map.get(key)?.as_str()
}

/// Read a boolean field, accepting `true`/`false` and 0/1 integers.
pub fn get_bool(map: &JsonMap, key: &str) -> Option<bool> {
    match map.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|v| v != 0),
        _ => None,
    }
}

/// Typed view of a principal row (student, teacher, or admin table).
#[derive(Debug, Clone, PartialEq)]
pub struct PrincipalRow {
    pub id: RecordId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub cnic: Option<String>,
    pub status: AccountStatus,
    pub is_deleted: bool,
    /// Present only when the row was fetched with `includePassword`.
    pub password: Option<String>,
}

impl PrincipalRow {
    pub fn from_map(map: &JsonMap) -> Result<Self, AppError> {
        Ok(Self {
            id: get_id(map, "id")
                .ok_or_else(|| AppError::internal("principal row missing id"))?,
            name: get_str(map, "name").unwrap_or_default().to_string(),
            email: get_str(map, "email").unwrap_or_default().to_string(),
            phone: get_str(map, "phone").map(str::to_string),
            cnic: get_str(map, "cnic").map(str::to_string),
            status: get_str(map, "status")
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            is_deleted: get_bool(map, "is_deleted").unwrap_or(false),
            password: get_str(map, "password").map(str::to_string),
        })
    }
}

/// Typed view of a course row.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseRow {
    pub id: RecordId,
    pub name: String,
    pub teacher_id: RecordId,
    pub credit_hours: i64,
    pub is_deleted: bool,
}

impl CourseRow {
    pub fn from_map(map: &JsonMap) -> Result<Self, AppError> {
        Ok(Self {
            id: get_id(map, "id").ok_or_else(|| AppError::internal("course row missing id"))?,
            name: get_str(map, "name").unwrap_or_default().to_string(),
            teacher_id: get_id(map, "teacher_id")
                .ok_or_else(|| AppError::internal("course row missing teacher_id"))?,
            credit_hours: get_i64(map, "credit_hours").unwrap_or(0),
            is_deleted: get_bool(map, "is_deleted").unwrap_or(false),
        })
    }
}

/// Typed view of an enrollment row.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrollmentRow {
    pub id: RecordId,
    pub student_id: RecordId,
    pub course_id: RecordId,
}

impl EnrollmentRow {
    pub fn from_map(map: &JsonMap) -> Result<Self, AppError> {
        Ok(Self {
            id: get_id(map, "id")
                .ok_or_else(|| AppError::internal("enrollment row missing id"))?,
            student_id: get_id(map, "student_id")
                .ok_or_else(|| AppError::internal("enrollment row missing student_id"))?,
            course_id: get_id(map, "course_id")
                .ok_or_else(|| AppError::internal("enrollment row missing course_id"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> JsonMap {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn tolerates_legacy_integer_booleans() {
        let row = map(json!({
            "id": 3, "name": "Ada", "email": "ada@uni.edu",
            "status": "active", "is_deleted": 1
        }));
        let principal = PrincipalRow::from_map(&row).unwrap();
        assert!(principal.is_deleted);
        assert_eq!(principal.status, AccountStatus::Active);
        assert_eq!(principal.password, None);
    }

    #[test]
    fn accepts_numeric_strings_for_ids() {
        let row = map(json!({"id": "12", "student_id": 7, "course_id": "10"}));
        let enrollment = EnrollmentRow::from_map(&row).unwrap();
        assert_eq!(enrollment.id, RecordId::new(12));
        assert_eq!(enrollment.course_id, RecordId::new(10));
    }

    #[test]
    fn missing_required_id_is_an_internal_error() {
        let row = map(json!({"name": "Algorithms", "teacher_id": 7}));
        assert!(CourseRow::from_map(&row).is_err());
    }
}
