//! Schema-level payload validation.
//!
//! Runs before any hook and collects every violation, not just the first,
//! so a client fixes a bad request in one round trip. Cross-entity checks
//! (uniqueness, references, ownership) are the hooks' job, not this
//! module's.

use registra_core::records::{get_i64, get_str};
use registra_core::{AppError, AppResult, EntityKind, JsonMap};

const MIN_PASSWORD_LEN: usize = 6;

fn is_valid_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.contains('.')
        && !value.contains(char::is_whitespace)
        && !domain.contains('@')
}

fn present(payload: &JsonMap, key: &str) -> bool {
    payload.get(key).is_some_and(|v| !v.is_null())
}

fn non_empty_str(payload: &JsonMap, key: &str) -> bool {
    get_str(payload, key).is_some_and(|s| !s.trim().is_empty())
}

fn check_email(payload: &JsonMap, violations: &mut Vec<String>) {
    if let Some(email) = get_str(payload, "email") {
        if !is_valid_email(email.trim()) {
            violations.push("email must be a valid email address".to_string());
        }
    }
}

fn check_status(payload: &JsonMap, violations: &mut Vec<String>) {
    if let Some(status) = get_str(payload, "status") {
        if !matches!(status.trim().to_ascii_lowercase().as_str(), "active" | "inactive") {
            violations.push("status must be one of: active, inactive".to_string());
        }
    }
}

fn check_credit_hours(payload: &JsonMap, required: bool, violations: &mut Vec<String>) {
    match get_i64(payload, "credit_hours") {
        Some(hours) if (1..=3).contains(&hours) => {}
        Some(_) => violations.push("credit_hours must be 1, 2, or 3".to_string()),
        None if required => violations.push("credit_hours is required".to_string()),
        None => {
            if present(payload, "credit_hours") {
                violations.push("credit_hours must be 1, 2, or 3".to_string());
            }
        }
    }
}

fn check_password(payload: &JsonMap, key: &str, required: bool, violations: &mut Vec<String>) {
    match get_str(payload, key) {
        Some(password) if password.len() >= MIN_PASSWORD_LEN => {}
        Some(_) => violations.push(format!(
            "{key} must be at least {MIN_PASSWORD_LEN} characters"
        )),
        None if required => violations.push(format!("{key} is required")),
        None => {}
    }
}

/// Validate a create payload for `kind`, collecting all violations.
pub fn validate_insert(kind: EntityKind, payload: &JsonMap) -> AppResult<()> {
    let mut violations = Vec::new();

    match kind {
        EntityKind::Student | EntityKind::Teacher | EntityKind::Admin => {
            if !non_empty_str(payload, "name") {
                violations.push("name is required".to_string());
            }
            if !non_empty_str(payload, "email") {
                violations.push("email is required".to_string());
            } else {
                check_email(payload, &mut violations);
            }
            check_password(payload, "password", true, &mut violations);
            check_status(payload, &mut violations);
        }
        EntityKind::Course => {
            if !non_empty_str(payload, "name") {
                violations.push("name is required".to_string());
            }
            if get_i64(payload, "teacher_id").is_none() {
                violations.push("teacher_id is required".to_string());
            }
            check_credit_hours(payload, true, &mut violations);
        }
        EntityKind::Enrollment => {
            if !present(payload, "course_id") {
                violations.push("course_id is required".to_string());
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(violations))
    }
}

/// Validate an update payload: only the fields actually present are checked.
pub fn validate_update(kind: EntityKind, payload: &JsonMap) -> AppResult<()> {
    let mut violations = Vec::new();

    match kind {
        EntityKind::Student | EntityKind::Teacher | EntityKind::Admin => {
            if present(payload, "name") && !non_empty_str(payload, "name") {
                violations.push("name must not be empty".to_string());
            }
            check_email(payload, &mut violations);
            check_status(payload, &mut violations);
            check_password(payload, "new_password", false, &mut violations);
        }
        EntityKind::Course => {
            if present(payload, "name") && !non_empty_str(payload, "name") {
                violations.push("name must not be empty".to_string());
            }
            if present(payload, "teacher_id") && get_i64(payload, "teacher_id").is_none() {
                violations.push("teacher_id must be an id".to_string());
            }
            check_credit_hours(payload, false, &mut violations);
        }
        EntityKind::Enrollment => {}
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(violations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> JsonMap {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn collects_every_violation_not_just_the_first() {
        let err = validate_insert(
            EntityKind::Student,
            &payload(json!({"email": "not-an-email", "password": "abc"})),
        )
        .unwrap_err();
        let AppError::Validation(violations) = err else {
            panic!("expected validation error");
        };
        assert_eq!(violations.len(), 3);
        assert!(violations.iter().any(|v| v.contains("name")));
        assert!(violations.iter().any(|v| v.contains("email")));
        assert!(violations.iter().any(|v| v.contains("password")));
    }

    #[test]
    fn accepts_a_complete_student_payload() {
        let result = validate_insert(
            EntityKind::Student,
            &payload(json!({
                "name": "Ada", "email": "ada@uni.edu", "password": "hunter22",
                "status": "active"
            })),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn credit_hours_must_be_one_two_or_three() {
        let err = validate_insert(
            EntityKind::Course,
            &payload(json!({"name": "Algo", "teacher_id": 7, "credit_hours": 5})),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        for hours in [1, 2, 3] {
            assert!(validate_insert(
                EntityKind::Course,
                &payload(json!({"name": "Algo", "teacher_id": 7, "credit_hours": hours})),
            )
            .is_ok());
        }
    }

    #[test]
    fn email_shape_is_checked() {
        for bad in ["no-at.example.com", "@missing-local.com", "x@nodot", "a b@c.d", "x@.com"] {
            assert!(!is_valid_email(bad), "{bad} should be invalid");
        }
        assert!(is_valid_email("ada.lovelace@uni.edu"));
    }

    #[test]
    fn update_only_checks_present_fields() {
        assert!(validate_update(EntityKind::Student, &payload(json!({"phone": "123"}))).is_ok());
        assert!(validate_update(
            EntityKind::Student,
            &payload(json!({"status": "archived"}))
        )
        .is_err());
        assert!(validate_update(
            EntityKind::Course,
            &payload(json!({"credit_hours": 9}))
        )
        .is_err());
    }
}
