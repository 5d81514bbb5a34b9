//! Entity kinds managed by the platform.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::role::Role;

/// A mutable entity type, keyed by its table name on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Student,
    Teacher,
    Admin,
    Course,
    Enrollment,
}

impl EntityKind {
    /// The three principal subtypes, in lookup order.
    pub const PRINCIPALS: [EntityKind; 3] =
        [EntityKind::Student, EntityKind::Teacher, EntityKind::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Student => "student",
            EntityKind::Teacher => "teacher",
            EntityKind::Admin => "admin",
            EntityKind::Course => "course",
            EntityKind::Enrollment => "enrollment",
        }
    }

    /// Whether this kind is a principal subtype (password-protected account).
    pub fn is_principal(&self) -> bool {
        matches!(self, EntityKind::Student | EntityKind::Teacher | EntityKind::Admin)
    }

    /// The role a principal stored in this table carries. `None` for
    /// non-principal kinds.
    pub fn principal_role(&self) -> Option<Role> {
        match self {
            EntityKind::Student => Some(Role::Student),
            EntityKind::Teacher => Some(Role::Teacher),
            EntityKind::Admin => Some(Role::Admin),
            _ => None,
        }
    }
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(EntityKind::Student),
            "teacher" => Ok(EntityKind::Teacher),
            "admin" => Ok(EntityKind::Admin),
            "course" => Ok(EntityKind::Course),
            "enrollment" => Ok(EntityKind::Enrollment),
            _ => Err(AppError::validation("invalid table name")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_and_lowercases() {
        assert_eq!(" Course ".parse::<EntityKind>().unwrap(), EntityKind::Course);
        assert!("grades".parse::<EntityKind>().is_err());
    }

    #[test]
    fn principal_kinds_carry_their_role() {
        assert_eq!(EntityKind::Teacher.principal_role(), Some(Role::Teacher));
        assert_eq!(EntityKind::Course.principal_role(), None);
        assert!(EntityKind::Admin.is_principal());
        assert!(!EntityKind::Enrollment.is_principal());
    }
}
