//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Identifier of a stored record (principal, course, or enrollment).
///
/// Records use 64-bit integer ids assigned by the storage layer; id lists
/// travel comma-joined on the Oracle wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(i64);

impl RecordId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl core::fmt::Display for RecordId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<RecordId> for i64 {
    fn from(value: RecordId) -> Self {
        value.0
    }
}

impl FromStr for RecordId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| AppError::validation(format!("invalid id: {s:?}")))
    }
}

/// Parse a comma-joined id list (`"3,4,5"`) as used in batched Oracle queries.
pub fn parse_id_list(raw: &str) -> Result<Vec<RecordId>, AppError> {
    raw.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(RecordId::from_str)
        .collect()
}
