//! Resolved caller identity.

use serde::{Deserialize, Serialize};

use registra_core::{RecordId, Role};

/// A fully resolved principal identity, as carried in session tokens and in
/// the gateway's signed `x-identity` assertion.
///
/// Construction is intentionally decoupled from transport: the Token Service
/// resolves it at login, everything downstream only verifies it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub id: RecordId,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
