//! `registra-auth`: pure authentication/authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage: token
//! signing/verification, password hashing, login throttling, and payload
//! envelope crypto, with no IO of their own.

pub mod claims;
pub mod envelope;
pub mod password;
pub mod principal;
pub mod throttle;

pub use claims::{SessionClaims, TokenCodec, ASSERTION_TTL_SECS, SESSION_TTL_SECS};
pub use envelope::EnvelopeKey;
pub use password::{hash_password, verify_password};
pub use principal::Caller;
pub use throttle::{LoginThrottle, LOCK_WINDOW, MAX_ATTEMPTS};
