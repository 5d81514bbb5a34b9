//! Request-scoped values inserted by the identity middleware.

use registra_auth::Caller;

/// The verified caller, available to every protected handler.
#[derive(Debug, Clone)]
pub struct CallerContext(pub Caller);

/// The raw bearer token as presented, kept so write services can forward the
/// caller's own credential to the read service.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);
