//! The public gateway: rate limiting, identity resolution, envelope
//! decryption, and relaying to the internal services.

pub mod proxy;
pub mod rate_limit;

pub use proxy::{build_gateway, GatewayState};
pub use rate_limit::{GatewayLimiter, RouteClass};
