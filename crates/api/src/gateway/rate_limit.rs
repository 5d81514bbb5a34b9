//! Per-IP token-bucket rate limiting, applied before authentication so
//! unauthenticated floods are shed at the door.

use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::http::HeaderMap;
use dashmap::DashMap;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

use registra_core::{AppError, AppResult};

/// Route family for quota purposes. Classified by path prefix only; the
/// budget must be charged before any body or credential is examined.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RouteClass {
    Auth,
    Read,
    Create,
    Update,
    Delete,
}

impl RouteClass {
    /// Classify by the first path segment. `None` means the gateway has no
    /// upstream for this path.
    pub fn classify(path: &str) -> Option<Self> {
        let segment = path.trim_start_matches('/').split('/').next()?;
        match segment {
            "auth" => Some(Self::Auth),
            "read" => Some(Self::Read),
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    /// Requests per minute per client IP. Reads dominate normal traffic;
    /// credential guessing and destructive verbs get the tightest budgets.
    fn per_minute(self) -> NonZeroU32 {
        let limit = match self {
            Self::Read => 100,
            Self::Create => 15,
            Self::Auth | Self::Update | Self::Delete => 10,
        };
        NonZeroU32::new(limit).unwrap_or(NonZeroU32::MIN)
    }
}

/// One token bucket per (route class, client IP) pair, created lazily.
#[derive(Default)]
pub struct GatewayLimiter {
    buckets: DashMap<(RouteClass, IpAddr), Arc<DefaultDirectRateLimiter>>,
}

impl GatewayLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, class: RouteClass, ip: IpAddr) -> AppResult<()> {
        let limiter = self
            .buckets
            .entry((class, ip))
            .or_insert_with(|| {
                Arc::new(RateLimiter::direct(Quota::per_minute(class.per_minute())))
            })
            .clone();

        limiter.check().map_err(|_| {
            tracing::warn!(%ip, ?class, "rate limit exceeded");
            AppError::throttled("too many requests, slow down")
        })
    }
}

/// Best-effort client address: proxy headers first, then the socket peer.
pub fn extract_client_ip(headers: &HeaderMap, peer: IpAddr) -> IpAddr {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            if let Ok(ip) = first.trim().parse() {
                return ip;
            }
        }
    }
    if let Some(real) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if let Ok(ip) = real.trim().parse() {
            return ip;
        }
    }
    peer
}
