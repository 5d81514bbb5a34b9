//! Failed-login throttling.
//!
//! Per-identifier failure counters in process memory. This state is a
//! throttle, not a security boundary: it is windowed, documented as
//! reset-on-restart, and never persisted.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use registra_core::{AppError, AppResult};

/// Consecutive failures before an identifier is locked.
pub const MAX_ATTEMPTS: u32 = 5;

/// How long a locked identifier stays locked after its last failure.
pub const LOCK_WINDOW: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy)]
struct FailureWindow {
    count: u32,
    last_attempt: Instant,
}

/// Tracks consecutive login failures per identifier.
///
/// Inside the lock window every attempt fails with `Throttled` regardless of
/// credential correctness; once the window elapses the counter starts fresh.
/// A successful login resets the counter.
#[derive(Debug)]
pub struct LoginThrottle {
    max_attempts: u32,
    window: Duration,
    failures: DashMap<String, FailureWindow>,
}

impl Default for LoginThrottle {
    fn default() -> Self {
        Self::new(MAX_ATTEMPTS, LOCK_WINDOW)
    }
}

impl LoginThrottle {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            failures: DashMap::new(),
        }
    }

    /// Gate an attempt before credentials are even looked at.
    pub fn check(&self, identifier: &str) -> AppResult<()> {
        self.check_at(identifier, Instant::now())
    }

    pub fn check_at(&self, identifier: &str, now: Instant) -> AppResult<()> {
        let Some(entry) = self.failures.get(identifier).map(|e| *e) else {
            return Ok(());
        };

        if entry.count >= self.max_attempts {
            if now.saturating_duration_since(entry.last_attempt) < self.window {
                return Err(AppError::throttled(
                    "Too many failed attempts. Try again later.",
                ));
            }
            // Window elapsed: the counter starts over.
            self.failures.remove(identifier);
        }

        Ok(())
    }

    pub fn record_failure(&self, identifier: &str) {
        self.record_failure_at(identifier, Instant::now());
    }

    pub fn record_failure_at(&self, identifier: &str, now: Instant) {
        self.failures
            .entry(identifier.to_string())
            .and_modify(|entry| {
                entry.count += 1;
                entry.last_attempt = now;
            })
            .or_insert(FailureWindow {
                count: 1,
                last_attempt: now,
            });
    }

    /// A successful login clears the identifier's failure history.
    pub fn reset(&self, identifier: &str) {
        self.failures.remove(identifier);
    }
}
