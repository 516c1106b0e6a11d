//! Bounded connect retry with fixed inter-attempt delay.
//!
//! Flaky radio links fail transiently; a small bounded retry with a fixed
//! backoff recovers most of these without unbounded latency. The policy is
//! an injectable value rather than hidden constants so tests can shrink the
//! delay.

use crate::error::TransportError;
use log::{info, warn};
use std::thread;
use std::time::Duration;

/// Default number of connect attempts.
pub const CONNECT_ATTEMPTS: u32 = 3;

/// Default delay between consecutive attempts.
pub const RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Bounded-retry driver for connect operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Treated as at least 1.
    pub max_attempts: u32,
    /// Sleep between consecutive attempts (never before the first).
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: CONNECT_ATTEMPTS,
            delay: RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Run `attempt` up to `max_attempts` times, sleeping `delay` between
    /// consecutive attempts, stopping on the first success.
    ///
    /// The closure receives the 1-based attempt number and must build its
    /// connection from scratch on every call; nothing half-initialized is
    /// carried across attempts. On exhaustion the last observed error is
    /// returned with its connect cause intact.
    pub fn run<T>(
        &self,
        mut attempt: impl FnMut(u32) -> Result<T, TransportError>,
    ) -> Result<T, TransportError> {
        let max_attempts = self.max_attempts.max(1);
        let mut last_err = None;

        for n in 1..=max_attempts {
            if n > 1 {
                info!("connect retry {}/{}", n, max_attempts);
                thread::sleep(self.delay);
            }
            match attempt(n) {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    warn!("attempt {}/{} failed: {}", n, max_attempts, e);
                    last_err = Some(e);
                }
            }
        }

        // max_attempts >= 1, so at least one attempt ran and recorded its error.
        Err(last_err.unwrap_or(TransportError::NotConnected))
    }
}
