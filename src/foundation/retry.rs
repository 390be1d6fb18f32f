use std::fmt;
use std::time::Duration;

use crate::foundation::error::{StickerError, StickerResult};

/// Attempt budget and per-attempt deadline for a fallible external call.
///
/// The policy holds no behavior of its own; [`run_with_retry`] consumes it. Timeouts are enforced
/// by the operation (HTTP agent timeout, sandbox reply deadline) using [`Self::per_attempt_timeout`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Always >= 1.
    pub max_attempts: u32,
    /// Deadline applied to each individual attempt.
    pub per_attempt_timeout: Duration,
    /// Pause between attempts. Zero means retry immediately.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Build a validated policy with no backoff.
    pub fn new(max_attempts: u32, per_attempt_timeout: Duration) -> StickerResult<Self> {
        if max_attempts == 0 {
            return Err(StickerError::config("retry attempts must be >= 1"));
        }
        if per_attempt_timeout.is_zero() {
            return Err(StickerError::config("per-attempt timeout must be > 0"));
        }
        Ok(Self {
            max_attempts,
            per_attempt_timeout,
            backoff: Duration::ZERO,
        })
    }

    /// Return a copy with a pause between attempts.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Outcome of a single failed attempt.
#[derive(Debug)]
pub enum AttemptError<E> {
    /// Worth retrying (timeout, connection reset, crashed session).
    Transient(E),
    /// Retrying cannot help (malformed input, 404).
    Permanent(E),
}

/// Returned when every attempt failed or a permanent failure stopped the loop.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    /// Attempts actually made.
    pub attempts: u32,
    /// Error from the final attempt.
    pub last: E,
}

/// Run `op` until it succeeds, fails permanently, or the policy's attempt budget is spent.
///
/// `op` receives the 1-based attempt number.
pub fn run_with_retry<T, E: fmt::Display>(
    policy: &RetryPolicy,
    what: &str,
    mut op: impl FnMut(u32) -> Result<T, AttemptError<E>>,
) -> Result<T, RetryExhausted<E>> {
    let max = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(v) => return Ok(v),
            Err(AttemptError::Permanent(e)) => {
                tracing::debug!(what, attempt, error = %e, "permanent failure, not retrying");
                return Err(RetryExhausted { attempts: attempt, last: e });
            }
            Err(AttemptError::Transient(e)) => {
                if attempt >= max {
                    tracing::warn!(what, attempts = attempt, error = %e, "retries exhausted");
                    return Err(RetryExhausted { attempts: attempt, last: e });
                }
                tracing::debug!(what, attempt, error = %e, "attempt failed, retrying");
            }
        }
        if !policy.backoff.is_zero() {
            std::thread::sleep(policy.backoff);
        }
        attempt += 1;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/retry.rs"]
mod tests;
