//! Bounded retry with backoff.
//!
//! Used explicitly at call sites that may fail transiently (move selection
//! in a match, checkpoint writes). The operation receives the zero-based
//! attempt number so it can change strategy between attempts.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Delay policy between attempts.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub enum Backoff {
    /// Retry immediately.
    #[default]
    None,
    /// Constant delay.
    Fixed(Duration),
    /// `initial * factor^attempt`.
    Exponential { initial: Duration, factor: u32 },
}

impl Backoff {
    /// Delay to wait after the given failed attempt.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(d) => d,
            Backoff::Exponential { initial, factor } => {
                initial.saturating_mul(factor.saturating_pow(attempt))
            }
        }
    }
}

/// Run `op` until it succeeds or `max_attempts` attempts have failed.
///
/// `max_attempts == 0` is treated as one attempt. Returns the last error.
pub fn retry<T, E, F>(mut op: F, max_attempts: u32, backoff: Backoff) -> Result<T, E>
where
    F: FnMut(u32) -> Result<T, E>,
{
    let attempts = max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= attempts {
                    return Err(err);
                }
                let delay = backoff.delay(attempt - 1);
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
            }
        }
    }
}
