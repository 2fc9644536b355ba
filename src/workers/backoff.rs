//! Retry policy for failed deliveries. Each error kind carries its own
//! attempt limit and wait schedule; anything past the limit, and every
//! permanent error, is discarded.

use crate::error::PushError;
use rand::Rng;
use std::time::Duration;

const DEFAULT_ATTEMPTS: u32 = 5;
const DEFAULT_WAIT: Duration = Duration::from_secs(3);
const TIMEOUT_WAIT: Duration = Duration::from_secs(60);
const CONNECTION_ATTEMPTS: u32 = 20;
const BACKOFF_ATTEMPTS: u32 = 6;
const BASE_BACKOFF_SECS: f64 = 60.0;
const MAX_BACKOFF_SECS: f64 = 3600.0;
const JITTER_FRACTION: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { wait: Duration },
    Discard,
}

/// Decides what to do after a failed attempt. `attempt` counts the
/// executions performed so far, starting at 1.
pub fn decide(error: &PushError, attempt: u32) -> RetryDecision {
    match error {
        PushError::Timeout(_) => retry_below(attempt, DEFAULT_ATTEMPTS, TIMEOUT_WAIT),
        PushError::Connection(_) => retry_below(attempt, CONNECTION_ATTEMPTS, DEFAULT_WAIT),
        // Usually permanent, but short-lived provider hiccups have shown
        // up under both of these.
        PushError::BadRequest(_) | PushError::Forbidden(_) => {
            retry_below(attempt, DEFAULT_ATTEMPTS, DEFAULT_WAIT)
        }
        PushError::RateLimited(_)
        | PushError::ServiceUnavailable(_)
        | PushError::InternalServer(_) => {
            if attempt < BACKOFF_ATTEMPTS {
                let jitter = rand::thread_rng().gen_range(0.0..JITTER_FRACTION);
                RetryDecision::Retry { wait: backoff_wait(attempt, jitter) }
            } else {
                RetryDecision::Discard
            }
        }
        PushError::TokenInvalid(_)
        | PushError::BadTopic(_)
        | PushError::PayloadTooLarge(_)
        | PushError::NotFound(_)
        | PushError::Config(_) => RetryDecision::Discard,
    }
}

fn retry_below(attempt: u32, attempts: u32, wait: Duration) -> RetryDecision {
    if attempt < attempts { RetryDecision::Retry { wait } } else { RetryDecision::Discard }
}

/// Doubles from one minute per attempt, applies the jitter fraction,
/// and caps at one hour.
fn backoff_wait(attempt: u32, jitter: f64) -> Duration {
    let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
    let wait = BASE_BACKOFF_SECS * 2f64.powi(exponent) * (1.0 + jitter);
    Duration::from_secs_f64(wait.min(MAX_BACKOFF_SECS))
}
