//! Retry policy.
//!
//! A failed attempt is retried only when all three hold: the failure is
//! transient, the step declares a retry config, and the attempt count has
//! not exhausted `max_retries`. Backoff is a fixed number of seconds.

use trellis_core::{ErrorClass, Step, StepAttempt};

const DEFAULT_BACKOFF_SECONDS: u64 = 1;

/// Whether the just-failed `attempt` should get a successor.
pub fn should_retry(step: &Step, attempt: &StepAttempt) -> bool {
    if attempt.error_class != Some(ErrorClass::Transient) {
        return false;
    }
    let Some(retry) = &step.retry else {
        return false;
    };
    attempt.retry_count < retry.max_retries
}

/// Seconds to wait before the successor attempt starts.
pub fn backoff_seconds(step: &Step) -> u64 {
    step.retry
        .map(|r| r.backoff_seconds)
        .unwrap_or(DEFAULT_BACKOFF_SECONDS)
}
