//! Assertion helpers shared by the integration suites.

use std::collections::HashMap;

use trellis_core::{AttemptStatus, LogEvent, StepAttempt, StepId};

/// The attempt with the highest retry count per step: the one whose
/// status determines the step's effective outcome.
pub fn effective_attempts(attempts: &[StepAttempt]) -> HashMap<StepId, &StepAttempt> {
    let mut effective: HashMap<StepId, &StepAttempt> = HashMap::new();
    for attempt in attempts {
        match effective.get(&attempt.step_id) {
            Some(current) if current.retry_count >= attempt.retry_count => {}
            _ => {
                effective.insert(attempt.step_id, attempt);
            }
        }
    }
    effective
}

/// The attempts of one step, ordered by retry count.
pub fn chain_for(attempts: &[StepAttempt], step_id: StepId) -> Vec<&StepAttempt> {
    let mut chain: Vec<&StepAttempt> = attempts
        .iter()
        .filter(|a| a.step_id == step_id)
        .collect();
    chain.sort_by_key(|a| a.retry_count);
    chain
}

/// Every attempt that ran has ordered timestamps, and the retry flags
/// agree with the chain position.
pub fn assert_attempt_invariants(attempts: &[StepAttempt]) {
    for attempt in attempts {
        assert!(
            attempt.is_terminal(),
            "attempt {} left non-terminal",
            attempt.id
        );

        let started_at = attempt
            .started_at
            .unwrap_or_else(|| panic!("attempt {} ran but has no started_at", attempt.id));
        let finished_at = attempt
            .finished_at
            .unwrap_or_else(|| panic!("terminal attempt {} has no finished_at", attempt.id));
        assert!(started_at >= attempt.created_at);
        assert!(finished_at >= started_at);

        assert_eq!(attempt.is_retry, attempt.retry_count > 0);
        assert_eq!(attempt.is_retry, attempt.parent_attempt_id.is_some());
    }
}

/// A retry chain is linear: counts 0..n, each link pointing at its
/// predecessor, and only the last attempt may be non-failed.
pub fn assert_chain_linked(chain: &[&StepAttempt]) {
    for (i, attempt) in chain.iter().enumerate() {
        assert_eq!(attempt.retry_count as usize, i);
        if i == 0 {
            assert!(attempt.parent_attempt_id.is_none());
        } else {
            assert_eq!(attempt.parent_attempt_id, Some(chain[i - 1].id));
        }
        if i + 1 < chain.len() {
            assert_eq!(attempt.status, AttemptStatus::Failed);
        }
    }
}

/// Log timestamps never go backwards.
pub fn assert_logs_monotonic(logs: &[LogEvent]) {
    for pair in logs.windows(2) {
        assert!(
            pair[0].timestamp <= pair[1].timestamp,
            "log events out of order: {:?} after {:?}",
            pair[1].message,
            pair[0].message
        );
    }
}

/// Exactly `expected` log messages, compared by prefix so messages that
/// embed ids or names still match.
pub fn assert_log_messages(logs: &[LogEvent], expected: &[&str]) {
    let messages: Vec<&str> = logs.iter().map(|l| l.message.as_str()).collect();
    assert_eq!(
        messages.len(),
        expected.len(),
        "log count mismatch: {messages:?}"
    );
    for (message, prefix) in messages.iter().zip(expected) {
        assert!(
            message.starts_with(prefix),
            "expected log starting with {prefix:?}, got {message:?}"
        );
    }
}
