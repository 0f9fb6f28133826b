//! Shared back-off schedule and error classification (spec §4.7).
//!
//! Pure logic, no I/O: both the generic job queue and the document queue
//! call into this module so retry behavior is identical across both.

use chrono::{DateTime, Duration, Utc};

/// Back-off schedule in minutes, indexed by `min(attempt, 4)`.
const SCHEDULE_MINUTES: [i64; 5] = [0, 1, 5, 15, 60];

/// How a classified error should be handled by the retry machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retryability {
    /// The error is permanent; retrying will not help.
    NonRetryable,
    /// The error is transient; the job should be requeued.
    Retryable,
}

/// Classify an error message into retryable / non-retryable per spec §4.7.
///
/// An empty or missing message is retryable by default, as is any message
/// that matches neither list (handler bugs retry up to `max_attempts`).
#[must_use]
pub fn classify(message: &str) -> Retryability {
    if message.is_empty() {
        return Retryability::Retryable;
    }
    let lower = message.to_lowercase();

    const NON_RETRYABLE: &[&str] = &[
        "not found",
        "invalid",
        "unsupported",
        "permission denied",
        "unauthorized",
        "forbidden",
        "404",
        "401",
        "403",
        "configuration error",
    ];
    if NON_RETRYABLE.iter().any(|needle| lower.contains(needle)) {
        return Retryability::NonRetryable;
    }

    const RETRYABLE: &[&str] = &[
        "timeout",
        "connection refused",
        "service unavailable",
        "temporary failure",
        "503",
        "connectionerror",
        "timeouterror",
        "rate limit",
        "too many requests",
        "429",
    ];
    if RETRYABLE.iter().any(|needle| lower.contains(needle)) {
        return Retryability::Retryable;
    }

    // Unknown / handler-bug errors default to retryable.
    Retryability::Retryable
}

/// Compute the back-off delay for the given (0-indexed) attempt count.
///
/// Attempt 0 is immediate; attempt 1 waits 1 minute, attempt 2 waits 5
/// minutes, attempt 3 waits 15 minutes, attempt 4 and beyond wait 60 minutes.
#[must_use]
pub fn delay_for_attempt(attempt: u32) -> Duration {
    let idx = (attempt as usize).min(SCHEDULE_MINUTES.len() - 1);
    Duration::minutes(SCHEDULE_MINUTES[idx])
}

/// Compute the next retry instant for a job that has just failed with the
/// given (1-indexed, post-increment) attempt count.
#[must_use]
pub fn next_retry_at(now: DateTime<Utc>, attempts_after_failure: u32) -> DateTime<Utc> {
    now + delay_for_attempt(attempts_after_failure)
}

/// The outcome of classifying and applying a failure to a job's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Job should be requeued with a new `next_retry`.
    Requeue,
    /// Job has exhausted its retries (or hit a non-retryable error) and is
    /// now terminally failed.
    TerminalFailure,
}

/// Decide the outcome of `markFailedRetry` (spec §4.7 steps 2-4), given the
/// error message, the attempt count *after* incrementing, and `max_attempts`.
#[must_use]
pub fn decide_outcome(message: &str, attempts_after_failure: u32, max_attempts: u32) -> FailureOutcome {
    let retryability = classify(message);
    if retryability == Retryability::NonRetryable || attempts_after_failure >= max_attempts {
        FailureOutcome::TerminalFailure
    } else {
        FailureOutcome::Requeue
    }
}

/// Stuck-recovery threshold: jobs `in_progress` longer than this are reset.
pub const STUCK_THRESHOLD_MINUTES: i64 = 30;

/// Returns `true` if a job started at `started_at` is stuck as of `now`.
///
/// Strictly-less-than-30-minutes-old jobs are NOT recovered; strictly older
/// ones are (spec §8 boundary behavior).
#[must_use]
pub fn is_stuck(started_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - started_at > Duration::minutes(STUCK_THRESHOLD_MINUTES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_not_found_as_non_retryable() {
        assert_eq!(classify("Entity not found"), Retryability::NonRetryable);
    }

    #[test]
    fn classifies_timeout_as_retryable() {
        assert_eq!(classify("Connection timeout"), Retryability::Retryable);
    }

    #[test]
    fn empty_message_is_retryable() {
        assert_eq!(classify(""), Retryability::Retryable);
    }

    #[test]
    fn unknown_message_defaults_retryable() {
        assert_eq!(classify("something weird happened"), Retryability::Retryable);
    }

    #[test]
    fn backoff_schedule_progression() {
        assert_eq!(delay_for_attempt(0), Duration::minutes(0));
        assert_eq!(delay_for_attempt(1), Duration::minutes(1));
        assert_eq!(delay_for_attempt(2), Duration::minutes(5));
        assert_eq!(delay_for_attempt(3), Duration::minutes(15));
        assert_eq!(delay_for_attempt(4), Duration::minutes(60));
        assert_eq!(delay_for_attempt(10), Duration::minutes(60));
    }

    #[test]
    fn max_attempts_forces_terminal_failure() {
        assert_eq!(
            decide_outcome("Connection timeout", 5, 5),
            FailureOutcome::TerminalFailure
        );
        assert_eq!(
            decide_outcome("Connection timeout", 4, 5),
            FailureOutcome::Requeue
        );
    }

    #[test]
    fn stuck_boundary_is_strict() {
        let now = Utc::now();
        assert!(!is_stuck(now - Duration::minutes(29), now));
        assert!(!is_stuck(now - Duration::minutes(30), now));
        assert!(is_stuck(now - Duration::minutes(31), now));
    }
}
