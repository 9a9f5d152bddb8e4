//! Failure classification and fixed-wait retry policy for transient errors.
//!
//! A failed request is classified into a [`FailureType`]; the [`RetryPolicy`]
//! then decides whether to try again. Waits between attempts are fixed rather
//! than exponential: the rate limiter already spaces requests out, so the
//! retry layer only needs a short, predictable pause.

use std::time::Duration;

use tracing::{debug, instrument};

use super::error::WebError;

/// Default maximum number of attempts (including the initial attempt).
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 10;

/// Default fixed wait between attempts.
const DEFAULT_RETRY_WAIT: Duration = Duration::from_secs(1);

/// Classification of request failure types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: network timeout, 5xx server errors, connection refused.
    Transient,

    /// Failure that won't succeed regardless of retries.
    ///
    /// Examples: 404 Not Found, TLS certificate errors, limiter timeout.
    Permanent,

    /// A status code configured to trigger limiter back-off (429/500 by
    /// default). Retryable; the limiter delays the next attempt.
    RateLimited,
}

/// Decision on whether to retry a failed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the given delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
        /// Whether the attempt budget was used up (as opposed to the
        /// failure being non-retryable).
        exhausted: bool,
    },
}

/// Fixed-wait retry policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            wait: DEFAULT_RETRY_WAIT,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the given attempt cap and fixed wait.
    ///
    /// The cap includes the initial attempt and is clamped to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, wait: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            wait,
        }
    }

    /// Returns the maximum number of attempts.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides whether the attempt that just failed should be retried.
    ///
    /// `attempt` is the 1-indexed number of the attempt that failed.
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - retry would not help".to_string(),
                exhausted: false,
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
                exhausted: true,
            };
        }

        debug!(
            attempt,
            next_attempt = attempt + 1,
            wait_ms = self.wait.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay: self.wait,
            attempt: attempt + 1,
        }
    }
}

/// Classifies a web error into a failure type for retry decisions.
///
/// `limit_statuses` is the set of status codes configured to trigger limiter
/// back-off (default {429, 500}).
#[instrument(skip(limit_statuses))]
pub fn classify_error(error: &WebError, limit_statuses: &[u16]) -> FailureType {
    match error {
        WebError::HttpStatus { status, .. } => {
            if limit_statuses.contains(status) {
                FailureType::RateLimited
            } else {
                classify_http_status(*status)
            }
        }

        WebError::Timeout { .. } => FailureType::Transient,

        WebError::Network { source, .. } => {
            if is_tls_error(source) {
                FailureType::Permanent
            } else {
                FailureType::Transient
            }
        }

        WebError::RateLimitTimeout { .. }
        | WebError::RetryExhausted { .. }
        | WebError::ClientBuild { .. } => FailureType::Permanent,
    }
}

/// Classifies an HTTP status code into a failure type.
fn classify_http_status(status: u16) -> FailureType {
    match status {
        408 => FailureType::Transient,          // Request Timeout
        429 => FailureType::RateLimited,        // Too Many Requests
        400..=499 => FailureType::Permanent,    // Other client errors
        500..=599 => FailureType::Transient,    // Server errors
        _ => FailureType::Permanent,
    }
}

/// Checks if a reqwest error is a TLS/certificate error.
fn is_tls_error(error: &reqwest::Error) -> bool {
    let error_string = error.to_string().to_lowercase();
    error_string.contains("certificate")
        || error_string.contains("tls")
        || error_string.contains("ssl")
        || error_string.contains("handshake")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const LIMIT_STATUSES: &[u16] = &[429, 500];

    // ==================== RetryPolicy Tests ====================

    #[test]
    fn test_policy_default_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 10);
        assert_eq!(policy.wait, Duration::from_secs(1));
    }

    #[test]
    fn test_policy_minimum_one_attempt() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1));
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn test_transient_retries_with_fixed_wait() {
        let policy = RetryPolicy::new(3, Duration::from_millis(250));

        let first = policy.should_retry(FailureType::Transient, 1);
        let second = policy.should_retry(FailureType::Transient, 2);

        assert_eq!(
            first,
            RetryDecision::Retry {
                delay: Duration::from_millis(250),
                attempt: 2
            }
        );
        assert_eq!(
            second,
            RetryDecision::Retry {
                delay: Duration::from_millis(250),
                attempt: 3
            }
        );
    }

    #[test]
    fn test_permanent_does_not_retry() {
        let policy = RetryPolicy::default();
        let decision = policy.should_retry(FailureType::Permanent, 1);
        assert!(matches!(
            decision,
            RetryDecision::DoNotRetry {
                exhausted: false,
                ..
            }
        ));
    }

    #[test]
    fn test_rate_limited_retries() {
        let policy = RetryPolicy::default();
        let decision = policy.should_retry(FailureType::RateLimited, 1);
        assert!(matches!(decision, RetryDecision::Retry { .. }));
    }

    #[test]
    fn test_attempt_cap_exhausts() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        let decision = policy.should_retry(FailureType::Transient, 3);
        assert!(matches!(
            decision,
            RetryDecision::DoNotRetry {
                exhausted: true,
                ..
            }
        ));
    }

    // ==================== Classification Tests ====================

    #[test]
    fn test_classify_timeout_transient() {
        let error = WebError::timeout("https://example.com");
        assert_eq!(classify_error(&error, LIMIT_STATUSES), FailureType::Transient);
    }

    #[test]
    fn test_classify_404_permanent() {
        let error = WebError::http_status("https://example.com", 404, None);
        assert_eq!(classify_error(&error, LIMIT_STATUSES), FailureType::Permanent);
    }

    #[test]
    fn test_classify_429_rate_limited() {
        let error = WebError::http_status("https://example.com", 429, None);
        assert_eq!(
            classify_error(&error, LIMIT_STATUSES),
            FailureType::RateLimited
        );
    }

    #[test]
    fn test_classify_500_follows_limit_statuses() {
        let error = WebError::http_status("https://example.com", 500, None);
        assert_eq!(
            classify_error(&error, LIMIT_STATUSES),
            FailureType::RateLimited
        );
        // Without 500 in the configured set it is plain transient.
        assert_eq!(classify_error(&error, &[429]), FailureType::Transient);
    }

    #[test]
    fn test_classify_503_transient() {
        let error = WebError::http_status("https://example.com", 503, None);
        assert_eq!(classify_error(&error, LIMIT_STATUSES), FailureType::Transient);
    }

    #[test]
    fn test_classify_408_transient() {
        let error = WebError::http_status("https://example.com", 408, None);
        assert_eq!(classify_error(&error, LIMIT_STATUSES), FailureType::Transient);
    }

    #[test]
    fn test_classify_limiter_timeout_permanent() {
        let error = WebError::rate_limit_timeout(
            "example.com",
            Duration::from_secs(120),
            Duration::from_secs(60),
        );
        assert_eq!(classify_error(&error, LIMIT_STATUSES), FailureType::Permanent);
    }
}
