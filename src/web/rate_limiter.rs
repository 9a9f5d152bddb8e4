//! Request rate limiting with bounded queuing delay.
//!
//! The [`RateLimiter`] enforces a minimum interval between requests, either
//! per destination host or for the whole client instance. A request that
//! would have to wait longer than the configured maximum queuing delay fails
//! with [`WebError::RateLimitTimeout`] instead of blocking indefinitely.
//!
//! Server-mandated back-off (429/500 responses, Retry-After headers) is fed
//! back via [`RateLimiter::record_backoff`], pushing out the earliest time
//! the next request to that host may start.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::error::WebError;

/// Warning threshold for cumulative delay per host (30 seconds).
const CUMULATIVE_DELAY_WARNING_THRESHOLD: Duration = Duration::from_secs(30);

/// Key used for all requests when the limiter is scoped to the instance.
const INSTANCE_KEY: &str = "";

/// Whether the minimum interval applies per destination host or to every
/// request the client makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitScope {
    /// One shared interval for the whole client instance.
    #[default]
    PerInstance,
    /// Independent intervals per destination host.
    PerHost,
}

/// State tracked per limiting key.
#[derive(Debug)]
struct KeyState {
    /// Earliest instant the next request may start.
    /// `None` indicates no request has been made yet (first request is immediate).
    not_before: Mutex<Option<Instant>>,

    /// Cumulative delay applied for this key (in milliseconds).
    cumulative_delay_ms: AtomicU64,
}

impl KeyState {
    fn new() -> Self {
        Self {
            not_before: Mutex::new(None),
            cumulative_delay_ms: AtomicU64::new(0),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn add_cumulative_delay(&self, delay: Duration) -> Duration {
        let delay_ms = delay.as_millis() as u64;
        let new_total = self
            .cumulative_delay_ms
            .fetch_add(delay_ms, Ordering::SeqCst)
            + delay_ms;
        Duration::from_millis(new_total)
    }
}

/// Minimum-interval rate limiter with bounded queuing delay.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum time between requests to the same key.
    min_interval: Duration,

    /// Longest a request may be queued before failing.
    max_delay: Duration,

    scope: RateLimitScope,

    /// Whether limiting is disabled entirely.
    disabled: bool,

    /// Per-key state. The Arc is cloned out of the map so the DashMap shard
    /// lock is released before awaiting on the inner Mutex.
    keys: DashMap<String, Arc<KeyState>>,
}

impl RateLimiter {
    /// Creates a limiter admitting `limit` requests per `interval`.
    ///
    /// A `limit` of zero disables limiting.
    #[must_use]
    pub fn new(limit: u32, interval: Duration, scope: RateLimitScope, max_delay: Duration) -> Self {
        if limit == 0 {
            return Self::disabled();
        }

        Self {
            min_interval: interval / limit,
            max_delay,
            scope,
            disabled: false,
            keys: DashMap::new(),
        }
    }

    /// Creates a disabled limiter that admits every request immediately.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            min_interval: Duration::ZERO,
            max_delay: Duration::ZERO,
            scope: RateLimitScope::PerInstance,
            disabled: true,
            keys: DashMap::new(),
        }
    }

    /// Returns the minimum interval between requests.
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Suspends the caller until the limiter admits a request to `url`.
    ///
    /// The first request to a key proceeds immediately. Subsequent requests
    /// wait out the remainder of the minimum interval plus any recorded
    /// server back-off.
    ///
    /// # Errors
    ///
    /// Returns [`WebError::RateLimitTimeout`] when the required wait exceeds
    /// the maximum queuing delay.
    #[instrument(skip(self), fields(key))]
    pub async fn acquire(&self, url: &str) -> Result<(), WebError> {
        if self.disabled {
            return Ok(());
        }

        let key = self.key_for(url);
        tracing::Span::current().record("key", &key);

        let state = self
            .keys
            .entry(key.clone())
            .or_insert_with(|| Arc::new(KeyState::new()))
            .clone();

        // Only the per-key Mutex is held across the await below.
        let mut not_before_guard = state.not_before.lock().await;

        if let Some(not_before) = *not_before_guard {
            let now = Instant::now();

            if not_before > now {
                let delay = not_before - now;

                if delay > self.max_delay {
                    return Err(WebError::rate_limit_timeout(key, delay, self.max_delay));
                }

                let cumulative = state.add_cumulative_delay(delay);

                debug!(
                    key = %key,
                    delay_ms = delay.as_millis(),
                    cumulative_ms = cumulative.as_millis(),
                    "applying rate limit delay"
                );

                if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
                    warn!(
                        key = %key,
                        cumulative_delay_secs = cumulative.as_secs(),
                        "excessive rate limiting for this destination"
                    );
                }

                tokio::time::sleep(delay).await;
            }
        } else {
            debug!(key = %key, "first request - no delay");
        }

        *not_before_guard = Some(Instant::now() + self.min_interval);

        Ok(())
    }

    /// Records a server-mandated back-off for `url`'s key.
    ///
    /// Subsequent requests to the same key will not start before the given
    /// delay has elapsed, in addition to the normal minimum interval.
    #[instrument(skip(self), fields(key))]
    pub fn record_backoff(&self, url: &str, delay: Duration) {
        if self.disabled {
            return;
        }

        let key = self.key_for(url);
        tracing::Span::current().record("key", &key);

        let state = self
            .keys
            .entry(key.clone())
            .or_insert_with(|| Arc::new(KeyState::new()))
            .clone();

        let earliest = Instant::now() + delay;

        // try_lock is sufficient: a concurrently admitted request will set
        // its own, earlier not_before, and the next acquire re-reads ours.
        if let Ok(mut guard) = state.not_before.try_lock() {
            let current = guard.unwrap_or(earliest);
            *guard = Some(current.max(earliest));
        }

        let cumulative = state.add_cumulative_delay(delay);

        debug!(
            key = %key,
            delay_ms = delay.as_millis(),
            cumulative_ms = cumulative.as_millis(),
            "recorded server back-off"
        );

        if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
            warn!(
                key = %key,
                cumulative_delay_secs = cumulative.as_secs(),
                "excessive server back-off - destination may be under heavy load"
            );
        }
    }

    fn key_for(&self, url: &str) -> String {
        match self.scope {
            RateLimitScope::PerInstance => INSTANCE_KEY.to_string(),
            RateLimitScope::PerHost => extract_host(url),
        }
    }
}

/// Extracts the host from a URL.
///
/// Returns "unknown" for malformed URLs so that even unparseable requests
/// are still rate limited under a shared key.
#[must_use]
pub fn extract_host(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_lowercase))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const MAX_DELAY: Duration = Duration::from_secs(3600);

    // ==================== Construction Tests ====================

    #[test]
    fn test_new_divides_interval_by_limit() {
        let limiter = RateLimiter::new(
            60,
            Duration::from_secs(60),
            RateLimitScope::PerInstance,
            MAX_DELAY,
        );
        assert_eq!(limiter.min_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_zero_limit_is_disabled() {
        let limiter = RateLimiter::new(
            0,
            Duration::from_secs(60),
            RateLimitScope::PerInstance,
            MAX_DELAY,
        );
        assert!(limiter.disabled);
    }

    // ==================== Admission Tests ====================

    #[tokio::test]
    async fn test_first_request_immediate() {
        tokio::time::pause();

        let limiter = RateLimiter::new(
            1,
            Duration::from_secs(1),
            RateLimitScope::PerInstance,
            MAX_DELAY,
        );
        let start = Instant::now();

        limiter.acquire("https://example.com/a").await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_second_request_waits_interval() {
        tokio::time::pause();

        let limiter = RateLimiter::new(
            1,
            Duration::from_secs(1),
            RateLimitScope::PerInstance,
            MAX_DELAY,
        );
        let start = Instant::now();

        limiter.acquire("https://example.com/1").await.unwrap();
        limiter.acquire("https://example.com/2").await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_per_host_scope_is_independent() {
        tokio::time::pause();

        let limiter = RateLimiter::new(
            1,
            Duration::from_secs(1),
            RateLimitScope::PerHost,
            MAX_DELAY,
        );

        limiter.acquire("https://a.com/1").await.unwrap();

        let start = Instant::now();
        limiter.acquire("https://b.com/1").await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_per_instance_scope_crosses_hosts() {
        tokio::time::pause();

        let limiter = RateLimiter::new(
            1,
            Duration::from_secs(1),
            RateLimitScope::PerInstance,
            MAX_DELAY,
        );

        limiter.acquire("https://a.com/1").await.unwrap();

        let start = Instant::now();
        limiter.acquire("https://b.com/1").await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_disabled_never_delays() {
        tokio::time::pause();

        let limiter = RateLimiter::disabled();
        let start = Instant::now();

        for i in 0..5 {
            limiter
                .acquire(&format!("https://example.com/{i}"))
                .await
                .unwrap();
        }

        assert!(start.elapsed() < Duration::from_millis(10));
    }

    // ==================== Max Delay Tests ====================

    #[tokio::test]
    async fn test_backoff_beyond_max_delay_fails() {
        tokio::time::pause();

        let limiter = RateLimiter::new(
            1,
            Duration::from_secs(1),
            RateLimitScope::PerInstance,
            Duration::from_secs(5),
        );

        limiter.acquire("https://example.com/1").await.unwrap();
        limiter.record_backoff("https://example.com/1", Duration::from_secs(60));

        let result = limiter.acquire("https://example.com/2").await;
        assert!(matches!(result, Err(WebError::RateLimitTimeout { .. })));
    }

    #[tokio::test]
    async fn test_backoff_within_max_delay_waits() {
        tokio::time::pause();

        let limiter = RateLimiter::new(
            1,
            Duration::from_secs(1),
            RateLimitScope::PerInstance,
            MAX_DELAY,
        );

        limiter.acquire("https://example.com/1").await.unwrap();
        limiter.record_backoff("https://example.com/1", Duration::from_secs(10));

        let start = Instant::now();
        limiter.acquire("https://example.com/2").await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    // ==================== extract_host Tests ====================

    #[test]
    fn test_extract_host_valid() {
        assert_eq!(extract_host("https://example.com/path"), "example.com");
    }

    #[test]
    fn test_extract_host_lowercases() {
        assert_eq!(extract_host("https://Example.COM/Path"), "example.com");
    }

    #[test]
    fn test_extract_host_with_port() {
        assert_eq!(extract_host("https://example.com:8080/a"), "example.com");
    }

    #[test]
    fn test_extract_host_malformed() {
        assert_eq!(extract_host("not a url"), "unknown");
    }
}
