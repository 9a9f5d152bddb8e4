//! Rate-limited, retrying HTTP transport.
//!
//! [`WebClient`] wraps a pooled reqwest client with:
//! - a minimum-interval rate limiter ([`RateLimiter`]), scoped per host or
//!   per instance, with a bounded queuing delay
//! - fixed-wait retries of transient failures ([`RetryPolicy`])
//! - limiter back-off on configured status codes (429/500 by default),
//!   honoring `Retry-After` headers
//!
//! # Example
//!
//! ```no_run
//! use doifetch_core::web::WebClient;
//!
//! # async fn example() -> Result<(), doifetch_core::WebError> {
//! let client = WebClient::builder().build()?;
//! let response = client.get("https://api.example.org/works").await?;
//! # Ok(())
//! # }
//! ```

mod error;
pub mod rate_limiter;
pub mod retry;

pub use error::WebError;
pub use rate_limiter::{RateLimitScope, RateLimiter, extract_host};
pub use retry::{DEFAULT_MAX_RETRY_ATTEMPTS, FailureType, RetryDecision, RetryPolicy, classify_error};

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use tracing::{debug, instrument, warn};

/// Default request timeout (60 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default maximum queuing delay before a rate-limited request fails (1 hour).
const DEFAULT_MAX_QUEUE_DELAY: Duration = Duration::from_secs(60 * 60);

/// Default rate: 60 requests per 60 seconds.
const DEFAULT_RATE_LIMIT: u32 = 60;
const DEFAULT_RATE_INTERVAL: Duration = Duration::from_secs(60);

/// Maximum Retry-After value honored (1 hour) to prevent excessive delays.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Status codes that trigger limiter back-off by default.
const DEFAULT_LIMIT_STATUSES: [u16; 2] = [429, 500];

/// Builder for [`WebClient`].
#[derive(Debug, Clone)]
pub struct WebClientBuilder {
    limit: u32,
    interval: Duration,
    scope: RateLimitScope,
    max_queue_delay: Duration,
    limit_statuses: Vec<u16>,
    timeout: Duration,
    max_retry_attempts: u32,
    retry_wait: Duration,
    headers: HeaderMap,
}

impl Default for WebClientBuilder {
    fn default() -> Self {
        Self {
            limit: DEFAULT_RATE_LIMIT,
            interval: DEFAULT_RATE_INTERVAL,
            scope: RateLimitScope::PerInstance,
            max_queue_delay: DEFAULT_MAX_QUEUE_DELAY,
            limit_statuses: DEFAULT_LIMIT_STATUSES.to_vec(),
            timeout: DEFAULT_TIMEOUT,
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            retry_wait: Duration::from_secs(1),
            headers: HeaderMap::new(),
        }
    }
}

impl WebClientBuilder {
    /// Sets the rate limit to `limit` requests per `interval`.
    #[must_use]
    pub fn rate_limit(mut self, limit: u32, interval: Duration) -> Self {
        self.limit = limit;
        self.interval = interval;
        self
    }

    /// Scopes the rate limit per destination host instead of per instance.
    #[must_use]
    pub fn per_host(mut self) -> Self {
        self.scope = RateLimitScope::PerHost;
        self
    }

    /// Sets the maximum queuing delay before a request fails.
    #[must_use]
    pub fn max_queue_delay(mut self, max: Duration) -> Self {
        self.max_queue_delay = max;
        self
    }

    /// Sets the status codes that trigger limiter back-off.
    #[must_use]
    pub fn limit_statuses(mut self, statuses: Vec<u16>) -> Self {
        self.limit_statuses = statuses;
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the maximum retry attempts and the fixed wait between them.
    #[must_use]
    pub fn retries(mut self, max_attempts: u32, wait: Duration) -> Self {
        self.max_retry_attempts = max_attempts;
        self.retry_wait = wait;
        self
    }

    /// Adds a default header sent with every request.
    ///
    /// Invalid header names or values are skipped with a logged warning.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            reqwest::header::HeaderName::from_bytes(name.as_bytes()),
            reqwest::header::HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => warn!(header = name, "skipping invalid default header"),
        }
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// Returns [`WebError::ClientBuild`] when the underlying HTTP client
    /// cannot be constructed.
    pub fn build(self) -> Result<WebClient, WebError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .default_headers(self.headers)
            .build()
            .map_err(|source| WebError::ClientBuild { source })?;

        Ok(WebClient {
            client,
            limiter: RateLimiter::new(self.limit, self.interval, self.scope, self.max_queue_delay),
            policy: RetryPolicy::new(self.max_retry_attempts, self.retry_wait),
            limit_statuses: self.limit_statuses,
            retry_wait: self.retry_wait,
        })
    }
}

/// HTTP client with rate limiting and fixed-wait retries.
#[derive(Debug)]
pub struct WebClient {
    client: reqwest::Client,
    limiter: RateLimiter,
    policy: RetryPolicy,
    limit_statuses: Vec<u16>,
    retry_wait: Duration,
}

impl WebClient {
    /// Returns a builder with default settings.
    #[must_use]
    pub fn builder() -> WebClientBuilder {
        WebClientBuilder::default()
    }

    /// Performs a GET request, treating HTTP error statuses as errors.
    ///
    /// The calling task is suspended until the rate limiter admits the
    /// request; transient failures are retried with a fixed wait up to the
    /// attempt cap.
    ///
    /// # Errors
    ///
    /// - [`WebError::RateLimitTimeout`] when the limiter wait exceeds the cap
    /// - [`WebError::HttpStatus`] for non-retryable error statuses
    /// - [`WebError::RetryExhausted`] when the attempt budget runs out
    pub async fn get(&self, url: &str) -> Result<reqwest::Response, WebError> {
        self.get_with(url, true).await
    }

    /// Performs a GET request, optionally passing HTTP error statuses
    /// through to the caller instead of treating them as failures.
    ///
    /// # Errors
    ///
    /// See [`WebClient::get`]. With `raise_on_status == false`, error
    /// statuses yield `Ok(response)` and only transport-level failures error.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get_with(
        &self,
        url: &str,
        raise_on_status: bool,
    ) -> Result<reqwest::Response, WebError> {
        let mut attempt: u32 = 1;

        loop {
            self.limiter.acquire(url).await?;

            let error = match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let retry_after = response
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|value| value.to_str().ok())
                        .map(ToString::to_string);

                    if self.limit_statuses.contains(&status) {
                        let backoff = retry_after
                            .as_deref()
                            .and_then(parse_retry_after)
                            .unwrap_or(self.retry_wait);
                        self.limiter.record_backoff(url, backoff);
                    }

                    if response.status().is_success() {
                        return Ok(response);
                    }

                    if !raise_on_status && !self.limit_statuses.contains(&status) {
                        debug!(status, "passing error status through to caller");
                        return Ok(response);
                    }

                    WebError::http_status(url, status, retry_after)
                }
                Err(source) => {
                    if source.is_timeout() {
                        WebError::timeout(url)
                    } else {
                        WebError::network(url, source)
                    }
                }
            };

            match self
                .policy
                .should_retry(classify_error(&error, &self.limit_statuses), attempt)
            {
                RetryDecision::Retry {
                    delay,
                    attempt: next_attempt,
                } => {
                    warn!(
                        attempt,
                        error = %error,
                        wait_ms = delay.as_millis(),
                        "request failed, will retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = next_attempt;
                }
                RetryDecision::DoNotRetry { reason, exhausted } => {
                    debug!(attempt, %reason, "not retrying");
                    return Err(if exhausted {
                        WebError::retry_exhausted(url, attempt, error)
                    } else {
                        error
                    });
                }
            }
        }
    }

    /// Performs a GET request and returns the response body bytes.
    ///
    /// # Errors
    ///
    /// See [`WebClient::get`]; body-read failures map to
    /// [`WebError::Network`].
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, WebError> {
        let response = self.get(url).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|source| WebError::network(url, source))?;
        Ok(bytes.to_vec())
    }
}

/// Parses a Retry-After header value into a Duration.
///
/// Supports both RFC 7231 formats: integer seconds and HTTP-date. Values are
/// capped at one hour; unparseable or negative values yield `None`.
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }

        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);
        return Some(duration.min(MAX_RETRY_AFTER));
    }

    if let Ok(datetime) = httpdate::parse_http_date(header_value) {
        let now = std::time::SystemTime::now();
        return match datetime.duration_since(now) {
            Ok(duration) => Some(duration.min(MAX_RETRY_AFTER)),
            // Date in the past
            Err(_) => Some(Duration::ZERO),
        };
    }

    debug!(header_value, "unparseable Retry-After value");
    None
}
