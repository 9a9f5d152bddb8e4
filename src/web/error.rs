//! Error types for the web transport layer.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while making rate-limited HTTP requests.
#[derive(Debug, Error)]
pub enum WebError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} requesting {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present.
        retry_after: Option<String>,
    },

    /// The rate limiter could not admit the request within the maximum
    /// queuing delay.
    #[error("rate limiter wait of {required:?} for {host} exceeds the maximum delay of {max:?}")]
    RateLimitTimeout {
        /// The host the request was limited for.
        host: String,
        /// The wait the limiter required.
        required: Duration,
        /// The configured maximum queuing delay.
        max: Duration,
    },

    /// All retry attempts were used without success.
    #[error("retries exhausted after {attempts} attempts requesting {url}")]
    RetryExhausted {
        /// The URL that kept failing.
        url: String,
        /// How many attempts were made.
        attempts: u32,
        /// The failure from the final attempt.
        #[source]
        source: Box<WebError>,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },
}

impl WebError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16, retry_after: Option<String>) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates a rate-limit timeout error.
    pub fn rate_limit_timeout(host: impl Into<String>, required: Duration, max: Duration) -> Self {
        Self::RateLimitTimeout {
            host: host.into(),
            required,
            max,
        }
    }

    /// Creates a retries-exhausted error wrapping the final failure.
    pub fn retry_exhausted(url: impl Into<String>, attempts: u32, source: WebError) -> Self {
        Self::RetryExhausted {
            url: url.into(),
            attempts,
            source: Box::new(source),
        }
    }
}

// Note on From implementations: variants require context (url, host) that the
// source errors do not carry, so helper constructors are used instead of
// `From<reqwest::Error>`.
