//! Crossref works API client.
//!
//! Fetches raw metadata JSON for a DOI from `GET {base}/works/{doi}`. The
//! response envelope must be `{"status": "ok", "message": {...}}` with a
//! non-empty message; the message object alone is re-serialized and returned
//! as the stored metadata.
//!
//! Requests carry a descriptive User-Agent. Configuring a contact email
//! routes requests into Crossref's polite pool (better rate allowance); when
//! no email is configured a one-time warning is logged.

use std::sync::Once;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::doi::Doi;
use crate::metadata::MetadataError;
use crate::web::{WebClient, WebError};

/// Default Crossref API base URL.
const DEFAULT_BASE_URL: &str = "https://api.crossref.org";

/// Default rate limit: 50 requests per second, matching the documented
/// Crossref public-pool allowance.
const RATE_LIMIT: u32 = 50;
const RATE_INTERVAL: Duration = Duration::from_secs(1);

static POLITE_POOL_WARNING: Once = Once::new();

/// Top-level Crossref API response envelope.
#[derive(Debug, Deserialize)]
struct CrossrefEnvelope {
    status: String,
    #[serde(default)]
    message: serde_json::Value,
}

/// Builds the User-Agent header value for Crossref requests.
///
/// Includes the crate name/version and project URL, plus `mailto:` when a
/// contact email is configured. Without an email a one-time warning notes
/// the reduced service tier.
#[must_use]
pub fn user_agent(email_address: Option<&str>) -> String {
    let identity = match email_address {
        Some(email) => format!(
            "doifetch/{} (https://github.com/fierce/doifetch; mailto:{email})",
            env!("CARGO_PKG_VERSION")
        ),
        None => {
            POLITE_POOL_WARNING.call_once(|| {
                warn!("email address not configured; unable to use the Crossref polite pool");
            });
            format!(
                "doifetch/{} (https://github.com/fierce/doifetch)",
                env!("CARGO_PKG_VERSION")
            )
        }
    };

    format!("{identity} reqwest")
}

/// Client for the Crossref works API.
#[derive(Debug)]
pub struct CrossrefApi {
    client: WebClient,
    base_url: String,
}

impl CrossrefApi {
    /// Creates a client against the public Crossref API.
    ///
    /// # Errors
    ///
    /// Returns [`WebError::ClientBuild`] if the HTTP client cannot be built.
    pub fn new(settings: &Settings) -> Result<Self, WebError> {
        Self::with_base_url(settings, DEFAULT_BASE_URL)
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`WebError::ClientBuild`] if the HTTP client cannot be built.
    pub fn with_base_url(
        settings: &Settings,
        base_url: impl Into<String>,
    ) -> Result<Self, WebError> {
        let client = WebClient::builder()
            .rate_limit(RATE_LIMIT, RATE_INTERVAL)
            .header(
                "User-Agent",
                &user_agent(settings.email_address.as_deref()),
            )
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Fetches the raw metadata JSON for a DOI.
    ///
    /// # Errors
    ///
    /// - [`MetadataError::Web`] for transport failures
    /// - [`MetadataError::Format`] when the response envelope is not
    ///   `status == "ok"` with a non-empty message
    pub async fn get_doi_metadata(&self, doi: &Doi) -> Result<Vec<u8>, MetadataError> {
        let url = format!("{}/works/{}", self.base_url, doi.quoted());
        debug!(api_url = %url, "calling Crossref API");

        let response = self.client.get(&url).await.map_err(MetadataError::Web)?;

        let envelope: CrossrefEnvelope = response
            .json()
            .await
            .map_err(|error| MetadataError::format(doi, format!("unparseable response: {error}")))?;

        let message_is_empty = match &envelope.message {
            serde_json::Value::Object(fields) => fields.is_empty(),
            _ => true,
        };

        if !envelope.status.eq_ignore_ascii_case("ok") || message_is_empty {
            return Err(MetadataError::format(
                doi,
                format!("unexpected status of metadata response: {}", envelope.status),
            ));
        }

        serde_json::to_vec(&envelope.message)
            .map_err(|error| MetadataError::format(doi, error.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn works_json() -> serde_json::Value {
        serde_json::json!({
            "status": "ok",
            "message": {
                "member": "4443",
                "publisher": "PeerJ",
                "title": ["A Great Paper"]
            }
        })
    }

    // ==================== User-Agent Tests ====================

    #[test]
    fn test_user_agent_with_email_includes_mailto() {
        let ua = user_agent(Some("contact@example.org"));
        assert!(ua.contains("mailto:contact@example.org"));
        assert!(ua.contains("doifetch/"));
    }

    #[test]
    fn test_user_agent_without_email_omits_mailto() {
        let ua = user_agent(None);
        assert!(!ua.contains("mailto:"));
        assert!(ua.contains("doifetch/"));
    }

    // ==================== API Tests ====================

    #[tokio::test]
    async fn test_get_doi_metadata_returns_message_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/works/10.1234%2Ftest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(works_json()))
            .mount(&server)
            .await;

        let api = CrossrefApi::with_base_url(&Settings::default(), server.uri()).unwrap();
        let doi = Doi::parse("10.1234/test").unwrap();
        let raw = api.get_doi_metadata(&doi).await.unwrap();

        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(value["member"], "4443");
        assert!(value.get("status").is_none(), "envelope must be stripped");
    }

    #[tokio::test]
    async fn test_get_doi_metadata_rejects_non_ok_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "error",
                "message": {"member": "1"}
            })))
            .mount(&server)
            .await;

        let api = CrossrefApi::with_base_url(&Settings::default(), server.uri()).unwrap();
        let doi = Doi::parse("10.1234/test").unwrap();
        let result = api.get_doi_metadata(&doi).await;
        assert!(matches!(result, Err(MetadataError::Format { .. })));
    }

    #[tokio::test]
    async fn test_get_doi_metadata_rejects_empty_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok",
                "message": {}
            })))
            .mount(&server)
            .await;

        let api = CrossrefApi::with_base_url(&Settings::default(), server.uri()).unwrap();
        let doi = Doi::parse("10.1234/test").unwrap();
        let result = api.get_doi_metadata(&doi).await;
        assert!(matches!(result, Err(MetadataError::Format { .. })));
    }

    #[tokio::test]
    async fn test_get_doi_metadata_propagates_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let api = CrossrefApi::with_base_url(&Settings::default(), server.uri()).unwrap();
        let doi = Doi::parse("10.1234/missing").unwrap();
        let result = api.get_doi_metadata(&doi).await;
        assert!(matches!(result, Err(MetadataError::Web(_))));
    }
}
