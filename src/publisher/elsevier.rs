//! Handler for Elsevier's text-and-data-mining API.
//!
//! Requires an API key and an institution token, sent as `X-ELS-APIKey` and
//! `X-ELS-Insttoken` headers. Sources come from the Crossref links filtered
//! to `api.elsevier.com`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::config::{self, Settings};
use crate::fulltext::FullText;
use crate::metadata::MemberId;
use crate::source::{AcquireError, Source};
use crate::web::{WebClient, WebError};

use super::{Publisher, PublisherBuildError, set_sources_from_crossref};

const MEMBER_ID: &str = "78";
const SOURCE_DOMAIN: &str = "api.elsevier.com";

/// Credentials for the Elsevier API, from `DOIFETCH_ELSEVIER_*`.
#[derive(Debug, Clone, Default)]
struct ElsevierSettings {
    api_key: Option<String>,
    institution_token: Option<String>,
}

impl ElsevierSettings {
    fn from_env() -> Self {
        Self {
            api_key: config::scoped_env("ELSEVIER", "API_KEY"),
            institution_token: config::scoped_env("ELSEVIER", "INSTITUTION_TOKEN"),
        }
    }
}

/// Elsevier handler.
pub struct Elsevier {
    is_configured: bool,
    session: WebClient,
}

impl Elsevier {
    /// Creates the handler, warning when credentials are absent.
    ///
    /// # Errors
    ///
    /// Returns [`PublisherBuildError`] on HTTP client build failure.
    pub fn new(_settings: &Settings) -> Result<Self, PublisherBuildError> {
        let credentials = ElsevierSettings::from_env();
        let is_configured =
            credentials.api_key.is_some() && credentials.institution_token.is_some();

        if !is_configured {
            warn!("handler for Elsevier is not configured");
        }

        let mut builder = WebClient::builder();
        if let (Some(api_key), Some(token)) =
            (&credentials.api_key, &credentials.institution_token)
        {
            builder = builder
                .header("X-ELS-APIKey", api_key)
                .header("X-ELS-Insttoken", token);
        }

        Ok(Self {
            is_configured,
            session: builder.build()?,
        })
    }
}

#[async_trait]
impl Publisher for Elsevier {
    fn name(&self) -> &'static str {
        "elsevier"
    }

    fn member_id(&self) -> MemberId {
        MemberId::from_static(MEMBER_ID)
    }

    fn set_sources(self: Arc<Self>, fulltext: &mut FullText) {
        let filter = |source: &Source| source.link.contains(SOURCE_DOMAIN);
        set_sources_from_crossref(fulltext, self, false, Some(&filter));
    }

    async fn acquire(&self, source: &Source) -> Result<Vec<u8>, AcquireError> {
        if !self.is_configured {
            return Err(AcquireError::NotConfigured { publisher: "elsevier" });
        }

        let response = self.session.get_with(&source.link, false).await?;

        if let Some(els_status) = response
            .headers()
            .get("X-ELS-Status")
            .and_then(|value| value.to_str().ok())
        {
            if els_status.to_lowercase().contains("warning") {
                warn!(els_status, "Elsevier API status warning");
            }
        }

        let status = response.status();

        if status.as_u16() == 401 {
            // The body carries a structured error worth surfacing.
            if let Ok(error_info) = response.json::<serde_json::Value>().await {
                if let Some(message) = error_info
                    .get("error-message")
                    .and_then(serde_json::Value::as_str)
                {
                    warn!(message, "error from the Elsevier API");
                }
            }
            return Err(AcquireError::Web(WebError::http_status(
                &source.link,
                401,
                None,
            )));
        }

        if !status.is_success() {
            return Err(AcquireError::Web(WebError::http_status(
                &source.link,
                status.as_u16(),
                None,
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|error| WebError::network(&source.link, error))?;

        Ok(bytes.to_vec())
    }
}
