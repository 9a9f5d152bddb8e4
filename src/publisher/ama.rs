//! Handler for AMA.
//!
//! AMA's content service is a JSON API keyed by API key, returning a
//! search-style envelope whose single document carries the article text.
//! Plain text is the only format on offer.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::config::{self, Settings};
use crate::format::FormatName;
use crate::fulltext::FullText;
use crate::metadata::MemberId;
use crate::source::{AcquireError, Source};
use crate::web::WebClient;

use super::{Publisher, PublisherBuildError, check_hostname};

const MEMBER_ID: &str = "10";

/// AMA handler.
pub struct Ama {
    api_key: Option<String>,
    valid_hostname: Option<String>,
    hostname: String,
    session: WebClient,
}

impl Ama {
    /// Creates the handler, warning when the API key is absent.
    ///
    /// # Errors
    ///
    /// Returns [`PublisherBuildError`] on HTTP client build failure.
    pub fn new(settings: &Settings) -> Result<Self, PublisherBuildError> {
        let api_key = config::scoped_env("AMA", "API_KEY");

        if api_key.is_none() {
            warn!("handler for AMA is not configured");
        }

        // Requests seem to be filtered by user agent.
        let session = WebClient::builder().header("User-Agent", "Wget/1.21.2").build()?;

        Ok(Self {
            api_key,
            valid_hostname: config::scoped_env("AMA", "VALID_HOSTNAME"),
            hostname: settings.hostname.clone(),
            session,
        })
    }
}

#[async_trait]
impl Publisher for Ama {
    fn name(&self) -> &'static str {
        "ama"
    }

    fn member_id(&self) -> MemberId {
        MemberId::from_static(MEMBER_ID)
    }

    fn set_sources(self: Arc<Self>, fulltext: &mut FullText) {
        // Can't set any sources if the API is not configured.
        let Some(api_key) = self.api_key.as_deref() else {
            return;
        };

        // The API only has TXT.
        let link = format!(
            "https://jamanetwork.com/api/contentservices/fulltext/apikey/{api_key}?doi={}",
            fulltext.doi
        );

        let source = Source::new(
            Arc::clone(&self) as Arc<dyn Publisher>,
            link,
            FormatName::Txt,
            false,
        );
        fulltext.format_mut(FormatName::Txt).sources = vec![source];
    }

    async fn acquire(&self, source: &Source) -> Result<Vec<u8>, AcquireError> {
        if self.api_key.is_none() {
            return Err(AcquireError::NotConfigured { publisher: "ama" });
        }

        check_hostname(self.valid_hostname.as_deref(), &self.hostname)?;

        let data = self.session.get_bytes(&source.link).await?;

        extract_article_text(&data, &source.link)
    }
}

/// Pulls the article text out of the content-service envelope.
fn extract_article_text(data: &[u8], link: &str) -> Result<Vec<u8>, AcquireError> {
    let value: Value = serde_json::from_slice(data)
        .map_err(|error| AcquireError::archive(link, format!("unparseable JSON: {error}")))?;

    let response = value
        .get("response")
        .ok_or_else(|| AcquireError::archive(link, "unexpected JSON structure"))?;

    if response.get("numFound").and_then(Value::as_u64).unwrap_or(0) == 0 {
        return Err(AcquireError::NotFound {
            link: link.to_string(),
        });
    }

    let docs = response
        .get("docs")
        .and_then(Value::as_array)
        .ok_or_else(|| AcquireError::archive(link, "unexpected JSON structure"))?;

    let [doc] = docs.as_slice() else {
        return Err(AcquireError::archive(link, "expected exactly one document"));
    };

    let text = doc
        .get("ArticleText")
        .and_then(Value::as_str)
        .ok_or_else(|| AcquireError::archive(link, "unexpected JSON structure"))?;

    Ok(text.as_bytes().to_vec())
}
