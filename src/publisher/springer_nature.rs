//! Handler for Springer Nature's metered full-text API.
//!
//! The API returns a query-response document wrapping zero or more
//! `article` elements; the single article with a non-empty `body` is
//! extracted and stored as the XML payload. Requests are limited to the
//! configured daily quota.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quick_xml::events::Event;
use tracing::warn;

use crate::config::{self, Settings};
use crate::format::FormatName;
use crate::fulltext::FullText;
use crate::metadata::MemberId;
use crate::source::{AcquireError, Source};
use crate::validate::{self, ValidationError};
use crate::web::WebClient;

use super::{Publisher, PublisherBuildError};

const MEMBER_ID: &str = "297";

const DEFAULT_REQUESTS_PER_DAY: u32 = 500;
const DAY: Duration = Duration::from_secs(60 * 60 * 24);

/// API configuration from `DOIFETCH_SPRINGER_NATURE_*`.
#[derive(Debug, Clone)]
struct SpringerNatureSettings {
    api_base_url: Option<String>,
    api_key: Option<String>,
    api_suffix: Option<String>,
    n_requests_per_day: u32,
}

impl SpringerNatureSettings {
    fn from_env() -> Self {
        let n_requests_per_day = config::scoped_env("SPRINGER_NATURE", "N_REQUESTS_PER_DAY")
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_REQUESTS_PER_DAY);

        Self {
            api_base_url: config::scoped_env("SPRINGER_NATURE", "API_BASE_URL"),
            api_key: config::scoped_env("SPRINGER_NATURE", "API_KEY"),
            api_suffix: config::scoped_env("SPRINGER_NATURE", "API_SUFFIX"),
            n_requests_per_day,
        }
    }

    fn is_configured(&self) -> bool {
        self.api_base_url.is_some() && self.api_key.is_some() && self.api_suffix.is_some()
    }
}

/// Springer Nature handler.
pub struct SpringerNature {
    settings: SpringerNatureSettings,
    session: WebClient,
}

impl SpringerNature {
    /// Creates the handler, warning when the API is not configured.
    ///
    /// # Errors
    ///
    /// Returns [`PublisherBuildError`] on HTTP client build failure.
    pub fn new(_settings: &Settings) -> Result<Self, PublisherBuildError> {
        let settings = SpringerNatureSettings::from_env();

        if !settings.is_configured() {
            warn!("handler for Springer Nature is not configured");
        }

        let session = WebClient::builder()
            .rate_limit(settings.n_requests_per_day, DAY)
            .build()?;

        Ok(Self { settings, session })
    }
}

#[async_trait]
impl Publisher for SpringerNature {
    fn name(&self) -> &'static str {
        "springer-nature"
    }

    fn member_id(&self) -> MemberId {
        MemberId::from_static(MEMBER_ID)
    }

    fn set_sources(self: Arc<Self>, fulltext: &mut FullText) {
        // Can't set any sources if the API is not configured.
        let (Some(base_url), Some(api_key), Some(api_suffix)) = (
            self.settings.api_base_url.as_deref(),
            self.settings.api_key.as_deref(),
            self.settings.api_suffix.as_deref(),
        ) else {
            return;
        };

        let link = format!(
            "{base_url}?q=doi:{}&api_key={api_key}/{api_suffix}",
            fulltext.doi
        );

        let source = Source::new(
            Arc::clone(&self) as Arc<dyn Publisher>,
            link,
            FormatName::Xml,
            false,
        );
        fulltext.format_mut(FormatName::Xml).sources = vec![source];
    }

    async fn acquire(&self, source: &Source) -> Result<Vec<u8>, AcquireError> {
        if !self.settings.is_configured() {
            return Err(AcquireError::NotConfigured {
                publisher: "springer-nature",
            });
        }

        let data = self.session.get_bytes(&source.link).await?;

        extract_article(&data)
    }
}

/// Extracts the single `article` element with a non-empty `body` from an
/// API query response.
///
/// The response wraps query bookkeeping around the article content, so the
/// article subtree is located by event positions and sliced out of the raw
/// bytes unchanged.
fn extract_article(data: &[u8]) -> Result<Vec<u8>, AcquireError> {
    let mut reader = quick_xml::Reader::from_reader(data);

    let mut article_count: usize = 0;
    let mut start: Option<usize> = None;
    let mut end: Option<usize> = None;
    let mut depth: usize = 0;
    let mut last_position: usize = 0;

    loop {
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(Event::Start(element)) => {
                if element.local_name().as_ref() == b"article" {
                    if depth == 0 {
                        article_count += 1;
                        start = Some(last_position);
                    }
                    depth += 1;
                }
            }
            Ok(Event::End(element)) => {
                if element.local_name().as_ref() == b"article" && depth > 0 {
                    depth -= 1;
                    if depth == 0 && end.is_none() {
                        #[allow(clippy::cast_possible_truncation)]
                        let position = reader.buffer_position() as usize;
                        end = Some(position);
                    }
                }
            }
            Ok(_) => {}
            Err(error) => {
                return Err(AcquireError::Validation(ValidationError::NotMarkup {
                    format: FormatName::Xml,
                    detail: error.to_string(),
                }));
            }
        }

        #[allow(clippy::cast_possible_truncation)]
        {
            last_position = reader.buffer_position() as usize;
        }
    }

    if article_count != 1 {
        return Err(AcquireError::Validation(ValidationError::NoBody {
            format: FormatName::Xml,
        }));
    }

    let (Some(start), Some(end)) = (start, end) else {
        return Err(AcquireError::Validation(ValidationError::NoBody {
            format: FormatName::Xml,
        }));
    };

    let article = &data[start..end];

    // The article must itself carry a non-empty body.
    validate::validate_xml(article)?;

    Ok(article.to_vec())
}
