//! Handler for Wiley's TDM API.
//!
//! The API serves PDF only, authenticated by a client token header.
//! Published limits are up to 60 requests per 10 minutes, which the
//! session's limiter enforces directly.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::config::{self, Settings};
use crate::format::FormatName;
use crate::fulltext::FullText;
use crate::metadata::MemberId;
use crate::source::{AcquireError, Source};
use crate::web::WebClient;

use super::{Publisher, PublisherBuildError, check_hostname};

const MEMBER_ID: &str = "311";

const RATE_LIMIT: u32 = 60;
const RATE_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Wiley handler.
pub struct Wiley {
    is_configured: bool,
    valid_hostname: Option<String>,
    hostname: String,
    session: WebClient,
}

impl Wiley {
    /// Creates the handler, warning when the client token is absent.
    ///
    /// # Errors
    ///
    /// Returns [`PublisherBuildError`] on HTTP client build failure.
    pub fn new(settings: &Settings) -> Result<Self, PublisherBuildError> {
        let tdm_client_token = config::scoped_env("WILEY", "TDM_CLIENT_TOKEN");
        let is_configured = tdm_client_token.is_some();

        if !is_configured {
            warn!("handler for Wiley is not configured");
        }

        let mut builder = WebClient::builder().rate_limit(RATE_LIMIT, RATE_INTERVAL);
        if let Some(token) = &tdm_client_token {
            builder = builder.header("Wiley-TDM-Client-Token", token);
        }

        Ok(Self {
            is_configured,
            valid_hostname: config::scoped_env("WILEY", "VALID_HOSTNAME"),
            hostname: settings.hostname.clone(),
            session: builder.build()?,
        })
    }
}

#[async_trait]
impl Publisher for Wiley {
    fn name(&self) -> &'static str {
        "wiley"
    }

    fn member_id(&self) -> MemberId {
        MemberId::from_static(MEMBER_ID)
    }

    fn set_sources(self: Arc<Self>, fulltext: &mut FullText) {
        // Can't set any sources if the API is not configured.
        if !self.is_configured {
            return;
        }

        // The API only has PDF.
        let link = format!(
            "https://api.wiley.com/onlinelibrary/tdm/v1/articles/{}",
            fulltext.doi.quoted()
        );

        let source = Source::new(
            Arc::clone(&self) as Arc<dyn Publisher>,
            link,
            FormatName::Pdf,
            false,
        );
        fulltext.format_mut(FormatName::Pdf).sources = vec![source];
    }

    async fn acquire(&self, source: &Source) -> Result<Vec<u8>, AcquireError> {
        check_hostname(self.valid_hostname.as_deref(), &self.hostname)?;
        Ok(self.session.get_bytes(&source.link).await?)
    }
}
