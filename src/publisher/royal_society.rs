//! Handler for the Royal Society: the generic Crossref-link strategy plus
//! an optional host restriction.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{self, Settings};
use crate::fulltext::FullText;
use crate::metadata::MemberId;
use crate::source::{AcquireError, Source};
use crate::web::WebClient;

use super::{Publisher, PublisherBuildError, check_hostname, set_sources_from_crossref};

const MEMBER_ID: &str = "175";

// The server returns an X-RateLimit-Limit header, which could be used to
// set custom rate limits.

/// Royal Society handler.
pub struct RoyalSociety {
    valid_hostname: Option<String>,
    hostname: String,
    session: WebClient,
}

impl RoyalSociety {
    /// Creates the handler.
    ///
    /// # Errors
    ///
    /// Returns [`PublisherBuildError`] on HTTP client build failure.
    pub fn new(settings: &Settings) -> Result<Self, PublisherBuildError> {
        Ok(Self {
            valid_hostname: config::scoped_env("ROYAL_SOCIETY", "VALID_HOSTNAME"),
            hostname: settings.hostname.clone(),
            session: WebClient::builder().build()?,
        })
    }
}

#[async_trait]
impl Publisher for RoyalSociety {
    fn name(&self) -> &'static str {
        "royal-society"
    }

    fn member_id(&self) -> MemberId {
        MemberId::from_static(MEMBER_ID)
    }

    fn set_sources(self: Arc<Self>, fulltext: &mut FullText) {
        set_sources_from_crossref(fulltext, self, false, None);
    }

    async fn acquire(&self, source: &Source) -> Result<Vec<u8>, AcquireError> {
        check_hostname(self.valid_hostname.as_deref(), &self.hostname)?;
        Ok(self.session.get_bytes(&source.link).await?)
    }
}
