//! Handler for PNAS, using the direct article URL scheme with an optional
//! host restriction.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{self, Settings};
use crate::format::FormatName;
use crate::fulltext::FullText;
use crate::metadata::MemberId;
use crate::source::{AcquireError, Source};
use crate::web::WebClient;

use super::{Publisher, PublisherBuildError, check_hostname};

const MEMBER_ID: &str = "341";

/// PNAS handler.
pub struct Pnas {
    valid_hostname: Option<String>,
    hostname: String,
    session: WebClient,
}

impl Pnas {
    /// Creates the handler.
    ///
    /// # Errors
    ///
    /// Returns [`PublisherBuildError`] on HTTP client build failure.
    pub fn new(settings: &Settings) -> Result<Self, PublisherBuildError> {
        Ok(Self {
            valid_hostname: config::scoped_env("PNAS", "VALID_HOSTNAME"),
            hostname: settings.hostname.clone(),
            session: WebClient::builder().build()?,
        })
    }
}

#[async_trait]
impl Publisher for Pnas {
    fn name(&self) -> &'static str {
        "pnas"
    }

    fn member_id(&self) -> MemberId {
        MemberId::from_static(MEMBER_ID)
    }

    fn set_sources(self: Arc<Self>, fulltext: &mut FullText) {
        for format_name in [FormatName::Xml, FormatName::Pdf] {
            let link = format!(
                "https://pnas.org/doi/{}/{}",
                format_name.ext(),
                fulltext.doi
            );

            let source = Source::new(Arc::clone(&self) as Arc<dyn Publisher>, link, format_name, false);
            fulltext.format_mut(format_name).sources = vec![source];
        }
    }

    async fn acquire(&self, source: &Source) -> Result<Vec<u8>, AcquireError> {
        check_hostname(self.valid_hostname.as_deref(), &self.hostname)?;
        Ok(self.session.get_bytes(&source.link).await?)
    }
}
