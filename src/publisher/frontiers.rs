//! Handler for Frontiers, using the documented article URL scheme.

use std::sync::Arc;

use async_trait::async_trait;

use crate::format::FormatName;
use crate::fulltext::FullText;
use crate::metadata::MemberId;
use crate::source::{AcquireError, Source};
use crate::web::WebClient;

use super::{Publisher, PublisherBuildError};

const MEMBER_ID: &str = "1965";

/// Frontiers handler.
pub struct Frontiers {
    session: WebClient,
}

impl Frontiers {
    /// Creates the handler.
    ///
    /// # Errors
    ///
    /// Returns [`PublisherBuildError`] on HTTP client build failure.
    pub fn new() -> Result<Self, PublisherBuildError> {
        Ok(Self {
            session: WebClient::builder().build()?,
        })
    }
}

#[async_trait]
impl Publisher for Frontiers {
    fn name(&self) -> &'static str {
        "frontiers"
    }

    fn member_id(&self) -> MemberId {
        MemberId::from_static(MEMBER_ID)
    }

    fn set_sources(self: Arc<Self>, fulltext: &mut FullText) {
        for format_name in [FormatName::Xml, FormatName::Pdf] {
            // https://helpcenter.frontiersin.org/s/article/Article-URLs-and-File-Formats
            let link = format!(
                "https://journal.frontiersin.org/article/{}/{}",
                fulltext.doi,
                format_name.ext()
            );

            let source = Source::new(Arc::clone(&self) as Arc<dyn Publisher>, link, format_name, false);
            fulltext.format_mut(format_name).sources = vec![source];
        }
    }

    async fn acquire(&self, source: &Source) -> Result<Vec<u8>, AcquireError> {
        Ok(self.session.get_bytes(&source.link).await?)
    }
}
