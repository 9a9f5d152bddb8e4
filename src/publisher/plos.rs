//! Handler for PLoS.
//!
//! Uses the documented article-file URL templates rather than the Crossref
//! links. Web requests only; the bulk `allofplos.zip` data file is not used,
//! and heavy use over the website gets a one-time nudge toward it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use tracing::warn;

use crate::format::FormatName;
use crate::fulltext::FullText;
use crate::metadata::MemberId;
use crate::source::{AcquireError, Source};
use crate::web::WebClient;

use super::{Publisher, PublisherBuildError};

const MEMBER_ID: &str = "340";

/// Requests beyond this count trigger the bulk-data suggestion.
const BULK_WARNING_THRESHOLD: u32 = 10;

/// PLoS handler.
pub struct Plos {
    session: WebClient,
    n_requests: AtomicU32,
    warning_printed: AtomicBool,
}

impl Plos {
    /// Creates the handler.
    ///
    /// # Errors
    ///
    /// Returns [`PublisherBuildError`] on HTTP client build failure.
    pub fn new() -> Result<Self, PublisherBuildError> {
        Ok(Self {
            session: WebClient::builder().build()?,
            n_requests: AtomicU32::new(0),
            warning_printed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Publisher for Plos {
    fn name(&self) -> &'static str {
        "plos"
    }

    fn member_id(&self) -> MemberId {
        MemberId::from_static(MEMBER_ID)
    }

    fn set_sources(self: Arc<Self>, fulltext: &mut FullText) {
        for format_name in [FormatName::Xml, FormatName::Pdf] {
            // https://api.plos.org/text-and-data-mining.html
            let file_type = if format_name == FormatName::Pdf {
                "printable"
            } else {
                "manuscript"
            };

            let link = format!(
                "https://journals.plos.org/plosone/article/file?id={}&type={file_type}",
                fulltext.doi
            );

            let source = Source::new(Arc::clone(&self) as Arc<dyn Publisher>, link, format_name, false);
            fulltext.format_mut(format_name).sources = vec![source];
        }
    }

    async fn acquire(&self, source: &Source) -> Result<Vec<u8>, AcquireError> {
        let data = self.session.get_bytes(&source.link).await?;

        let n_requests = self.n_requests.fetch_add(1, Ordering::SeqCst) + 1;

        if n_requests > BULK_WARNING_THRESHOLD && !self.warning_printed.swap(true, Ordering::SeqCst)
        {
            warn!(
                "bulk downloading via the PLoS website is discouraged; consider the PLoS \
                 data file (see https://api.plos.org/text-and-data-mining.html)"
            );
        }

        Ok(data)
    }
}
