//! Generic web-host strategy: acquire whatever the Crossref text-mining
//! links point at, over plain rate-limited HTTP.

use std::sync::Arc;

use async_trait::async_trait;

use crate::fulltext::FullText;
use crate::metadata::MemberId;
use crate::source::{AcquireError, Source};
use crate::web::WebClient;

use super::{Publisher, PublisherBuildError, set_sources_from_crossref};

/// Handler for publishers that need nothing beyond the Crossref links:
/// an optional domain restriction and a default-limited HTTP session.
pub struct GenericWebHost {
    name: &'static str,
    member_id: MemberId,
    source_domain: Option<&'static str>,
    session: WebClient,
}

impl GenericWebHost {
    /// Creates a generic host handler for the given member ID.
    ///
    /// # Errors
    ///
    /// Returns [`PublisherBuildError`] on an invalid member ID literal or
    /// HTTP client build failure.
    pub fn new(
        name: &'static str,
        member_id: &str,
        source_domain: Option<&'static str>,
    ) -> Result<Self, PublisherBuildError> {
        Ok(Self {
            name,
            member_id: MemberId::new(member_id)?,
            source_domain,
            session: WebClient::builder().build()?,
        })
    }
}

#[async_trait]
impl Publisher for GenericWebHost {
    fn name(&self) -> &'static str {
        self.name
    }

    fn member_id(&self) -> MemberId {
        self.member_id.clone()
    }

    fn set_sources(self: Arc<Self>, fulltext: &mut FullText) {
        let domain = self.source_domain;
        let filter = move |source: &Source| match domain {
            Some(domain) => source.link.contains(domain),
            None => true,
        };
        set_sources_from_crossref(fulltext, self, false, Some(&filter));
    }

    async fn acquire(&self, source: &Source) -> Result<Vec<u8>, AcquireError> {
        Ok(self.session.get_bytes(&source.link).await?)
    }
}
