//! Handler for Sage.
//!
//! Sage's text-mining policy mandates different request rates by time of
//! week in the America/Los_Angeles timezone: one request per six seconds on
//! weekday mornings (midnight to noon), one per two seconds otherwise. Two
//! pre-built sessions carry the two limits and the active one is picked per
//! request.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, NaiveTime, Timelike, Utc};
use chrono_tz::America::Los_Angeles;

use crate::config::{self, Settings};
use crate::fulltext::FullText;
use crate::metadata::MemberId;
use crate::source::{AcquireError, Source};
use crate::web::WebClient;

use super::{Publisher, PublisherBuildError, check_hostname, set_sources_from_crossref};

const MEMBER_ID: &str = "179";
const SOURCE_DOMAIN: &str = "journals.sagepub.com";

/// Which of the two mandated request rates applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RateLimit {
    OnePerSixSeconds,
    OnePerTwoSeconds,
}

impl RateLimit {
    /// Selects the rate for the current wall-clock time.
    ///
    /// https://journals.sagepub.com/page/policies/text-and-data-mining:
    /// 1 request / 6 s Monday-Friday between midnight and noon Pacific;
    /// 1 request / 2 s otherwise (weekday afternoons and all weekend).
    fn from_current_time() -> Self {
        let now = Utc::now().with_timezone(&Los_Angeles);
        Self::for_instant(now.weekday().num_days_from_monday(), now.time())
    }

    fn for_instant(days_from_monday: u32, time: NaiveTime) -> Self {
        let is_weekday = days_from_monday < 5;
        let is_morning = time.hour() < 12;

        if is_weekday && is_morning {
            Self::OnePerSixSeconds
        } else {
            Self::OnePerTwoSeconds
        }
    }
}

/// Sage handler.
pub struct Sage {
    valid_hostname: Option<String>,
    hostname: String,
    slow_session: WebClient,
    fast_session: WebClient,
}

impl Sage {
    /// Creates the handler with both rate-limited sessions.
    ///
    /// # Errors
    ///
    /// Returns [`PublisherBuildError`] on HTTP client build failure.
    pub fn new(settings: &Settings) -> Result<Self, PublisherBuildError> {
        Ok(Self {
            valid_hostname: config::scoped_env("SAGE", "VALID_HOSTNAME"),
            hostname: settings.hostname.clone(),
            slow_session: WebClient::builder()
                .rate_limit(1, Duration::from_secs(6))
                .build()?,
            fast_session: WebClient::builder()
                .rate_limit(1, Duration::from_secs(2))
                .build()?,
        })
    }

    fn session_for(&self, rate_limit: RateLimit) -> &WebClient {
        match rate_limit {
            RateLimit::OnePerSixSeconds => &self.slow_session,
            RateLimit::OnePerTwoSeconds => &self.fast_session,
        }
    }
}

#[async_trait]
impl Publisher for Sage {
    fn name(&self) -> &'static str {
        "sage"
    }

    fn member_id(&self) -> MemberId {
        MemberId::from_static(MEMBER_ID)
    }

    fn set_sources(self: Arc<Self>, fulltext: &mut FullText) {
        let filter = |source: &Source| source.link.contains(SOURCE_DOMAIN);
        set_sources_from_crossref(fulltext, self, false, Some(&filter));
    }

    async fn acquire(&self, source: &Source) -> Result<Vec<u8>, AcquireError> {
        check_hostname(self.valid_hostname.as_deref(), &self.hostname)?;

        let session = self.session_for(RateLimit::from_current_time());
        Ok(session.get_bytes(&source.link).await?)
    }
}
