//! Publisher acquisition strategies and the dispatch registry.
//!
//! Each publisher implements [`Publisher`]: a Crossref member ID (the
//! dispatch key), `set_sources` to populate candidate [`Source`]s into a
//! work's formats, and `acquire` to fetch raw bytes for one source. The
//! [`PublisherRegistry`] is an explicit value built once at startup from the
//! statically known handler list and passed into the orchestrator.
//!
//! Dispatch is by exact member-ID match only. An unmatched member ID means
//! zero candidate sources for that work, which is a reportable outcome, not
//! an error.

mod ama;
mod apa;
mod elsevier;
mod frontiers;
mod generic;
mod iop;
mod plos;
mod pnas;
mod royal_society;
mod sage;
mod springer_nature;
mod taylor_francis;
mod wiley;

pub use ama::Ama;
pub use apa::Apa;
pub use elsevier::Elsevier;
pub use frontiers::Frontiers;
pub use generic::GenericWebHost;
pub use iop::Iop;
pub use plos::Plos;
pub use pnas::Pnas;
pub use royal_society::RoyalSociety;
pub use sage::Sage;
pub use springer_nature::SpringerNature;
pub use taylor_francis::TaylorAndFrancis;
pub use wiley::Wiley;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::format::FormatName;
use crate::fulltext::FullText;
use crate::metadata::{MemberId, MetadataError};
use crate::source::{AcquireError, Source};
use crate::web::WebError;

/// Errors raised while constructing a publisher handler.
#[derive(Debug, Error)]
pub enum PublisherBuildError {
    /// The handler's HTTP client could not be built.
    #[error(transparent)]
    Web(#[from] WebError),

    /// The handler's member ID literal was invalid.
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

/// A per-publisher acquisition strategy.
///
/// # Object Safety
///
/// `acquire` uses `async_trait` so handlers can be stored as
/// `Arc<dyn Publisher>` in the registry. `set_sources` takes `self: Arc<Self>`
/// so implementations can bind themselves into the sources they create.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// The handler's name (e.g. "elsevier", "plos").
    fn name(&self) -> &'static str;

    /// The Crossref member ID this handler is dispatched for.
    fn member_id(&self) -> MemberId;

    /// Populates candidate sources into the relevant formats of `fulltext`,
    /// from metadata links and/or fixed URL templates.
    fn set_sources(self: Arc<Self>, fulltext: &mut FullText);

    /// Acquires raw full-text bytes for one source.
    async fn acquire(&self, source: &Source) -> Result<Vec<u8>, AcquireError>;
}

/// Dispatch table from member ID to publisher handler.
pub struct PublisherRegistry {
    handlers: HashMap<MemberId, Arc<dyn Publisher>>,
}

impl PublisherRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers a handler under its member ID.
    ///
    /// A later registration for the same member ID replaces the earlier one
    /// with a logged warning.
    pub fn register(&mut self, publisher: Arc<dyn Publisher>) {
        let member_id = publisher.member_id();
        debug!(
            name = publisher.name(),
            member_id = %member_id,
            "registering publisher handler"
        );
        if let Some(previous) = self.handlers.insert(member_id.clone(), publisher) {
            warn!(
                member_id = %member_id,
                previous = previous.name(),
                "replaced an existing handler for member ID"
            );
        }
    }

    /// Looks up the handler for a member ID.
    #[must_use]
    pub fn get(&self, member_id: &MemberId) -> Option<Arc<dyn Publisher>> {
        self.handlers.get(member_id).cloned()
    }

    /// Returns the number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// The registered member IDs, in ascending order.
    #[must_use]
    pub fn member_ids(&self) -> Vec<MemberId> {
        let mut ids: Vec<MemberId> = self.handlers.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for PublisherRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PublisherRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.handlers.values().map(|p| p.name()).collect();
        f.debug_struct("PublisherRegistry")
            .field("handler_count", &self.handlers.len())
            .field("handlers", &names)
            .finish()
    }
}

/// Builds the default registry from the built-in handler list.
///
/// Handlers that fail to construct (e.g. HTTP client build failure) are
/// skipped with a logged warning; the rest of the registry still works.
#[must_use]
pub fn build_default_registry(settings: &Settings) -> PublisherRegistry {
    let mut registry = PublisherRegistry::new();

    register_or_warn(&mut registry, "ama", Ama::new(settings));
    register_or_warn(&mut registry, "elsevier", Elsevier::new(settings));
    register_or_warn(&mut registry, "plos", Plos::new());
    register_or_warn(&mut registry, "frontiers", Frontiers::new());
    register_or_warn(&mut registry, "pnas", Pnas::new(settings));
    register_or_warn(&mut registry, "royal-society", RoyalSociety::new(settings));
    register_or_warn(&mut registry, "sage", Sage::new(settings));
    register_or_warn(&mut registry, "springer-nature", SpringerNature::new(settings));
    register_or_warn(
        &mut registry,
        "taylor-and-francis",
        TaylorAndFrancis::new(settings),
    );
    register_or_warn(&mut registry, "wiley", Wiley::new(settings));
    register_or_warn(&mut registry, "apa", Apa::new(settings));
    register_or_warn(&mut registry, "iop", Iop::new(settings));
    // PeerJ needs nothing beyond the generic Crossref-link strategy.
    register_or_warn(
        &mut registry,
        "peerj",
        GenericWebHost::new("peerj", "4443", None),
    );

    registry
}

fn register_or_warn<P: Publisher + 'static>(
    registry: &mut PublisherRegistry,
    name: &str,
    result: Result<P, PublisherBuildError>,
) {
    match result {
        Ok(publisher) => registry.register(Arc::new(publisher)),
        Err(error) => warn!(
            handler = name,
            error = %error,
            "publisher handler unavailable; continuing without it"
        ),
    }
}

/// Fails when this process is not running on the host a publisher's access
/// terms are restricted to. No restriction configured means any host is fine.
pub(crate) fn check_hostname(
    valid_hostname: Option<&str>,
    hostname: &str,
) -> Result<(), AcquireError> {
    match valid_hostname {
        Some(expected) if expected != hostname => Err(AcquireError::InvalidHostname {
            expected: expected.to_string(),
            actual: hostname.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Populates sources from the metadata's Crossref `link` array.
///
/// Keeps entries whose `intended-application` is `text-mining`, classifies
/// each by MIME `content-type` into a format (skipping `unspecified` and
/// unrecognized types with a warning), optionally filters by a predicate
/// (e.g. a required domain), and prepends each new source to its format's
/// list, de-duplicated on (link, format).
///
/// This is the default generic strategy; specific handlers use it verbatim,
/// use it with a domain filter, or replace it with their own templates.
pub fn set_sources_from_crossref(
    fulltext: &mut FullText,
    acquirer: Arc<dyn Publisher>,
    encrypt: bool,
    source_filter: Option<&dyn Fn(&Source) -> bool>,
) {
    let metadata = Arc::clone(&fulltext.metadata);

    let raw = match metadata.raw() {
        Ok(raw) => raw,
        Err(error) => {
            warn!(error = %error, "missing metadata; no sources to derive");
            return;
        }
    };

    let Some(links) = raw.get("link") else {
        return;
    };

    let Some(links) = links.as_array() else {
        warn!("unexpected `link` structure in metadata");
        return;
    };

    for link in links {
        let Some(link) = link.as_object() else {
            warn!("unexpected `link` entry in metadata");
            continue;
        };

        if link.get("intended-application").and_then(Value::as_str) != Some("text-mining") {
            continue;
        }

        let Some(content_type) = link.get("content-type").and_then(Value::as_str) else {
            warn!("skipping link without a content-type");
            continue;
        };

        if content_type == "unspecified" {
            warn!(content_type, "skipping due to the content-type");
            continue;
        }

        let Some(url) = link.get("URL").and_then(Value::as_str) else {
            warn!("skipping link without a URL");
            continue;
        };

        let Some(format_name) = FormatName::from_content_type(content_type) else {
            warn!(content_type, "skipping due to unknown content-type");
            continue;
        };

        let source = Source::new(Arc::clone(&acquirer), url, format_name, encrypt);

        if let Some(filter) = source_filter {
            if !filter(&source) {
                warn!(link = %source.link, "skipping due to a failed source check");
                continue;
            }
        }

        let sources = &mut fulltext.format_mut(format_name).sources;
        if !sources.contains(&source) {
            sources.insert(0, source);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::doi::Doi;
    use crate::metadata::Metadata;

    struct NullPublisher {
        member: &'static str,
    }

    #[async_trait]
    impl Publisher for NullPublisher {
        fn name(&self) -> &'static str {
            "null"
        }

        fn member_id(&self) -> MemberId {
            MemberId::new(self.member).unwrap()
        }

        fn set_sources(self: Arc<Self>, _fulltext: &mut FullText) {}

        async fn acquire(&self, source: &Source) -> Result<Vec<u8>, AcquireError> {
            Err(AcquireError::NotFound {
                link: source.link.clone(),
            })
        }
    }

    fn fulltext_with_metadata(
        temp: &tempfile::TempDir,
        value: &serde_json::Value,
    ) -> (FullText, Settings) {
        let settings = Settings {
            data_dir: temp.path().to_path_buf(),
            metadata_compression_level: 0,
            ..Settings::default()
        };
        let doi = Doi::parse("10.1234/test").unwrap();
        let metadata = Metadata::new(&doi, &settings);
        std::fs::create_dir_all(metadata.path.parent().unwrap()).unwrap();
        std::fs::write(&metadata.path, serde_json::to_vec(value).unwrap()).unwrap();

        let fulltext = FullText::new(&doi, Arc::new(metadata), &settings);
        (fulltext, settings)
    }

    // ==================== Registry Tests ====================

    #[test]
    fn test_registry_new_is_empty() {
        let registry = PublisherRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_registry_register_and_get() {
        let mut registry = PublisherRegistry::new();
        registry.register(Arc::new(NullPublisher { member: "42" }));

        let member = MemberId::new("42").unwrap();
        assert!(registry.get(&member).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_unknown_member_is_none() {
        let registry = PublisherRegistry::new();
        let member = MemberId::new("999").unwrap();
        assert!(registry.get(&member).is_none());
    }

    #[test]
    fn test_registry_member_ids_sorted_numerically() {
        let mut registry = PublisherRegistry::new();
        registry.register(Arc::new(NullPublisher { member: "100" }));
        registry.register(Arc::new(NullPublisher { member: "99" }));

        let ids = registry.member_ids();
        assert_eq!(ids[0].as_str(), "99");
        assert_eq!(ids[1].as_str(), "100");
    }

    #[test]
    fn test_registry_debug_lists_names() {
        let mut registry = PublisherRegistry::new();
        registry.register(Arc::new(NullPublisher { member: "1" }));
        let debug = format!("{registry:?}");
        assert!(debug.contains("null"));
        assert!(debug.contains("handler_count: 1"));
    }

    #[test]
    fn test_build_default_registry_has_handlers() {
        let registry = build_default_registry(&Settings::default());
        // Every built-in web handler registers even when unconfigured.
        assert!(registry.len() >= 10, "got {} handlers", registry.len());
        assert!(registry.get(&MemberId::new("340").unwrap()).is_some());
        assert!(registry.get(&MemberId::new("4443").unwrap()).is_some());
    }

    // ==================== Hostname Check Tests ====================

    #[test]
    fn test_check_hostname_unrestricted() {
        assert!(check_hostname(None, "anyhost").is_ok());
    }

    #[test]
    fn test_check_hostname_match() {
        assert!(check_hostname(Some("tdm-box"), "tdm-box").is_ok());
    }

    #[test]
    fn test_check_hostname_mismatch() {
        let result = check_hostname(Some("tdm-box"), "laptop");
        assert!(matches!(result, Err(AcquireError::InvalidHostname { .. })));
    }

    // ==================== Crossref Link Derivation Tests ====================

    fn text_mining_links() -> serde_json::Value {
        serde_json::json!({
            "member": "4443",
            "link": [
                {
                    "URL": "https://peerj.com/articles/1.xml",
                    "content-type": "application/xml",
                    "intended-application": "text-mining"
                },
                {
                    "URL": "https://peerj.com/articles/1.pdf",
                    "content-type": "application/pdf",
                    "intended-application": "text-mining"
                },
                {
                    "URL": "https://peerj.com/articles/1",
                    "content-type": "unspecified",
                    "intended-application": "text-mining"
                },
                {
                    "URL": "https://peerj.com/articles/1-similarity",
                    "content-type": "application/pdf",
                    "intended-application": "similarity-checking"
                }
            ]
        })
    }

    #[test]
    fn test_set_sources_from_crossref_classifies_links() {
        let temp = tempfile::TempDir::new().unwrap();
        let (mut fulltext, _settings) = fulltext_with_metadata(&temp, &text_mining_links());

        let acquirer: Arc<dyn Publisher> = Arc::new(NullPublisher { member: "4443" });
        set_sources_from_crossref(&mut fulltext, acquirer, false, None);

        assert_eq!(fulltext.format(FormatName::Xml).sources.len(), 1);
        assert_eq!(fulltext.format(FormatName::Pdf).sources.len(), 1);
        // unspecified and non-text-mining entries are skipped
        assert_eq!(fulltext.format(FormatName::Html).sources.len(), 0);
        assert_eq!(
            fulltext.format(FormatName::Pdf).sources[0].link,
            "https://peerj.com/articles/1.pdf"
        );
    }

    #[test]
    fn test_set_sources_from_crossref_is_idempotent() {
        let temp = tempfile::TempDir::new().unwrap();
        let (mut fulltext, _settings) = fulltext_with_metadata(&temp, &text_mining_links());

        let acquirer: Arc<dyn Publisher> = Arc::new(NullPublisher { member: "4443" });
        set_sources_from_crossref(&mut fulltext, Arc::clone(&acquirer), false, None);
        set_sources_from_crossref(&mut fulltext, acquirer, false, None);

        assert_eq!(
            fulltext.format(FormatName::Pdf).sources.len(),
            1,
            "repeated derivation must not duplicate sources"
        );
    }

    #[test]
    fn test_set_sources_from_crossref_domain_filter() {
        let temp = tempfile::TempDir::new().unwrap();
        let (mut fulltext, _settings) = fulltext_with_metadata(&temp, &text_mining_links());

        let acquirer: Arc<dyn Publisher> = Arc::new(NullPublisher { member: "4443" });
        let filter = |source: &Source| source.link.contains("nosuchdomain.example");
        set_sources_from_crossref(&mut fulltext, acquirer, false, Some(&filter));

        assert_eq!(fulltext.format(FormatName::Pdf).sources.len(), 0);
        assert_eq!(fulltext.format(FormatName::Xml).sources.len(), 0);
    }

    #[test]
    fn test_set_sources_from_crossref_without_links_is_noop() {
        let temp = tempfile::TempDir::new().unwrap();
        let (mut fulltext, _settings) =
            fulltext_with_metadata(&temp, &serde_json::json!({"member": "4443"}));

        let acquirer: Arc<dyn Publisher> = Arc::new(NullPublisher { member: "4443" });
        set_sources_from_crossref(&mut fulltext, acquirer, false, None);

        for format in FormatName::ALL {
            assert!(fulltext.format(format).sources.is_empty());
        }
    }

    #[test]
    fn test_set_sources_prepends_most_recent() {
        let temp = tempfile::TempDir::new().unwrap();
        let (mut fulltext, _settings) = fulltext_with_metadata(&temp, &text_mining_links());

        let acquirer: Arc<dyn Publisher> = Arc::new(NullPublisher { member: "4443" });

        // A pre-existing generic source ends up behind the derived one.
        let existing = Source::new(
            Arc::clone(&acquirer),
            "https://fallback.example/1.pdf",
            FormatName::Pdf,
            false,
        );
        fulltext.format_mut(FormatName::Pdf).sources.push(existing);

        set_sources_from_crossref(&mut fulltext, acquirer, false, None);

        let sources = &fulltext.format(FormatName::Pdf).sources;
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].link, "https://peerj.com/articles/1.pdf");
        assert_eq!(sources[1].link, "https://fallback.example/1.pdf");
    }
}
