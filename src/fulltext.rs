//! Full-text acquisition orchestration across formats.

use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::config::Settings;
use crate::doi::Doi;
use crate::format::{Format, FormatName};
use crate::metadata::Metadata;
use crate::publisher::PublisherRegistry;
use crate::source::AcquireError;

/// Loaded full-text content and the format it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedData {
    /// The payload bytes (decrypted when stored encrypted).
    pub data: Vec<u8>,
    /// Which format was loaded.
    pub format: FormatName,
}

/// Per-work full-text state: one [`Format`] per format name plus a
/// memoized sources-populated flag.
pub struct FullText {
    /// The work's DOI.
    pub doi: Doi,
    /// The work's metadata (shared with [`crate::work::Work`]).
    pub metadata: Arc<Metadata>,
    formats: [Format; 5],
    sources_set: bool,
}

impl FullText {
    /// Creates the full-text state for a DOI.
    #[must_use]
    pub fn new(doi: &Doi, metadata: Arc<Metadata>, settings: &Settings) -> Self {
        Self {
            doi: doi.clone(),
            metadata,
            formats: FormatName::ALL.map(|name| Format::new(name, doi, settings)),
            sources_set: false,
        }
    }

    /// The state for one format.
    #[must_use]
    pub fn format(&self, name: FormatName) -> &Format {
        &self.formats[name.index()]
    }

    /// Mutable state for one format.
    #[must_use]
    pub fn format_mut(&mut self, name: FormatName) -> &mut Format {
        &mut self.formats[name.index()]
    }

    /// Iterates over all format states.
    pub fn formats(&self) -> impl Iterator<Item = &Format> {
        self.formats.iter()
    }

    /// Whether content exists for the given format.
    #[must_use]
    pub fn has_format(&self, name: FormatName) -> bool {
        self.format(name).exists()
    }

    /// Uses the registered publisher handler to populate candidate sources.
    ///
    /// A no-op when metadata is absent, its member ID is unreadable, or no
    /// handler is registered for the member ID: the work simply ends up
    /// with zero sources.
    pub fn set_sources(&mut self, registry: &PublisherRegistry) {
        if !self.metadata.exists() {
            return;
        }

        let member_id = match self.metadata.member_id() {
            Ok(member_id) => member_id,
            Err(error) => {
                warn!(doi = %self.doi, error = %error, "could not read member ID");
                return;
            }
        };

        let Some(publisher) = registry.get(&member_id) else {
            debug!(doi = %self.doi, member_id = %member_id, "no handler registered for member ID");
            return;
        };

        publisher.set_sources(self);
    }

    /// Attempts to acquire full-text content in format preference order.
    ///
    /// Sources are populated at most once per instance. A format whose
    /// local file already exists counts as a success without refetching.
    /// Per-format failures are logged and the next preferred format is
    /// tried; after any success, remaining formats are skipped when so
    /// configured. Returns whether any format is now available.
    #[instrument(skip(self, registry, settings), fields(doi = %self.doi))]
    pub async fn acquire(&mut self, registry: &PublisherRegistry, settings: &Settings) -> bool {
        info!(doi = %self.doi, "attempting to acquire full-text");

        if !self.sources_set {
            self.set_sources(registry);
            self.sources_set = true;
        }

        let mut any_success = false;

        for format_name in settings.format_preference_order.clone() {
            let format = self.format(format_name);

            if format.exists() {
                info!(
                    doi = %self.doi,
                    format = %format_name,
                    "full-text content already exists; skipping"
                );
            } else {
                info!(format = %format_name, "trying to acquire format");

                if let Err(error) = format.acquire(settings).await {
                    warn!(
                        format = %format_name,
                        error = %error,
                        "could not acquire full-text content for format"
                    );
                    continue;
                }

                info!(format = %format_name, "successfully acquired format");
            }

            any_success = true;

            if settings.skip_remaining_formats {
                info!("skipping any remaining formats");
                break;
            }
        }

        if !any_success {
            error!(doi = %self.doi, "unable to obtain any full-text content");
        }

        any_success
    }

    /// Loads stored content, either for a specific format or for the first
    /// format in preference order that has content.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::NoContent`] when nothing is stored, plus any
    /// read/decryption failure from the format itself.
    pub fn load(
        &self,
        format: Option<FormatName>,
        settings: &Settings,
    ) -> Result<LoadedData, AcquireError> {
        let candidates: Vec<FormatName> = match format {
            Some(format) => vec![format],
            None => settings.format_preference_order.clone(),
        };

        for name in candidates {
            let format = self.format(name);
            if !format.exists() {
                continue;
            }

            return Ok(LoadedData {
                data: format.load(settings)?,
                format: name,
            });
        }

        Err(AcquireError::NoContent {
            doi: self.doi.clone(),
        })
    }
}

impl std::fmt::Debug for FullText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FullText")
            .field("doi", &self.doi)
            .field("sources_set", &self.sources_set)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::metadata::MemberId;
    use crate::publisher::Publisher;
    use crate::source::Source;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    const PDF_PAYLOAD: &[u8] = b"%PDF-1.7 content";

    /// Test handler that plants one PDF source and counts acquire calls.
    struct TemplatePublisher {
        member: &'static str,
        calls: AtomicU32,
    }

    impl TemplatePublisher {
        fn new(member: &'static str) -> Arc<Self> {
            Arc::new(Self {
                member,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Publisher for TemplatePublisher {
        fn name(&self) -> &'static str {
            "template"
        }

        fn member_id(&self) -> MemberId {
            MemberId::new(self.member).unwrap()
        }

        fn set_sources(self: Arc<Self>, fulltext: &mut FullText) {
            let link = format!("https://host.example/{}.pdf", fulltext.doi.quoted());
            let source = Source::new(self, link, FormatName::Pdf, false);
            fulltext.format_mut(FormatName::Pdf).sources = vec![source];
        }

        async fn acquire(&self, _source: &Source) -> Result<Vec<u8>, AcquireError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PDF_PAYLOAD.to_vec())
        }
    }

    fn settings_in(temp: &tempfile::TempDir) -> Settings {
        Settings {
            data_dir: temp.path().to_path_buf(),
            metadata_compression_level: 0,
            ..Settings::default()
        }
    }

    fn stored_metadata(settings: &Settings, doi: &Doi, member: &str) -> Arc<Metadata> {
        let metadata = Metadata::new(doi, settings);
        std::fs::create_dir_all(metadata.path.parent().unwrap()).unwrap();
        std::fs::write(
            &metadata.path,
            serde_json::to_vec(&serde_json::json!({"member": member})).unwrap(),
        )
        .unwrap();
        Arc::new(metadata)
    }

    // ==================== Dispatch Tests ====================

    #[tokio::test]
    async fn test_acquire_uses_registered_handler() {
        let temp = tempfile::TempDir::new().unwrap();
        let settings = settings_in(&temp);
        let doi = Doi::parse("10.1234/test").unwrap();
        let metadata = stored_metadata(&settings, &doi, "7");

        let publisher = TemplatePublisher::new("7");
        let mut registry = PublisherRegistry::new();
        registry.register(publisher.clone());

        let mut fulltext = FullText::new(&doi, metadata, &settings);
        let success = fulltext.acquire(&registry, &settings).await;

        assert!(success);
        assert_eq!(publisher.calls(), 1);
        assert!(fulltext.has_format(FormatName::Pdf));
    }

    #[test]
    fn test_set_sources_unknown_member_yields_zero_sources() {
        let temp = tempfile::TempDir::new().unwrap();
        let settings = settings_in(&temp);
        let doi = Doi::parse("10.1234/test").unwrap();
        let metadata = stored_metadata(&settings, &doi, "424242");

        let registry = PublisherRegistry::new();
        let mut fulltext = FullText::new(&doi, metadata, &settings);
        fulltext.set_sources(&registry);

        for name in FormatName::ALL {
            assert!(fulltext.format(name).sources.is_empty());
        }
    }

    #[test]
    fn test_set_sources_without_metadata_is_noop() {
        let temp = tempfile::TempDir::new().unwrap();
        let settings = settings_in(&temp);
        let doi = Doi::parse("10.1234/test").unwrap();
        let metadata = Arc::new(Metadata::new(&doi, &settings));

        let registry = PublisherRegistry::new();
        let mut fulltext = FullText::new(&doi, metadata, &settings);
        fulltext.set_sources(&registry);

        assert!(fulltext.format(FormatName::Pdf).sources.is_empty());
    }

    // ==================== Idempotent Skip Tests ====================

    #[tokio::test]
    async fn test_acquire_skips_existing_file_without_refetch() {
        let temp = tempfile::TempDir::new().unwrap();
        let settings = settings_in(&temp);
        let doi = Doi::parse("10.1234/test").unwrap();
        let metadata = stored_metadata(&settings, &doi, "7");

        let publisher = TemplatePublisher::new("7");
        let mut registry = PublisherRegistry::new();
        registry.register(publisher.clone());

        let mut fulltext = FullText::new(&doi, metadata, &settings);

        // Pre-existing payload for the first preferred format.
        let first = settings.format_preference_order[0];
        let path = &fulltext.format(first).local_path;
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, PDF_PAYLOAD).unwrap();

        let success = fulltext.acquire(&registry, &settings).await;

        assert!(success);
        assert_eq!(
            publisher.calls(),
            0,
            "existing content must not be refetched"
        );
    }

    #[tokio::test]
    async fn test_acquire_without_any_success_returns_false() {
        let temp = tempfile::TempDir::new().unwrap();
        let settings = settings_in(&temp);
        let doi = Doi::parse("10.1234/test").unwrap();
        let metadata = stored_metadata(&settings, &doi, "424242");

        let registry = PublisherRegistry::new();
        let mut fulltext = FullText::new(&doi, metadata, &settings);

        let success = fulltext.acquire(&registry, &settings).await;
        assert!(!success);
    }

    #[tokio::test]
    async fn test_acquire_stops_after_first_format_when_configured() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut settings = settings_in(&temp);
        settings.skip_remaining_formats = true;
        settings.format_preference_order = vec![FormatName::Pdf, FormatName::Xml];

        let doi = Doi::parse("10.1234/test").unwrap();
        let metadata = stored_metadata(&settings, &doi, "7");

        let publisher = TemplatePublisher::new("7");
        let mut registry = PublisherRegistry::new();
        registry.register(publisher.clone());

        let mut fulltext = FullText::new(&doi, metadata, &settings);
        fulltext.acquire(&registry, &settings).await;

        assert_eq!(publisher.calls(), 1);
        assert!(fulltext.has_format(FormatName::Pdf));
        assert!(!fulltext.has_format(FormatName::Xml));
    }

    // ==================== Load Tests ====================

    #[tokio::test]
    async fn test_load_scans_preference_order() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut settings = settings_in(&temp);
        settings.format_preference_order = vec![FormatName::Xml, FormatName::Pdf];

        let doi = Doi::parse("10.1234/test").unwrap();
        let metadata = stored_metadata(&settings, &doi, "7");
        let fulltext = FullText::new(&doi, metadata, &settings);

        // Only PDF exists; XML is first in preference but absent.
        let path = &fulltext.format(FormatName::Pdf).local_path;
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, PDF_PAYLOAD).unwrap();

        let loaded = fulltext.load(None, &settings).unwrap();
        assert_eq!(loaded.format, FormatName::Pdf);
        assert_eq!(loaded.data, PDF_PAYLOAD);
    }

    #[test]
    fn test_load_nothing_stored_is_no_content() {
        let temp = tempfile::TempDir::new().unwrap();
        let settings = settings_in(&temp);
        let doi = Doi::parse("10.1234/test").unwrap();
        let metadata = Arc::new(Metadata::new(&doi, &settings));
        let fulltext = FullText::new(&doi, metadata, &settings);

        let result = fulltext.load(None, &settings);
        assert!(matches!(result, Err(AcquireError::NoContent { .. })));
    }
}
