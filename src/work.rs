//! The per-DOI aggregate binding identifier, metadata, and full-text.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Settings;
use crate::doi::Doi;
use crate::fulltext::FullText;
use crate::metadata::Metadata;
use crate::store;

/// One item of work: a runtime view over the persisted metadata and
/// full-text files for a single DOI. Created on demand, never persisted
/// itself.
#[derive(Debug)]
pub struct Work {
    /// The work's DOI.
    pub doi: Doi,
    /// The work's metadata.
    pub metadata: Arc<Metadata>,
    /// The work's full-text state.
    pub fulltext: FullText,
    /// The work's directory in the data directory.
    pub path: PathBuf,
}

impl Work {
    /// Creates the aggregate for a DOI under the given settings.
    #[must_use]
    pub fn new(doi: &Doi, settings: &Settings) -> Self {
        let metadata = Arc::new(Metadata::new(doi, settings));

        Self {
            doi: doi.clone(),
            metadata: Arc::clone(&metadata),
            fulltext: FullText::new(doi, metadata, settings),
            path: store::work_dir(settings, doi),
        }
    }
}
