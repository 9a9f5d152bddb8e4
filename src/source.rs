//! Candidate full-text sources and the acquisition error domain.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::config::ConfigError;
use crate::crypto::CryptoError;
use crate::doi::Doi;
use crate::format::FormatName;
use crate::publisher::Publisher;
use crate::validate::{self, ValidationError};
use crate::web::WebError;

/// Errors that can occur while acquiring full-text content.
///
/// Per-source failures are caught at the format boundary and treated as
/// "try the next source"; only [`AcquireError::MissingPassphrase`] and
/// I/O failures after the payload was fetched are fatal for the operation.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// Transport-level failure.
    #[error(transparent)]
    Web(#[from] WebError),

    /// The request was attempted from a host not authorized for this
    /// publisher's access terms.
    #[error("hostname {actual} is not the authorized host {expected}")]
    InvalidHostname {
        /// The host the publisher is restricted to.
        expected: String,
        /// The host this process is running on.
        actual: String,
    },

    /// The publisher handler is missing required credentials or paths.
    #[error("handler for {publisher} is not configured")]
    NotConfigured {
        /// Handler name.
        publisher: &'static str,
    },

    /// A source requires encryption but no passphrase is configured.
    /// Operator misconfiguration: fatal for the operation, never retried.
    #[error(transparent)]
    MissingPassphrase(#[from] ConfigError),

    /// Payload encryption or decryption failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The acquired content failed its format sniff.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// An archive or listing did not contain the expected entry.
    #[error("{link} not found in the publisher archive")]
    NotFound {
        /// The entry that was looked up.
        link: String,
    },

    /// A local or remote archive could not be read.
    #[error("archive error for {link}: {detail}")]
    Archive {
        /// The entry being read.
        link: String,
        /// Underlying diagnostic.
        detail: String,
    },

    /// SFTP transport failure.
    #[error("sftp error: {detail}")]
    Sftp {
        /// Underlying diagnostic.
        detail: String,
    },

    /// Filesystem failure while persisting content.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Every candidate source for a format failed.
    #[error("could not acquire {format} for {doi} from any source")]
    Exhausted {
        /// The format that was being acquired.
        format: FormatName,
        /// The work's DOI.
        doi: Doi,
    },

    /// No stored content exists for any format of this work.
    #[error("no loadable full-text content found for {doi}")]
    NoContent {
        /// The work's DOI.
        doi: Doi,
    },
}

impl AcquireError {
    /// Creates an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an archive error.
    pub fn archive(link: impl Into<String>, detail: impl ToString) -> Self {
        Self::Archive {
            link: link.into(),
            detail: detail.to_string(),
        }
    }

    /// Creates an SFTP error.
    pub fn sftp(detail: impl ToString) -> Self {
        Self::Sftp {
            detail: detail.to_string(),
        }
    }
}

/// Validator signature: checks raw data against an expected format.
pub type ValidatorFn = fn(&[u8], FormatName) -> Result<(), ValidationError>;

/// One candidate location and method for acquiring one content format.
///
/// The acquisition capability is the publisher handler that created the
/// source; calling [`Source::acquire`] dispatches back to it. Two sources
/// are equal when they share a link and a target format, which is how
/// repeated `set_sources` calls avoid inserting duplicates.
#[derive(Clone)]
pub struct Source {
    /// The handler that can acquire this source.
    pub acquirer: Arc<dyn Publisher>,
    /// Location of the content (URL, archive member name, remote filename).
    pub link: String,
    /// The format this source yields.
    pub format_name: FormatName,
    /// Whether the payload must be encrypted before being written to disk.
    pub encrypt: bool,
    /// Content validator, defaulting to the format sniffers.
    pub validator: ValidatorFn,
}

impl Source {
    /// Creates a source with the default validator.
    #[must_use]
    pub fn new(
        acquirer: Arc<dyn Publisher>,
        link: impl Into<String>,
        format_name: FormatName,
        encrypt: bool,
    ) -> Self {
        Self {
            acquirer,
            link: link.into(),
            format_name,
            encrypt,
            validator: validate::validate_data,
        }
    }

    /// Acquires the raw content from this source via its bound handler.
    ///
    /// # Errors
    ///
    /// Propagates the handler's [`AcquireError`].
    pub async fn acquire(&self) -> Result<Vec<u8>, AcquireError> {
        self.acquirer.acquire(self).await
    }

    /// Validates acquired data against this source's target format.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] when the sniff fails.
    pub fn validate(&self, data: &[u8]) -> Result<(), ValidationError> {
        (self.validator)(data, self.format_name)
    }
}

impl PartialEq for Source {
    fn eq(&self, other: &Self) -> bool {
        self.link == other.link && self.format_name == other.format_name
    }
}

impl Eq for Source {}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("acquirer", &self.acquirer.name())
            .field("link", &self.link)
            .field("format_name", &self.format_name)
            .field("encrypt", &self.encrypt)
            .finish_non_exhaustive()
    }
}
