//! Full-text content formats and per-format acquisition state.

use std::path::PathBuf;

use tracing::{info, instrument, warn};

use crate::config::Settings;
use crate::crypto;
use crate::doi::Doi;
use crate::source::{AcquireError, Source};
use crate::store::{self, ENCRYPTED_SENTINEL_SUFFIX};

/// The closed set of full-text content formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FormatName {
    /// JATS or publisher XML.
    Xml,
    /// PDF.
    Pdf,
    /// HTML.
    Html,
    /// Plain text.
    Txt,
    /// Page-image TIFF.
    Tiff,
}

impl FormatName {
    /// Every format, in default preference order.
    pub const ALL: [FormatName; 5] = [
        FormatName::Xml,
        FormatName::Pdf,
        FormatName::Html,
        FormatName::Txt,
        FormatName::Tiff,
    ];

    /// Position of this format in [`FormatName::ALL`].
    pub(crate) const fn index(self) -> usize {
        match self {
            Self::Xml => 0,
            Self::Pdf => 1,
            Self::Html => 2,
            Self::Txt => 3,
            Self::Tiff => 4,
        }
    }

    /// The file extension for this format.
    #[must_use]
    pub fn ext(self) -> &'static str {
        match self {
            Self::Xml => "xml",
            Self::Pdf => "pdf",
            Self::Html => "html",
            Self::Txt => "txt",
            Self::Tiff => "tiff",
        }
    }

    /// The canonical MIME type for this format.
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Xml => "application/xml",
            Self::Pdf => "application/pdf",
            Self::Html => "text/html",
            Self::Txt => "text/plain",
            Self::Tiff => "image/tiff",
        }
    }

    /// Classifies a MIME type into a format.
    ///
    /// Returns `None` for unrecognized types; callers decide whether that
    /// is a warning (registry-supplied links) or an error.
    #[must_use]
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type.split(';').next().unwrap_or("").trim();
        match mime.to_ascii_lowercase().as_str() {
            "application/pdf" => Some(Self::Pdf),
            "text/html" => Some(Self::Html),
            "text/plain" => Some(Self::Txt),
            "application/xml" | "text/xml" => Some(Self::Xml),
            "image/tiff" => Some(Self::Tiff),
            _ => None,
        }
    }
}

impl std::fmt::Display for FormatName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.ext())
    }
}

impl std::str::FromStr for FormatName {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "xml" => Ok(Self::Xml),
            "pdf" => Ok(Self::Pdf),
            "html" => Ok(Self::Html),
            "txt" => Ok(Self::Txt),
            "tiff" => Ok(Self::Tiff),
            _ => Err(()),
        }
    }
}

/// The full-text content state for one format of one work.
///
/// Owns the local storage path, the encryption sentinel, and the ordered
/// list of candidate sources (most specific first, populated by the
/// publisher dispatch).
#[derive(Debug)]
pub struct Format {
    /// Which format this is.
    pub name: FormatName,
    /// The work's DOI.
    pub doi: Doi,
    /// Path of the payload file in the data directory.
    pub local_path: PathBuf,
    /// Candidate sources, tried in list order.
    pub sources: Vec<Source>,
}

impl Format {
    /// Creates the format state for a DOI under the given settings.
    #[must_use]
    pub fn new(name: FormatName, doi: &Doi, settings: &Settings) -> Self {
        let local_path =
            store::work_dir(settings, doi).join(format!("{}.{}", doi.quoted(), name.ext()));

        Self {
            name,
            doi: doi.clone(),
            local_path,
            sources: Vec::new(),
        }
    }

    /// Whether a payload file exists for this format.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.local_path.exists()
    }

    /// Path of the sentinel file marking the payload as ciphertext.
    #[must_use]
    pub fn encrypted_sentinel_path(&self) -> PathBuf {
        let mut path = self.local_path.clone().into_os_string();
        path.push(ENCRYPTED_SENTINEL_SUFFIX);
        PathBuf::from(path)
    }

    /// Whether the stored payload is encrypted.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.encrypted_sentinel_path().exists()
    }

    /// Attempts to acquire this format's content.
    ///
    /// Sources are tried in list order; acquisition and validation failures
    /// are logged and the next source is tried. The first valid payload is
    /// (optionally) encrypted and written, and no later source is attempted.
    ///
    /// # Errors
    ///
    /// - [`AcquireError::Exhausted`] when no source yields valid content
    /// - [`AcquireError::MissingPassphrase`] when a source requires
    ///   encryption and no passphrase is configured (fatal, not skipped)
    /// - [`AcquireError::Io`] when persisting fails after retries
    #[instrument(skip(self, settings), fields(doi = %self.doi, format = %self.name))]
    pub async fn acquire(&self, settings: &Settings) -> Result<(), AcquireError> {
        if self.sources.is_empty() {
            warn!(format = %self.name, "no sources for format");
        }

        for source in &self.sources {
            let data = match source.acquire().await {
                Ok(data) => data,
                Err(error) => {
                    warn!(source = ?source, error = %error, "error when acquiring source");
                    continue;
                }
            };

            if let Err(error) = source.validate(&data) {
                warn!(source = ?source, error = %error, "error when validating source data");
                continue;
            }

            let data = if source.encrypt {
                let passphrase = settings.require_encryption_passphrase()?;
                let sealed = crypto::encrypt(&data, passphrase)?;

                let sentinel = self.encrypted_sentinel_path();
                info!(path = %sentinel.display(), "writing encryption sentinel file");
                store::write_with_retry(&sentinel, b"")
                    .await
                    .map_err(|error| AcquireError::io(&sentinel, error))?;

                sealed
            } else {
                data
            };

            info!(path = %self.local_path.display(), "writing full-text content");
            store::write_with_retry(&self.local_path, &data)
                .await
                .map_err(|error| AcquireError::io(&self.local_path, error))?;

            return Ok(());
        }

        Err(AcquireError::Exhausted {
            format: self.name,
            doi: self.doi.clone(),
        })
    }

    /// Loads the stored payload, decrypting when the sentinel is present.
    ///
    /// # Errors
    ///
    /// - [`AcquireError::Io`] when the file cannot be read
    /// - [`AcquireError::MissingPassphrase`] when the payload is encrypted
    ///   and no passphrase is configured
    /// - [`AcquireError::Crypto`] when decryption fails
    pub fn load(&self, settings: &Settings) -> Result<Vec<u8>, AcquireError> {
        let data = std::fs::read(&self.local_path)
            .map_err(|error| AcquireError::io(&self.local_path, error))?;

        if !self.is_encrypted() {
            return Ok(data);
        }

        let passphrase = settings.require_encryption_passphrase()?;
        Ok(crypto::decrypt(&data, passphrase)?)
    }
}
