//! Stored Crossref metadata: member IDs, lazy typed accessors, acquisition.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::OnceLock;

use chrono::NaiveDate;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::config::Settings;
use crate::crossref::CrossrefApi;
use crate::doi::Doi;
use crate::snapshot::{SnapshotError, SnapshotStore};
use crate::store;
use crate::web::WebError;

/// Errors for metadata handling.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// A member ID string was not numeric.
    #[error("provided member ID ({value}) is not a number")]
    InvalidMemberId {
        /// The rejected value.
        value: String,
    },

    /// An accessor was invoked before metadata exists on disk.
    #[error("no metadata available for {doi}")]
    NotAvailable {
        /// The work's DOI.
        doi: Doi,
    },

    /// A present field or response had an unexpected shape. Distinct from
    /// identifier-shape errors: the identifier was fine, the content is not.
    #[error("unexpected metadata format for {doi}: {detail}")]
    Format {
        /// The work's DOI.
        doi: Doi,
        /// What was malformed.
        detail: String,
    },

    /// Every configured metadata source failed.
    #[error("unable to retrieve metadata for {doi}")]
    Acquisition {
        /// The work's DOI.
        doi: Doi,
    },

    /// Transport failure from the web API source.
    #[error(transparent)]
    Web(#[from] WebError),

    /// Snapshot store failure.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// Filesystem failure reading or writing the metadata file.
    #[error("IO error for metadata at {path}: {source}")]
    Io {
        /// The metadata file path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl MetadataError {
    /// Creates a content-shape error.
    pub fn format(doi: &Doi, detail: impl Into<String>) -> Self {
        Self::Format {
            doi: doi.clone(),
            detail: detail.into(),
        }
    }

    fn not_available(doi: &Doi) -> Self {
        Self::NotAvailable { doi: doi.clone() }
    }
}

/// A Crossref member ID: the numeric-string identifier of the organization
/// that owns a work's metadata, used as the publisher dispatch key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberId(String);

impl MemberId {
    /// Validates and wraps a member ID.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::InvalidMemberId`] for non-numeric input.
    pub fn new(id: impl Into<String>) -> Result<Self, MetadataError> {
        let id = id.into();
        if id.is_empty() || !id.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(MetadataError::InvalidMemberId { value: id });
        }
        Ok(Self(id))
    }

    /// Wraps a known-numeric literal; used for the built-in handler IDs.
    pub(crate) fn from_static(id: &'static str) -> Self {
        debug_assert!(id.bytes().all(|byte| byte.is_ascii_digit()));
        Self(id.to_string())
    }

    /// The ID as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MemberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for MemberId {
    type Err = MetadataError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::new(value)
    }
}

impl Ord for MemberId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Numeric order for digit strings: shorter means smaller, same
        // length falls back to lexicographic.
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for MemberId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// One place metadata can be fetched from, tried in configured order.
#[derive(Debug)]
pub enum MetadataSource {
    /// Local snapshot database.
    Snapshot(SnapshotStore),
    /// Remote Crossref works API.
    WebApi(CrossrefApi),
}

impl MetadataSource {
    /// Fetches raw metadata JSON for a DOI from this source.
    ///
    /// # Errors
    ///
    /// Propagates the source's failure; the caller treats any error as
    /// "try the next source".
    pub async fn get(&self, doi: &Doi) -> Result<Vec<u8>, MetadataError> {
        match self {
            Self::Snapshot(store) => Ok(store.get(doi).await?),
            Self::WebApi(api) => api.get_doi_metadata(doi).await,
        }
    }

    /// Short name for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Snapshot(_) => "snapshot",
            Self::WebApi(_) => "crossref-api",
        }
    }
}

/// Builds the ordered metadata source list from settings: the local
/// snapshot first when configured, then the web API.
///
/// # Errors
///
/// Propagates snapshot-open failures (fatal after bounded retries) and
/// HTTP-client build failures.
pub async fn build_metadata_sources(
    settings: &Settings,
) -> Result<Vec<MetadataSource>, MetadataError> {
    let mut sources = Vec::new();

    if let Some(snapshot_path) = &settings.snapshot_path {
        let store = SnapshotStore::open(snapshot_path).await?;
        sources.push(MetadataSource::Snapshot(store));
    }

    sources.push(MetadataSource::WebApi(CrossrefApi::new(settings)?));

    Ok(sources)
}

/// Crossref metadata for one DOI, stored as a JSON file and parsed lazily
/// on first access.
#[derive(Debug)]
pub struct Metadata {
    doi: Doi,
    /// Path of the metadata file in the data directory.
    pub path: PathBuf,
    compressed: bool,
    compression_level: u32,
    raw: OnceLock<Value>,
}

impl Metadata {
    /// Creates the metadata view for a DOI under the given settings.
    #[must_use]
    pub fn new(doi: &Doi, settings: &Settings) -> Self {
        let compressed = settings.metadata_compression_level != 0;
        let suffix = if compressed { ".gz" } else { "" };
        let path = store::work_dir(settings, doi)
            .join(format!("{}_metadata.json{suffix}", doi.quoted()));

        Self {
            doi: doi.clone(),
            path,
            compressed,
            compression_level: settings.metadata_compression_level,
            raw: OnceLock::new(),
        }
    }

    /// Whether the metadata file exists in the data directory.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// The raw metadata object, loaded and parsed on first access.
    ///
    /// # Errors
    ///
    /// - [`MetadataError::NotAvailable`] before the file exists
    /// - [`MetadataError::Format`] when the stored JSON is not an object
    pub fn raw(&self) -> Result<&Value, MetadataError> {
        if !self.exists() {
            return Err(MetadataError::not_available(&self.doi));
        }

        if let Some(value) = self.raw.get() {
            return Ok(value);
        }

        let value = self.load()?;
        Ok(self.raw.get_or_init(|| value))
    }

    fn load(&self) -> Result<Value, MetadataError> {
        let stored = std::fs::read(&self.path).map_err(|source| MetadataError::Io {
            path: self.path.clone(),
            source,
        })?;

        let raw_json = if self.compressed {
            let mut decoder = flate2::read::ZlibDecoder::new(stored.as_slice());
            let mut decompressed = Vec::new();
            decoder
                .read_to_end(&mut decompressed)
                .map_err(|source| MetadataError::Io {
                    path: self.path.clone(),
                    source,
                })?;
            decompressed
        } else {
            stored
        };

        let value: Value = serde_json::from_slice(&raw_json)
            .map_err(|error| MetadataError::format(&self.doi, error.to_string()))?;

        if !value.is_object() {
            return Err(MetadataError::format(&self.doi, "stored metadata is not an object"));
        }

        Ok(value)
    }

    /// The metadata owner's member ID (`member`), the dispatch key.
    ///
    /// # Errors
    ///
    /// Errors when metadata is absent or the field is missing/malformed.
    pub fn member_id(&self) -> Result<MemberId, MetadataError> {
        let raw = self.raw()?;
        let value = raw
            .get("member")
            .ok_or_else(|| MetadataError::format(&self.doi, "missing `member` field"))?;
        let text = value
            .as_str()
            .ok_or_else(|| MetadataError::format(&self.doi, format!("unexpected member id {value}")))?;
        MemberId::new(text)
    }

    /// The publisher display name (`publisher`).
    ///
    /// # Errors
    ///
    /// Errors when metadata is absent or the field is missing/malformed.
    pub fn publisher_name(&self) -> Result<String, MetadataError> {
        let raw = self.raw()?;
        let value = raw
            .get("publisher")
            .ok_or_else(|| MetadataError::format(&self.doi, "missing `publisher` field"))?;
        value
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| MetadataError::format(&self.doi, format!("unexpected publisher {value}")))
    }

    /// The work title, when present (`title[0]`).
    ///
    /// # Errors
    ///
    /// Errors when metadata is absent or a present field is malformed.
    pub fn title(&self) -> Result<Option<String>, MetadataError> {
        self.first_of_string_array("title")
    }

    /// The journal name, when present (`container-title[0]`).
    ///
    /// # Errors
    ///
    /// Errors when metadata is absent or a present field is malformed.
    pub fn journal_name(&self) -> Result<Option<String>, MetadataError> {
        self.first_of_string_array("container-title")
    }

    /// The volume, when present.
    ///
    /// # Errors
    ///
    /// Errors when metadata is absent.
    pub fn volume(&self) -> Result<Option<String>, MetadataError> {
        self.stringish_field("volume")
    }

    /// The issue, when present.
    ///
    /// # Errors
    ///
    /// Errors when metadata is absent.
    pub fn issue(&self) -> Result<Option<String>, MetadataError> {
        self.stringish_field("issue")
    }

    /// The page (or article number), when present.
    ///
    /// # Errors
    ///
    /// Errors when metadata is absent.
    pub fn page(&self) -> Result<Option<String>, MetadataError> {
        self.stringish_field("page")
    }

    /// All ISSNs, when present (`ISSN`).
    ///
    /// # Errors
    ///
    /// Errors when metadata is absent or a present field is malformed.
    pub fn issns(&self) -> Result<Option<Vec<String>>, MetadataError> {
        let raw = self.raw()?;
        let Some(value) = raw.get("ISSN") else {
            return Ok(None);
        };
        let items = value
            .as_array()
            .ok_or_else(|| MetadataError::format(&self.doi, "unexpected `ISSN` structure"))?;
        let issns = items
            .iter()
            .map(|item| {
                item.as_str().map(ToString::to_string).ok_or_else(|| {
                    MetadataError::format(&self.doi, "unexpected `ISSN` entry")
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(issns))
    }

    /// The electronic ISSN, selected from `issn-type` entries with
    /// `type == "electronic"`.
    ///
    /// # Errors
    ///
    /// Errors when metadata is absent or a present field is malformed.
    pub fn electronic_issn(&self) -> Result<Option<String>, MetadataError> {
        let raw = self.raw()?;
        let Some(value) = raw.get("issn-type") else {
            return Ok(None);
        };
        let entries = value
            .as_array()
            .ok_or_else(|| MetadataError::format(&self.doi, "unexpected `issn-type` structure"))?;

        let mut electronic = None;

        for entry in entries {
            let entry = entry.as_object().ok_or_else(|| {
                MetadataError::format(&self.doi, "unexpected `issn-type` entry")
            })?;
            if entry.get("type").and_then(Value::as_str) == Some("electronic") {
                let issn = entry
                    .get("value")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        MetadataError::format(&self.doi, "`issn-type` entry without a value")
                    })?;
                electronic = Some(issn.to_string());
            }
        }

        Ok(electronic)
    }

    /// The published date, resolved from the `published.date-parts` arrays.
    ///
    /// Each entry may carry year, year+month, or year+month+day; missing
    /// parts default to 1. When multiple representations are present the
    /// latest resulting date wins. A documented-but-unverified business
    /// rule; see the explicit test.
    ///
    /// # Errors
    ///
    /// Errors when metadata is absent or a present field is malformed.
    pub fn published_date(&self) -> Result<Option<NaiveDate>, MetadataError> {
        let raw = self.raw()?;
        let Some(published) = raw.get("published") else {
            return Ok(None);
        };
        let published = published
            .as_object()
            .ok_or_else(|| MetadataError::format(&self.doi, "unexpected `published` structure"))?;

        let Some(date_parts) = published.get("date-parts") else {
            return Ok(None);
        };
        let date_parts = date_parts
            .as_array()
            .ok_or_else(|| MetadataError::format(&self.doi, "unexpected `date-parts` structure"))?;

        let mut dates: Vec<NaiveDate> = Vec::new();

        for entry in date_parts {
            let parts = entry
                .as_array()
                .ok_or_else(|| MetadataError::format(&self.doi, "unexpected date entry"))?;

            let numbers = parts
                .iter()
                .map(|part| {
                    part.as_i64().ok_or_else(|| {
                        MetadataError::format(&self.doi, format!("unexpected date part {part}"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let (year, month, day) = match numbers.as_slice() {
                [year] => (*year, 1, 1),
                [year, month] => (*year, *month, 1),
                [year, month, day] => (*year, *month, *day),
                other => {
                    return Err(MetadataError::format(
                        &self.doi,
                        format!("unknown date format: {other:?}"),
                    ));
                }
            };

            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let date = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
                .ok_or_else(|| {
                    MetadataError::format(
                        &self.doi,
                        format!("invalid date {year}-{month}-{day}"),
                    )
                })?;

            dates.push(date);
        }

        Ok(dates.into_iter().max())
    }

    /// Reads an optional field that may be stored as a string or number.
    fn stringish_field(&self, key: &str) -> Result<Option<String>, MetadataError> {
        let raw = self.raw()?;
        let Some(value) = raw.get(key) else {
            return Ok(None);
        };
        match value {
            Value::String(text) => Ok(Some(text.clone())),
            Value::Number(number) => Ok(Some(number.to_string())),
            other => Err(MetadataError::format(
                &self.doi,
                format!("unexpected `{key}` value {other}"),
            )),
        }
    }

    /// Reads an optional array-of-strings field and returns its first entry.
    fn first_of_string_array(&self, key: &str) -> Result<Option<String>, MetadataError> {
        let raw = self.raw()?;
        let Some(value) = raw.get(key) else {
            return Ok(None);
        };
        let items = value
            .as_array()
            .ok_or_else(|| MetadataError::format(&self.doi, format!("unexpected `{key}` structure")))?;
        match items.first() {
            Some(first) => {
                let text = first.as_str().ok_or_else(|| {
                    MetadataError::format(&self.doi, format!("unexpected `{key}` entry"))
                })?;
                Ok(Some(text.to_string()))
            }
            None => Ok(None),
        }
    }

    /// Attempts to acquire the metadata, trying each source in order.
    ///
    /// The first successful fetch is written (optionally zlib-compressed)
    /// to the deterministic metadata path, with bounded retries on
    /// transient write failures.
    ///
    /// # Errors
    ///
    /// - [`MetadataError::Acquisition`] when every source fails
    /// - [`MetadataError::Io`] when the write fails after retries
    #[instrument(skip(self, sources), fields(doi = %self.doi))]
    pub async fn acquire(&self, sources: &[MetadataSource]) -> Result<(), MetadataError> {
        let mut raw: Option<Vec<u8>> = None;

        for source in sources {
            match source.get(&self.doi).await {
                Ok(bytes) => {
                    raw = Some(bytes);
                    break;
                }
                Err(error) => {
                    warn!(source = source.name(), error = %error, "metadata source failed");
                }
            }
        }

        let Some(raw) = raw else {
            return Err(MetadataError::Acquisition {
                doi: self.doi.clone(),
            });
        };

        let output = if self.compressed {
            let mut encoder = flate2::write::ZlibEncoder::new(
                Vec::new(),
                flate2::Compression::new(self.compression_level),
            );
            encoder
                .write_all(&raw)
                .and_then(|()| encoder.finish())
                .map_err(|source| MetadataError::Io {
                    path: self.path.clone(),
                    source,
                })?
        } else {
            raw
        };

        store::write_with_retry(&self.path, &output)
            .await
            .map_err(|source| MetadataError::Io {
                path: self.path.clone(),
                source,
            })?;

        info!(path = %self.path.display(), "wrote metadata");

        Ok(())
    }
}
