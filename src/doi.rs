//! DOI parsing, validation, and batch creation from raw input.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

/// Regex pattern for DOIs embedded in URLs, anchored at the end of the string.
///
/// See <https://www.crossref.org/blog/dois-and-matching-regular-expressions/>.
#[allow(clippy::expect_used)]
static DOI_IN_URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)10\.\d{4,9}/[-._;()/:A-Z0-9]+$").expect("DOI regex is valid") // Static pattern, safe to panic
});

/// Errors that can occur when interpreting a string as a DOI.
#[derive(Debug, Error)]
pub enum DoiError {
    /// The input starts with a URL scheme; the caller should use [`Doi::from_url`].
    #[error("the string {input} looks to be a URL; use the `from_url` constructor")]
    LooksLikeUrl {
        /// The offending input.
        input: String,
    },

    /// The input does not have the `10.`-prefixed shape of a DOI.
    #[error("the string {input} does not appear to be a DOI")]
    NotADoi {
        /// The offending input.
        input: String,
    },

    /// No DOI could be extracted from the URL.
    #[error("no suitable DOI found in {url}")]
    NoDoiInUrl {
        /// The URL that was searched.
        url: String,
    },
}

impl DoiError {
    fn looks_like_url(input: impl Into<String>) -> Self {
        Self::LooksLikeUrl {
            input: input.into(),
        }
    }

    fn not_a_doi(input: impl Into<String>) -> Self {
        Self::NotADoi {
            input: input.into(),
        }
    }

    fn no_doi_in_url(url: impl Into<String>) -> Self {
        Self::NoDoiInUrl { url: url.into() }
    }
}

/// The prefix and suffix of a DOI, split on the first `/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoiParts<'a> {
    /// Registrant prefix (e.g. `10.3758`).
    pub prefix: &'a str,
    /// Registrant-assigned suffix.
    pub suffix: &'a str,
}

/// A validated, normalized Digital Object Identifier.
///
/// Equality, hashing, and ordering are all on the normalized string form.
/// Instances are immutable once constructed.
///
/// # Example
///
/// ```
/// use doifetch_core::Doi;
///
/// let a = Doi::parse("10.3758/s13414-023-02718-0").unwrap();
/// let b = Doi::parse("10.3758%2Fs13414-023-02718-0").unwrap();
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Doi {
    doi: String,
}

impl Doi {
    /// Parses a raw string into a DOI, percent-unquoting special characters.
    ///
    /// # Errors
    ///
    /// Returns [`DoiError::LooksLikeUrl`] for scheme-prefixed input and
    /// [`DoiError::NotADoi`] for input that does not start with `10.`.
    pub fn parse(raw: &str) -> Result<Self, DoiError> {
        Self::parse_with(raw, true)
    }

    /// Parses a raw string into a DOI with explicit unquoting behavior.
    ///
    /// # Errors
    ///
    /// See [`Doi::parse`].
    pub fn parse_with(raw: &str, unquote: bool) -> Result<Self, DoiError> {
        if raw.starts_with("http") {
            return Err(DoiError::looks_like_url(raw));
        }

        if !raw.starts_with("10.") {
            return Err(DoiError::not_a_doi(raw));
        }

        let doi = if unquote {
            match urlencoding::decode(raw) {
                Ok(decoded) => decoded.into_owned(),
                Err(_) => raw.to_string(),
            }
        } else {
            raw.to_string()
        };

        Ok(Self { doi })
    }

    /// Extracts a DOI from a URL that ends with one.
    ///
    /// # Errors
    ///
    /// Returns [`DoiError::NoDoiInUrl`] when the pattern does not match.
    pub fn from_url(url: &str) -> Result<Self, DoiError> {
        Self::from_url_with(url, true)
    }

    /// Extracts a DOI from a URL with explicit unquoting behavior.
    ///
    /// # Errors
    ///
    /// See [`Doi::from_url`].
    pub fn from_url_with(url: &str, unquote: bool) -> Result<Self, DoiError> {
        let matched = DOI_IN_URL_PATTERN
            .find(url)
            .ok_or_else(|| DoiError::no_doi_in_url(url))?;

        Self::parse_with(matched.as_str(), unquote)
    }

    /// The normalized DOI string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.doi
    }

    /// A percent-encoded form in which every reserved character (including
    /// `/`) is quoted, usable as a filesystem name.
    #[must_use]
    pub fn quoted(&self) -> String {
        urlencoding::encode(&self.doi).into_owned()
    }

    /// The prefix and suffix, split on the first `/`.
    ///
    /// A DOI without a `/` yields an empty suffix.
    #[must_use]
    pub fn parts(&self) -> DoiParts<'_> {
        match self.doi.split_once('/') {
            Some((prefix, suffix)) => DoiParts { prefix, suffix },
            None => DoiParts {
                prefix: &self.doi,
                suffix: "",
            },
        }
    }

    /// The shard group this DOI belongs to, as a decimal string.
    ///
    /// Returns the SHA-256 hash of the normalized string modulo `n_groups`.
    /// Returns an empty string when `n_groups` is `None` or zero (sharding
    /// disabled). Deterministic across runs; changing `n_groups` reshuffles
    /// every group assignment.
    #[must_use]
    pub fn group(&self, n_groups: Option<u64>) -> String {
        let Some(n_groups) = n_groups else {
            return String::new();
        };

        if n_groups == 0 {
            return String::new();
        }

        let digest = Sha256::digest(self.doi.as_bytes());

        // The digest is a 256-bit big-endian integer; reduce it modulo
        // n_groups one byte at a time to avoid big-integer arithmetic.
        let group = digest.iter().fold(0u128, |acc, byte| {
            (acc * 256 + u128::from(*byte)) % u128::from(n_groups)
        });

        group.to_string()
    }
}

impl std::fmt::Display for Doi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.doi)
    }
}

/// Forms a de-duplicated list of DOIs from raw command-line input.
///
/// A single input item is first tried as a path to a file of DOIs (one per
/// line, or a CSV with a `doi`/`DOI` column); if no such file exists it is
/// treated as one raw DOI. Multiple input items are always treated as raw
/// DOIs. Items starting with `http` go through URL extraction.
///
/// Invalid entries are skipped with a logged warning rather than failing the
/// whole batch. Duplicates are removed, preserving first-seen order.
#[must_use]
pub fn form_dois_from_input(raw_input: &[String], unquote: bool) -> Vec<Doi> {
    debug!(n_items = raw_input.len(), "creating DOIs from input");

    let mut raw_dois: Vec<String> = Vec::new();

    if let [single] = raw_input {
        let path = Path::new(single);

        if path.is_file() {
            match read_raw_dois_from_path(path) {
                Ok(from_file) => raw_dois.extend(from_file),
                Err(error) => {
                    warn!(path = %path.display(), error = %error, "could not read DOI file");
                }
            }
        } else {
            raw_dois.push(single.clone());
        }
    } else {
        raw_dois.extend(raw_input.iter().cloned());
    }

    let mut seen: HashSet<Doi> = HashSet::new();
    let mut dois: Vec<Doi> = Vec::new();

    for raw_item in &raw_dois {
        let parsed = if raw_item.starts_with("http") {
            Doi::from_url_with(raw_item, unquote)
        } else {
            Doi::parse_with(raw_item, unquote)
        };

        match parsed {
            Ok(doi) => {
                if seen.insert(doi.clone()) {
                    dois.push(doi);
                }
            }
            Err(error) => {
                warn!(input = %raw_item, error = %error, "no valid DOI could be interpreted");
            }
        }
    }

    dois
}

/// Reads raw DOI strings from a file.
///
/// When the first line looks like a CSV header containing a `doi` or `DOI`
/// column, that column is read; otherwise every non-empty line is taken as
/// one raw DOI.
fn read_raw_dois_from_path(path: &Path) -> std::io::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;

    let header_fields: Vec<String> = content
        .lines()
        .next()
        .unwrap_or_default()
        .split(',')
        .map(|field| field.trim().trim_matches('"').to_string())
        .collect();

    let doi_column = header_fields
        .iter()
        .position(|field| field == "doi" || field == "DOI");

    let raw_dois = if let Some(column) = doi_column {
        let mut reader = csv::Reader::from_reader(content.as_bytes());
        let mut values = Vec::new();
        for record in reader.records() {
            let record = match record {
                Ok(record) => record,
                Err(error) => {
                    warn!(path = %path.display(), error = %error, "skipping malformed CSV record");
                    continue;
                }
            };
            if let Some(value) = record.get(column) {
                let value = value.trim();
                if !value.is_empty() {
                    values.push(value.to_string());
                }
            }
        }
        values
    } else {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToString::to_string)
            .collect()
    };

    Ok(raw_dois)
}
