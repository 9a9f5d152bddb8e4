//! Handler for APA.
//!
//! APA content is delivered out-of-band as a passphrase-encrypted zip whose
//! members are themselves zip archives of JATS XML files, keyed by APA
//! article IDs rather than DOIs. Sources are the `alternative-id` entries
//! from the metadata; the archive index is built once on first acquisition.
//! Payloads are re-encrypted at rest with the data-directory passphrase.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{info, warn};
use zip::ZipArchive;

use crate::config::{self, Settings};
use crate::crypto;
use crate::format::FormatName;
use crate::fulltext::FullText;
use crate::metadata::MemberId;
use crate::source::{AcquireError, Source};

use super::{Publisher, PublisherBuildError};

const MEMBER_ID: &str = "15";

/// Index over the decrypted outer archive: member file name to
/// (outer archive member, inner entry name).
struct ApaArchive {
    raw: Vec<u8>,
    lut: HashMap<String, (String, String)>,
}

impl ApaArchive {
    fn build(data_path: &std::path::Path, passphrase: &str) -> Result<Self, AcquireError> {
        info!(path = %data_path.display(), "initialising APA data archive");

        let sealed = std::fs::read(data_path)
            .map_err(|error| AcquireError::io(data_path, error))?;
        let raw = crypto::decrypt(&sealed, passphrase)?;

        let mut outer = ZipArchive::new(Cursor::new(raw.as_slice()))
            .map_err(|error| AcquireError::archive(data_path.display().to_string(), error))?;

        let mut lut = HashMap::new();

        let outer_names: Vec<String> = outer.file_names().map(ToString::to_string).collect();

        for outer_name in outer_names {
            if outer_name.ends_with(".7z") {
                // No 7z support; zip members carry the same content.
                warn!(member = %outer_name, "skipping 7z member of the APA archive");
                continue;
            }

            if !outer_name.ends_with(".zip") {
                return Err(AcquireError::archive(
                    &outer_name,
                    "unexpected member suffix in the APA archive",
                ));
            }

            let inner_data = read_member(&mut outer, &outer_name)?;
            let inner = ZipArchive::new(Cursor::new(inner_data.as_slice()))
                .map_err(|error| AcquireError::archive(&outer_name, error))?;

            for inner_name in inner.file_names() {
                if !inner_name.ends_with(".xml") {
                    continue;
                }

                let file_name = inner_name
                    .rsplit('/')
                    .next()
                    .unwrap_or(inner_name)
                    .to_string();

                lut.insert(file_name, (outer_name.clone(), inner_name.to_string()));
            }
        }

        Ok(Self { raw, lut })
    }

    fn read(&self, file_name: &str) -> Result<Vec<u8>, AcquireError> {
        let (outer_name, inner_name) = self
            .lut
            .get(file_name)
            .ok_or_else(|| AcquireError::NotFound {
                link: file_name.to_string(),
            })?;

        let mut outer = ZipArchive::new(Cursor::new(self.raw.as_slice()))
            .map_err(|error| AcquireError::archive(file_name, error))?;
        let outer_data = read_member(&mut outer, outer_name)?;

        let mut inner = ZipArchive::new(Cursor::new(outer_data.as_slice()))
            .map_err(|error| AcquireError::archive(outer_name.as_str(), error))?;
        read_member(&mut inner, inner_name)
    }
}

fn read_member(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>, AcquireError> {
    let mut entry = archive
        .by_name(name)
        .map_err(|error| AcquireError::archive(name, error))?;
    let mut data = Vec::new();
    entry
        .read_to_end(&mut data)
        .map_err(|error| AcquireError::archive(name, error))?;
    Ok(data)
}

/// APA handler.
pub struct Apa {
    data_path: Option<PathBuf>,
    archive_passphrase: Option<String>,
    is_configured: bool,
    archive: OnceCell<ApaArchive>,
}

impl Apa {
    /// Creates the handler, warning when the archive or passphrases are
    /// absent.
    ///
    /// # Errors
    ///
    /// Infallible today; the signature matches the other handlers.
    pub fn new(settings: &Settings) -> Result<Self, PublisherBuildError> {
        let data_path = config::scoped_env("APA", "DATA_PATH").map(PathBuf::from);
        let archive_passphrase = config::scoped_env("APA", "PASSPHRASE");

        let is_configured = data_path.as_ref().is_some_and(|path| path.exists())
            && archive_passphrase.is_some()
            && settings.encryption_passphrase.is_some();

        if !is_configured {
            warn!("handler for APA is not configured");
        }

        if settings.encryption_passphrase.is_none() {
            warn!("no encryption passphrase setting is provided, which is required for APA");
        }

        Ok(Self {
            data_path,
            archive_passphrase,
            is_configured,
            archive: OnceCell::new(),
        })
    }

    async fn archive(&self) -> Result<&ApaArchive, AcquireError> {
        self.archive
            .get_or_try_init(|| async {
                let (Some(data_path), Some(passphrase)) =
                    (self.data_path.clone(), self.archive_passphrase.clone())
                else {
                    return Err(AcquireError::NotConfigured { publisher: "apa" });
                };

                tokio::task::spawn_blocking(move || ApaArchive::build(&data_path, &passphrase))
                    .await
                    .map_err(|error| AcquireError::archive("apa", error))?
            })
            .await
    }
}

#[async_trait]
impl Publisher for Apa {
    fn name(&self) -> &'static str {
        "apa"
    }

    fn member_id(&self) -> MemberId {
        MemberId::from_static(MEMBER_ID)
    }

    fn set_sources(self: Arc<Self>, fulltext: &mut FullText) {
        // Can't set any sources if the archive is not configured.
        if !self.is_configured {
            return;
        }

        let metadata = Arc::clone(&fulltext.metadata);
        let raw = match metadata.raw() {
            Ok(raw) => raw,
            Err(error) => {
                warn!(error = %error, "missing metadata; no sources to derive");
                return;
            }
        };

        // Raw files are keyed by an APA ID, carried as alternative IDs.
        let Some(alternative_ids) = raw.get("alternative-id").and_then(|v| v.as_array()) else {
            warn!(doi = %fulltext.doi, "no alternative IDs found for APA work");
            return;
        };

        let candidate_ids: Vec<String> = alternative_ids
            .iter()
            .filter_map(|id| id.as_str())
            .filter(|id| id.contains('-'))
            .map(ToString::to_string)
            .collect();

        if candidate_ids.is_empty() {
            warn!(doi = %fulltext.doi, "no alternative IDs found for APA work");
            return;
        }

        for alternative_id in candidate_ids {
            let source = Source::new(
                Arc::clone(&self) as Arc<dyn Publisher>,
                format!("{alternative_id}.xml"),
                FormatName::Xml,
                true,
            );

            let sources = &mut fulltext.format_mut(FormatName::Xml).sources;
            if !sources.contains(&source) {
                sources.push(source);
            }
        }
    }

    async fn acquire(&self, source: &Source) -> Result<Vec<u8>, AcquireError> {
        if !self.is_configured {
            return Err(AcquireError::NotConfigured { publisher: "apa" });
        }

        let archive = self.archive().await?;
        archive.read(&source.link)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::{SimpleFileOptions, ZipWriter};

    const ARTICLE_XML: &[u8] = b"<article><body><p>APA text.</p></body></article>";

    fn zip_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer
                .start_file(name.to_string(), SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn build_archive_file(temp: &tempfile::TempDir, passphrase: &str) -> PathBuf {
        let inner = zip_of(&[("batch1/2020-12345-001.xml", ARTICLE_XML)]);
        let outer = zip_of(&[("batch1.zip", inner.as_slice())]);
        let sealed = crypto::encrypt(&outer, passphrase).unwrap();

        let path = temp.path().join("apa_archive.bin");
        std::fs::write(&path, sealed).unwrap();
        path
    }

    #[test]
    fn test_archive_index_and_read() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = build_archive_file(&temp, "archive-pass");

        let archive = ApaArchive::build(&path, "archive-pass").unwrap();
        assert!(archive.lut.contains_key("2020-12345-001.xml"));

        let data = archive.read("2020-12345-001.xml").unwrap();
        assert_eq!(data, ARTICLE_XML);
    }

    #[test]
    fn test_archive_missing_entry_not_found() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = build_archive_file(&temp, "archive-pass");

        let archive = ApaArchive::build(&path, "archive-pass").unwrap();
        let result = archive.read("2099-00000-999.xml");
        assert!(matches!(result, Err(AcquireError::NotFound { .. })));
    }

    #[test]
    fn test_archive_wrong_passphrase_fails() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = build_archive_file(&temp, "archive-pass");

        let result = ApaArchive::build(&path, "wrong");
        assert!(matches!(result, Err(AcquireError::Crypto(_))));
    }
}
