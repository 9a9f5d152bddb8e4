//! Handler for IOP.
//!
//! IOP ships article packages over SFTP: one zip per article containing the
//! PDF and JATS XML, named from the journal ISSN, volume, issue, page, and
//! an escaped DOI. Candidate filenames are derived from the work's
//! metadata; acquisition downloads the package and extracts the member
//! matching the requested format.
//!
//! Host-key verification checks the user's `known_hosts` file and is on by
//! default; it can be disabled explicitly for first-contact setups, with a
//! logged warning.

use std::io::{Cursor, Read};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use ssh2::{CheckResult, KnownHostFileKind, Session};
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::config::{self, Settings};
use crate::format::FormatName;
use crate::fulltext::FullText;
use crate::metadata::MemberId;
use crate::source::{AcquireError, Source};

use super::{Publisher, PublisherBuildError};

const MEMBER_ID: &str = "266";

const DEFAULT_SERVER_ADDRESS: &str = "iopp-public-transfer-server.cld.iop.org";
const DEFAULT_SERVER_PORT: u16 = 22;

/// SFTP configuration from `DOIFETCH_IOP_*`.
#[derive(Debug, Clone)]
struct IopSettings {
    username: Option<String>,
    password: Option<String>,
    server_address: String,
    server_port: u16,
    verify_host_key: bool,
}

impl IopSettings {
    fn from_env() -> Self {
        let server_port = config::scoped_env("IOP", "SERVER_PORT")
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_SERVER_PORT);

        let verify_host_key = config::scoped_env("IOP", "VERIFY_HOST_KEY")
            .map(|value| !matches!(value.to_ascii_lowercase().as_str(), "0" | "false" | "no"))
            .unwrap_or(true);

        Self {
            username: config::scoped_env("IOP", "USERNAME"),
            password: config::scoped_env("IOP", "PASSWORD"),
            server_address: config::scoped_env("IOP", "SERVER_ADDRESS")
                .unwrap_or_else(|| DEFAULT_SERVER_ADDRESS.to_string()),
            server_port,
            verify_host_key,
        }
    }
}

/// IOP handler.
pub struct Iop {
    settings: IopSettings,
    is_configured: bool,
}

impl Iop {
    /// Creates the handler, warning when credentials are absent.
    ///
    /// # Errors
    ///
    /// Infallible today; the signature matches the other handlers.
    pub fn new(_settings: &Settings) -> Result<Self, PublisherBuildError> {
        let settings = IopSettings::from_env();
        let is_configured = settings.username.is_some() && settings.password.is_some();

        if !is_configured {
            warn!("handler for IOP is not configured");
        }

        if !settings.verify_host_key {
            warn!("IOP SFTP host-key verification is disabled by configuration");
        }

        Ok(Self {
            settings,
            is_configured,
        })
    }

    /// Derives the candidate package filenames for one format of a work.
    ///
    /// Package names look like
    /// `1_0957-4484_30_40_405602_10__1088_1361-6528_ab2d69.zip`, where `1`
    /// marks a PDF package (`2` for XML), followed by ISSN, volume, issue,
    /// page, and the escaped DOI.
    fn filenames_for(fulltext: &FullText, format_name: FormatName) -> Vec<String> {
        let prefix = match format_name {
            FormatName::Pdf => "1",
            FormatName::Xml => "2",
            _ => return Vec::new(),
        };

        let metadata = &fulltext.metadata;

        let fields = (
            metadata.issns(),
            metadata.volume(),
            metadata.issue(),
            metadata.page(),
        );

        let (Ok(Some(issns)), Ok(Some(volume)), Ok(Some(issue)), Ok(Some(page))) = fields else {
            debug!(
                doi = %fulltext.doi,
                "metadata lacks the fields needed to derive IOP package names"
            );
            return Vec::new();
        };

        let doi_encoded = fulltext
            .doi
            .as_str()
            .replace('.', "__")
            .replace('/', "_");

        issns
            .iter()
            .map(|issn| format!("{prefix}_{issn}_{volume}_{issue}_{page}_{doi_encoded}.zip"))
            .collect()
    }

}

/// Connects, verifies the host when so configured, and downloads one
/// package file from the server root.
fn download_package(settings: &IopSettings, filename: &str) -> Result<Vec<u8>, AcquireError> {
    let (Some(username), Some(password)) = (&settings.username, &settings.password) else {
        return Err(AcquireError::NotConfigured { publisher: "iop" });
    };

    let address = &settings.server_address;
    let port = settings.server_port;

    debug!(address, port, filename, "connecting to the IOP SFTP server");

    let tcp = TcpStream::connect((address.as_str(), port)).map_err(AcquireError::sftp)?;

    let mut session = Session::new().map_err(AcquireError::sftp)?;
    session.set_tcp_stream(tcp);
    session.handshake().map_err(AcquireError::sftp)?;

    if settings.verify_host_key {
        verify_host_key(&session, address, port)?;
    }

    session
        .userauth_password(username, password)
        .map_err(AcquireError::sftp)?;

    let sftp = session.sftp().map_err(AcquireError::sftp)?;

    let mut file = sftp
        .open(Path::new(&format!("/{filename}")))
        .map_err(|_| AcquireError::NotFound {
            link: filename.to_string(),
        })?;

    let mut data = Vec::new();
    file.read_to_end(&mut data).map_err(AcquireError::sftp)?;

    Ok(data)
}

/// Checks the server's host key against the user's `known_hosts` file.
fn verify_host_key(session: &Session, address: &str, port: u16) -> Result<(), AcquireError> {
    let mut known_hosts = session.known_hosts().map_err(AcquireError::sftp)?;

    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or_else(|| AcquireError::sftp("cannot locate a known_hosts file (HOME unset)"))?;
    let known_hosts_path = home.join(".ssh").join("known_hosts");

    known_hosts
        .read_file(&known_hosts_path, KnownHostFileKind::OpenSSH)
        .map_err(AcquireError::sftp)?;

    let (key, _key_type) = session
        .host_key()
        .ok_or_else(|| AcquireError::sftp("server offered no host key"))?;

    match known_hosts.check_port(address, port, key) {
        CheckResult::Match => Ok(()),
        CheckResult::NotFound => Err(AcquireError::sftp(format!(
            "host key for {address} not present in {}",
            known_hosts_path.display()
        ))),
        CheckResult::Mismatch => Err(AcquireError::sftp(format!(
            "host key for {address} does not match the known_hosts entry"
        ))),
        CheckResult::Failure => Err(AcquireError::sftp("host key check failed")),
    }
}

/// Extracts the package member matching the requested format.
fn extract_member(package: &[u8], format_name: FormatName) -> Result<Vec<u8>, AcquireError> {
    let mut archive = ZipArchive::new(Cursor::new(package))
        .map_err(|error| AcquireError::archive("iop package", error))?;

    let wanted_suffix = format!(".{}", format_name.ext());

    let member_name = archive
        .file_names()
        .find(|name| name.ends_with(&wanted_suffix))
        .map(ToString::to_string)
        .ok_or_else(|| AcquireError::NotFound {
            link: format!("*{wanted_suffix}"),
        })?;

    let mut entry = archive
        .by_name(&member_name)
        .map_err(|error| AcquireError::archive(&member_name, error))?;

    let mut data = Vec::new();
    entry
        .read_to_end(&mut data)
        .map_err(|error| AcquireError::archive(&member_name, error))?;

    Ok(data)
}

#[async_trait]
impl Publisher for Iop {
    fn name(&self) -> &'static str {
        "iop"
    }

    fn member_id(&self) -> MemberId {
        MemberId::from_static(MEMBER_ID)
    }

    fn set_sources(self: Arc<Self>, fulltext: &mut FullText) {
        if !self.is_configured {
            return;
        }

        for format_name in [FormatName::Xml, FormatName::Pdf] {
            for filename in Self::filenames_for(fulltext, format_name) {
                let source = Source::new(
                    Arc::clone(&self) as Arc<dyn Publisher>,
                    filename,
                    format_name,
                    false,
                );

                let sources = &mut fulltext.format_mut(format_name).sources;
                if !sources.contains(&source) {
                    sources.push(source);
                }
            }
        }
    }

    async fn acquire(&self, source: &Source) -> Result<Vec<u8>, AcquireError> {
        if !self.is_configured {
            return Err(AcquireError::NotConfigured { publisher: "iop" });
        }

        // One connection per package; the batch driver is sequential, so
        // connection reuse would only complicate reconnect handling.
        let settings = self.settings.clone();
        let filename = source.link.clone();
        let format_name = source.format_name;

        let package =
            tokio::task::spawn_blocking(move || download_package(&settings, &filename))
                .await
                .map_err(AcquireError::sftp)??;

        extract_member(&package, format_name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::doi::Doi;
    use crate::metadata::Metadata;
    use std::io::Write;
    use zip::write::{SimpleFileOptions, ZipWriter};

    fn fulltext_with_fields(temp: &tempfile::TempDir) -> FullText {
        let settings = Settings {
            data_dir: temp.path().to_path_buf(),
            metadata_compression_level: 0,
            ..Settings::default()
        };
        let doi = Doi::parse("10.1088/1361-6528/ab2d69").unwrap();
        let metadata = Metadata::new(&doi, &settings);
        std::fs::create_dir_all(metadata.path.parent().unwrap()).unwrap();
        std::fs::write(
            &metadata.path,
            serde_json::to_vec(&serde_json::json!({
                "member": "266",
                "ISSN": ["0957-4484"],
                "volume": "30",
                "issue": "40",
                "page": "405602"
            }))
            .unwrap(),
        )
        .unwrap();

        FullText::new(&doi, Arc::new(metadata), &settings)
    }

    #[test]
    fn test_filenames_follow_package_scheme() {
        let temp = tempfile::TempDir::new().unwrap();
        let fulltext = fulltext_with_fields(&temp);

        let pdf_names = Iop::filenames_for(&fulltext, FormatName::Pdf);
        assert_eq!(
            pdf_names,
            vec!["1_0957-4484_30_40_405602_10__1088_1361-6528_ab2d69.zip".to_string()]
        );

        let xml_names = Iop::filenames_for(&fulltext, FormatName::Xml);
        assert!(xml_names[0].starts_with("2_"));
    }

    #[test]
    fn test_filenames_empty_for_other_formats() {
        let temp = tempfile::TempDir::new().unwrap();
        let fulltext = fulltext_with_fields(&temp);
        assert!(Iop::filenames_for(&fulltext, FormatName::Txt).is_empty());
    }

    #[test]
    fn test_extract_member_by_extension() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("article/ab2d69.pdf", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"%PDF-1.7 iop").unwrap();
        writer
            .start_file("article/ab2d69.xml", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"<article/>").unwrap();
        let package = writer.finish().unwrap().into_inner();

        let pdf = extract_member(&package, FormatName::Pdf).unwrap();
        assert_eq!(pdf, b"%PDF-1.7 iop");

        let xml = extract_member(&package, FormatName::Xml).unwrap();
        assert_eq!(xml, b"<article/>");
    }

    #[test]
    fn test_extract_member_missing_format() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("article/ab2d69.pdf", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"%PDF-1.7 iop").unwrap();
        let package = writer.finish().unwrap().into_inner();

        let result = extract_member(&package, FormatName::Xml);
        assert!(matches!(result, Err(AcquireError::NotFound { .. })));
    }
}
