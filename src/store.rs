//! Data-directory path scheme and retried file writes.
//!
//! The on-disk layout is the store of record:
//!
//! ```text
//! <data_dir>/<shard_group>/<quoted_doi>/
//!     <quoted_doi>_metadata.json[.gz]
//!     <quoted_doi>.<format_ext>
//!     <quoted_doi>.<format_ext>.encrypted     # sentinel, present iff ciphertext
//! ```
//!
//! With sharding disabled the `<shard_group>` level collapses away. All
//! paths are fully determined by (DOI, format, shard configuration).

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::config::{IO_RETRY_ATTEMPTS, IO_RETRY_WAIT, Settings};
use crate::doi::Doi;

/// Suffix appended to a payload path to form its encryption sentinel path.
pub const ENCRYPTED_SENTINEL_SUFFIX: &str = ".encrypted";

/// The directory holding all files for one work.
#[must_use]
pub fn work_dir(settings: &Settings, doi: &Doi) -> PathBuf {
    let group = doi.group(settings.data_dir_n_groups);
    let mut dir = settings.data_dir.clone();
    if !group.is_empty() {
        dir.push(group);
    }
    dir.push(doi.quoted());
    dir
}

/// Writes `data` to `path`, creating parent directories and retrying
/// transient failures with a fixed wait.
///
/// Mirrors the write discipline used for every persisted artifact: a flaky
/// network filesystem should not fail a whole batch over one `EAGAIN`.
/// Writes are not atomic; a process kill mid-write can leave a partial file.
///
/// # Errors
///
/// Returns the final I/O error once the attempt cap is reached.
pub async fn write_with_retry(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut attempt: u32 = 1;

    loop {
        match write_all(path, data).await {
            Ok(()) => return Ok(()),
            Err(error) if attempt < IO_RETRY_ATTEMPTS => {
                warn!(
                    path = %path.display(),
                    attempt,
                    error = %error,
                    wait_s = IO_RETRY_WAIT.as_secs(),
                    "write failed, retrying"
                );
                tokio::time::sleep(IO_RETRY_WAIT).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

async fn write_all(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(data).await?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn settings_with(data_dir: &Path, n_groups: Option<u64>) -> Settings {
        Settings {
            data_dir: data_dir.to_path_buf(),
            data_dir_n_groups: n_groups,
            ..Settings::default()
        }
    }

    #[test]
    fn test_work_dir_flat_when_sharding_disabled() {
        let doi = Doi::parse("10.1234/example").unwrap();
        let settings = settings_with(Path::new("/data"), None);

        let dir = work_dir(&settings, &doi);
        assert_eq!(dir, PathBuf::from("/data/10.1234%2Fexample"));
    }

    #[test]
    fn test_work_dir_sharded_inserts_group_level() {
        let doi = Doi::parse("10.1234/example").unwrap();
        let settings = settings_with(Path::new("/data"), Some(100));

        let dir = work_dir(&settings, &doi);
        let group = doi.group(Some(100));
        assert_eq!(
            dir,
            PathBuf::from("/data").join(group).join("10.1234%2Fexample")
        );
    }

    #[test]
    fn test_work_dir_deterministic() {
        let doi = Doi::parse("10.1234/example").unwrap();
        let settings = settings_with(Path::new("/data"), Some(100));
        assert_eq!(work_dir(&settings, &doi), work_dir(&settings, &doi));
    }

    #[tokio::test]
    async fn test_write_with_retry_creates_parents() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("a/b/c/file.bin");

        write_with_retry(&path, b"payload").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_write_with_retry_overwrites() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("file.bin");

        write_with_retry(&path, b"first").await.unwrap();
        write_with_retry(&path, b"second").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
    }
}
