//! Read-only local metadata snapshot store.
//!
//! An alternative to the web API for bulk runs: a SQLite database mapping
//! DOI strings to zlib-compressed Crossref metadata JSON, prepared from a
//! public data file. The store is opened read-only; opening is retried with
//! a fixed delay before failing fatally, since snapshot files often live on
//! network mounts that need a moment to appear.
//!
//! Schema: `works (doi TEXT PRIMARY KEY, metadata BLOB NOT NULL)`.

use std::io::Read;
use std::path::{Path, PathBuf};

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{IO_RETRY_ATTEMPTS, IO_RETRY_WAIT};
use crate::doi::Doi;

/// Errors for snapshot store operations.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The store could not be opened after the retry budget.
    #[error("failed to open snapshot store at {path} after {attempts} attempts: {source}")]
    Open {
        /// The snapshot database path.
        path: PathBuf,
        /// How many attempts were made.
        attempts: u32,
        /// The final open error.
        #[source]
        source: sqlx::Error,
    },

    /// The DOI has no entry in the snapshot.
    #[error("{doi} not found in the snapshot store")]
    NotFound {
        /// The DOI that was looked up.
        doi: Doi,
    },

    /// A lookup query failed.
    #[error("snapshot query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// The stored value could not be decompressed.
    #[error("could not decompress the snapshot entry for {doi}: {source}")]
    Decompress {
        /// The DOI whose entry is corrupt.
        doi: Doi,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Read-only key-value store of DOI metadata.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    pool: SqlitePool,
}

impl SnapshotStore {
    /// Opens the snapshot database read-only, retrying with a fixed delay.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Open`] once the attempt cap is reached.
    pub async fn open(path: &Path) -> Result<Self, SnapshotError> {
        let url = format!("sqlite:{}?mode=ro", path.display());

        let mut attempt: u32 = 1;

        loop {
            match SqlitePoolOptions::new()
                .max_connections(1)
                .connect(&url)
                .await
            {
                Ok(pool) => {
                    debug!(path = %path.display(), "opened snapshot store");
                    return Ok(Self { pool });
                }
                Err(error) if attempt < IO_RETRY_ATTEMPTS => {
                    warn!(
                        path = %path.display(),
                        attempt,
                        error = %error,
                        wait_s = IO_RETRY_WAIT.as_secs(),
                        "snapshot store open failed, retrying"
                    );
                    tokio::time::sleep(IO_RETRY_WAIT).await;
                    attempt += 1;
                }
                Err(source) => {
                    return Err(SnapshotError::Open {
                        path: path.to_path_buf(),
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }

    /// Looks up the metadata JSON for a DOI, decompressing the stored value.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::NotFound`] for absent keys.
    pub async fn get(&self, doi: &Doi) -> Result<Vec<u8>, SnapshotError> {
        let row: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT metadata FROM works WHERE doi = ?")
                .bind(doi.as_str())
                .fetch_optional(&self.pool)
                .await?;

        let compressed = row.ok_or_else(|| SnapshotError::NotFound { doi: doi.clone() })?;

        let mut decoder = flate2::read::ZlibDecoder::new(compressed.as_slice());
        let mut raw = Vec::new();
        decoder
            .read_to_end(&mut raw)
            .map_err(|source| SnapshotError::Decompress {
                doi: doi.clone(),
                source,
            })?;

        Ok(raw)
    }
}
