//! Runtime settings, loaded from `DOIFETCH_`-prefixed environment variables.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::format::FormatName;

/// Environment variable prefix for all settings.
const ENV_PREFIX: &str = "DOIFETCH_";

/// Fixed wait between attempts when retrying failed file writes and
/// snapshot-store opens.
pub const IO_RETRY_WAIT: Duration = Duration::from_secs(10);

/// Attempt cap for retried file writes and snapshot-store opens.
pub const IO_RETRY_ATTEMPTS: u32 = 10;

/// Errors raised while loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable had a value that could not be parsed.
    #[error("invalid value for {var}: {detail}")]
    InvalidValue {
        /// The environment variable name.
        var: String,
        /// What was wrong with it.
        detail: String,
    },

    /// A required setting is missing for the requested operation.
    #[error("missing required setting: {setting}")]
    Missing {
        /// The missing setting, in environment-variable form.
        setting: String,
    },
}

/// Resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root of the sharded data directory.
    pub data_dir: PathBuf,

    /// Number of shard groups; `None` disables sharding (flat layout).
    pub data_dir_n_groups: Option<u64>,

    /// Contact email appended to the Crossref User-Agent for polite-pool
    /// access.
    pub email_address: Option<String>,

    /// Passphrase for at-rest payload encryption. Required only when a
    /// source is flagged `encrypt`.
    pub encryption_passphrase: Option<String>,

    /// Path to a local metadata snapshot database; when set, the snapshot
    /// is consulted before the web API.
    pub snapshot_path: Option<PathBuf>,

    /// Formats to try, most preferred first.
    pub format_preference_order: Vec<FormatName>,

    /// Whether to stop after the first successfully acquired format.
    pub skip_remaining_formats: bool,

    /// zlib level for stored metadata; 0 stores raw JSON.
    pub metadata_compression_level: u32,

    /// This machine's hostname, for publisher host restrictions.
    pub hostname: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            data_dir_n_groups: None,
            email_address: None,
            encryption_passphrase: None,
            snapshot_path: None,
            format_preference_order: FormatName::ALL.to_vec(),
            skip_remaining_formats: true,
            metadata_compression_level: 6,
            hostname: local_hostname(),
        }
    }
}

impl Settings {
    /// Loads settings from the environment, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for unparseable values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Self::default();

        if let Some(value) = env_var("DATA_DIR") {
            settings.data_dir = PathBuf::from(value);
        }

        if let Some(value) = env_var("DATA_DIR_N_GROUPS") {
            let n: u64 = value.parse().map_err(|_| ConfigError::InvalidValue {
                var: format!("{ENV_PREFIX}DATA_DIR_N_GROUPS"),
                detail: format!("expected an integer, got {value:?}"),
            })?;
            // Zero means sharding disabled, same as unset.
            settings.data_dir_n_groups = (n != 0).then_some(n);
        }

        settings.email_address = env_var("EMAIL_ADDRESS");
        settings.encryption_passphrase = env_var("ENCRYPTION_PASSPHRASE");
        settings.snapshot_path = env_var("SNAPSHOT_PATH").map(PathBuf::from);

        if let Some(value) = env_var("FORMAT_PREFERENCE_ORDER") {
            settings.format_preference_order = parse_format_order(&value)?;
        }

        if let Some(value) = env_var("SKIP_REMAINING_FORMATS") {
            settings.skip_remaining_formats = parse_bool("SKIP_REMAINING_FORMATS", &value)?;
        }

        if let Some(value) = env_var("METADATA_COMPRESSION_LEVEL") {
            let level: u32 = value.parse().map_err(|_| ConfigError::InvalidValue {
                var: format!("{ENV_PREFIX}METADATA_COMPRESSION_LEVEL"),
                detail: format!("expected 0-9, got {value:?}"),
            })?;
            if level > 9 {
                return Err(ConfigError::InvalidValue {
                    var: format!("{ENV_PREFIX}METADATA_COMPRESSION_LEVEL"),
                    detail: format!("expected 0-9, got {level}"),
                });
            }
            settings.metadata_compression_level = level;
        }

        if let Some(value) = env_var("HOSTNAME") {
            settings.hostname = value;
        }

        debug!(?settings.data_dir, n_groups = ?settings.data_dir_n_groups, "settings loaded");

        Ok(settings)
    }

    /// Returns the encryption passphrase or a fatal configuration error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when no passphrase is configured.
    pub fn require_encryption_passphrase(&self) -> Result<&str, ConfigError> {
        self.encryption_passphrase
            .as_deref()
            .ok_or(ConfigError::Missing {
                setting: format!("{ENV_PREFIX}ENCRYPTION_PASSPHRASE"),
            })
    }
}

/// Reads one `DOIFETCH_<SCOPE>_<NAME>` environment variable for a
/// publisher-specific setting, treating empty values as unset.
pub(crate) fn scoped_env(scope: &str, name: &str) -> Option<String> {
    env_var(&format!("{scope}_{name}"))
}

/// Reads one `DOIFETCH_`-prefixed environment variable, treating empty
/// values as unset.
fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{name}"))
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            var: format!("{ENV_PREFIX}{name}"),
            detail: format!("expected a boolean, got {other:?}"),
        }),
    }
}

fn parse_format_order(value: &str) -> Result<Vec<FormatName>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse().map_err(|()| ConfigError::InvalidValue {
                var: format!("{ENV_PREFIX}FORMAT_PREFERENCE_ORDER"),
                detail: format!("unknown format {part:?}"),
            })
        })
        .collect()
}

fn local_hostname() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}
