//! Inventory of the works already present in the data directory.

use tracing::warn;

use crate::config::Settings;
use crate::doi::Doi;
use crate::work::Work;

/// Collects the works in the data directory, in directory order.
///
/// With sharding disabled, top-level entries are quoted DOIs; with
/// sharding enabled, top-level entries are numeric group directories
/// containing the works. Entries inconsistent with the active sharding
/// mode are skipped with a warning, as are names that do not parse as
/// DOIs.
///
/// # Errors
///
/// Returns an I/O error when the data directory itself cannot be read;
/// unreadable entries inside it are skipped.
pub fn collect_works(settings: &Settings) -> std::io::Result<Vec<Work>> {
    let sharded = settings.data_dir_n_groups.is_some();

    let mut works = Vec::new();

    for entry in std::fs::read_dir(&settings.data_dir)? {
        let Ok(entry) = entry else { continue };
        let path = entry.path();

        if !path.is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        let name_is_numeric = !name.is_empty() && name.bytes().all(|byte| byte.is_ascii_digit());

        if sharded {
            if !name_is_numeric {
                warn!(path = %path.display(), "path without digits found; skipping");
                continue;
            }

            for inner in std::fs::read_dir(&path)? {
                let Ok(inner) = inner else { continue };
                if !inner.path().is_dir() {
                    continue;
                }
                push_work(&mut works, &inner.file_name().to_string_lossy(), settings);
            }
        } else {
            if name_is_numeric {
                warn!(path = %path.display(), "path with digits found; skipping");
                continue;
            }

            push_work(&mut works, &name, settings);
        }
    }

    Ok(works)
}

fn push_work(works: &mut Vec<Work>, quoted_name: &str, settings: &Settings) {
    match Doi::parse(quoted_name) {
        Ok(doi) => works.push(Work::new(&doi, settings)),
        Err(error) => {
            warn!(name = quoted_name, error = %error, "directory name is not a DOI; skipping");
        }
    }
}
