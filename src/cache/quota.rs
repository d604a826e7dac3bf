//! Quota Module
//!
//! Disk usage accounting and oldest-first eviction for a cache directory.
//! Hidden files (leading `.`) are in-flight temporaries and are ignored.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::fs;
use tracing::{debug, error, info, warn};

struct FileInfo {
    path: PathBuf,
    len: u64,
    modified: SystemTime,
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

async fn list_files(dir: &Path) -> io::Result<Vec<FileInfo>> {
    let mut files = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if is_hidden(&entry.file_name()) {
            continue;
        }
        // Files can vanish between listing and stat
        let metadata = match entry.metadata().await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => continue,
            Err(e) => {
                debug!("Skipping {}: {}", entry.path().display(), e);
                continue;
            }
        };
        files.push(FileInfo {
            path: entry.path(),
            len: metadata.len(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }
    Ok(files)
}

// == Usage ==
/// Total size in bytes of the non-hidden files in `dir`.
///
/// Returns 0 and logs if the directory cannot be listed.
pub async fn usage(dir: &Path) -> u64 {
    match list_files(dir).await {
        Ok(files) => files.iter().map(|f| f.len).sum(),
        Err(e) => {
            error!("Failed to calculate disk usage of {}: {}", dir.display(), e);
            0
        }
    }
}

// == Enforce ==
/// Deletes the oldest files (by modification time) until usage is at or
/// below `max_usage`. No-op when `current_usage <= max_usage`.
///
/// Deletion failures are logged and skipped. Returns the number of files removed.
pub async fn enforce(dir: &Path, current_usage: u64, max_usage: u64) -> usize {
    if current_usage <= max_usage {
        return 0;
    }

    let mut files = match list_files(dir).await {
        Ok(files) => files,
        Err(e) => {
            error!("Failed to list {} for quota enforcement: {}", dir.display(), e);
            return 0;
        }
    };
    files.sort_by_key(|f| f.modified);

    let mut total = current_usage;
    let mut removed = 0;
    for file in files {
        if total <= max_usage {
            break;
        }
        match fs::remove_file(&file.path).await {
            Ok(()) => {
                total = total.saturating_sub(file.len);
                removed += 1;
                debug!("Quota evicted {} ({} bytes)", file.path.display(), file.len);
            }
            Err(e) => warn!("Failed to evict {}: {}", file.path.display(), e),
        }
    }

    info!(
        "Quota enforcement on {}: removed {} files, usage {} -> {} bytes (limit {})",
        dir.display(),
        removed,
        current_usage,
        total,
        max_usage
    );
    removed
}
