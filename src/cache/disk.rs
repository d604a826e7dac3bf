//! Disk Tier Module
//!
//! Persistent per-key file storage under `<root>/<app-id>.cache.<name>/`.
//!
//! Filenames are the SHA-256 of the key's `Display` form. Two keys with the
//! same display string share a file; callers are trusted to use keys whose
//! display form is unique. A directory must be owned by a single `DiskTier`:
//! quota passes in one instance can race reads in another.

use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::cache::quota;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

/// File TTL for tiers built outside a cache configuration
pub const DEFAULT_DISK_TTL: Duration = Duration::from_secs(86_400);

// == Disk Tier ==
#[derive(Debug)]
pub struct DiskTier {
    name: String,
    dir: PathBuf,
    max_disk_size: u64,
    ttl: Duration,
    /// Shared for reads, exclusive for anything that writes or deletes
    lock: RwLock<()>,
    tmp_seq: AtomicU64,
}

impl DiskTier {
    // == Constructor ==
    /// Creates the tier, creating its directory if missing.
    ///
    /// Failing to create the directory is the one fatal error of the cache.
    pub async fn new(
        name: &str,
        root: &Path,
        app_id: &str,
        max_disk_size: u64,
        ttl: Duration,
    ) -> Result<Self> {
        let dir = root.join(format!("{}.cache.{}", app_id, name));
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| CacheError::Initialization {
                path: dir.clone(),
                source,
            })?;

        info!(
            "Disk tier '{}' at {} (max {} bytes, ttl {}s)",
            name,
            dir.display(),
            max_disk_size,
            ttl.as_secs()
        );

        Ok(Self {
            name: name.to_string(),
            dir,
            max_disk_size,
            ttl,
            lock: RwLock::new(()),
            tmp_seq: AtomicU64::new(0),
        })
    }

    /// Creates the tier described by a cache configuration, using its default TTL.
    pub async fn from_config(config: &CacheConfig) -> Result<Self> {
        Self::new(
            &config.name,
            &config.resolved_root(),
            &config.app_id,
            config.max_disk_size,
            config.default_ttl,
        )
        .await
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding this tier's files.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn max_disk_size(&self) -> u64 {
        self.max_disk_size
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// File backing `key`.
    pub fn file_path<K: Display + ?Sized>(&self, key: &K) -> PathBuf {
        self.dir.join(filename_for(key))
    }

    // == Save ==
    /// Writes `bytes` for `key` via write-then-rename, then enforces the quota.
    pub async fn save<K: Display + ?Sized>(&self, bytes: &[u8], key: &K) {
        let _guard = self.lock.write().await;

        let path = self.file_path(key);
        match self.write_atomic(&path, bytes).await {
            Ok(()) => debug!("Saved to disk cache: {} ({} bytes)", key, bytes.len()),
            Err(e) => {
                error!("Failed to save {} to disk: {}", key, e);
                return;
            }
        }

        let current = quota::usage(&self.dir).await;
        if current > self.max_disk_size {
            quota::enforce(&self.dir, current, self.max_disk_size).await;
        }
    }

    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = self.dir.join(format!(".{}.tmp", seq));

        if let Err(e) = fs::write(&tmp, bytes).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }
        Ok(())
    }

    // == Load ==
    /// Returns the stored bytes, or None if missing, expired or unreadable.
    ///
    /// A file older than the tier TTL is deleted.
    pub async fn load<K: Display + ?Sized>(&self, key: &K) -> Option<Vec<u8>> {
        let path = self.file_path(key);
        {
            let _guard = self.lock.read().await;
            match fs::metadata(&path).await {
                Ok(metadata) => {
                    if !self.is_expired(metadata.modified().ok()) {
                        return match fs::read(&path).await {
                            Ok(bytes) => {
                                debug!("Loaded from disk cache: {}", key);
                                Some(bytes)
                            }
                            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
                            Err(e) => {
                                error!("Failed to load {} from disk: {}", key, e);
                                None
                            }
                        };
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
                Err(e) => {
                    error!("Failed to stat {}: {}", path.display(), e);
                    return None;
                }
            }
        }

        // Expired: re-check under the write lock since a save may have refreshed it
        let _guard = self.lock.write().await;
        if let Ok(metadata) = fs::metadata(&path).await {
            if self.is_expired(metadata.modified().ok()) {
                remove_quietly(&path).await;
                debug!("Disk cache entry expired: {}", key);
            }
        }
        None
    }

    fn is_expired(&self, modified: Option<SystemTime>) -> bool {
        let Some(modified) = modified else {
            return false;
        };
        SystemTime::now()
            .duration_since(modified)
            .map(|age| age > self.ttl)
            .unwrap_or(false)
    }

    pub async fn remove<K: Display + ?Sized>(&self, key: &K) {
        let _guard = self.lock.write().await;
        if remove_quietly(&self.file_path(key)).await {
            debug!("Removed from disk cache: {}", key);
        }
    }

    /// Deletes every file in the tier directory.
    pub async fn remove_all(&self) {
        let _guard = self.lock.write().await;
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                error!("Failed to clear disk cache '{}': {}", self.name, e);
                return;
            }
        };

        let mut removed = 0usize;
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    if remove_quietly(&entry.path()).await {
                        removed += 1;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to list disk cache '{}': {}", self.name, e);
                    break;
                }
            }
        }
        debug!("Cleared disk cache '{}' ({} files)", self.name, removed);
    }

    // == Clean Expired ==
    /// Deletes every file older than the tier TTL. Returns how many were removed.
    pub async fn clean_expired(&self) -> usize {
        let _guard = self.lock.write().await;
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                error!("Failed to clean expired entries in '{}': {}", self.name, e);
                return 0;
            }
        };

        let mut removed = 0usize;
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let modified = match entry.metadata().await {
                Ok(metadata) => metadata.modified().ok(),
                Err(_) => continue,
            };
            if self.is_expired(modified) && remove_quietly(&entry.path()).await {
                removed += 1;
            }
        }

        debug!("Cleaned {} expired disk entries in '{}'", removed, self.name);
        removed
    }

    /// Bytes currently used by the tier.
    pub async fn usage(&self) -> u64 {
        let _guard = self.lock.read().await;
        quota::usage(&self.dir).await
    }
}

fn filename_for<K: Display + ?Sized>(key: &K) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Removes a file, logging failures other than "not found". Returns true if removed.
async fn remove_quietly(path: &Path) -> bool {
    match fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!("Failed to remove {}: {}", path.display(), e);
            false
        }
    }
}
