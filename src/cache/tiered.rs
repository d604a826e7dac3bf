//! Tiered Cache Module
//!
//! Two-level cache combining the memory tier (L1) and the disk tier (L2),
//! with hit/miss statistics, per-key access analytics, batch helpers,
//! warm-up, a prefetch hook and a background maintenance task.

use std::collections::{HashMap, VecDeque};
use std::fmt::{Debug, Display};
use std::future::Future;
use std::hash::Hash;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::cache::encoder::{decode_entry, encode_entry, CacheValue};
use crate::cache::{AccessPattern, CacheEntry, CacheStats, DiskTier, HitCounter, MemoryTier};
use crate::config::CacheConfig;
use crate::error::Result;
use crate::tasks::{spawn_maintenance_task, Maintain, MaintenanceHandle};

/// Access patterns idle longer than this are pruned during maintenance
pub const PATTERN_IDLE_LIMIT: Duration = Duration::from_secs(3600);
/// Access patterns with fewer accesses are pruned during maintenance
pub const MIN_PATTERN_ACCESSES: u64 = 2;
/// Keys touched within this window are prefetch candidates
pub const PREFETCH_WINDOW: Duration = Duration::from_secs(300);
/// Candidate keys collected per miss
pub const PREFETCH_CANDIDATES: usize = 3;
/// Queued keys handed to the prefetch source per pass
pub const PREFETCH_BATCH: usize = 5;

/// Bounds required of cache keys.
pub trait CacheKey: Eq + Hash + Clone + Display + Debug + Send + Sync + 'static {}

impl<T> CacheKey for T where T: Eq + Hash + Clone + Display + Debug + Send + Sync + 'static {}

// == Prefetch Source ==
/// Data source consulted on misses to populate keys that are likely to be read soon.
#[async_trait]
pub trait PrefetchSource<K, V>: Send + Sync {
    /// Returns values for whichever of `keys` the source can provide.
    async fn prefetch(&self, keys: Vec<K>) -> Vec<(K, V)>;
}

struct Inner<K, V> {
    config: CacheConfig,
    memory: MemoryTier<K, CacheEntry<V>>,
    disk: Option<DiskTier>,
    counter: HitCounter,
    /// Held exclusively by writers and shared while a disk hit is promoted,
    /// so a promotion never lands after a newer set or remove.
    write_order: RwLock<()>,
    patterns: RwLock<HashMap<K, AccessPattern>>,
    last_cleanup: Mutex<Instant>,
    prefetch: Option<Arc<dyn PrefetchSource<K, V>>>,
    loading_queue: Mutex<VecDeque<K>>,
    is_preloading: AtomicBool,
}

// == Tiered Cache ==
/// Memory + disk cache over a single key and value type.
///
/// Every operation fails open: I/O or encoding problems are logged and
/// surface as misses or skipped writes. Only construction returns errors.
pub struct TieredCache<K, V>
where
    K: CacheKey,
    V: CacheValue + Clone + Send + Sync + 'static,
{
    inner: Arc<Inner<K, V>>,
    maintenance: Mutex<Option<MaintenanceHandle>>,
}

impl<K, V> TieredCache<K, V>
where
    K: CacheKey,
    V: CacheValue + Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Builds the cache and starts its maintenance task.
    ///
    /// Must be called within a Tokio runtime. Fails if the configuration is
    /// invalid or the disk tier directory cannot be created.
    pub async fn new(config: CacheConfig) -> Result<Self> {
        Self::build(config, None).await
    }

    /// Like [`TieredCache::new`], with a source that serves prefetch requests.
    pub async fn with_prefetch_source(
        config: CacheConfig,
        source: Arc<dyn PrefetchSource<K, V>>,
    ) -> Result<Self> {
        Self::build(config, Some(source)).await
    }

    async fn build(
        config: CacheConfig,
        prefetch: Option<Arc<dyn PrefetchSource<K, V>>>,
    ) -> Result<Self> {
        config.validate()?;

        let disk = if config.enable_disk_tier {
            Some(DiskTier::from_config(&config).await?)
        } else {
            None
        };

        let inner = Arc::new(Inner {
            memory: MemoryTier::new(config.max_memory_count),
            disk,
            counter: HitCounter::new(),
            write_order: RwLock::new(()),
            patterns: RwLock::new(HashMap::new()),
            last_cleanup: Mutex::new(Instant::now()),
            prefetch,
            loading_queue: Mutex::new(VecDeque::new()),
            is_preloading: AtomicBool::new(false),
            config,
        });

        let handle = spawn_maintenance_task(Arc::downgrade(&inner), inner.config.cleanup_interval);

        info!(
            "Initialized cache '{}' with memory:{} disk:{}",
            inner.config.name,
            inner.config.max_memory_count,
            if inner.disk.is_some() {
                inner.config.max_disk_size.to_string()
            } else {
                "disabled".to_string()
            }
        );

        Ok(Self {
            inner,
            maintenance: Mutex::new(Some(handle)),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// File that holds `key` on disk, None when the disk tier is disabled.
    pub fn disk_path(&self, key: &K) -> Option<PathBuf> {
        self.inner.disk.as_ref().map(|disk| disk.file_path(key))
    }

    // == Core Operations ==
    /// Reads `key`, probing memory first and then disk.
    pub async fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key).await
    }

    /// Writes `value` under `key` into both tiers; `None` uses the default TTL.
    pub async fn set(&self, key: K, value: V, ttl: Option<Duration>) {
        self.inner.set(key, value, ttl).await
    }

    pub async fn remove(&self, key: &K) {
        self.inner.remove(key).await
    }

    /// Clears both tiers, the access patterns and the hit/miss counters.
    pub async fn remove_all(&self) {
        self.inner.remove_all().await
    }

    /// True if a valid entry exists in either tier. Does not count as an access.
    pub async fn contains(&self, key: &K) -> bool {
        self.inner.contains(key).await
    }

    // == Batch Operations ==
    /// Sets each item in turn. Not atomic as a whole.
    pub async fn set_batch(&self, items: Vec<(K, V)>, ttl: Option<Duration>) {
        let count = items.len();
        for (key, value) in items {
            self.inner.set(key, value, ttl).await;
        }
        debug!("Batch cached {} items", count);
    }

    /// Gets each key in turn, returning the hits.
    pub async fn get_batch(&self, keys: &[K]) -> HashMap<K, V> {
        let mut results = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.inner.get(key).await {
                results.insert(key.clone(), value);
            }
        }
        debug!("Batch retrieved {}/{} items", results.len(), keys.len());
        results
    }

    /// Bulk population helper.
    pub async fn preload(&self, items: Vec<(K, V)>, ttl: Option<Duration>) {
        info!(
            "Preloading {} items into cache '{}'",
            items.len(),
            self.name()
        );
        self.set_batch(items, ttl).await;
    }

    // == Warm Up ==
    /// Loads every key not already cached through `loader`, caching what it returns.
    ///
    /// A loader returning None only skips that key. Returns the number of keys loaded.
    pub async fn warm_up<F, Fut>(&self, keys: Vec<K>, loader: F) -> usize
    where
        F: Fn(K) -> Fut,
        Fut: Future<Output = Option<V>>,
    {
        info!("Warming up cache '{}' with {} keys", self.name(), keys.len());

        let mut loaded = 0;
        for key in keys {
            if self.inner.contains(&key).await {
                continue;
            }
            match loader(key.clone()).await {
                Some(value) => {
                    self.inner.set(key, value, None).await;
                    loaded += 1;
                }
                None => debug!("Warm-up loader returned nothing for {}", key),
            }
        }
        loaded
    }

    // == Analytics ==
    /// hits / (hits + misses), 0 before any access.
    pub fn hit_rate(&self) -> f64 {
        self.inner.counter.hit_rate()
    }

    pub async fn stats(&self) -> CacheStats {
        self.inner.stats().await
    }

    /// Up to `limit` keys ordered by descending access count.
    pub async fn hot_keys(&self, limit: usize) -> Vec<(K, u64)> {
        let patterns = self.inner.patterns.read().await;
        let mut keys: Vec<(K, u64)> = patterns
            .iter()
            .map(|(key, pattern)| (key.clone(), pattern.access_count))
            .collect();
        keys.sort_by(|a, b| b.1.cmp(&a.1));
        keys.truncate(limit);
        keys
    }

    // == Maintenance ==
    /// Runs a maintenance pass now, regardless of the cleanup interval.
    pub async fn run_maintenance(&self) {
        self.inner.perform_maintenance().await
    }

    /// Stops the maintenance task and waits for it. The cache stays usable.
    pub async fn shutdown(&self) {
        let handle = self.maintenance.lock().await.take();
        if let Some(handle) = handle {
            handle.shutdown().await;
            info!("Cache '{}' maintenance stopped", self.name());
        }
    }
}

impl<K, V> Inner<K, V>
where
    K: CacheKey,
    V: CacheValue + Clone + Send + Sync + 'static,
{
    // == Get ==
    async fn get(self: &Arc<Self>, key: &K) -> Option<V> {
        let refreshed = self
            .memory
            .refresh(key, self.config.default_ttl, |entry| {
                entry.is_valid().then(|| entry.with_updated_access())
            })
            .await;
        if let Some(entry) = refreshed {
            self.record_access(key, false).await;
            self.counter.record_hit();
            return Some(entry.value);
        }

        if let Some(value) = self.load_from_disk(key).await {
            self.record_access(key, false).await;
            self.counter.record_hit();
            return Some(value);
        }

        self.counter.record_miss();
        if self.config.enable_predictive_loading {
            self.trigger_predictive_loading().await;
        }
        None
    }

    /// Reads `key` from disk and promotes a valid entry into memory.
    /// Expired and undecodable files are deleted.
    async fn load_from_disk(&self, key: &K) -> Option<V> {
        let disk = self.disk.as_ref()?;
        let _order = self.write_order.read().await;
        let bytes = disk.load(key).await?;

        match decode_entry::<V>(&bytes) {
            Some(entry) if entry.is_valid() => {
                // Promote with a fresh memory TTL
                let promoted = self
                    .memory
                    .insert_if_absent(
                        key.clone(),
                        entry.with_updated_access(),
                        self.config.default_ttl,
                    )
                    .await;
                if promoted {
                    debug!("Promoted {} from disk", key);
                }
                Some(entry.value)
            }
            Some(_) => {
                debug!("Disk entry expired: {}", key);
                disk.remove(key).await;
                None
            }
            None => {
                warn!("Discarding undecodable disk entry for {}", key);
                disk.remove(key).await;
                None
            }
        }
    }

    // == Set ==
    async fn set(&self, key: K, value: V, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        self.store(key.clone(), value, ttl, true).await;
        self.record_access(&key, true).await;
        debug!("Cached value for key: {} with TTL: {}s", key, ttl.as_secs_f64());
    }

    /// Writes both tiers without touching access analytics.
    ///
    /// With `overwrite` false a key that already holds a valid entry is left
    /// alone. Returns true if the value was stored.
    async fn store(&self, key: K, value: V, ttl: Duration, overwrite: bool) -> bool {
        let entry = CacheEntry::new(value, ttl);

        let encoded = match &self.disk {
            Some(_) => {
                let bytes = encode_entry(&entry);
                if bytes.is_none() {
                    warn!("Skipping disk write for {}: value not encodable", key);
                }
                bytes
            }
            None => None,
        };

        let _order = self.write_order.write().await;
        if !overwrite && self.contains(&key).await {
            return false;
        }
        self.memory.set(key.clone(), entry, ttl).await;
        if let (Some(disk), Some(bytes)) = (&self.disk, encoded) {
            disk.save(&bytes, &key).await;
        }
        true
    }

    async fn remove(&self, key: &K) {
        {
            let _order = self.write_order.write().await;
            self.memory.remove(key).await;
            if let Some(disk) = &self.disk {
                disk.remove(key).await;
            }
        }
        self.patterns.write().await.remove(key);
        debug!("Removed cache entry for key: {}", key);
    }

    async fn remove_all(&self) {
        {
            let _order = self.write_order.write().await;
            self.memory.remove_all().await;
            if let Some(disk) = &self.disk {
                disk.remove_all().await;
            }
        }
        self.patterns.write().await.clear();
        self.counter.reset();
        info!("Cleared all cache entries for '{}'", self.config.name);
    }

    async fn contains(&self, key: &K) -> bool {
        if self.memory.contains(key).await {
            return true;
        }
        match &self.disk {
            Some(disk) => match disk.load(key).await {
                Some(bytes) => decode_entry::<V>(&bytes).is_some_and(|entry| entry.is_valid()),
                None => false,
            },
            None => false,
        }
    }

    async fn record_access(&self, key: &K, is_write: bool) {
        if !self.config.enable_analytics {
            return;
        }
        let mut patterns = self.patterns.write().await;
        match patterns.get_mut(key) {
            Some(pattern) => pattern.record(is_write),
            None => {
                patterns.insert(key.clone(), AccessPattern::first(is_write));
            }
        }
    }

    async fn stats(&self) -> CacheStats {
        let disk_usage_bytes = match &self.disk {
            Some(disk) => disk.usage().await,
            None => 0,
        };
        CacheStats {
            name: self.config.name.clone(),
            hit_count: self.counter.hits(),
            miss_count: self.counter.misses(),
            hit_rate: self.counter.hit_rate(),
            memory_limit: self.memory.count_limit(),
            disk_usage_bytes,
            entry_count: self.memory.len().await,
        }
    }

    // == Predictive Loading ==
    async fn trigger_predictive_loading(self: &Arc<Self>) {
        if self.is_preloading.load(Ordering::Acquire) {
            return;
        }

        let related = self.predict_related_keys().await;
        if related.is_empty() {
            return;
        }
        self.loading_queue.lock().await.extend(related);
        self.start_predictive_loading().await;
    }

    /// Keys touched within the prefetch window, at most [`PREFETCH_CANDIDATES`].
    async fn predict_related_keys(&self) -> Vec<K> {
        let now = Utc::now();
        self.patterns
            .read()
            .await
            .iter()
            .filter(|(_, pattern)| pattern.accessed_within(now, PREFETCH_WINDOW))
            .map(|(key, _)| key.clone())
            .take(PREFETCH_CANDIDATES)
            .collect()
    }

    async fn start_predictive_loading(self: &Arc<Self>) {
        let Some(source) = self.prefetch.clone() else {
            let dropped = self.take_prefetch_batch().await.len();
            if dropped > 0 {
                debug!("No prefetch source; dropping {} prefetch candidates", dropped);
            }
            return;
        };

        // Queued keys stay put while another load is running
        if self
            .is_preloading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let batch = self.take_prefetch_batch().await;
        if batch.is_empty() {
            self.is_preloading.store(false, Ordering::Release);
            return;
        }

        debug!("Starting predictive loading for {} keys", batch.len());
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let fetched = source.prefetch(batch).await;
            let mut stored = 0;
            for (key, value) in fetched {
                if inner.store(key, value, inner.config.default_ttl, false).await {
                    stored += 1;
                }
            }
            inner.is_preloading.store(false, Ordering::Release);
            debug!("Predictive loading stored {} values", stored);
        });
    }

    async fn take_prefetch_batch(&self) -> Vec<K> {
        let mut queue = self.loading_queue.lock().await;
        let size = queue.len().min(PREFETCH_BATCH);
        queue.drain(..size).collect()
    }

    // == Maintenance ==
    async fn perform_maintenance(&self) {
        debug!("Starting cache maintenance for '{}'", self.config.name);

        let purged_disk = match &self.disk {
            Some(disk) => disk.clean_expired().await,
            None => 0,
        };
        let purged_memory = self.memory.purge_expired().await;
        let pruned = self.prune_access_patterns().await;

        let stats = self.stats().await;
        info!(
            "Cache '{}' stats - Hit rate: {:.1}%, Entries: {}, purged {} disk / {} memory entries, pruned {} patterns",
            stats.name,
            stats.hit_rate * 100.0,
            stats.entry_count,
            purged_disk,
            purged_memory,
            pruned
        );
        *self.last_cleanup.lock().await = Instant::now();
    }

    /// Drops patterns idle over an hour or accessed fewer than twice.
    async fn prune_access_patterns(&self) -> usize {
        let now = Utc::now();
        let mut patterns = self.patterns.write().await;
        let before = patterns.len();
        patterns.retain(|_, pattern| {
            !pattern.is_idle(now, PATTERN_IDLE_LIMIT)
                && pattern.access_count >= MIN_PATTERN_ACCESSES
        });
        before - patterns.len()
    }
}

#[async_trait]
impl<K, V> Maintain for Inner<K, V>
where
    K: CacheKey,
    V: CacheValue + Clone + Send + Sync + 'static,
{
    async fn maintain(&self) {
        let elapsed = self.last_cleanup.lock().await.elapsed();
        if elapsed < self.config.cleanup_interval {
            return;
        }
        self.perform_maintenance().await;
    }
}
