//! Memory Tier Module
//!
//! Count-bounded in-memory storage with per-entry TTL and LRU eviction.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::cache::entry::expiry_from;
use crate::cache::LruTracker;

#[derive(Debug)]
struct Slot<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

impl<V> Slot<V> {
    fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Result of a non-mutating lookup.
#[derive(Debug, PartialEq)]
pub enum Lookup<V> {
    Hit(V),
    Expired,
    Missing,
}

// == Memory Store ==
/// Synchronous core of the memory tier.
#[derive(Debug)]
pub struct MemoryStore<K, V> {
    entries: HashMap<K, Slot<V>>,
    lru: LruTracker<K>,
    count_limit: usize,
    evictions: u64,
}

impl<K, V> MemoryStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates a store holding at most `count_limit` entries (minimum 1).
    pub fn new(count_limit: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            count_limit: count_limit.max(1),
            evictions: 0,
        }
    }

    // == Set ==
    /// Stores a value, overwriting any previous one and resetting its TTL.
    ///
    /// Evicts least recently used entries while a new key would exceed the count limit.
    /// Returns the evicted keys.
    pub fn set(&mut self, key: K, value: V, ttl: Duration) -> Vec<K> {
        let mut evicted = Vec::new();
        if !self.entries.contains_key(&key) {
            while self.entries.len() >= self.count_limit {
                match self.lru.evict_oldest() {
                    Some(victim) => {
                        self.entries.remove(&victim);
                        self.evictions += 1;
                        evicted.push(victim);
                    }
                    None => break,
                }
            }
        }

        let slot = Slot {
            value,
            expires_at: expiry_from(Utc::now(), ttl),
        };
        self.entries.insert(key.clone(), slot);
        self.lru.touch(&key);
        evicted
    }

    /// Looks a key up without touching recency or evicting.
    pub fn peek(&self, key: &K) -> Lookup<V> {
        match self.entries.get(key) {
            Some(slot) if slot.is_expired() => Lookup::Expired,
            Some(slot) => Lookup::Hit(slot.value.clone()),
            None => Lookup::Missing,
        }
    }

    // == Get ==
    /// Returns the value if present and unexpired; expired entries are removed.
    pub fn get(&mut self, key: &K) -> Option<V> {
        match self.peek(key) {
            Lookup::Hit(value) => {
                self.lru.touch(key);
                Some(value)
            }
            Lookup::Expired => {
                self.remove(key);
                None
            }
            Lookup::Missing => None,
        }
    }

    /// Replaces a live entry with `update(&value)` and resets its TTL, or
    /// removes it when `update` returns None. Expired entries are removed
    /// without calling `update`. Returns the replacement.
    pub fn refresh<F>(&mut self, key: &K, ttl: Duration, update: F) -> Option<V>
    where
        F: FnOnce(&V) -> Option<V>,
    {
        let slot = self.entries.get_mut(key)?;
        if slot.is_expired() {
            self.remove(key);
            return None;
        }
        match update(&slot.value) {
            Some(value) => {
                slot.value = value.clone();
                slot.expires_at = expiry_from(Utc::now(), ttl);
                self.lru.touch(key);
                Some(value)
            }
            None => {
                self.remove(key);
                None
            }
        }
    }

    /// Stores a value only if the key holds no live entry.
    ///
    /// Returns the evicted keys, or None when a live entry was kept.
    pub fn insert_if_absent(&mut self, key: K, value: V, ttl: Duration) -> Option<Vec<K>> {
        if self.entries.get(&key).is_some_and(|slot| !slot.is_expired()) {
            return None;
        }
        Some(self.set(key, value, ttl))
    }

    /// Marks a present key as most recently used.
    pub fn touch(&mut self, key: &K) {
        if self.entries.contains_key(key) {
            self.lru.touch(key);
        }
    }

    /// Removes the key if its entry has expired. Returns true if removed.
    pub fn remove_if_expired(&mut self, key: &K) -> bool {
        if matches!(self.peek(key), Lookup::Expired) {
            self.remove(key);
            true
        } else {
            false
        }
    }

    pub fn remove(&mut self, key: &K) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.lru.remove(key);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
    }

    // == Purge Expired ==
    /// Removes all expired entries, returning how many were dropped.
    pub fn purge_expired(&mut self) -> usize {
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, slot)| slot.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count_limit(&self) -> usize {
        self.count_limit
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }
}

// == Memory Tier ==
/// Thread-safe memory tier: shared reads, exclusive writes.
#[derive(Debug)]
pub struct MemoryTier<K, V> {
    store: RwLock<MemoryStore<K, V>>,
    count_limit: usize,
}

impl<K, V> MemoryTier<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new(count_limit: usize) -> Self {
        let store = MemoryStore::new(count_limit);
        let count_limit = store.count_limit();
        Self {
            store: RwLock::new(store),
            count_limit,
        }
    }

    /// Entry count bound, fixed at construction.
    pub fn count_limit(&self) -> usize {
        self.count_limit
    }

    pub async fn set(&self, key: K, value: V, ttl: Duration) {
        let evicted = self.store.write().await.set(key, value, ttl);
        if !evicted.is_empty() {
            debug!("Memory tier evicted {} entries: {:?}", evicted.len(), evicted);
        }
    }

    // == Get ==
    /// Probes under a read lock; takes the write lock only to touch recency
    /// on a hit or to drop an expired entry.
    pub async fn get(&self, key: &K) -> Option<V> {
        let lookup = self.store.read().await.peek(key);
        match lookup {
            Lookup::Hit(value) => {
                self.store.write().await.touch(key);
                Some(value)
            }
            Lookup::Expired => {
                self.store.write().await.remove_if_expired(key);
                debug!("Memory tier entry expired: {:?}", key);
                None
            }
            Lookup::Missing => None,
        }
    }

    /// Read-modify-write of a live entry under one write lock.
    ///
    /// See [`MemoryStore::refresh`]. A concurrent `set` either lands before the
    /// update sees the value or overwrites the replacement afterwards.
    pub async fn refresh<F>(&self, key: &K, ttl: Duration, update: F) -> Option<V>
    where
        F: FnOnce(&V) -> Option<V>,
    {
        self.store.write().await.refresh(key, ttl, update)
    }

    /// Stores a value unless a live entry exists. Returns true if stored.
    pub async fn insert_if_absent(&self, key: K, value: V, ttl: Duration) -> bool {
        match self.store.write().await.insert_if_absent(key, value, ttl) {
            Some(evicted) => {
                if !evicted.is_empty() {
                    debug!("Memory tier evicted {} entries: {:?}", evicted.len(), evicted);
                }
                true
            }
            None => false,
        }
    }

    /// True if an unexpired entry exists. Does not affect recency.
    pub async fn contains(&self, key: &K) -> bool {
        matches!(self.store.read().await.peek(key), Lookup::Hit(_))
    }

    pub async fn remove(&self, key: &K) -> bool {
        self.store.write().await.remove(key)
    }

    pub async fn remove_all(&self) {
        self.store.write().await.clear();
    }

    pub async fn purge_expired(&self) -> usize {
        self.store.write().await.purge_expired()
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    const LONG: Duration = Duration::from_secs(300);

    #[test]
    fn test_store_set_and_get() {
        let mut store = MemoryStore::new(10);
        store.set("key1", "value1".to_string(), LONG);

        assert_eq!(store.get(&"key1"), Some("value1".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_get_nonexistent() {
        let mut store: MemoryStore<&str, u32> = MemoryStore::new(10);
        assert_eq!(store.get(&"nope"), None);
    }

    #[test]
    fn test_store_overwrite() {
        let mut store = MemoryStore::new(10);
        store.set("key1", 1, LONG);
        store.set("key1", 2, LONG);

        assert_eq!(store.get(&"key1"), Some(2));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_ttl_expiration() {
        let mut store = MemoryStore::new(10);
        store.set("key1", 1, Duration::from_secs(1));
        assert_eq!(store.get(&"key1"), Some(1));

        sleep(Duration::from_millis(1100));

        assert_eq!(store.peek(&"key1"), Lookup::Expired);
        assert_eq!(store.get(&"key1"), None);
        assert!(store.is_empty(), "Expired entry should be evicted on read");
    }

    #[test]
    fn test_store_count_bound() {
        let mut store = MemoryStore::new(2);
        store.set("a", 1, LONG);
        store.set("b", 2, LONG);
        let evicted = store.set("c", 3, LONG);

        assert!(store.len() <= 2);
        assert_eq!(evicted.len(), 1);
        assert_eq!(store.evictions(), 1);
        assert_eq!(store.get(&"c"), Some(3));
    }

    #[test]
    fn test_store_recently_read_survives() {
        let mut store = MemoryStore::new(2);
        store.set("a", 1, LONG);
        store.set("b", 2, LONG);
        store.get(&"a");
        store.set("c", 3, LONG);

        assert_eq!(store.get(&"a"), Some(1));
        assert_eq!(store.get(&"b"), None);
    }

    #[test]
    fn test_zero_limit_is_raised_to_one() {
        let mut store = MemoryStore::new(0);
        store.set("a", 1, LONG);
        assert_eq!(store.count_limit(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_purge_expired() {
        let mut store = MemoryStore::new(10);
        store.set("short", 1, Duration::from_secs(1));
        store.set("long", 2, LONG);

        sleep(Duration::from_millis(1100));

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&"long"), Some(2));
    }

    #[test]
    fn test_store_refresh_replaces_or_removes() {
        let mut store = MemoryStore::new(10);
        store.set("a", 1, LONG);
        store.set("b", 2, LONG);

        assert_eq!(store.refresh(&"a", LONG, |v| Some(v + 10)), Some(11));
        assert_eq!(store.get(&"a"), Some(11));

        assert_eq!(store.refresh(&"b", LONG, |_| None), None);
        assert_eq!(store.get(&"b"), None);
        assert_eq!(store.refresh(&"missing", LONG, |v| Some(*v)), None);
    }

    #[test]
    fn test_store_refresh_skips_expired() {
        let mut store = MemoryStore::new(10);
        store.set("a", 1, Duration::from_millis(50));
        sleep(Duration::from_millis(100));

        let mut called = false;
        assert_eq!(
            store.refresh(&"a", LONG, |v| {
                called = true;
                Some(*v)
            }),
            None
        );
        assert!(!called);
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_insert_if_absent_keeps_live_entry() {
        let mut store = MemoryStore::new(10);
        store.set("a", 1, LONG);

        assert_eq!(store.insert_if_absent("a", 2, LONG), None);
        assert_eq!(store.get(&"a"), Some(1));
        assert_eq!(store.insert_if_absent("b", 3, LONG), Some(Vec::new()));
        assert_eq!(store.get(&"b"), Some(3));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_tier_refresh_never_reverts_a_set() {
        let tier = std::sync::Arc::new(MemoryTier::new(10));
        tier.set("k", 0u64, LONG).await;

        let mut readers = Vec::new();
        for _ in 0..3 {
            let tier = tier.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..2000 {
                    tier.refresh(&"k", LONG, |v| Some(*v)).await;
                }
            }));
        }

        for i in 1..=2000u64 {
            tier.set("k", i, LONG).await;
            assert_eq!(tier.refresh(&"k", LONG, |v| Some(*v)).await, Some(i));
        }
        for reader in readers {
            reader.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_tier_roundtrip_and_remove() {
        let tier = MemoryTier::new(10);
        tier.set("k".to_string(), vec![1u8, 2, 3], LONG).await;

        assert!(tier.contains(&"k".to_string()).await);
        assert_eq!(tier.get(&"k".to_string()).await, Some(vec![1, 2, 3]));
        assert!(tier.remove(&"k".to_string()).await);
        assert_eq!(tier.get(&"k".to_string()).await, None);
    }

    #[tokio::test]
    async fn test_tier_count_limit_respected() {
        let tier = MemoryTier::new(2);
        tier.set("a", 1, LONG).await;
        tier.set("b", 2, LONG).await;
        tier.set("c", 3, LONG).await;

        assert_eq!(tier.count_limit(), 2);
        assert!(tier.len().await <= 2);
    }

    #[tokio::test]
    async fn test_tier_expired_read_evicts() {
        let tier = MemoryTier::new(4);
        tier.set("a", 1, Duration::from_millis(50)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(tier.get(&"a").await, None);
        assert!(tier.is_empty().await);
    }

    #[tokio::test]
    async fn test_tier_remove_all() {
        let tier = MemoryTier::new(4);
        tier.set("a", 1, LONG).await;
        tier.set("b", 2, LONG).await;
        tier.remove_all().await;
        assert_eq!(tier.len().await, 0);
    }
}
