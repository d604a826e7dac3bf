//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check tier invariants over generated inputs.

use proptest::prelude::*;
use std::thread::sleep;
use std::time::Duration;

use tempfile::TempDir;

use crate::cache::encoder::{decode_entry, encode_entry};
use crate::cache::{CacheEntry, DiskTier, HitCounter, MemoryStore, TieredCache};
use crate::config::CacheConfig;

// == Test Configuration ==
const TEST_MAX_ENTRIES: usize = 100;
const TEST_TTL: Duration = Duration::from_secs(300);

// == Strategies ==
fn valid_key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_]{1,64}"
}

fn valid_value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{1,256}"
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: String },
    Get { key: String },
    Remove { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (valid_key_strategy(), valid_value_strategy())
            .prop_map(|(key, value)| CacheOp::Set { key, value }),
        valid_key_strategy().prop_map(|key| CacheOp::Get { key }),
        valid_key_strategy().prop_map(|key| CacheOp::Remove { key }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Storing a pair and reading it back before expiry returns the stored value.
    #[test]
    fn prop_roundtrip_storage(key in valid_key_strategy(), value in valid_value_strategy()) {
        let mut store = MemoryStore::new(TEST_MAX_ENTRIES);
        store.set(key.clone(), value.clone(), TEST_TTL);
        prop_assert_eq!(store.get(&key), Some(value));
    }

    // A second write to the same key replaces the first.
    #[test]
    fn prop_overwrite_semantics(
        key in valid_key_strategy(),
        value1 in valid_value_strategy(),
        value2 in valid_value_strategy()
    ) {
        let mut store = MemoryStore::new(TEST_MAX_ENTRIES);
        store.set(key.clone(), value1, TEST_TTL);
        store.set(key.clone(), value2.clone(), TEST_TTL);

        prop_assert_eq!(store.get(&key), Some(value2));
        prop_assert_eq!(store.len(), 1);
    }

    // The entry count never exceeds the count limit.
    #[test]
    fn prop_capacity_enforcement(
        entries in prop::collection::vec((valid_key_strategy(), valid_value_strategy()), 1..200),
        limit in 1usize..50
    ) {
        let mut store = MemoryStore::new(limit);
        for (key, value) in entries {
            store.set(key, value, TEST_TTL);
            prop_assert!(store.len() <= limit, "size {} exceeds limit {}", store.len(), limit);
        }
    }

    // Hit rate is hits / (hits + misses) for any operation sequence.
    #[test]
    fn prop_hit_rate_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..50)) {
        let mut store = MemoryStore::new(TEST_MAX_ENTRIES);
        let counter = HitCounter::new();
        let (mut hits, mut misses) = (0u64, 0u64);

        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    store.set(key, value, TEST_TTL);
                }
                CacheOp::Get { key } => match store.get(&key) {
                    Some(_) => { hits += 1; counter.record_hit(); }
                    None => { misses += 1; counter.record_miss(); }
                },
                CacheOp::Remove { key } => {
                    store.remove(&key);
                }
            }
        }

        let expected = if hits + misses == 0 { 0.0 } else { hits as f64 / (hits + misses) as f64 };
        prop_assert_eq!(counter.hits(), hits);
        prop_assert_eq!(counter.misses(), misses);
        prop_assert_eq!(counter.hit_rate(), expected);
    }

    // Raw payloads survive the disk envelope byte for byte.
    #[test]
    fn prop_raw_entry_exact(payload in prop::collection::vec(any::<u8>(), 0..2048)) {
        let entry = CacheEntry::new(payload.clone(), TEST_TTL);
        let bytes = encode_entry(&entry).unwrap();
        let decoded: CacheEntry<Vec<u8>> = decode_entry(&bytes).unwrap();
        prop_assert_eq!(decoded.value, payload);
    }

    // Structured values survive the envelope; timestamps keep whole seconds.
    #[test]
    fn prop_structured_entry_roundtrip(value in any::<String>(), count in any::<i64>()) {
        let entry = CacheEntry::new(value.clone(), TEST_TTL);
        let decoded: CacheEntry<String> = decode_entry(&encode_entry(&entry).unwrap()).unwrap();
        prop_assert_eq!(decoded.value, value);
        prop_assert_eq!(decoded.created_at.timestamp(), entry.created_at.timestamp());
        prop_assert_eq!(decoded.expires_at.timestamp(), entry.expires_at.timestamp());

        let number = CacheEntry::new(count, TEST_TTL);
        let decoded: CacheEntry<i64> = decode_entry(&encode_entry(&number).unwrap()).unwrap();
        prop_assert_eq!(decoded.value, count);
    }
}

// Disk-backed properties touch the filesystem, so run fewer cases
proptest! {
    #![proptest_config(ProptestConfig::with_cases(10))]

    // After any save, usage is at or below the quota.
    #[test]
    fn prop_disk_quota_bound(
        sizes in prop::collection::vec(1usize..800, 1..12),
        max in 500u64..3000
    ) {
        let root = TempDir::new().unwrap();
        tokio_test::block_on(async {
            let disk = DiskTier::new("prop", root.path(), "test", max, TEST_TTL).await.unwrap();
            for (i, size) in sizes.iter().enumerate() {
                disk.save(&vec![0u8; *size], &format!("key{}", i)).await;
                let usage = disk.usage().await;
                assert!(usage <= max, "usage {} exceeds quota {}", usage, max);
            }
        });
    }

    // Through both tiers, set followed by get returns the value.
    #[test]
    fn prop_tiered_set_get(
        entries in prop::collection::vec((valid_key_strategy(), valid_value_strategy()), 1..20)
    ) {
        let root = TempDir::new().unwrap();
        let config = CacheConfig::new("prop")
            .with_cache_root(root.path())
            .with_predictive_loading(false);

        tokio_test::block_on(async {
            let cache: TieredCache<String, String> = TieredCache::new(config).await.unwrap();
            for (key, value) in entries {
                cache.set(key.clone(), value.clone(), None).await;
                assert_eq!(cache.get(&key).await, Some(value));
            }
            cache.shutdown().await;
        });
    }
}

// Separate block with fewer cases for time-sensitive TTL tests
proptest! {
    #![proptest_config(ProptestConfig::with_cases(3))]

    // After the TTL elapses, a read misses.
    #[test]
    fn prop_ttl_expiration_behavior(key in valid_key_strategy(), value in valid_value_strategy()) {
        let mut store = MemoryStore::new(TEST_MAX_ENTRIES);
        store.set(key.clone(), value.clone(), Duration::from_millis(300));
        prop_assert_eq!(store.get(&key), Some(value));

        sleep(Duration::from_millis(400));

        prop_assert_eq!(store.get(&key), None);
        prop_assert!(store.is_empty());
    }
}
