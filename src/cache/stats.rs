//! Cache Statistics Module
//!
//! Tracks hit/miss counters and produces point-in-time snapshots.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Hit Counter ==
/// Lock-free hit/miss counters shared by concurrent readers.
#[derive(Debug, Default)]
pub struct HitCounter {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl HitCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Zeroes both counters.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        hit_rate(self.hits(), self.misses())
    }
}

fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

// == Cache Stats ==
/// Snapshot of a cache's performance, not persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub name: String,
    pub hit_count: u64,
    pub miss_count: u64,
    pub hit_rate: f64,
    /// Entry count limit of the memory tier
    pub memory_limit: usize,
    /// Bytes currently used by the disk tier, 0 when memory-only
    pub disk_usage_bytes: u64,
    /// Entries currently resident in the memory tier
    pub entry_count: usize,
}

impl CacheStats {
    /// One-line human readable summary.
    pub fn summary(&self) -> String {
        format!(
            "Cache '{}': {:.1}% hit rate, {} entries, Memory limit: {} entries, Disk: {:.1}MB",
            self.name,
            self.hit_rate * 100.0,
            self.entry_count,
            self.memory_limit,
            self.disk_usage_bytes as f64 / (1024.0 * 1024.0)
        )
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_new() {
        let counter = HitCounter::new();
        assert_eq!(counter.hits(), 0);
        assert_eq!(counter.misses(), 0);
    }

    #[test]
    fn test_hit_rate_no_requests() {
        assert_eq!(HitCounter::new().hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_all_hits() {
        let counter = HitCounter::new();
        counter.record_hit();
        counter.record_hit();
        counter.record_hit();
        assert_eq!(counter.hit_rate(), 1.0);
    }

    #[test]
    fn test_hit_rate_all_misses() {
        let counter = HitCounter::new();
        counter.record_miss();
        counter.record_miss();
        assert_eq!(counter.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let counter = HitCounter::new();
        counter.record_hit();
        counter.record_miss();
        counter.record_miss();
        counter.record_miss();
        assert_eq!(counter.hit_rate(), 0.25);
    }

    #[test]
    fn test_reset() {
        let counter = HitCounter::new();
        counter.record_hit();
        counter.record_miss();
        counter.reset();
        assert_eq!(counter.hits(), 0);
        assert_eq!(counter.misses(), 0);
        assert_eq!(counter.hit_rate(), 0.0);
    }

    #[test]
    fn test_summary_format() {
        let stats = CacheStats {
            name: "rates".to_string(),
            hit_count: 3,
            miss_count: 1,
            hit_rate: 0.75,
            memory_limit: 100,
            disk_usage_bytes: 2 * 1024 * 1024,
            entry_count: 4,
        };
        assert_eq!(
            stats.summary(),
            "Cache 'rates': 75.0% hit rate, 4 entries, Memory limit: 100 entries, Disk: 2.0MB"
        );
    }
}
