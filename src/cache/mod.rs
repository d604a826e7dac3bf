//! Cache Module
//!
//! Two-level caching: a count-bounded memory tier in front of a
//! quota-bounded disk tier, both with per-entry TTL.

pub mod encoder;
mod entry;
mod lru;
pub mod quota;
mod stats;

mod disk;
mod memory;
mod tiered;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use disk::{DiskTier, DEFAULT_DISK_TTL};
pub use encoder::{CacheValue, Encoding, Structured};
pub use entry::{AccessPattern, CacheEntry, MIN_TTL};
pub use lru::LruTracker;
pub use memory::{Lookup, MemoryStore, MemoryTier};
pub use stats::{CacheStats, HitCounter};
pub use tiered::{
    CacheKey, PrefetchSource, TieredCache, MIN_PATTERN_ACCESSES, PATTERN_IDLE_LIMIT,
    PREFETCH_BATCH, PREFETCH_CANDIDATES, PREFETCH_WINDOW,
};
