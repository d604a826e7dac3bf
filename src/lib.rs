//! Tiered Cache - A two-level memory/disk cache
//!
//! Provides a generic key/value cache with TTL expiration, LRU-bounded
//! memory, quota-bounded disk persistence and access analytics.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{CacheStats, CacheValue, PrefetchSource, Structured, TieredCache};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
