//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support,
//! plus the per-key access bookkeeping used for analytics.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Shortest TTL accepted; keeps `expires_at > created_at`.
pub const MIN_TTL: Duration = Duration::from_millis(1);

// == Cache Entry ==
/// A stored value with its lifetime metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Expiration timestamp, always after `created_at`
    pub expires_at: DateTime<Utc>,
    /// Number of reads served from this entry, starting at 1 on creation
    pub access_count: u64,
    /// Last time the entry was read or written
    pub last_accessed: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new cache entry expiring `ttl` from now.
    pub fn new(value: V, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            value,
            created_at: now,
            expires_at: expiry_from(now, ttl),
            access_count: 1,
            last_accessed: now,
        }
    }

    // == Is Valid ==
    /// An entry is valid strictly before its expiration instant.
    pub fn is_valid(&self) -> bool {
        Utc::now() < self.expires_at
    }

    /// Returns a copy with the access counter bumped and `last_accessed` set to now.
    pub fn with_updated_access(&self) -> Self
    where
        V: Clone,
    {
        let mut copy = self.clone();
        copy.access_count += 1;
        copy.last_accessed = Utc::now();
        copy
    }

    /// Remaining lifetime, zero once expired.
    pub fn ttl_remaining(&self) -> Duration {
        (self.expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Computes `now + ttl`, clamping the TTL to [`MIN_TTL`] and saturating on overflow.
pub fn expiry_from(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    let ttl = chrono::Duration::from_std(ttl.max(MIN_TTL))
        .unwrap_or_else(|_| chrono::Duration::days(365 * 100));
    now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// == Access Pattern ==
/// Per-key access bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessPattern {
    /// Reads plus writes
    pub access_count: u64,
    /// Writes only
    pub write_count: u64,
    pub last_accessed: DateTime<Utc>,
}

impl AccessPattern {
    /// Starts a pattern for a first read or write.
    pub fn first(is_write: bool) -> Self {
        Self {
            access_count: 1,
            write_count: u64::from(is_write),
            last_accessed: Utc::now(),
        }
    }

    /// Records one more read or write.
    pub fn record(&mut self, is_write: bool) {
        self.access_count += 1;
        if is_write {
            self.write_count += 1;
        }
        self.last_accessed = Utc::now();
    }

    /// True when the key has not been touched for longer than `idle`.
    pub fn is_idle(&self, now: DateTime<Utc>, idle: Duration) -> bool {
        match chrono::Duration::from_std(idle) {
            Ok(idle) => now - self.last_accessed > idle,
            Err(_) => false,
        }
    }

    /// True when the key was touched within the last `window`.
    pub fn accessed_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        !self.is_idle(now, window)
    }
}
