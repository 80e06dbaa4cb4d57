#![forbid(unsafe_code)]

//! Generic LRU + TTL eviction policy shared by both resource caches.
//!
//! The policy owns a single access-ordered map, so lookup and recency order
//! can never disagree. The container itself is unbounded; the capacity bound
//! is enforced here and every entry that leaves is handed back to the caller.
//! That lets the owning cache release external resources on *every* exit
//! path (eviction, expiry, removal, replacement, clear) instead of having
//! entries dropped silently inside the container.
//!
//! The policy is clock-free: callers pass `now` in. Owning caches read it
//! from their [`Clock`](crate::clock::Clock).

use core::time::Duration;
use std::num::NonZeroUsize;

use lru::LruCache;
use rustc_hash::FxBuildHasher;

use crate::entry::{CacheEntry, ObjectUrl};

/// Statistics about cache behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Number of lookups that found an entry.
    pub hits: u64,
    /// Number of lookups that found nothing.
    pub misses: u64,
    /// Entries dropped to make room.
    pub evictions: u64,
    /// Entries dropped by expiry sweeps.
    pub expirations: u64,
    /// Current number of entries.
    pub size: usize,
    /// Maximum number of entries.
    pub capacity: usize,
}

impl CacheStats {
    /// Calculate hit rate (0.0 to 1.0).
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Result of a single [`LruTtlPolicy::insert`].
#[derive(Debug)]
#[must_use = "displaced entries may own handles that need releasing"]
pub struct Insertion<'a, V> {
    /// The entry now stored under the key.
    pub entry: &'a CacheEntry<V>,
    /// Number of entries after the insertion.
    pub size: usize,
    /// Least-recently-used entry dropped to make room.
    pub evicted: Option<CacheEntry<V>>,
    /// Previous entry under the same key.
    pub replaced: Option<CacheEntry<V>>,
}

/// Bounded, access-ordered map with per-entry creation time.
#[derive(Debug)]
pub struct LruTtlPolicy<V> {
    entries: LruCache<String, CacheEntry<V>, FxBuildHasher>,
    max_size: NonZeroUsize,
    ttl: Duration,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

impl<V> LruTtlPolicy<V> {
    /// Create an empty policy.
    ///
    /// A `max_size` of zero is treated as one.
    #[must_use]
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            entries: LruCache::unbounded_with_hasher(FxBuildHasher),
            max_size: NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN),
            ttl,
            hits: 0,
            misses: 0,
            evictions: 0,
            expirations: 0,
        }
    }

    /// Insert a fresh entry stamped with `now`.
    ///
    /// An existing entry under `key` is replaced without evicting anything.
    /// Otherwise, when the policy is full, exactly one least-recently-used
    /// entry is evicted first.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        payload: V,
        handle: Option<ObjectUrl>,
        now: Duration,
    ) -> Insertion<'_, V> {
        let key = key.into();
        let replaced = self.entries.pop(key.as_str());
        let evicted = if replaced.is_none() && self.entries.len() >= self.max_size.get() {
            self.pop_lru()
        } else {
            None
        };

        let size = self.entries.len() + 1;
        let fresh = CacheEntry::new(key.clone(), payload, handle, now);
        // Unbounded container: this always inserts and never evicts internally.
        let entry = self.entries.get_or_insert(key, move || fresh);
        Insertion {
            entry,
            size,
            evicted,
            replaced,
        }
    }

    /// Look up `key`, refreshing its recency and access time on a hit.
    pub fn get(&mut self, key: &str, now: Duration) -> Option<&V> {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.touch(now);
                self.hits += 1;
                Some(entry.payload())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Look at an entry without touching recency or statistics.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.entries.peek(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    /// Remove and return the least-recently-used entry.
    pub fn pop_lru(&mut self) -> Option<CacheEntry<V>> {
        let (_, entry) = self.entries.pop_lru()?;
        self.evictions += 1;
        Some(entry)
    }

    /// Remove and return the entry under `key`.
    pub fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        self.entries.pop(key)
    }

    /// Remove every entry whose age at `now` exceeds the TTL.
    ///
    /// Entries come back least-recently-used first.
    pub fn drain_expired(&mut self, now: Duration) -> Vec<CacheEntry<V>> {
        let ttl = self.ttl;
        let expired: Vec<String> = self
            .entries
            .iter()
            .rev()
            .filter(|(_, entry)| entry.is_expired(now, ttl))
            .map(|(key, _)| key.clone())
            .collect();

        let removed: Vec<CacheEntry<V>> = expired
            .iter()
            .filter_map(|key| self.entries.pop(key.as_str()))
            .collect();
        self.expirations += removed.len() as u64;
        removed
    }

    /// Remove every entry, least-recently-used first.
    pub fn drain(&mut self) -> Vec<CacheEntry<V>> {
        let mut drained = Vec::with_capacity(self.entries.len());
        while let Some((_, entry)) = self.entries.pop_lru() {
            drained.push(entry);
        }
        drained
    }

    /// Change the bound, evicting least-recently-used entries if it shrank.
    pub fn set_max_size(&mut self, max_size: usize) -> Vec<CacheEntry<V>> {
        self.max_size = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN);
        let mut evicted = Vec::new();
        while self.entries.len() > self.max_size.get() {
            match self.pop_lru() {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }
        evicted
    }

    /// Keys from least- to most-recently used.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().rev().map(|(key, _)| key.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn max_size(&self) -> usize {
        self.max_size.get()
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            expirations: self.expirations,
            size: self.entries.len(),
            capacity: self.max_size.get(),
        }
    }

    /// Reset statistics counters.
    pub fn reset_stats(&mut self) {
        self.hits = 0;
        self.misses = 0;
        self.evictions = 0;
        self.expirations = 0;
    }
}
