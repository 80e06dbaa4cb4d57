#![forbid(unsafe_code)]

//! Cache entries and the external handles they may carry.

use core::time::Duration;
use std::fmt;

/// Revocable reference to a transient browser resource.
///
/// In practice this is a `blob:` URL produced by `URL.createObjectURL` for a
/// locally picked font file. It must be revoked exactly once when nothing
/// needs it any more.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectUrl(String);

impl ObjectUrl {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ObjectUrl {
    fn from(url: String) -> Self {
        Self(url)
    }
}

impl From<&str> for ObjectUrl {
    fn from(url: &str) -> Self {
        Self(url.to_owned())
    }
}

/// Why an entry left its cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemovalCause {
    /// Least-recently-used entry dropped to make room.
    Evicted,
    /// Older than the cache's time-to-live at sweep time.
    Expired,
    /// Explicitly removed by key.
    Removed,
    /// Superseded by a new `put` under the same key.
    Replaced,
    /// Dropped by a bulk clear or teardown.
    Cleared,
}

impl RemovalCause {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Evicted => "evicted",
            Self::Expired => "expired",
            Self::Removed => "removed",
            Self::Replaced => "replaced",
            Self::Cleared => "cleared",
        }
    }
}

impl fmt::Display for RemovalCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of cached state.
///
/// Timestamps are monotonic offsets read from the owning cache's
/// [`Clock`](crate::clock::Clock). `last_accessed_at >= created_at` always
/// holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry<V> {
    key: String,
    payload: V,
    handle: Option<ObjectUrl>,
    created_at: Duration,
    last_accessed_at: Duration,
}

impl<V> CacheEntry<V> {
    pub(crate) fn new(key: String, payload: V, handle: Option<ObjectUrl>, now: Duration) -> Self {
        Self {
            key,
            payload,
            handle,
            created_at: now,
            last_accessed_at: now,
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn payload(&self) -> &V {
        &self.payload
    }

    #[must_use]
    pub fn handle(&self) -> Option<&ObjectUrl> {
        self.handle.as_ref()
    }

    #[must_use]
    pub fn created_at(&self) -> Duration {
        self.created_at
    }

    #[must_use]
    pub fn last_accessed_at(&self) -> Duration {
        self.last_accessed_at
    }

    /// Age relative to `now`, zero if the clock reads earlier than creation.
    #[must_use]
    pub fn age(&self, now: Duration) -> Duration {
        now.saturating_sub(self.created_at)
    }

    /// True once the entry is strictly older than `ttl`.
    #[must_use]
    pub fn is_expired(&self, now: Duration, ttl: Duration) -> bool {
        self.age(now) > ttl
    }

    pub(crate) fn touch(&mut self, now: Duration) {
        self.last_accessed_at = now.max(self.created_at);
    }

    /// Split into payload and handle, consuming the entry.
    #[must_use]
    pub fn into_parts(self) -> (V, Option<ObjectUrl>) {
        (self.payload, self.handle)
    }
}
