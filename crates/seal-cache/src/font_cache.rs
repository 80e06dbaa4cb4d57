#![forbid(unsafe_code)]

//! Bounded cache of loaded font resources.
//!
//! Each entry may own a revocable [`ObjectUrl`] (local font files are loaded
//! through `blob:` URLs) and a face registered with the rendering engine.
//! Whenever an entry leaves the cache, whatever the reason, both are
//! released through the injected [`ResourceHost`]:
//!
//! | Exit path | Trigger |
//! |-----------|---------|
//! | evicted   | `put` of a new key while full |
//! | expired   | sweep finds `now - created_at > ttl` |
//! | removed   | explicit `remove` |
//! | replaced  | `put` under an existing key |
//! | cleared   | `clear` / `teardown` |
//!
//! Host failures during release are logged and swallowed; the entry still
//! leaves the cache.
//!
//! Handles are revoked only while they are members of the active-handle set.
//! Membership is consumed by the first release, which is what makes
//! revocation exactly-once even when the same URL is seen on several paths.
//! A released handle is remembered and never tracked again.

use core::time::Duration;
use std::fmt;

use rustc_hash::FxHashSet;

use crate::clock::Clock;
use crate::entry::{CacheEntry, ObjectUrl, RemovalCause};
use crate::error::ReleaseError;
use crate::policy::{CacheStats, LruTtlPolicy};
use crate::schedule::{CacheKind, SweepReport, SweepSchedule};

/// Maximum number of simultaneously cached fonts.
pub const FONT_CACHE_MAX_SIZE: usize = 10;

/// Fonts older than this are dropped by the background sweep.
pub const FONT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Interval between font expiry sweeps.
pub const FONT_SWEEP_PERIOD: Duration = Duration::from_secs(30 * 60);

/// Capabilities the font cache needs from the rendering engine.
///
/// The browser implementation maps these onto `document.fonts.add`,
/// `document.fonts.delete` and `URL.revokeObjectURL`. Tests use a fake.
pub trait ResourceHost {
    /// Engine-side font face handle.
    type Face: PartialEq;

    /// Make `face` available to text rendering.
    fn register_font(&mut self, face: &Self::Face) -> Result<(), ReleaseError>;

    /// Withdraw `face` from text rendering.
    ///
    /// Engines may reject faces they do not know; the cache tolerates that.
    fn unregister_font(&mut self, face: &Self::Face) -> Result<(), ReleaseError>;

    /// Release a blob-backed URL.
    fn revoke(&mut self, handle: &ObjectUrl) -> Result<(), ReleaseError>;
}

/// What a font cache entry holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FontResource<F> {
    /// A face loaded and registered with the engine.
    Face(F),
    /// A font pulled in through a stylesheet; the engine owns it and there is
    /// no face to unregister.
    Stylesheet,
}

impl<F> FontResource<F> {
    #[must_use]
    pub fn face(&self) -> Option<&F> {
        match self {
            Self::Face(face) => Some(face),
            Self::Stylesheet => None,
        }
    }
}

/// Host plus the bookkeeping needed to release resources exactly once.
struct ReleaseLedger<H> {
    host: H,
    active_handles: FxHashSet<ObjectUrl>,
    released: FxHashSet<ObjectUrl>,
    failures: u64,
}

impl<H: ResourceHost> ReleaseLedger<H> {
    fn release(
        &mut self,
        entry: CacheEntry<FontResource<H::Face>>,
        cause: RemovalCause,
        successor: Option<&CacheEntry<FontResource<H::Face>>>,
    ) {
        let key = entry.key().to_owned();
        let (resource, handle) = entry.into_parts();

        if let Some(handle) = handle {
            let kept = successor.and_then(CacheEntry::handle) == Some(&handle);
            if !kept {
                self.revoke(&handle);
            }
        }

        if let FontResource::Face(face) = resource {
            let kept = successor.and_then(|e| e.payload().face()) == Some(&face);
            if !kept {
                if let Err(e) = self.host.unregister_font(&face) {
                    self.failures += 1;
                    tracing::warn!(key = %key, error = %e, "failed to unregister font face");
                }
            }
        }

        tracing::debug!(key = %key, cause = %cause, "font left cache");
    }

    /// Start tracking `handle`. Refused for handles already released.
    fn track(&mut self, handle: &ObjectUrl) -> bool {
        if self.released.contains(handle) {
            tracing::debug!(handle = %handle, "refusing to track a released object url");
            return false;
        }
        self.active_handles.insert(handle.clone());
        true
    }

    fn revoke(&mut self, handle: &ObjectUrl) -> bool {
        if !self.active_handles.remove(handle) {
            tracing::debug!(handle = %handle, "object url already released");
            return false;
        }
        self.released.insert(handle.clone());
        if let Err(e) = self.host.revoke(handle) {
            self.failures += 1;
            tracing::warn!(handle = %handle, error = %e, "failed to revoke object url");
        }
        true
    }
}

/// Outcome of [`FontResourceCache::teardown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TeardownReport {
    /// Entries cleared from the cache.
    pub entries: usize,
    /// Tracked handles revoked that no entry referenced any more.
    pub orphan_handles: usize,
}

/// LRU + TTL cache of loaded fonts.
///
/// # Example
/// ```
/// use seal_cache::{FontResource, FontResourceCache, ManualClock, ObjectUrl};
/// # use seal_cache::{ReleaseError, ResourceHost};
/// # #[derive(Default)]
/// # struct NullHost;
/// # impl ResourceHost for NullHost {
/// #     type Face = u32;
/// #     fn register_font(&mut self, _: &u32) -> Result<(), ReleaseError> { Ok(()) }
/// #     fn unregister_font(&mut self, _: &u32) -> Result<(), ReleaseError> { Ok(()) }
/// #     fn revoke(&mut self, _: &ObjectUrl) -> Result<(), ReleaseError> { Ok(()) }
/// # }
///
/// let mut cache = FontResourceCache::new(NullHost, ManualClock::new());
/// cache.put("local-seal.ttf-2048", FontResource::Face(7), Some(ObjectUrl::from("blob:1")));
///
/// assert_eq!(cache.get("local-seal.ttf-2048"), Some(&FontResource::Face(7)));
/// assert_eq!(cache.clear(), 1);
/// assert_eq!(cache.active_handles(), 0);
/// ```
pub struct FontResourceCache<H: ResourceHost, C: Clock> {
    policy: LruTtlPolicy<FontResource<H::Face>>,
    ledger: ReleaseLedger<H>,
    clock: C,
    schedule: SweepSchedule,
}

impl<H: ResourceHost, C: Clock> fmt::Debug for FontResourceCache<H, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FontResourceCache")
            .field("size", &self.policy.len())
            .field("max_size", &self.policy.max_size())
            .field("ttl", &self.policy.ttl())
            .field("active_handles", &self.ledger.active_handles.len())
            .field("next_sweep", &self.schedule.next_due())
            .finish_non_exhaustive()
    }
}

impl<H: ResourceHost, C: Clock> FontResourceCache<H, C> {
    /// Create a cache with the standard limits (10 fonts, 24 h, 30 min sweeps).
    #[must_use]
    pub fn new(host: H, clock: C) -> Self {
        Self::with_limits(host, clock, FONT_CACHE_MAX_SIZE, FONT_CACHE_TTL, FONT_SWEEP_PERIOD)
    }

    /// Create a cache with custom limits.
    #[must_use]
    pub fn with_limits(
        host: H,
        clock: C,
        max_size: usize,
        ttl: Duration,
        sweep_period: Duration,
    ) -> Self {
        let schedule = SweepSchedule::new(sweep_period, clock.now());
        Self {
            policy: LruTtlPolicy::new(max_size, ttl),
            ledger: ReleaseLedger {
                host,
                active_handles: FxHashSet::default(),
                released: FxHashSet::default(),
                failures: 0,
            },
            clock,
            schedule,
        }
    }

    /// Insert a freshly loaded font.
    ///
    /// When full, the least-recently-used font is evicted first. An existing
    /// entry under `key` is replaced; its handle and face are released unless
    /// the new entry carries the very same ones. A handle that was already
    /// released is not stored with the entry.
    pub fn put(
        &mut self,
        key: impl Into<String>,
        resource: FontResource<H::Face>,
        handle: Option<ObjectUrl>,
    ) -> &CacheEntry<FontResource<H::Face>> {
        let now = self.clock.now();
        let handle = handle.filter(|h| self.ledger.track(h));

        let inserted = self.policy.insert(key, resource, handle, now);
        if let Some(evicted) = inserted.evicted {
            self.ledger.release(evicted, RemovalCause::Evicted, None);
        }
        if let Some(replaced) = inserted.replaced {
            self.ledger
                .release(replaced, RemovalCause::Replaced, Some(inserted.entry));
        }

        tracing::debug!(
            key = %inserted.entry.key(),
            size = inserted.size,
            "font added to cache"
        );
        inserted.entry
    }

    /// Look up a font, refreshing its recency on a hit.
    pub fn get(&mut self, key: &str) -> Option<&FontResource<H::Face>> {
        let now = self.clock.now();
        self.policy.get(key, now)
    }

    /// Look at an entry without refreshing it.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<&CacheEntry<FontResource<H::Face>>> {
        self.policy.peek(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.policy.contains(key)
    }

    /// Evict the least-recently-used font, if any.
    pub fn evict_lru(&mut self) {
        if let Some(entry) = self.policy.pop_lru() {
            self.ledger.release(entry, RemovalCause::Evicted, None);
        }
    }

    /// Remove a font and release its resources. No-op for unknown keys.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.policy.remove(key) {
            Some(entry) => {
                self.ledger.release(entry, RemovalCause::Removed, None);
                true
            }
            None => false,
        }
    }

    /// Drop every font older than the TTL, returning how many went.
    pub fn sweep_expired(&mut self) -> usize {
        let now = self.clock.now();
        let expired = self.policy.drain_expired(now);
        let removed = expired.len();
        for entry in expired {
            self.ledger.release(entry, RemovalCause::Expired, None);
        }
        if removed > 0 {
            tracing::info!(removed, "expired font cache entries cleaned");
        }
        removed
    }

    /// Run the expiry sweep if its period has elapsed.
    pub fn tick(&mut self) -> Option<SweepReport> {
        if !self.schedule.poll(self.clock.now()) {
            return None;
        }
        Some(SweepReport {
            cache: CacheKind::Font,
            removed: self.sweep_expired(),
        })
    }

    /// Remove every font, returning how many entries there were.
    pub fn clear(&mut self) -> usize {
        let drained = self.policy.drain();
        let removed = drained.len();
        for entry in drained {
            self.ledger.release(entry, RemovalCause::Cleared, None);
        }
        tracing::info!(removed, "font cache cleared");
        removed
    }

    /// Page-unload cleanup: clear the cache, then revoke every handle still
    /// tracked, including those never attached to an entry.
    pub fn teardown(&mut self) -> TeardownReport {
        let entries = self.clear();
        let orphans: Vec<ObjectUrl> = self.ledger.active_handles.iter().cloned().collect();
        let mut orphan_handles = 0;
        for handle in &orphans {
            if self.ledger.revoke(handle) {
                orphan_handles += 1;
            }
        }
        tracing::info!(entries, orphan_handles, "font resources torn down");
        TeardownReport {
            entries,
            orphan_handles,
        }
    }

    /// Record a handle allocated before its font finished loading, so that
    /// teardown can reclaim it even if the load never completes.
    /// Returns `false`, tracking nothing, if the handle was already released.
    pub fn track_handle(&mut self, handle: ObjectUrl) -> bool {
        self.ledger.track(&handle)
    }

    /// Revoke a tracked handle outside of any entry (e.g. after a failed
    /// load). Returns `false` if it was not tracked.
    pub fn release_handle(&mut self, handle: &ObjectUrl) -> bool {
        self.ledger.revoke(handle)
    }

    /// Whether `handle` is allocated and not yet revoked.
    #[must_use]
    pub fn is_tracked(&self, handle: &ObjectUrl) -> bool {
        self.ledger.active_handles.contains(handle)
    }

    /// Number of handles allocated and not yet revoked.
    #[must_use]
    pub fn active_handles(&self) -> usize {
        self.ledger.active_handles.len()
    }

    /// Number of host release calls that failed and were swallowed.
    #[must_use]
    pub fn release_failures(&self) -> u64 {
        self.ledger.failures
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.policy.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policy.is_empty()
    }

    #[must_use]
    pub fn max_size(&self) -> usize {
        self.policy.max_size()
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.policy.ttl()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.policy.stats()
    }

    /// Keys from least- to most-recently used.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.policy.keys()
    }

    #[must_use]
    pub fn host(&self) -> &H {
        &self.ledger.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.ledger.host
    }

    #[must_use]
    pub fn clock(&self) -> &C {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use tracing_test::traced_test;

    #[derive(Debug, Default)]
    struct RecordingHost {
        registered: Vec<u32>,
        unregistered: Vec<u32>,
        revoked: Vec<ObjectUrl>,
        fail_unregister: bool,
        fail_revoke: bool,
    }

    impl ResourceHost for RecordingHost {
        type Face = u32;

        fn register_font(&mut self, face: &u32) -> Result<(), ReleaseError> {
            self.registered.push(*face);
            Ok(())
        }

        fn unregister_font(&mut self, face: &u32) -> Result<(), ReleaseError> {
            self.unregistered.push(*face);
            if self.fail_unregister {
                return Err(ReleaseError::unregister("face not in set"));
            }
            Ok(())
        }

        fn revoke(&mut self, handle: &ObjectUrl) -> Result<(), ReleaseError> {
            self.revoked.push(handle.clone());
            if self.fail_revoke {
                return Err(ReleaseError::revoke("stale blob"));
            }
            Ok(())
        }
    }

    fn blob(i: u32) -> ObjectUrl {
        ObjectUrl::new(format!("blob:{i}"))
    }

    fn cache() -> (FontResourceCache<RecordingHost, ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        (
            FontResourceCache::new(RecordingHost::default(), clock.clone()),
            clock,
        )
    }

    fn fill(cache: &mut FontResourceCache<RecordingHost, ManualClock>, n: u32) {
        for i in 0..n {
            cache.put(format!("font-{i}"), FontResource::Face(i), Some(blob(i)));
        }
    }

    #[test]
    fn full_cache_evicts_least_recent_and_releases_it() {
        let (mut cache, _clock) = cache();
        fill(&mut cache, 10);
        assert_eq!(cache.size(), 10);

        cache.put("font-10", FontResource::Face(10), Some(blob(10)));

        assert_eq!(cache.size(), 10);
        assert!(!cache.contains("font-0"));
        assert_eq!(cache.host().unregistered, vec![0]);
        assert_eq!(cache.host().revoked, vec![blob(0)]);
        assert_eq!(cache.active_handles(), 10);
    }

    #[test]
    fn get_protects_from_eviction() {
        let (mut cache, _clock) = cache();
        fill(&mut cache, 10);

        assert_eq!(cache.get("font-0"), Some(&FontResource::Face(0)));
        cache.put("font-10", FontResource::Face(10), None);

        assert!(cache.contains("font-0"));
        assert!(!cache.contains("font-1"));
    }

    #[test]
    fn replacing_releases_superseded_resources_without_evicting() {
        let (mut cache, clock) = cache();
        fill(&mut cache, 10);
        clock.advance(Duration::from_secs(60));

        let entry = cache.put("font-3", FontResource::Face(30), Some(blob(30)));
        assert_eq!(entry.created_at(), Duration::from_secs(60));

        assert_eq!(cache.size(), 10);
        assert!(cache.contains("font-0"));
        assert_eq!(cache.host().unregistered, vec![3]);
        assert_eq!(cache.host().revoked, vec![blob(3)]);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn replacing_with_same_resources_releases_nothing() {
        let (mut cache, _clock) = cache();
        cache.put("font", FontResource::Face(1), Some(blob(1)));
        cache.put("font", FontResource::Face(1), Some(blob(1)));

        assert!(cache.host().unregistered.is_empty());
        assert!(cache.host().revoked.is_empty());
        assert_eq!(cache.active_handles(), 1);

        assert!(cache.remove("font"));
        assert_eq!(cache.host().revoked, vec![blob(1)]);
    }

    #[test]
    fn sweep_removes_only_strictly_older_than_ttl() {
        let (mut cache, clock) = cache();
        cache.put("old", FontResource::Face(1), Some(blob(1)));
        clock.advance(Duration::from_secs(60 * 60));
        cache.put("young", FontResource::Face(2), Some(blob(2)));

        clock.set(FONT_CACHE_TTL);
        assert_eq!(cache.sweep_expired(), 0);

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.sweep_expired(), 1);
        assert!(!cache.contains("old"));
        assert!(cache.contains("young"));
        assert_eq!(cache.host().revoked, vec![blob(1)]);
    }

    #[test]
    fn access_does_not_extend_lifetime() {
        let (mut cache, clock) = cache();
        cache.put("font", FontResource::Face(1), None);

        clock.advance(FONT_CACHE_TTL);
        assert!(cache.get("font").is_some());
        clock.advance(Duration::from_secs(1));

        assert_eq!(cache.sweep_expired(), 1);
    }

    #[test]
    fn tick_waits_for_sweep_period() {
        let (mut cache, clock) = cache();
        clock.advance(Duration::from_secs(29 * 60));
        assert_eq!(cache.tick(), None);

        clock.advance(Duration::from_secs(60));
        assert_eq!(
            cache.tick(),
            Some(SweepReport {
                cache: CacheKind::Font,
                removed: 0,
            })
        );
        assert_eq!(cache.tick(), None);
    }

    #[traced_test]
    #[test]
    fn host_failures_are_swallowed() {
        let (mut cache, _clock) = cache();
        cache.host_mut().fail_unregister = true;
        cache.host_mut().fail_revoke = true;
        cache.put("font", FontResource::Face(1), Some(blob(1)));

        assert!(cache.remove("font"));

        assert!(cache.is_empty());
        assert_eq!(cache.active_handles(), 0);
        assert_eq!(cache.release_failures(), 2);
        assert!(logs_contain("failed to revoke object url"));
        assert!(logs_contain("failed to unregister font face"));
    }

    #[test]
    fn handles_are_revoked_exactly_once() {
        let (mut cache, _clock) = cache();
        cache.put("font", FontResource::Face(1), Some(blob(1)));

        assert!(cache.remove("font"));
        assert!(!cache.remove("font"));
        assert!(!cache.release_handle(&blob(1)));
        assert_eq!(cache.clear(), 0);

        assert_eq!(cache.host().revoked, vec![blob(1)]);
    }

    #[test]
    fn released_handle_is_never_tracked_again() {
        let (mut cache, _clock) = cache();
        cache.put("a", FontResource::Face(1), Some(blob(1)));
        assert!(cache.remove("a"));

        let entry = cache.put("b", FontResource::Face(2), Some(blob(1)));
        assert_eq!(entry.handle(), None);
        assert!(!cache.track_handle(blob(1)));
        assert!(cache.remove("b"));
        cache.teardown();

        assert_eq!(cache.host().revoked, vec![blob(1)]);
        assert_eq!(cache.active_handles(), 0);
    }

    #[test]
    fn teardown_reclaims_orphaned_handles() {
        let (mut cache, _clock) = cache();
        cache.track_handle(ObjectUrl::from("blob:pending"));
        fill(&mut cache, 2);

        let report = cache.teardown();
        assert_eq!(
            report,
            TeardownReport {
                entries: 2,
                orphan_handles: 1,
            }
        );
        assert_eq!(cache.host().revoked.len(), 3);
        assert_eq!(cache.active_handles(), 0);

        assert_eq!(cache.teardown(), TeardownReport::default());
        assert_eq!(cache.host().revoked.len(), 3);
    }

    #[test]
    fn stylesheet_fonts_have_nothing_to_unregister() {
        let (mut cache, _clock) = cache();
        cache.put("noto-serif-sc", FontResource::Stylesheet, None);

        assert_eq!(cache.get("noto-serif-sc"), Some(&FontResource::Stylesheet));
        assert_eq!(cache.clear(), 1);
        assert!(cache.host().unregistered.is_empty());
        assert!(cache.host().revoked.is_empty());
    }

    #[test]
    fn evict_lru_on_empty_cache_is_a_no_op() {
        let (mut cache, _clock) = cache();
        cache.evict_lru();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().evictions, 0);
    }
}
