#![forbid(unsafe_code)]

//! Bounded cache of fallback glyph images.
//!
//! Keys are fully resolved image URLs (see [`ImageProvider::image_url`]) and
//! payloads are the image source to assign to an `<img>`, usually the URL
//! itself. There is no external handle to release, so leaving the cache is
//! purely a memory concern.
//!
//! The cache honours the persisted `cacheEnabled` switch: while disabled,
//! `put` and `get` do nothing and sweeps are skipped. A new bound set while
//! disabled only takes effect once the cache is enabled again.

use core::ops::RangeInclusive;
use core::time::Duration;

use crate::clock::Clock;
use crate::entry::CacheEntry;
use crate::error::ConfigError;
use crate::glyph_url::ImageProvider;
use crate::policy::{CacheStats, LruTtlPolicy};
use crate::schedule::{CacheKind, SweepReport, SweepSchedule};
use crate::settings::CompatibilitySettings;

/// Default maximum number of cached glyph images.
pub const GLYPH_CACHE_DEFAULT_SIZE: usize = 100;

/// Accepted values for [`GlyphImageCache::configure`].
pub const GLYPH_CACHE_SIZE_RANGE: RangeInclusive<usize> = 10..=25565;

/// Glyph images older than this are dropped by the background sweep.
pub const GLYPH_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Interval between glyph image expiry sweeps.
pub const GLYPH_SWEEP_PERIOD: Duration = Duration::from_secs(15 * 60);

/// Result of resolving a character against the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlyphLookup {
    /// Cached image source, ready to display.
    Hit(String),
    /// Not cached; fetch `url` and `put` it once the image loads.
    Miss(String),
    /// The provider cannot produce an image; render the character as text.
    Unavailable,
}

/// LRU + TTL cache of fallback glyph image sources.
#[derive(Debug)]
pub struct GlyphImageCache<C: Clock> {
    policy: LruTtlPolicy<String>,
    /// Configured bound; the policy lags behind it while disabled.
    max_size: usize,
    enabled: bool,
    clock: C,
    schedule: SweepSchedule,
}

impl<C: Clock> GlyphImageCache<C> {
    /// Create an enabled cache with the default bound (100 images, 1 h).
    #[must_use]
    pub fn new(clock: C) -> Self {
        Self::with_limits(clock, GLYPH_CACHE_DEFAULT_SIZE, GLYPH_CACHE_TTL, GLYPH_SWEEP_PERIOD)
    }

    /// Create a cache with custom limits.
    ///
    /// `max_size` is not range-checked here; use [`configure`](Self::configure)
    /// for user-supplied values.
    #[must_use]
    pub fn with_limits(clock: C, max_size: usize, ttl: Duration, sweep_period: Duration) -> Self {
        let schedule = SweepSchedule::new(sweep_period, clock.now());
        Self {
            policy: LruTtlPolicy::new(max_size, ttl),
            max_size,
            enabled: true,
            clock,
            schedule,
        }
    }

    /// Create a cache configured from persisted settings.
    #[must_use]
    pub fn from_settings(settings: &CompatibilitySettings, clock: C) -> Self {
        let mut cache = Self::new(clock);
        cache.configure(settings.max_cache_size);
        cache.set_enabled(settings.cache_enabled);
        cache
    }

    /// Cache an image source under its URL.
    ///
    /// Returns `None` without touching the cache when caching is disabled.
    pub fn put(
        &mut self,
        url: impl Into<String>,
        source: impl Into<String>,
    ) -> Option<&CacheEntry<String>> {
        if !self.enabled {
            return None;
        }
        let now = self.clock.now();
        let inserted = self.policy.insert(url, source.into(), None, now);
        if let Some(evicted) = &inserted.evicted {
            tracing::debug!(url = %evicted.key(), "glyph image evicted");
        }
        tracing::debug!(
            url = %inserted.entry.key(),
            size = inserted.size,
            "glyph image added to cache"
        );
        Some(inserted.entry)
    }

    /// Cached image source for `url`, refreshing its recency on a hit.
    pub fn get(&mut self, url: &str) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        let now = self.clock.now();
        self.policy.get(url, now).map(String::as_str)
    }

    /// Resolve `ch` through `provider`, consulting the cache.
    pub fn resolve(&mut self, ch: char, provider: &ImageProvider) -> GlyphLookup {
        let Some(url) = provider.image_url(ch) else {
            return GlyphLookup::Unavailable;
        };
        match self.get(&url) {
            Some(source) => GlyphLookup::Hit(source.to_owned()),
            None => GlyphLookup::Miss(url),
        }
    }

    #[must_use]
    pub fn contains(&self, url: &str) -> bool {
        self.policy.contains(url)
    }

    /// Evict the least-recently-used image, if any.
    pub fn evict_lru(&mut self) {
        if let Some(entry) = self.policy.pop_lru() {
            tracing::debug!(url = %entry.key(), "glyph image evicted");
        }
    }

    /// Remove one image. No-op for unknown URLs.
    pub fn remove(&mut self, url: &str) -> bool {
        self.policy.remove(url).is_some()
    }

    /// Drop every image older than the TTL, returning how many went.
    pub fn sweep_expired(&mut self) -> usize {
        if !self.enabled {
            return 0;
        }
        let now = self.clock.now();
        let removed = self.policy.drain_expired(now).len();
        if removed > 0 {
            tracing::info!(removed, "expired glyph image cache entries cleaned");
        }
        removed
    }

    /// Run the expiry sweep if its period has elapsed.
    pub fn tick(&mut self) -> Option<SweepReport> {
        if !self.schedule.poll(self.clock.now()) {
            return None;
        }
        Some(SweepReport {
            cache: CacheKind::GlyphImage,
            removed: self.sweep_expired(),
        })
    }

    /// Remove every image, returning how many there were.
    pub fn clear(&mut self) -> usize {
        let removed = self.policy.drain().len();
        tracing::info!(removed, "glyph image cache cleared");
        removed
    }

    /// Change the bound, rejecting values outside [`GLYPH_CACHE_SIZE_RANGE`].
    ///
    /// Shrinking evicts least-recently-used images down to the new bound. While
    /// the cache is disabled the bound is only recorded.
    pub fn try_configure(&mut self, max_size: usize) -> Result<(), ConfigError> {
        if !GLYPH_CACHE_SIZE_RANGE.contains(&max_size) {
            return Err(ConfigError::CacheSizeOutOfRange {
                requested: max_size,
                min: *GLYPH_CACHE_SIZE_RANGE.start(),
                max: *GLYPH_CACHE_SIZE_RANGE.end(),
            });
        }
        self.max_size = max_size;
        if self.enabled {
            self.apply_max_size();
        } else {
            tracing::debug!(max_size, "glyph image cache resize deferred while disabled");
        }
        Ok(())
    }

    fn apply_max_size(&mut self) {
        if self.policy.max_size() == self.max_size {
            return;
        }
        let evicted = self.policy.set_max_size(self.max_size).len();
        tracing::debug!(max_size = self.max_size, evicted, "glyph image cache resized");
    }

    /// Like [`try_configure`](Self::try_configure), but a rejected value is
    /// only logged. Returns whether the new bound took effect.
    pub fn configure(&mut self, max_size: usize) -> bool {
        match self.try_configure(max_size) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    kept = self.max_size,
                    "glyph cache size rejected"
                );
                false
            }
        }
    }

    /// Toggle the global cache switch. Existing entries are kept, apart from
    /// those a bound set while disabled now evicts.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if enabled {
            self.apply_max_size();
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
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
        self.max_size
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.policy.ttl()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.policy.stats()
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

    const MINUTE: Duration = Duration::from_secs(60);

    fn cache() -> (GlyphImageCache<ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        (GlyphImageCache::new(clock.clone()), clock)
    }

    #[test]
    fn defaults() {
        let (cache, _) = cache();
        assert_eq!(cache.max_size(), 100);
        assert_eq!(cache.ttl(), GLYPH_CACHE_TTL);
        assert!(cache.is_enabled());
        assert!(cache.is_empty());
    }

    #[test]
    fn put_and_get_round_trip_source() {
        let (mut cache, _) = cache();
        let url = "https://zhs.glyphwiki.org/glyph/u7bc6.svg";
        let entry = cache.put(url, url).expect("enabled");
        assert_eq!(entry.key(), url);

        assert_eq!(cache.get(url), Some(url));
        assert_eq!(cache.get("https://elsewhere"), None);
    }

    #[test]
    fn resolve_reports_miss_then_hit() {
        let (mut cache, _) = cache();
        let provider = ImageProvider::GlyphWiki;

        let GlyphLookup::Miss(url) = cache.resolve('篆', &provider) else {
            panic!("expected a miss on an empty cache");
        };
        cache.put(url.clone(), url.clone());

        assert_eq!(cache.resolve('篆', &provider), GlyphLookup::Hit(url));
    }

    #[test]
    fn resolve_unavailable_for_empty_template() {
        let (mut cache, _) = cache();
        let provider = ImageProvider::Custom {
            template: String::new(),
        };
        assert_eq!(cache.resolve('篆', &provider), GlyphLookup::Unavailable);
    }

    #[test]
    fn configure_rejects_out_of_range() {
        let (mut cache, _) = cache();
        assert!(!cache.configure(5));
        assert!(!cache.configure(30_000));
        assert_eq!(cache.max_size(), 100);

        assert!(cache.configure(10));
        assert!(cache.configure(25_565));
        assert_eq!(cache.max_size(), 25_565);
    }

    #[test]
    fn try_configure_reports_bounds() {
        let (mut cache, _) = cache();
        assert_eq!(
            cache.try_configure(9),
            Err(ConfigError::CacheSizeOutOfRange {
                requested: 9,
                min: 10,
                max: 25565
            })
        );
    }

    #[test]
    fn shrinking_evicts_oldest() {
        let (mut cache, _) = cache();
        for i in 0..20 {
            let url = format!("https://img/{i}");
            cache.put(url.clone(), url);
        }
        assert!(cache.configure(10));
        assert_eq!(cache.size(), 10);
        assert!(!cache.contains("https://img/9"));
        assert!(cache.contains("https://img/10"));
    }

    #[test]
    fn shrinking_while_disabled_waits_for_reenable() {
        let (mut cache, _) = cache();
        for i in 0..20 {
            let url = format!("https://img/{i}");
            cache.put(url.clone(), url);
        }
        cache.set_enabled(false);
        assert!(cache.configure(10));
        assert_eq!(cache.max_size(), 10);
        assert_eq!(cache.size(), 20);

        cache.set_enabled(true);
        assert_eq!(cache.size(), 10);
        assert!(!cache.contains("https://img/9"));
        assert!(cache.contains("https://img/19"));
    }

    #[test]
    fn disabled_cache_is_inert() {
        let (mut cache, _) = cache();
        cache.set_enabled(false);
        for i in 0..50 {
            let url = format!("https://img/{i}");
            assert!(cache.put(url.clone(), url.clone()).is_none());
            assert_eq!(cache.get(&url), None);
        }
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn disabled_cache_skips_sweeps() {
        let (mut cache, clock) = cache();
        cache.put("https://img/a", "https://img/a");
        cache.set_enabled(false);

        clock.advance(MINUTE * 120);
        assert_eq!(cache.sweep_expired(), 0);
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn tick_sweeps_every_fifteen_minutes() {
        let (mut cache, clock) = cache();
        cache.put("https://img/a", "https://img/a");

        clock.advance(MINUTE * 14);
        assert_eq!(cache.tick(), None);

        clock.advance(MINUTE);
        let report = cache.tick().expect("due after 15 minutes");
        assert_eq!(report.cache, CacheKind::GlyphImage);
        assert_eq!(report.removed, 0);

        // 61 minutes in; next tick is due at 30.
        clock.set(MINUTE * 61);
        let report = cache.tick().expect("due");
        assert_eq!(report.removed, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn from_settings_applies_size_and_switch() {
        let settings = CompatibilitySettings {
            cache_enabled: false,
            max_cache_size: 42,
            ..CompatibilitySettings::default()
        };
        let cache = GlyphImageCache::from_settings(&settings, ManualClock::new());
        assert_eq!(cache.max_size(), 42);
        assert!(!cache.is_enabled());
    }

    #[test]
    fn clear_reports_prior_size() {
        let (mut cache, _) = cache();
        cache.put("https://img/a", "https://img/a");
        cache.put("https://img/b", "https://img/b");
        assert_eq!(cache.clear(), 2);
        assert_eq!(cache.size(), 0);
    }
}
