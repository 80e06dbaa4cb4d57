#![forbid(unsafe_code)]

//! The application's cache set: one font cache, one glyph image cache and the
//! loader that feeds fonts into the former.
//!
//! Constructed explicitly and owned by the host; there is no global instance.

use crate::clock::Clock;
use crate::entry::{CacheEntry, ObjectUrl};
use crate::error::LoadError;
use crate::font_cache::{FontResource, FontResourceCache, ResourceHost, TeardownReport};
use crate::font_loader::{FontLoadState, FontLoader, FontRequest, LoadStart, LoadTicket};
use crate::glyph_cache::GlyphImageCache;
use crate::schedule::SweepReport;
use crate::settings::CompatibilitySettings;

/// Entries removed by [`ResourceCaches::clear_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClearReport {
    pub fonts: usize,
    pub glyphs: usize,
}

impl ClearReport {
    #[must_use]
    pub fn total(&self) -> usize {
        self.fonts + self.glyphs
    }
}

/// Font and glyph image caches sharing one clock.
pub struct ResourceCaches<H: ResourceHost, C: Clock> {
    fonts: FontResourceCache<H, C>,
    glyphs: GlyphImageCache<C>,
    loader: FontLoader,
}

impl<H: ResourceHost, C: Clock + Clone> ResourceCaches<H, C> {
    /// Standard limits, glyph cache configured from `settings`.
    #[must_use]
    pub fn new(host: H, clock: C, settings: &CompatibilitySettings) -> Self {
        Self::from_parts(
            FontResourceCache::new(host, clock.clone()),
            GlyphImageCache::from_settings(settings, clock),
        )
    }
}

impl<H: ResourceHost, C: Clock> ResourceCaches<H, C> {
    #[must_use]
    pub fn from_parts(fonts: FontResourceCache<H, C>, glyphs: GlyphImageCache<C>) -> Self {
        Self {
            fonts,
            glyphs,
            loader: FontLoader::new(),
        }
    }

    /// Run whichever sweeps are due. Returns one report per sweep that ran.
    pub fn tick(&mut self) -> Vec<SweepReport> {
        let reports: Vec<SweepReport> = [self.fonts.tick(), self.glyphs.tick()]
            .into_iter()
            .flatten()
            .collect();
        for report in reports.iter().filter(|r| r.is_noteworthy()) {
            tracing::info!(
                cache = %report.cache,
                removed = report.removed,
                "stale cache entries cleaned"
            );
        }
        reports
    }

    /// Empty both caches, releasing every font resource.
    pub fn clear_all(&mut self) -> ClearReport {
        let report = ClearReport {
            fonts: self.fonts.clear(),
            glyphs: self.glyphs.clear(),
        };
        tracing::info!(
            fonts = report.fonts,
            glyphs = report.glyphs,
            "all caches cleared"
        );
        report
    }

    /// Combined number of cached entries.
    #[must_use]
    pub fn total_size(&self) -> usize {
        self.fonts.size() + self.glyphs.size()
    }

    /// Page-unload cleanup. Glyph images hold no external resources and are
    /// left alone.
    pub fn teardown(&mut self) -> TeardownReport {
        self.fonts.teardown()
    }

    /// Pick up a changed `cache_enabled` switch and cache size.
    pub fn apply_settings(&mut self, settings: &CompatibilitySettings) {
        self.glyphs.set_enabled(settings.cache_enabled);
        self.glyphs.configure(settings.max_cache_size);
    }

    pub fn begin_font_load(&mut self, request: &FontRequest) -> LoadStart<'_, H::Face> {
        self.loader.begin(&mut self.fonts, request)
    }

    pub fn attach_font_handle(&mut self, ticket: &mut LoadTicket, handle: ObjectUrl) {
        self.loader.attach_handle(&mut self.fonts, ticket, handle);
    }

    pub fn abandon_font_load(&mut self, ticket: LoadTicket) {
        self.loader.abandon(&mut self.fonts, ticket);
    }

    pub fn finish_font_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<FontResource<H::Face>, LoadError>,
    ) -> Result<&CacheEntry<FontResource<H::Face>>, LoadError> {
        self.loader.finish(&mut self.fonts, ticket, result)
    }

    #[must_use]
    pub fn font_state(&self, key: &str) -> FontLoadState {
        self.loader.state(&self.fonts, key)
    }

    #[must_use]
    pub fn fonts(&self) -> &FontResourceCache<H, C> {
        &self.fonts
    }

    pub fn fonts_mut(&mut self) -> &mut FontResourceCache<H, C> {
        &mut self.fonts
    }

    #[must_use]
    pub fn glyphs(&self) -> &GlyphImageCache<C> {
        &self.glyphs
    }

    pub fn glyphs_mut(&mut self) -> &mut GlyphImageCache<C> {
        &mut self.glyphs
    }

    #[must_use]
    pub fn loader(&self) -> &FontLoader {
        &self.loader
    }
}

impl<H: ResourceHost, C: Clock> std::fmt::Debug for ResourceCaches<H, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCaches")
            .field("fonts", &self.fonts)
            .field("glyph_count", &self.glyphs.size())
            .field("loader", &self.loader)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ReleaseError;
    use crate::schedule::CacheKind;
    use core::time::Duration;

    #[derive(Debug, Default)]
    struct CountingHost {
        revoked: usize,
    }

    impl ResourceHost for CountingHost {
        type Face = u8;

        fn register_font(&mut self, _: &u8) -> Result<(), ReleaseError> {
            Ok(())
        }

        fn unregister_font(&mut self, _: &u8) -> Result<(), ReleaseError> {
            Ok(())
        }

        fn revoke(&mut self, _: &ObjectUrl) -> Result<(), ReleaseError> {
            self.revoked += 1;
            Ok(())
        }
    }

    fn caches() -> (ResourceCaches<CountingHost, ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        let caches = ResourceCaches::new(
            CountingHost::default(),
            clock.clone(),
            &CompatibilitySettings::default(),
        );
        (caches, clock)
    }

    #[test]
    fn clear_all_reports_both_counts() {
        let (mut caches, _clock) = caches();
        caches
            .fonts_mut()
            .put("a", FontResource::Face(1), Some(ObjectUrl::from("blob:a")));
        caches.glyphs_mut().put("u7bc6.svg", "data:a");
        caches.glyphs_mut().put("u8aaa.svg", "data:b");
        assert_eq!(caches.total_size(), 3);

        let report = caches.clear_all();
        assert_eq!(report, ClearReport { fonts: 1, glyphs: 2 });
        assert_eq!(report.total(), 3);
        assert_eq!(caches.total_size(), 0);
        assert_eq!(caches.fonts().host().revoked, 1);
    }

    #[test]
    fn tick_reports_each_due_sweep() {
        let (mut caches, clock) = caches();
        clock.advance(Duration::from_secs(15 * 60));
        let reports = caches.tick();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].cache, CacheKind::GlyphImage);

        clock.advance(Duration::from_secs(15 * 60));
        let kinds: Vec<CacheKind> = caches.tick().iter().map(|r| r.cache).collect();
        assert_eq!(kinds, vec![CacheKind::Font, CacheKind::GlyphImage]);
    }

    #[test]
    fn teardown_keeps_glyph_images() {
        let (mut caches, _clock) = caches();
        caches
            .fonts_mut()
            .put("a", FontResource::Face(1), Some(ObjectUrl::from("blob:a")));
        caches.glyphs_mut().put("u7bc6.svg", "data:a");

        let report = caches.teardown();
        assert_eq!(report.entries, 1);
        assert_eq!(caches.glyphs().size(), 1);
    }

    #[test]
    fn apply_settings_reconfigures_glyph_cache() {
        let (mut caches, _clock) = caches();
        let settings = CompatibilitySettings {
            cache_enabled: false,
            max_cache_size: 20,
            ..CompatibilitySettings::default()
        };
        caches.apply_settings(&settings);

        assert!(!caches.glyphs().is_enabled());
        assert_eq!(caches.glyphs().max_size(), 20);
    }
}
