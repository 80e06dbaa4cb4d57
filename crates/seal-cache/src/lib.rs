#![forbid(unsafe_code)]

//! Resource caches for the seal-script converter.
//!
//! This crate holds the engine-agnostic half of the converter's resource
//! management:
//! - [`FontResourceCache`] - loaded fonts, releasing blob URLs and registered
//!   faces through a [`ResourceHost`] whenever an entry leaves
//! - [`GlyphImageCache`] - fallback glyph image sources, sized from settings
//! - [`LruTtlPolicy`] - the shared LRU + time-to-live policy behind both
//! - [`FontLoader`] - the Unloaded / Loading / Loaded font lifecycle
//! - [`ResourceCaches`] - both caches under one owner with a single `tick`
//!
//! Time comes from an injected [`Clock`]. Nothing runs in the background:
//! the host calls `tick()` and the caches sweep when their period is due.
//!
//! # Example
//! ```
//! use core::time::Duration;
//! use seal_cache::{GlyphImageCache, GlyphLookup, ImageProvider, ManualClock};
//!
//! let clock = ManualClock::new();
//! let mut glyphs = GlyphImageCache::new(clock.clone());
//!
//! let url = match glyphs.resolve('篆', &ImageProvider::GlyphWiki) {
//!     GlyphLookup::Miss(url) => url,
//!     other => panic!("unexpected {other:?}"),
//! };
//! glyphs.put(url.clone(), "data:image/svg+xml;base64,PHN2Zy8+");
//! assert!(matches!(glyphs.resolve('篆', &ImageProvider::GlyphWiki), GlyphLookup::Hit(_)));
//!
//! // An hour and a bit later the entry is stale and the next due sweep drops it.
//! clock.advance(Duration::from_secs(61 * 60));
//! let report = glyphs.tick().expect("sweep is due");
//! assert_eq!(report.removed, 1);
//! ```

pub mod caches;
pub mod clock;
pub mod entry;
pub mod error;
pub mod font_cache;
pub mod font_loader;
pub mod glyph_cache;
pub mod glyph_url;
pub mod policy;
pub mod schedule;
pub mod settings;

pub use caches::{ClearReport, ResourceCaches};
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{CacheEntry, ObjectUrl, RemovalCause};
pub use error::{ConfigError, LoadError, ReleaseError, ReleaseStep, StorageError};
pub use font_cache::{
    FONT_CACHE_MAX_SIZE, FONT_CACHE_TTL, FONT_SWEEP_PERIOD, FontResource, FontResourceCache,
    ResourceHost, TeardownReport,
};
pub use font_loader::{FontLoadState, FontLoader, FontRequest, FontSource, LoadStart, LoadTicket};
pub use glyph_cache::{
    GLYPH_CACHE_DEFAULT_SIZE, GLYPH_CACHE_SIZE_RANGE, GLYPH_CACHE_TTL, GLYPH_SWEEP_PERIOD,
    GlyphImageCache, GlyphLookup,
};
pub use glyph_url::{ImageProvider, code_point_hex};
pub use policy::{CacheStats, Insertion, LruTtlPolicy};
pub use schedule::{CacheKind, SweepReport, SweepSchedule};
pub use settings::{CompatibilitySettings, FontKind, FontSelection, MemoryStore, SettingsStore};
