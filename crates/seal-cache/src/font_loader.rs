#![forbid(unsafe_code)]

//! Font load lifecycle on top of [`FontResourceCache`].
//!
//! ```text
//!   Unloaded ──begin──▶ Loading ──finish(Ok)──▶ Loaded ──evict/expire/clear──▶ Unloaded
//!                          │
//!                          └──finish(Err) / abandon──▶ Unloaded
//! ```
//!
//! The loader never performs I/O. The host fetches or decodes the font
//! between [`FontLoader::begin`] and [`FontLoader::finish`], possibly across
//! an `await`. Two requests for the same key may both miss and both finish;
//! the second `put` replaces the first (last writer wins) and the replaced
//! entry's resources are released by the cache.

use rustc_hash::FxHashMap;

use crate::clock::Clock;
use crate::entry::{CacheEntry, ObjectUrl};
use crate::error::LoadError;
use crate::font_cache::{FontResource, FontResourceCache, ResourceHost};
use crate::settings::{FontKind, FontSelection};

/// Marker for fonts served through a CSS stylesheet (e.g. Google Fonts `css2?`).
const STYLESHEET_MARKER: &str = "css2?";

/// Where a font comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FontSource {
    /// Stylesheet link; the engine loads and owns the faces.
    Stylesheet { url: String },
    /// Direct font file URL.
    Remote { url: String },
    /// File picked by the user, loaded through a `blob:` URL.
    Local { file_name: String, byte_len: u64 },
}

impl FontSource {
    /// Classify a cloud font URL.
    #[must_use]
    pub fn cloud(url: impl Into<String>) -> Self {
        let url = url.into();
        if url.contains(STYLESHEET_MARKER) {
            Self::Stylesheet { url }
        } else {
            Self::Remote { url }
        }
    }

    #[must_use]
    pub fn local(file_name: impl Into<String>, byte_len: u64) -> Self {
        Self::Local {
            file_name: file_name.into(),
            byte_len,
        }
    }

    #[must_use]
    pub fn kind(&self) -> FontKind {
        match self {
            Self::Stylesheet { .. } | Self::Remote { .. } => FontKind::Cloud,
            Self::Local { .. } => FontKind::Local,
        }
    }
}

/// A request to make a font available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontRequest {
    /// Catalogue id for cloud fonts.
    pub font_id: String,
    /// Display name, also used as the CSS family.
    pub name: String,
    pub source: FontSource,
}

impl FontRequest {
    /// Cache key: the catalogue id for cloud fonts, name and size for local
    /// files.
    #[must_use]
    pub fn cache_key(&self) -> String {
        match &self.source {
            FontSource::Local {
                file_name,
                byte_len,
            } => format!("local-{file_name}-{byte_len}"),
            FontSource::Stylesheet { .. } | FontSource::Remote { .. } => self.font_id.clone(),
        }
    }

    /// Selection to persist once the font is applied.
    #[must_use]
    pub fn selection(&self) -> FontSelection {
        let name = match &self.source {
            FontSource::Local { file_name, .. } => format!("{} ({file_name})", self.name),
            FontSource::Stylesheet { .. } | FontSource::Remote { .. } => self.name.clone(),
        };
        FontSelection {
            id: self.cache_key(),
            name,
            family: self.name.clone(),
            kind: self.source.kind(),
        }
    }
}

/// Lifecycle state of one font key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontLoadState {
    Unloaded,
    Loading,
    Loaded,
}

/// An outstanding load. Hand it back to [`FontLoader::finish`] or
/// [`FontLoader::abandon`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "an unfinished load keeps its key in the Loading state"]
pub struct LoadTicket {
    key: String,
    handle: Option<ObjectUrl>,
}

impl LoadTicket {
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn handle(&self) -> Option<&ObjectUrl> {
        self.handle.as_ref()
    }
}

/// Outcome of [`FontLoader::begin`].
#[derive(Debug)]
pub enum LoadStart<'a, F> {
    /// Already cached; recency refreshed.
    Cached(&'a FontResource<F>),
    /// Cache miss; the host should load the font.
    Started(LoadTicket),
}

/// Tracks in-flight loads and drives entries into the font cache.
#[derive(Debug, Default)]
pub struct FontLoader {
    in_flight: FxHashMap<String, usize>,
}

impl FontLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of `key`. An in-flight load wins over a cached entry.
    #[must_use]
    pub fn state<H: ResourceHost, C: Clock>(
        &self,
        cache: &FontResourceCache<H, C>,
        key: &str,
    ) -> FontLoadState {
        if self.in_flight.contains_key(key) {
            FontLoadState::Loading
        } else if cache.contains(key) {
            FontLoadState::Loaded
        } else {
            FontLoadState::Unloaded
        }
    }

    /// Number of loads begun and not yet finished.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.values().sum()
    }

    /// Check the cache for `request`, or start a load on a miss.
    ///
    /// Concurrent loads of one key are not de-duplicated.
    pub fn begin<'c, H: ResourceHost, C: Clock>(
        &mut self,
        cache: &'c mut FontResourceCache<H, C>,
        request: &FontRequest,
    ) -> LoadStart<'c, H::Face> {
        let key = request.cache_key();
        if let Some(resource) = cache.get(&key) {
            tracing::debug!(key = %key, "font served from cache");
            return LoadStart::Cached(resource);
        }

        let pending = self.in_flight.entry(key.clone()).or_insert(0);
        *pending += 1;
        tracing::debug!(key = %key, pending = *pending, "font load started");
        LoadStart::Started(LoadTicket { key, handle: None })
    }

    /// Record the object URL allocated for a local font load.
    ///
    /// The cache tracks it from now on, so teardown reclaims it even if the
    /// load never finishes.
    pub fn attach_handle<H: ResourceHost, C: Clock>(
        &self,
        cache: &mut FontResourceCache<H, C>,
        ticket: &mut LoadTicket,
        handle: ObjectUrl,
    ) {
        if ticket.handle.as_ref() == Some(&handle) {
            return;
        }
        if let Some(previous) = ticket.handle.take() {
            cache.release_handle(&previous);
        }
        if cache.track_handle(handle.clone()) {
            ticket.handle = Some(handle);
        }
    }

    /// Give up on a load that will never report an outcome.
    ///
    /// The key leaves the Loading state and the ticket's handle is revoked.
    pub fn abandon<H: ResourceHost, C: Clock>(
        &mut self,
        cache: &mut FontResourceCache<H, C>,
        ticket: LoadTicket,
    ) {
        self.settle(&ticket.key);
        if let Some(handle) = &ticket.handle {
            cache.release_handle(handle);
        }
        tracing::debug!(key = %ticket.key, "font load abandoned");
    }

    /// Complete a load.
    ///
    /// On success the face is registered with the host and cached together
    /// with the ticket's handle, if that handle is still live. On failure, or
    /// if registration is refused, the handle is revoked, nothing is cached
    /// and the error is returned.
    pub fn finish<'c, H: ResourceHost, C: Clock>(
        &mut self,
        cache: &'c mut FontResourceCache<H, C>,
        ticket: LoadTicket,
        result: Result<FontResource<H::Face>, LoadError>,
    ) -> Result<&'c CacheEntry<FontResource<H::Face>>, LoadError> {
        self.settle(&ticket.key);
        let LoadTicket { key, handle } = ticket;
        // Teardown may have revoked the handle while the load was in flight.
        let handle = handle.filter(|h| cache.is_tracked(h));

        let outcome = result.and_then(|resource| {
            let registered = resource
                .face()
                .map(|face| cache.host_mut().register_font(face));
            match registered {
                Some(Err(e)) => Err(LoadError::Register(e)),
                Some(Ok(())) | None => Ok(resource),
            }
        });

        match outcome {
            Ok(resource) => {
                tracing::debug!(key = %key, "font load finished");
                Ok(cache.put(key, resource, handle))
            }
            Err(e) => {
                if let Some(handle) = &handle {
                    cache.release_handle(handle);
                }
                tracing::warn!(key = %key, error = %e, "font load failed");
                Err(e)
            }
        }
    }

    fn settle(&mut self, key: &str) {
        if let Some(pending) = self.in_flight.get_mut(key) {
            *pending = pending.saturating_sub(1);
            if *pending == 0 {
                self.in_flight.remove(key);
            }
        }
    }
}
