#![forbid(unsafe_code)]

//! Persisted configuration consumed by the caches.
//!
//! The caches only ever *read* these values. Loading and saving goes through
//! a [`SettingsStore`], a flat string key-value store (browser `localStorage`
//! in production, [`MemoryStore`] in tests).
//!
//! # Design Invariants
//!
//! 1. **Partial load tolerance**: missing fields take their defaults.
//! 2. **Graceful degradation**: corrupt JSON is logged and replaced by
//!    defaults; it never fails application start-up.
//! 3. **Range safety**: a persisted `maxCacheSize` outside the accepted range
//!    is replaced by the default rather than handed to the cache.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::glyph_cache::{GLYPH_CACHE_DEFAULT_SIZE, GLYPH_CACHE_SIZE_RANGE};
use crate::glyph_url::ImageProvider;

/// Storage key for the selected font.
pub const FONT_SETTINGS_KEY: &str = "seal-converter-font";
/// Storage key for image-mode (compatibility) settings.
pub const COMPATIBILITY_SETTINGS_KEY: &str = "seal-converter-compatibility-settings";

/// Image-mode settings, including the glyph cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompatibilitySettings {
    /// Image mode is active.
    pub enabled: bool,
    /// `"svgfonts"` or `"custom"`.
    pub current_provider: String,
    /// Global switch for the glyph image cache.
    pub cache_enabled: bool,
    pub lazy_load: bool,
    /// Rendered glyph size in CSS pixels.
    pub img_size: u32,
    pub show_char_in_alt: bool,
    pub custom_url_template: String,
    pub max_cache_size: usize,
}

impl Default for CompatibilitySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            current_provider: ImageProvider::GlyphWiki.id().to_owned(),
            cache_enabled: true,
            lazy_load: true,
            img_size: 24,
            show_char_in_alt: true,
            custom_url_template: String::new(),
            max_cache_size: GLYPH_CACHE_DEFAULT_SIZE,
        }
    }
}

impl CompatibilitySettings {
    /// Decode persisted settings, falling back to defaults on corruption.
    #[must_use]
    pub fn from_json_str(json: &str) -> Self {
        match serde_json::from_str::<Self>(json) {
            Ok(settings) => settings.sanitized(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to decode compatibility settings, using defaults");
                Self::default()
            }
        }
    }

    pub fn to_json_string(&self) -> Result<String, StorageError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Replace out-of-range values with their defaults.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        if !GLYPH_CACHE_SIZE_RANGE.contains(&self.max_cache_size) {
            tracing::warn!(
                max_cache_size = self.max_cache_size,
                "persisted glyph cache size out of range, using default"
            );
            self.max_cache_size = GLYPH_CACHE_DEFAULT_SIZE;
        }
        self
    }

    /// Active image provider.
    ///
    /// Unknown provider ids fall back to GlyphWiki.
    #[must_use]
    pub fn provider(&self) -> ImageProvider {
        match self.current_provider.as_str() {
            "custom" => ImageProvider::Custom {
                template: self.custom_url_template.clone(),
            },
            _ => ImageProvider::GlyphWiki,
        }
    }

    pub fn load(store: &dyn SettingsStore) -> Self {
        store
            .load(COMPATIBILITY_SETTINGS_KEY)
            .map(|json| Self::from_json_str(&json))
            .unwrap_or_default()
    }

    pub fn save(&self, store: &mut dyn SettingsStore) -> Result<(), StorageError> {
        store.save(COMPATIBILITY_SETTINGS_KEY, &self.to_json_string()?)
    }
}

/// Kind of font currently applied to the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontKind {
    System,
    Cloud,
    Local,
    Compatibility,
}

/// The persisted font choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontSelection {
    /// Font cache key.
    pub id: String,
    /// Display name.
    pub name: String,
    /// CSS `font-family` value.
    pub family: String,
    #[serde(rename = "type")]
    pub kind: FontKind,
}

impl FontSelection {
    /// Restore the last selection, if one was saved and is readable.
    pub fn load(store: &dyn SettingsStore) -> Option<Self> {
        let json = store.load(FONT_SETTINGS_KEY)?;
        match serde_json::from_str(&json) {
            Ok(selection) => Some(selection),
            Err(e) => {
                tracing::warn!(error = %e, "failed to restore font selection");
                None
            }
        }
    }

    pub fn save(&self, store: &mut dyn SettingsStore) -> Result<(), StorageError> {
        store.save(FONT_SETTINGS_KEY, &serde_json::to_string(self)?)
    }
}

/// Flat string key-value persistence.
pub trait SettingsStore {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Stored value for `key`, if any.
    fn load(&self, key: &str) -> Option<String>;

    fn save(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl SettingsStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn load(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn save(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}
