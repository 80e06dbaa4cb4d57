#![forbid(unsafe_code)]

//! Fallback glyph image URLs.
//!
//! When no loaded font can draw a seal-script character, the page shows a
//! picture of it instead. The picture's URL is derived from the character's
//! code point and the active image provider, and doubles as the glyph
//! cache key.

use std::fmt;

/// Placeholder substituted in custom URL templates. Only the first
/// occurrence is replaced.
pub const UNICODE_PLACEHOLDER: &str = "{unicode}";

const GLYPHWIKI_BASE: &str = "https://zhs.glyphwiki.org/glyph/";

/// Upper-case hexadecimal code point, zero-padded to at least four digits.
///
/// ```
/// assert_eq!(seal_cache::glyph_url::code_point_hex('A'), "0041");
/// assert_eq!(seal_cache::glyph_url::code_point_hex('說'), "8AAA");
/// assert_eq!(seal_cache::glyph_url::code_point_hex('𠀀'), "20000");
/// ```
#[must_use]
pub fn code_point_hex(ch: char) -> String {
    format!("{:04X}", u32::from(ch))
}

/// Where fallback glyph images come from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ImageProvider {
    /// GlyphWiki's SVG renderer.
    #[default]
    GlyphWiki,
    /// User-supplied template containing [`UNICODE_PLACEHOLDER`].
    Custom { template: String },
}

impl ImageProvider {
    /// Image URL for `ch`, or `None` if the provider cannot produce one.
    #[must_use]
    pub fn image_url(&self, ch: char) -> Option<String> {
        let hex = code_point_hex(ch);
        match self {
            Self::GlyphWiki => Some(format!(
                "{GLYPHWIKI_BASE}u{}.svg",
                hex.to_ascii_lowercase()
            )),
            Self::Custom { template } if template.trim().is_empty() => None,
            Self::Custom { template } => Some(template.replacen(UNICODE_PLACEHOLDER, &hex, 1)),
        }
    }

    /// Short identifier persisted in settings.
    #[must_use]
    pub fn id(&self) -> &'static str {
        match self {
            Self::GlyphWiki => "svgfonts",
            Self::Custom { .. } => "custom",
        }
    }
}

impl fmt::Display for ImageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}
