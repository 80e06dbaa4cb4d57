#![forbid(unsafe_code)]

//! Browser binding for the seal-script converter's resource caches.
//!
//! On `wasm32` this exports [`SealCaches`] to JavaScript and supplies the
//! engine side of [`seal_cache::ResourceHost`] (`document.fonts`,
//! `URL.revokeObjectURL`) and [`seal_cache::SettingsStore`]
//! (`localStorage`).

#[cfg(target_arch = "wasm32")]
mod wasm;

#[cfg(target_arch = "wasm32")]
pub use wasm::{LocalStorageStore, SealCaches, WebFontHost};

/// Native builds compile this crate as a stub so `cargo check --workspace` stays
/// green on non-wasm targets.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Default)]
pub struct SealCaches;

#[cfg(not(target_arch = "wasm32"))]
impl SealCaches {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self
    }
}
