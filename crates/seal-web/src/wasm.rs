#![forbid(unsafe_code)]

use std::collections::HashMap;

use js_sys::{Array, Object, Reflect};
use seal_cache::{
    ClearReport, CompatibilitySettings, FontRequest, FontResource, FontSource, LoadError,
    LoadStart, LoadTicket, ObjectUrl, ReleaseError, ResourceCaches, ResourceHost, SettingsStore,
    StorageError, SweepReport, SystemClock,
};
use wasm_bindgen::prelude::*;
use web_sys::{FontFace, FontFaceSet, Storage, Url};

fn js_detail(value: &JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{value:?}"))
}

/// `document.fonts` plus `URL.revokeObjectURL`.
#[derive(Debug)]
pub struct WebFontHost {
    fonts: FontFaceSet,
}

impl WebFontHost {
    pub fn from_document() -> Result<Self, JsValue> {
        let document = web_sys::window()
            .and_then(|w| w.document())
            .ok_or_else(|| JsValue::from_str("no document"))?;
        Ok(Self {
            fonts: document.fonts(),
        })
    }
}

impl ResourceHost for WebFontHost {
    type Face = FontFace;

    fn register_font(&mut self, face: &FontFace) -> Result<(), ReleaseError> {
        self.fonts
            .add(face)
            .map(|_| ())
            .map_err(|e| ReleaseError::register(js_detail(&e)))
    }

    fn unregister_font(&mut self, face: &FontFace) -> Result<(), ReleaseError> {
        if self.fonts.delete(face) {
            Ok(())
        } else {
            Err(ReleaseError::unregister("face not in document.fonts"))
        }
    }

    fn revoke(&mut self, handle: &ObjectUrl) -> Result<(), ReleaseError> {
        Url::revoke_object_url(handle.as_str()).map_err(|e| ReleaseError::revoke(js_detail(&e)))
    }
}

/// `window.localStorage`.
#[derive(Debug)]
pub struct LocalStorageStore {
    storage: Storage,
}

impl LocalStorageStore {
    pub fn open() -> Result<Self, StorageError> {
        web_sys::window()
            .ok_or_else(|| StorageError::Unavailable("no window".into()))?
            .local_storage()
            .map_err(|e| StorageError::Unavailable(js_detail(&e)))?
            .map(|storage| Self { storage })
            .ok_or_else(|| StorageError::Unavailable("localStorage disabled".into()))
    }
}

impl SettingsStore for LocalStorageStore {
    fn name(&self) -> &str {
        "localStorage"
    }

    fn load(&self, key: &str) -> Option<String> {
        self.storage.get_item(key).ok().flatten()
    }

    fn save(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.storage
            .set_item(key, value)
            .map_err(|e| StorageError::Unavailable(js_detail(&e)))
    }
}

fn set_field(target: &Object, name: &str, value: &JsValue) {
    // Reflect::set only fails on frozen objects, which we never hand out.
    let _ = Reflect::set(target, &JsValue::from_str(name), value);
}

fn sweep_report_to_js(report: &SweepReport) -> JsValue {
    let obj = Object::new();
    set_field(&obj, "cache", &JsValue::from_str(&report.cache.to_string()));
    set_field(&obj, "removed", &JsValue::from(report.removed as u32));
    obj.into()
}

fn clear_report_to_js(report: ClearReport) -> JsValue {
    let obj = Object::new();
    set_field(&obj, "fonts", &JsValue::from(report.fonts as u32));
    set_field(&obj, "glyphs", &JsValue::from(report.glyphs as u32));
    set_field(&obj, "total", &JsValue::from(report.total() as u32));
    obj.into()
}

fn load_error_to_js(error: &LoadError) -> JsValue {
    js_sys::Error::new(&error.to_string()).into()
}

/// Resource caches for the converter page.
///
/// The page calls `tick()` from a `setInterval` and `teardown()` from
/// `beforeunload`.
#[wasm_bindgen]
pub struct SealCaches {
    caches: ResourceCaches<WebFontHost, SystemClock>,
    settings: CompatibilitySettings,
    store: Option<LocalStorageStore>,
    tickets: HashMap<u32, LoadTicket>,
    next_ticket: u32,
}

#[wasm_bindgen]
impl SealCaches {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Result<SealCaches, JsValue> {
        let store = match LocalStorageStore::open() {
            Ok(store) => Some(store),
            Err(e) => {
                tracing::warn!(error = %e, "settings will not persist");
                None
            }
        };
        let settings = store
            .as_ref()
            .map(|s| CompatibilitySettings::load(s))
            .unwrap_or_default();
        let host = WebFontHost::from_document()?;
        let caches = ResourceCaches::new(host, SystemClock::new(), &settings);
        Ok(Self {
            caches,
            settings,
            store,
            tickets: HashMap::new(),
            next_ticket: 0,
        })
    }

    /// Start loading a cloud font. Returns `undefined` when it is already
    /// cached, otherwise a load id for `finishFontLoad` / `failFontLoad`.
    #[wasm_bindgen(js_name = beginCloudFontLoad)]
    pub fn begin_cloud_font_load(
        &mut self,
        font_id: String,
        name: String,
        url: String,
    ) -> Option<u32> {
        self.begin(&FontRequest {
            font_id,
            name,
            source: FontSource::cloud(url),
        })
    }

    /// Start loading a user-picked font file.
    #[wasm_bindgen(js_name = beginLocalFontLoad)]
    pub fn begin_local_font_load(
        &mut self,
        name: String,
        file_name: String,
        byte_len: f64,
    ) -> Option<u32> {
        self.begin(&FontRequest {
            font_id: String::new(),
            name,
            source: FontSource::local(file_name, byte_len as u64),
        })
    }

    /// Hand over the `blob:` URL created for a local font load.
    #[wasm_bindgen(js_name = attachObjectUrl)]
    pub fn attach_object_url(&mut self, load_id: u32, url: String) -> Result<(), JsValue> {
        let mut ticket = self.take_ticket(load_id)?;
        self.caches.attach_font_handle(&mut ticket, ObjectUrl::new(url));
        self.tickets.insert(load_id, ticket);
        Ok(())
    }

    /// Complete a load. Pass `undefined` for stylesheet fonts.
    #[wasm_bindgen(js_name = finishFontLoad)]
    pub fn finish_font_load(
        &mut self,
        load_id: u32,
        face: Option<FontFace>,
    ) -> Result<(), JsValue> {
        let ticket = self.take_ticket(load_id)?;
        let resource = face.map_or(FontResource::Stylesheet, FontResource::Face);
        self.caches
            .finish_font_load(ticket, Ok(resource))
            .map(|_| ())
            .map_err(|e| load_error_to_js(&e))
    }

    #[wasm_bindgen(js_name = failFontLoad)]
    pub fn fail_font_load(&mut self, load_id: u32, message: String) -> Result<(), JsValue> {
        let ticket = self.take_ticket(load_id)?;
        // The error is the caller's own; only the cleanup matters here.
        let _ = self
            .caches
            .finish_font_load(ticket, Err(LoadError::Fetch(message)));
        Ok(())
    }

    /// Drop a load that will never finish, revoking its object URL.
    #[wasm_bindgen(js_name = abandonFontLoad)]
    pub fn abandon_font_load(&mut self, load_id: u32) -> Result<(), JsValue> {
        let ticket = self.take_ticket(load_id)?;
        self.caches.abandon_font_load(ticket);
        Ok(())
    }

    #[wasm_bindgen(js_name = hasFont)]
    pub fn has_font(&self, key: &str) -> bool {
        self.caches.fonts().contains(key)
    }

    #[wasm_bindgen(js_name = removeFont)]
    pub fn remove_font(&mut self, key: &str) -> bool {
        self.caches.fonts_mut().remove(key)
    }

    /// Image URL for `ch` under the active provider.
    #[wasm_bindgen(js_name = glyphUrl)]
    pub fn glyph_url(&self, ch: char) -> Option<String> {
        self.settings.provider().image_url(ch)
    }

    /// Cached image source for `url`, if any.
    #[wasm_bindgen(js_name = cachedGlyph)]
    pub fn cached_glyph(&mut self, url: &str) -> Option<String> {
        self.caches.glyphs_mut().get(url).map(str::to_owned)
    }

    /// Cache an image source. Returns `false` when caching is disabled.
    #[wasm_bindgen(js_name = putGlyph)]
    pub fn put_glyph(&mut self, url: String, source: String) -> bool {
        self.caches.glyphs_mut().put(url, source).is_some()
    }

    /// Run due sweeps. Returns `[{ cache, removed }]` for each sweep that ran.
    pub fn tick(&mut self) -> Array {
        self.caches
            .tick()
            .iter()
            .map(sweep_report_to_js)
            .collect()
    }

    /// Returns `{ fonts, glyphs, total }`.
    #[wasm_bindgen(js_name = clearAll)]
    pub fn clear_all(&mut self) -> JsValue {
        clear_report_to_js(self.caches.clear_all())
    }

    /// Change the glyph cache size and persist it. Out-of-range sizes are
    /// rejected and nothing is saved.
    pub fn configure(&mut self, max_cache_size: u32) -> bool {
        let size = max_cache_size as usize;
        if !self.caches.glyphs_mut().configure(size) {
            return false;
        }
        self.settings.max_cache_size = size;
        self.persist();
        true
    }

    #[wasm_bindgen(js_name = setCacheEnabled)]
    pub fn set_cache_enabled(&mut self, enabled: bool) {
        self.settings.cache_enabled = enabled;
        self.caches.apply_settings(&self.settings);
        self.persist();
    }

    /// `beforeunload` hook: releases every font resource. Returns the number
    /// of object URLs revoked that no cached font referenced.
    ///
    /// Outstanding loads stay open: `beforeunload` can be cancelled, and a
    /// load finishing afterwards is still cached.
    pub fn teardown(&mut self) -> u32 {
        self.caches.teardown().orphan_handles as u32
    }

    #[wasm_bindgen(getter, js_name = fontCacheSize)]
    pub fn font_cache_size(&self) -> u32 {
        self.caches.fonts().size() as u32
    }

    #[wasm_bindgen(getter, js_name = glyphCacheSize)]
    pub fn glyph_cache_size(&self) -> u32 {
        self.caches.glyphs().size() as u32
    }

    #[wasm_bindgen(getter, js_name = totalSize)]
    pub fn total_size(&self) -> u32 {
        self.caches.total_size() as u32
    }
}

impl SealCaches {
    fn begin(&mut self, request: &FontRequest) -> Option<u32> {
        let ticket = match self.caches.begin_font_load(request) {
            LoadStart::Cached(_) => return None,
            LoadStart::Started(ticket) => ticket,
        };
        self.next_ticket = self.next_ticket.wrapping_add(1);
        self.tickets.insert(self.next_ticket, ticket);
        Some(self.next_ticket)
    }

    fn take_ticket(&mut self, id: u32) -> Result<LoadTicket, JsValue> {
        self.tickets
            .remove(&id)
            .ok_or_else(|| JsValue::from_str("unknown font load"))
    }

    fn persist(&mut self) {
        if let Some(store) = self.store.as_mut() {
            if let Err(e) = self.settings.save(&mut *store) {
                tracing::warn!(store = store.name(), error = %e, "failed to save settings");
            }
        }
    }
}
