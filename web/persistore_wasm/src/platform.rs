//! Detection of the storages the current page provides.

use crate::cookies::BrowserCookies;
use crate::extension::BrowserExtensionStorage;
use crate::indexed_db::BrowserIndexedDb;
use crate::web_storage::BrowserStorageArea;
use persistore_storage::Platform;
use std::rc::Rc;
use tracing::debug;
use wasm_bindgen::JsCast;
use web_sys::{HtmlDocument, Window};

/// Builds a [`Platform`] from browser globals.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserPlatform;

impl BrowserPlatform {
    /// Collects every storage reachable from the current global scope.
    ///
    /// Storages the browser refuses (privacy mode, sandboxed iframes, worker
    /// scopes without a document) are left out, and the adapters created
    /// for them fall back to no-op storage.
    pub fn detect() -> Platform {
        let mut platform = Platform::detached();

        if let Some(window) = web_sys::window() {
            platform = Self::with_window(platform, &window);
        }
        if let Some(extension) = BrowserExtensionStorage::detect() {
            platform = platform.with_extension_storage(Rc::new(extension));
        }

        debug!(platform = ?platform, "detected browser storages");
        platform
    }

    fn with_window(mut platform: Platform, window: &Window) -> Platform {
        if let Some(document) = window
            .document()
            .and_then(|document| document.dyn_into::<HtmlDocument>().ok())
        {
            platform = platform.with_cookies(Rc::new(BrowserCookies::new(document)));
        }
        if let Ok(Some(storage)) = window.local_storage() {
            platform = platform.with_local_storage(Rc::new(BrowserStorageArea::new(window.clone(), storage)));
        }
        if let Ok(Some(storage)) = window.session_storage() {
            platform = platform.with_session_storage(Rc::new(BrowserStorageArea::new(window.clone(), storage)));
        }
        if let Ok(Some(factory)) = window.indexed_db() {
            platform = platform.with_indexed_db(Rc::new(BrowserIndexedDb::new(factory)));
        }
        platform
    }
}
