//! `document.cookie`.

use crate::error::js_to_storage;
use persistore_storage::{DocumentCookies, StorageResult};
use web_sys::HtmlDocument;

/// Cookie access through the page's document.
#[derive(Debug, Clone)]
pub struct BrowserCookies {
    document: HtmlDocument,
}

impl BrowserCookies {
    /// Wraps `document`.
    pub fn new(document: HtmlDocument) -> Self {
        Self { document }
    }
}

impl DocumentCookies for BrowserCookies {
    fn cookie_string(&self) -> StorageResult<String> {
        self.document.cookie().map_err(js_to_storage)
    }

    fn write_cookie(&self, assignment: &str) -> StorageResult<()> {
        self.document.set_cookie(assignment).map_err(js_to_storage)
    }
}
